//! Command-digest artifact cache.
//!
//! An artifact is up to date when it exists and the digest of the command
//! (plus any inputs folded into the digest) matches the digest recorded by
//! the previous run. Changing a command line therefore forces a rebuild
//! even when sources did not change.

use std::fs;
use std::hash::Hasher;
use std::io;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHasher};
use tracing::{debug, trace};

const CACHE_FILE_NAME: &str = "command-cache.txt";

/// Digest table keyed by artifact path.
pub struct ArtifactCache {
    cache_dir: PathBuf,
    /// Digests recorded by the previous run.
    previous: FxHashMap<String, u64>,
    /// Digests of this run's commands, written back by [`ArtifactCache::save`].
    current: FxHashMap<String, u64>,
}

impl ArtifactCache {
    /// Load the previous run's digests from `cache_dir`, tolerating a
    /// missing or malformed cache file (everything rebuilds).
    pub fn load(cache_dir: impl Into<PathBuf>) -> ArtifactCache {
        let cache_dir = cache_dir.into();
        let mut previous = FxHashMap::default();
        if let Ok(contents) = fs::read_to_string(cache_dir.join(CACHE_FILE_NAME)) {
            for line in contents.lines() {
                if let Some((digest, artifact)) = line.split_once('\t') {
                    if let Ok(digest) = digest.parse::<u64>() {
                        previous.insert(artifact.to_string(), digest);
                    }
                }
            }
        }
        debug!(entries = previous.len(), dir = %cache_dir.display(), "loaded command cache");
        ArtifactCache {
            cache_dir,
            previous,
            current: FxHashMap::default(),
        }
    }

    /// Digest a command line plus any extra inputs (e.g. generated source
    /// text) that should force a rebuild when they change.
    pub fn digest(command: &[String], extra_inputs: &[&str]) -> u64 {
        let mut hasher = FxHasher::default();
        for argument in command {
            hasher.write(argument.as_bytes());
            hasher.write_u8(0);
        }
        for input in extra_inputs {
            hasher.write(input.as_bytes());
            hasher.write_u8(0);
        }
        hasher.finish()
    }

    /// Record this run's command for `artifact` and report whether it must
    /// be rebuilt.
    pub fn needs_rebuild(
        &mut self,
        artifact: &Path,
        command: &[String],
        extra_inputs: &[&str],
    ) -> bool {
        let digest = Self::digest(command, extra_inputs);
        let key = artifact.to_string_lossy().into_owned();
        self.current.insert(key.clone(), digest);

        if !artifact.exists() {
            trace!(artifact = %key, "rebuild: artifact missing");
            return true;
        }
        match self.previous.get(&key) {
            Some(previous) if *previous == digest => false,
            _ => {
                trace!(artifact = %key, "rebuild: command changed");
                true
            }
        }
    }

    /// Persist this run's digests. Artifacts not touched this run keep their
    /// previous entries so partial runs do not forget them.
    pub fn save(&self) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir)?;
        let mut merged: FxHashMap<&str, u64> = FxHashMap::default();
        for (artifact, digest) in &self.previous {
            merged.insert(artifact, *digest);
        }
        for (artifact, digest) in &self.current {
            merged.insert(artifact, *digest);
        }

        let mut lines: Vec<String> = merged
            .iter()
            .map(|(artifact, digest)| format!("{digest}\t{artifact}"))
            .collect();
        lines.sort();
        fs::write(
            self.cache_dir.join(CACHE_FILE_NAME),
            lines.join("\n") + "\n",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifact_needs_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ArtifactCache::load(dir.path());
        let artifact = dir.path().join("out.o");
        let command = vec!["cc".to_string(), "-c".to_string()];
        assert!(cache.needs_rebuild(&artifact, &command, &[]));
    }

    #[test]
    fn test_unchanged_command_skips_rebuild_after_save() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("out.o");
        let command = vec!["cc".to_string(), "-c".to_string()];

        let mut cache = ArtifactCache::load(dir.path());
        assert!(cache.needs_rebuild(&artifact, &command, &[]));
        std::fs::write(&artifact, "object").unwrap();
        cache.save().unwrap();

        let mut reloaded = ArtifactCache::load(dir.path());
        assert!(!reloaded.needs_rebuild(&artifact, &command, &[]));
    }

    #[test]
    fn test_changed_command_forces_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("out.o");

        let mut cache = ArtifactCache::load(dir.path());
        cache.needs_rebuild(&artifact, &["cc".to_string()], &[]);
        std::fs::write(&artifact, "object").unwrap();
        cache.save().unwrap();

        let mut reloaded = ArtifactCache::load(dir.path());
        assert!(reloaded.needs_rebuild(&artifact, &["cc".to_string(), "-O2".to_string()], &[]));
    }

    #[test]
    fn test_changed_input_forces_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("lib.so");
        let command = vec!["cc".to_string()];

        let mut cache = ArtifactCache::load(dir.path());
        cache.needs_rebuild(&artifact, &command, &["int main;"]);
        std::fs::write(&artifact, "so").unwrap();
        cache.save().unwrap();

        let mut reloaded = ArtifactCache::load(dir.path());
        assert!(reloaded.needs_rebuild(&artifact, &command, &["int main; // edited"]));
    }
}
