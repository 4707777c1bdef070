//! Name-style conversion between lisp-case and C conventions.
//!
//! Sprig symbols are lisp-case (`my-function`); emitted C identifiers follow
//! the configured style. The `IfLispy` modes convert only names that
//! actually contain a dash, so names already valid in C (`add`, `int`,
//! `SDL_Init`) pass through untouched.

/// How to restyle one class of identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NameStyleMode {
    /// Emit exactly as written.
    Untouched,
    /// `my-name` → `myName`, unconditionally lowercasing the first segment.
    CamelCase,
    /// `my-name` → `MyName`.
    PascalCase,
    /// `my-name` → `my_name`.
    SnakeCase,
    /// CamelCase, but only when the name contains a dash.
    #[default]
    CamelCaseIfLispy,
    /// PascalCase, but only when the name contains a dash.
    PascalCaseIfLispy,
    /// SnakeCase, but only when the name contains a dash.
    SnakeCaseIfLispy,
}

/// Per-identifier-class style settings consumed by the writer.
#[derive(Clone, Copy, Debug)]
pub struct NameStyleSettings {
    pub variables: NameStyleMode,
    pub functions: NameStyleMode,
    pub types: NameStyleMode,
}

impl Default for NameStyleSettings {
    fn default() -> Self {
        NameStyleSettings {
            variables: NameStyleMode::CamelCaseIfLispy,
            functions: NameStyleMode::CamelCaseIfLispy,
            types: NameStyleMode::PascalCaseIfLispy,
        }
    }
}

/// Whether a name is exempt from conversion entirely.
///
/// Sigil-prefixed symbols, numbers, and anything not starting with a letter
/// or underscore is emitted verbatim (operators, literals, C fragments).
fn is_convert_exempt(name: &str) -> bool {
    match name.chars().next() {
        Some(first) => !(first.is_ascii_alphabetic() || first == '_'),
        None => true,
    }
}

fn capitalize_segment(segment: &str, out: &mut String) {
    let mut chars = segment.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.push_str(chars.as_str());
    }
}

/// Convert `name` according to `mode`.
pub fn convert_name(name: &str, mode: NameStyleMode) -> String {
    let lispy = name.contains('-');
    let effective = match mode {
        NameStyleMode::CamelCaseIfLispy if lispy => NameStyleMode::CamelCase,
        NameStyleMode::PascalCaseIfLispy if lispy => NameStyleMode::PascalCase,
        NameStyleMode::SnakeCaseIfLispy if lispy => NameStyleMode::SnakeCase,
        NameStyleMode::CamelCaseIfLispy
        | NameStyleMode::PascalCaseIfLispy
        | NameStyleMode::SnakeCaseIfLispy => NameStyleMode::Untouched,
        other => other,
    };

    if effective == NameStyleMode::Untouched || is_convert_exempt(name) {
        return name.to_string();
    }

    let mut out = String::with_capacity(name.len());
    match effective {
        NameStyleMode::SnakeCase => {
            for (index, segment) in name.split('-').enumerate() {
                if index > 0 {
                    out.push('_');
                }
                out.push_str(segment);
            }
        }
        NameStyleMode::CamelCase => {
            for (index, segment) in name.split('-').enumerate() {
                if index == 0 {
                    out.push_str(segment);
                } else {
                    capitalize_segment(segment, &mut out);
                }
            }
        }
        NameStyleMode::PascalCase => {
            for segment in name.split('-') {
                capitalize_segment(segment, &mut out);
            }
        }
        // Handled above.
        _ => out.push_str(name),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_untouched_by_if_lispy() {
        assert_eq!(convert_name("add", NameStyleMode::CamelCaseIfLispy), "add");
        assert_eq!(convert_name("int", NameStyleMode::PascalCaseIfLispy), "int");
        assert_eq!(
            convert_name("SDL_Init", NameStyleMode::CamelCaseIfLispy),
            "SDL_Init"
        );
    }

    #[test]
    fn test_lispy_names_convert() {
        assert_eq!(
            convert_name("my-function", NameStyleMode::CamelCaseIfLispy),
            "myFunction"
        );
        assert_eq!(
            convert_name("my-struct-type", NameStyleMode::PascalCaseIfLispy),
            "MyStructType"
        );
        assert_eq!(
            convert_name("loop-count", NameStyleMode::SnakeCaseIfLispy),
            "loop_count"
        );
    }

    #[test]
    fn test_unconditional_pascal() {
        assert_eq!(convert_name("vec", NameStyleMode::PascalCase), "Vec");
    }

    #[test]
    fn test_exempt_names_pass_through() {
        assert_eq!(convert_name("42", NameStyleMode::PascalCase), "42");
        assert_eq!(convert_name("+", NameStyleMode::CamelCase), "+");
        assert_eq!(
            convert_name(":keyword", NameStyleMode::PascalCase),
            ":keyword"
        );
    }
}
