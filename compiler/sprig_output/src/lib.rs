//! Output model and final writer for the Sprig transpiler.
//!
//! Generators build ordered, modifier-tagged fragment streams
//! ([`GeneratorOutput`]) with deferred insertion points ([`OutputCell`]
//! splices); the writer flattens and renders them to a C source/header pair
//! at the very end of compilation. Keeping rendering this late is what lets
//! reference resolution and post-resolution hooks rewrite a definition's
//! output in place without touching anything that spliced it.

mod converters;
mod output;
mod writer;

pub use converters::{convert_name, NameStyleMode, NameStyleSettings};
pub use output::{
    add_lang_token_output, add_splice_output, add_string_output, GeneratorOutput, OutputCell,
    OutputContents, OutputModifiers, StringOutput,
};
pub use writer::{
    flatten_stream, render_stream, write_generator_output, BraceStyle, StreamKind, WriterError,
    WriterFormatSettings, WriterOutputSettings,
};

#[cfg(test)]
mod tests;
