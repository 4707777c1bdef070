//! Ordered, modifier-tagged output fragments with deferred splices.
//!
//! Generators do not build strings: they append [`StringOutput`] fragments
//! to the source and header streams of a [`GeneratorOutput`]. A fragment is
//! either literal text or a *splice* — a deferred insertion point for a
//! child output that may still be rewritten (forward references, hook-driven
//! redefinition). The writer flattens splices at the very end, so rewriting
//! a child never has to touch any parent.

use sprig_lexer::Token;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::rc::Rc;

/// Orthogonal output flags combined by bitwise union.
///
/// Punctuation flags (`OPEN_PAREN`, `END_STATEMENT`, ...) carry the target
/// language's syntax: a fragment with empty text and `END_STATEMENT` renders
/// as `;`. Conversion flags defer name styling to the writer.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputModifiers(u32);

impl OutputModifiers {
    pub const NONE: OutputModifiers = OutputModifiers(0);
    pub const NEWLINE_AFTER: OutputModifiers = OutputModifiers(1 << 0);
    pub const SPACE_AFTER: OutputModifiers = OutputModifiers(1 << 1);
    pub const SPACE_BEFORE: OutputModifiers = OutputModifiers(1 << 2);
    /// `;` plus newline.
    pub const END_STATEMENT: OutputModifiers = OutputModifiers(1 << 3);
    /// `, ` between siblings in an argument list.
    pub const LIST_SEPARATOR: OutputModifiers = OutputModifiers(1 << 4);
    pub const OPEN_PAREN: OutputModifiers = OutputModifiers(1 << 5);
    pub const CLOSE_PAREN: OutputModifiers = OutputModifiers(1 << 6);
    /// `{`, newline, indent.
    pub const OPEN_BLOCK: OutputModifiers = OutputModifiers(1 << 7);
    /// Dedent, `}`, newline.
    pub const CLOSE_BLOCK: OutputModifiers = OutputModifiers(1 << 8);
    /// Render the text as a C string literal.
    pub const SURROUND_WITH_QUOTES: OutputModifiers = OutputModifiers(1 << 9);
    pub const CONVERT_VARIABLE_NAME: OutputModifiers = OutputModifiers(1 << 10);
    pub const CONVERT_FUNCTION_NAME: OutputModifiers = OutputModifiers(1 << 11);
    pub const CONVERT_TYPE_NAME: OutputModifiers = OutputModifiers(1 << 12);

    /// Whether every flag in `other` is set in `self`.
    #[inline]
    pub fn contains(self, other: OutputModifiers) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bits, for the compile-time C interface.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Reconstruct from raw bits. Unknown bits are ignored by the writer.
    #[inline]
    pub const fn from_bits(bits: u32) -> OutputModifiers {
        OutputModifiers(bits)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for OutputModifiers {
    type Output = OutputModifiers;

    #[inline]
    fn bitor(self, rhs: OutputModifiers) -> OutputModifiers {
        OutputModifiers(self.0 | rhs.0)
    }
}

impl BitOrAssign for OutputModifiers {
    #[inline]
    fn bitor_assign(&mut self, rhs: OutputModifiers) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for OutputModifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputModifiers({:#x})", self.0)
    }
}

/// Payload of a fragment: literal text or a deferred child insertion.
#[derive(Clone, Debug)]
pub enum OutputContents {
    Text(String),
    Splice(OutputCell),
}

/// One fragment of generated output.
#[derive(Clone, Debug)]
pub struct StringOutput {
    pub contents: OutputContents,
    pub modifiers: OutputModifiers,
    /// The token this text is generated from, for blame in writer diagnostics.
    pub blame: Token,
}

impl StringOutput {
    /// A delimiter template: no text, only modifiers. Cloned between sibling
    /// statements with the sibling's blame substituted in.
    pub fn delimiter_template(modifiers: OutputModifiers, blame: &Token) -> StringOutput {
        StringOutput {
            contents: OutputContents::Text(String::new()),
            modifiers,
            blame: blame.clone(),
        }
    }

    /// Clone this template with a different blame token.
    pub fn with_blame(&self, blame: &Token) -> StringOutput {
        StringOutput {
            contents: self.contents.clone(),
            modifiers: self.modifiers,
            blame: blame.clone(),
        }
    }
}

/// Two ordered streams of fragments: one for the source file, one for the
/// header.
#[derive(Debug, Default)]
pub struct GeneratorOutput {
    pub source: Vec<StringOutput>,
    pub header: Vec<StringOutput>,
}

impl GeneratorOutput {
    pub fn new() -> GeneratorOutput {
        GeneratorOutput::default()
    }

    /// Discard all fragments in place. Splice markers held by parents keep
    /// pointing at this output and will see whatever replaces the contents.
    pub fn clear(&mut self) {
        self.source.clear();
        self.header.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty() && self.header.is_empty()
    }
}

/// A shared, mutable [`GeneratorOutput`] — the unit of splicing.
///
/// Wraps `Rc<RefCell<_>>` behind a factory so all splice targets are
/// constructed the same way. Single-threaded by design: the whole evaluator
/// runs on the driver thread.
#[derive(Clone)]
pub struct OutputCell(Rc<RefCell<GeneratorOutput>>);

impl OutputCell {
    pub fn new() -> OutputCell {
        OutputCell(Rc::new(RefCell::new(GeneratorOutput::new())))
    }

    #[inline]
    pub fn borrow(&self) -> Ref<'_, GeneratorOutput> {
        self.0.borrow()
    }

    #[inline]
    pub fn borrow_mut(&self) -> RefMut<'_, GeneratorOutput> {
        self.0.borrow_mut()
    }

    /// Whether two cells are the same allocation.
    #[inline]
    pub fn same_cell(&self, other: &OutputCell) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for OutputCell {
    fn default() -> Self {
        OutputCell::new()
    }
}

impl fmt::Debug for OutputCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(output) => write!(
                f,
                "OutputCell(source: {}, header: {})",
                output.source.len(),
                output.header.len()
            ),
            Err(_) => f.write_str("OutputCell(<borrowed>)"),
        }
    }
}

/// Append literal text to a stream.
pub fn add_string_output(
    stream: &mut Vec<StringOutput>,
    text: impl Into<String>,
    modifiers: OutputModifiers,
    blame: &Token,
) {
    stream.push(StringOutput {
        contents: OutputContents::Text(text.into()),
        modifiers,
        blame: blame.clone(),
    });
}

/// Append language punctuation carried entirely by modifier flags.
pub fn add_lang_token_output(
    stream: &mut Vec<StringOutput>,
    modifiers: OutputModifiers,
    blame: &Token,
) {
    stream.push(StringOutput {
        contents: OutputContents::Text(String::new()),
        modifiers,
        blame: blame.clone(),
    });
}

/// Record a deferred insertion of `child` into `parent`.
///
/// The marker goes to *both* streams: the child may contribute to either, and
/// global ordering within each stream must reflect insertion order.
pub fn add_splice_output(parent: &mut GeneratorOutput, child: &OutputCell, blame: &Token) {
    parent.source.push(StringOutput {
        contents: OutputContents::Splice(child.clone()),
        modifiers: OutputModifiers::NONE,
        blame: blame.clone(),
    });
    parent.header.push(StringOutput {
        contents: OutputContents::Splice(child.clone()),
        modifiers: OutputModifiers::NONE,
        blame: blame.clone(),
    });
}
