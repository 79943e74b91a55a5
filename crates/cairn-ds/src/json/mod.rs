//! JSON documents built from the allocator-aware containers.
//!
//! A [`Value`] owns its payload through [`Str`](crate::Str),
//! [`Buf`](crate::Buf) and [`Map`](crate::Map), so a whole document lives in
//! whichever allocator was current while it was built or parsed, and dropping
//! the root frees every child exactly once.
//!
//! # Examples
//!
//! ```
//! use cairn_ds::json::{self, Value};
//!
//! let mut doc = json::parse(r#"{"name": "cairn", "tags": ["mem"]}"#).unwrap();
//! doc.object_insert("stable", Value::Bool(true));
//!
//! assert_eq!(doc.object_lookup("name").and_then(Value::as_str), Some("cairn"));
//! assert_eq!(doc.object_lookup("tags").and_then(|t| t.array_at(0)), Some(&Value::string("mem")));
//! ```

mod parse;
mod value;

pub use parse::parse;
pub use value::Value;

use std::fmt;

/// Maximum nesting of arrays and objects accepted by [`parse`].
pub const MAX_DEPTH: usize = 128;

/// What went wrong while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonErrorKind {
    /// Input ended inside a value.
    UnexpectedEof,

    /// A character that cannot start or continue the current value.
    UnexpectedChar(char),

    /// A number not matching the JSON grammar.
    InvalidNumber,

    /// A number too large to represent as a finite `f64`.
    NumberOutOfRange,

    /// An unknown `\` escape in a string.
    InvalidEscape(char),

    /// A malformed `\uXXXX` escape or an unpaired surrogate.
    InvalidUnicode,

    /// An unescaped control character inside a string.
    ControlCharacter,

    /// Non-whitespace after the top-level value.
    TrailingCharacters,

    /// Nesting deeper than [`MAX_DEPTH`].
    DepthLimitExceeded,
}

impl fmt::Display for JsonErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::UnexpectedChar(ch) => write!(f, "unexpected character {ch:?}"),
            Self::InvalidNumber => write!(f, "invalid number"),
            Self::NumberOutOfRange => write!(f, "number out of range"),
            Self::InvalidEscape(ch) => write!(f, "invalid escape '\\{ch}'"),
            Self::InvalidUnicode => write!(f, "invalid unicode escape"),
            Self::ControlCharacter => write!(f, "control character in string"),
            Self::TrailingCharacters => write!(f, "trailing characters after value"),
            Self::DepthLimitExceeded => {
                write!(f, "nesting deeper than {MAX_DEPTH} levels")
            }
        }
    }
}

/// A parse failure with its 1-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonError {
    pub kind: JsonErrorKind,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}, column {}", self.kind, self.line, self.column)
    }
}

impl std::error::Error for JsonError {}
