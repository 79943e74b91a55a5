//! UTF-8 string over a [`Buf<u8>`].
//!
//! `Str` hashes and compares like `str`, so a `Map<Str, V>` can be queried
//! with plain `&str` keys.
//!
//! # Examples
//!
//! ```
//! use cairn_ds::Str;
//! use std::fmt::Write;
//!
//! let mut s = Str::from("Mostafa");
//! s.push_str(" Saad");
//! write!(s, " age: {}", 25).unwrap();
//! assert_eq!(s, "Mostafa Saad age: 25");
//! assert_eq!(s.find("Saad", 0), Some(8));
//! ```

use crate::buf::Buf;
use crate::raw::handle_alloc_error;
use cairn_mem::{Allocator, Error, context};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// An owned UTF-8 string.
#[derive(Clone, Default)]
pub struct Str {
    bytes: Buf<u8>,
}

impl Str {
    /// Creates an empty string capturing the current allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(context::current())
    }

    /// Creates an empty string using `allocator`.
    #[must_use]
    pub fn with_allocator(allocator: Allocator) -> Self {
        Str {
            bytes: Buf::with_allocator(allocator),
        }
    }

    /// Copies `s` into storage from `allocator`.
    #[must_use]
    pub fn from_str_in(s: &str, allocator: Allocator) -> Self {
        let mut out = Self::with_allocator(allocator);
        out.push_str(s);
        out
    }

    #[must_use]
    pub fn allocator(&self) -> &Allocator {
        self.bytes.allocator()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // SAFETY: Every mutation appends or removes whole UTF-8 sequences.
        unsafe { std::str::from_utf8_unchecked(&self.bytes) }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    pub fn push_str(&mut self, s: &str) {
        self.bytes.extend_from_slice(s.as_bytes());
    }

    pub fn push(&mut self, c: char) {
        let mut utf8 = [0; 4];
        self.push_str(c.encode_utf8(&mut utf8));
    }

    /// Appends `count` copies of `c`.
    ///
    /// # Panics
    ///
    /// Panics if the result would not fit in memory or the allocator cannot
    /// provide it.
    #[track_caller]
    pub fn push_repeat(&mut self, c: char, count: usize) {
        let Some(additional) = c.len_utf8().checked_mul(count) else {
            handle_alloc_error(Error::InvalidLayout {
                size: usize::MAX,
                align: 1,
            });
        };
        self.bytes.reserve(additional);
        for _ in 0..count {
            self.push(c);
        }
    }

    /// Empties the string, keeping its storage.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Byte offset of the first occurrence of `needle` at or after `start`.
    ///
    /// `start` past the end, or not on a character boundary, finds nothing.
    #[must_use]
    pub fn find(&self, needle: &str, start: usize) -> Option<usize> {
        let hay = self.as_str().get(start..)?;
        hay.find(needle).map(|offset| start + offset)
    }

    /// Splits on every occurrence of `delimiter`.
    ///
    /// With `skip_empty` the empty pieces are dropped. An empty delimiter
    /// yields the whole string as one piece. The pieces use the current
    /// allocator.
    #[must_use]
    pub fn split(&self, delimiter: &str, skip_empty: bool) -> Buf<Str> {
        let allocator = context::current();
        let mut pieces = Buf::with_allocator(allocator.clone());
        let mut keep = |piece: &str| {
            if !(skip_empty && piece.is_empty()) {
                pieces.push(Str::from_str_in(piece, allocator.clone()));
            }
        };

        if delimiter.is_empty() {
            keep(self.as_str());
        } else {
            self.as_str().split(delimiter).for_each(keep);
        }
        pieces
    }

    /// Removes leading and trailing whitespace in place.
    pub fn trim(&mut self) {
        let s = self.as_str();
        let end = s.trim_end().len();
        let start = end - s[..end].trim_start().len();
        self.bytes.truncate(end);
        if start > 0 {
            let mut i = 0;
            self.bytes.retain(|_| {
                i += 1;
                i > start
            });
        }
    }
}

impl Deref for Str {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for Str {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for Str {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Str::from_str_in(s, context::current())
    }
}

impl fmt::Write for Str {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

impl PartialEq for Str {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Str {}

impl PartialEq<str> for Str {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Str {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialEq<Str> for &str {
    fn eq(&self, other: &Str) -> bool {
        *self == other.as_str()
    }
}

impl PartialOrd for Str {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Str {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Hash for Str {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.as_str(), f)
    }
}

impl fmt::Debug for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}
