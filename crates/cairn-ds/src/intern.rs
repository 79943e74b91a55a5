//! String interning with ID-based references.
//!
//! # Design
//!
//! The interner keeps two tables:
//! - `strings`: Symbol ID → span of the arena holding the bytes
//! - `symbols`: string → Symbol, keyed by the same spans
//!
//! String bytes are copied once into an arena owned by the interner, so the
//! slice returned by [`StrIntern::resolve`] never moves and every span lives
//! exactly as long as the interner.
//!
//! # Examples
//!
//! ```
//! use cairn_ds::StrIntern;
//!
//! let mut interner = StrIntern::new();
//! let a = interner.intern("Mostafa");
//! let b = interner.intern(&"my name is Mostafa"[11..]);
//!
//! assert_eq!(a, b);
//! assert_eq!(interner.resolve(a), Some("Mostafa"));
//! ```

use crate::buf::Buf;
use crate::map::Map;
use cairn_mem::{Allocator, context};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

/// Chunk size of the string arena.
const ARENA_CHUNK_SIZE: usize = 8 * 1024;

/// A symbol representing an interned string.
///
/// Symbols are 32-bit identifiers: comparing two is comparing two integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

impl Symbol {
    /// Creates a symbol from a raw ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The placeholder symbol, never returned by an interner.
    #[must_use]
    pub const fn invalid() -> Self {
        Self(u32::MAX)
    }

    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

impl From<u32> for Symbol {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Interned bytes inside the arena.
#[derive(Clone, Copy)]
struct Span {
    ptr: NonNull<u8>,
    len: usize,
}

impl Span {
    fn as_str(&self) -> &str {
        // SAFETY: Spans are only created by `StrIntern::intern` from a copied
        // `&str`, and the arena keeps the bytes until the interner drops.
        unsafe {
            let bytes = std::slice::from_raw_parts(self.ptr.as_ptr(), self.len);
            std::str::from_utf8_unchecked(bytes)
        }
    }
}

impl Borrow<str> for Span {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq for Span {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Span {}

impl Hash for Span {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

/// String interner with bidirectional mapping.
pub struct StrIntern {
    strings: Buf<Span>,
    symbols: Map<Span, Symbol>,
    arena: Allocator,
}

impl StrIntern {
    /// Creates an empty interner. Its tables use the current allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(context::current())
    }

    /// Creates an empty interner whose tables use `allocator`.
    ///
    /// String bytes always go to the interner's own arena, which takes its
    /// chunks from the general-purpose allocator.
    #[must_use]
    pub fn with_allocator(allocator: Allocator) -> Self {
        StrIntern {
            strings: Buf::with_allocator(allocator.clone()),
            symbols: Map::with_allocator(allocator),
            arena: Allocator::arena(ARENA_CHUNK_SIZE),
        }
    }

    /// Interns `s`, returning its symbol.
    ///
    /// Interning an equal string again returns the same symbol without
    /// copying.
    ///
    /// # Panics
    ///
    /// Panics if the arena cannot provide memory or more than `u32::MAX - 1`
    /// strings are interned.
    #[track_caller]
    pub fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&sym) = self.symbols.lookup(s) {
            return sym;
        }

        let id = match u32::try_from(self.strings.len()) {
            Ok(id) if id != u32::MAX => id,
            _ => cairn_mem::contract_violation!("string interner is full"),
        };

        let block = match self.arena.allocate(s.len(), 1) {
            Ok(block) => block,
            Err(err) => crate::raw::handle_alloc_error(err),
        };
        // SAFETY: The block is fresh, holds s.len() bytes and cannot overlap s.
        unsafe {
            std::ptr::copy_nonoverlapping(s.as_ptr(), block.as_ptr(), s.len());
        }

        let span = Span {
            ptr: block.ptr(),
            len: s.len(),
        };
        let sym = Symbol::new(id);
        self.strings.push(span);
        self.symbols.insert(span, sym);
        cairn_log::trace!("interned {:?} as {}", s, sym);
        sym
    }

    /// Returns the string behind `sym`, or `None` if this interner never
    /// issued it.
    #[must_use]
    pub fn resolve(&self, sym: Symbol) -> Option<&str> {
        self.strings.get(sym.as_usize()).map(Span::as_str)
    }

    /// Returns the symbol of `s` if it was interned, without interning it.
    #[must_use]
    pub fn get(&self, s: &str) -> Option<Symbol> {
        self.symbols.lookup(s).copied()
    }

    /// Number of distinct strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Bytes of string data held by the arena.
    #[must_use]
    pub fn bytes_used(&self) -> usize {
        self.arena.stats().used
    }
}

impl Default for StrIntern {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StrIntern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.strings.iter().map(Span::as_str))
            .finish()
    }
}
