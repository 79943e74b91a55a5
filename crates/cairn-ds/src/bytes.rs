//! Little-endian byte codec.
//!
//! Values are appended at the end and read back from a cursor starting at
//! the front, so a `Bytes` works as a simple FIFO wire buffer.

use crate::buf::Buf;
use cairn_mem::{Allocator, context};
use std::fmt;

/// A byte buffer with typed push operations and a read cursor.
#[derive(Clone, Default)]
pub struct Bytes {
    data: Buf<u8>,
    cursor: usize,
}

macro_rules! codec {
    ($($push:ident, $pop:ident => $ty:ty;)*) => {
        $(
            #[doc = concat!("Appends a little-endian `", stringify!($ty), "`.")]
            pub fn $push(&mut self, value: $ty) {
                self.data.extend_from_slice(&value.to_le_bytes());
            }

            #[doc = concat!("Reads a little-endian `", stringify!($ty), "` at the cursor.")]
            ///
            /// Returns `None`, leaving the cursor in place, when fewer bytes remain.
            pub fn $pop(&mut self) -> Option<$ty> {
                let raw = self.take(size_of::<$ty>())?;
                raw.try_into().ok().map(<$ty>::from_le_bytes)
            }
        )*
    };
}

impl Bytes {
    /// Creates an empty buffer capturing the current allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(context::current())
    }

    #[must_use]
    pub fn with_allocator(allocator: Allocator) -> Self {
        Bytes {
            data: Buf::with_allocator(allocator),
            cursor: 0,
        }
    }

    #[must_use]
    pub fn allocator(&self) -> &Allocator {
        self.data.allocator()
    }

    /// Total bytes written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    /// Moves the read cursor back to the first byte.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Whether the cursor has consumed every byte.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.cursor >= self.data.len()
    }

    /// Drops the contents and resets the cursor, keeping the storage.
    pub fn clear(&mut self) {
        self.data.clear();
        self.cursor = 0;
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Reads `len` raw bytes at the cursor.
    pub fn pop_bytes(&mut self, len: usize) -> Option<&[u8]> {
        self.take(len)
    }

    fn take(&mut self, len: usize) -> Option<&[u8]> {
        let end = self.cursor.checked_add(len)?;
        let raw = self.data.get(self.cursor..end)?;
        self.cursor = end;
        Some(raw)
    }

    codec! {
        push_u8, pop_u8 => u8;
        push_u16, pop_u16 => u16;
        push_u32, pop_u32 => u32;
        push_u64, pop_u64 => u64;
        push_i8, pop_i8 => i8;
        push_i16, pop_i16 => i16;
        push_i32, pop_i32 => i32;
        push_i64, pop_i64 => i64;
        push_f32, pop_f32 => f32;
        push_f64, pop_f64 => f64;
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bytes")
            .field("len", &self.data.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}
