//! In-memory byte stream with a single read/write cursor.

use crate::buf::Buf;
use cairn_mem::{Allocator, context};
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// A growable byte stream.
///
/// Writes overwrite bytes at the cursor and extend the stream past its end;
/// reads consume bytes from the cursor. Both advance the cursor.
#[derive(Clone, Default)]
pub struct MemoryStream {
    data: Buf<u8>,
    cursor: usize,
}

impl MemoryStream {
    /// Creates an empty stream capturing the current allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(context::current())
    }

    #[must_use]
    pub fn with_allocator(allocator: Allocator) -> Self {
        MemoryStream {
            data: Buf::with_allocator(allocator),
            cursor: 0,
        }
    }

    #[must_use]
    pub fn allocator(&self) -> &Allocator {
        self.data.allocator()
    }

    /// Writes `bytes` at the cursor, returning the count written.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let overlap = bytes.len().min(self.data.len() - self.cursor);
        let (inside, past) = bytes.split_at(overlap);
        self.data[self.cursor..self.cursor + overlap].copy_from_slice(inside);
        self.data.extend_from_slice(past);
        self.cursor += bytes.len();
        bytes.len()
    }

    /// Copies bytes from the cursor into `out`, returning the count read.
    ///
    /// Returns 0 at the end of the stream.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let available = &self.data[self.cursor..];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.cursor += n;
        n
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn cursor_pos(&self) -> usize {
        self.cursor
    }

    pub fn cursor_to_start(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_to_end(&mut self) {
        self.cursor = self.data.len();
    }

    /// Moves the cursor by `offset`, clamped to the stream bounds.
    pub fn cursor_move(&mut self, offset: isize) {
        self.cursor = self
            .cursor
            .saturating_add_signed(offset)
            .min(self.data.len());
    }

    /// Empties the stream and rewinds the cursor.
    pub fn clear(&mut self) {
        self.data.clear();
        self.cursor = 0;
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(MemoryStream::read(self, buf))
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(MemoryStream::write(self, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => usize::try_from(n).ok(),
            SeekFrom::End(n) => isize::try_from(n)
                .ok()
                .and_then(|n| self.data.len().checked_add_signed(n)),
            SeekFrom::Current(n) => isize::try_from(n)
                .ok()
                .and_then(|n| self.cursor.checked_add_signed(n)),
        };
        match target {
            Some(at) if at <= self.data.len() => {
                self.cursor = at;
                Ok(at as u64)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek outside the memory stream",
            )),
        }
    }
}

impl fmt::Debug for MemoryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStream")
            .field("size", &self.data.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}
