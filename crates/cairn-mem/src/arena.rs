//! Arena allocator: a growing chain of bump-allocated chunks.
//!
//! The arena provides:
//!
//! - **Fast allocation** through a bump pointer in the current chunk
//! - **Stable addresses** (chunks never move)
//! - **Bulk release only**: `release` does nothing, `release_all` hands every
//!   chunk back upstream at once
//!
//! Chunks come from a [`ChunkSource`]: another allocator (the general-purpose
//! one by default) or virtual memory.
//!
//! # Examples
//!
//! ```
//! use cairn_mem::Allocator;
//!
//! let arena = Allocator::arena(4096);
//! for _ in 0..1000 {
//!     arena.allocate(std::mem::size_of::<u32>(), 4).unwrap();
//! }
//! assert!(arena.stats().chunks >= 1);
//!
//! // SAFETY: none of the blocks above are used again.
//! unsafe { arena.release_all() };
//! assert_eq!(arena.stats().chunks, 0);
//! ```

use crate::allocator::{AllocatorStats, ChunkSource};
use crate::block::{Block, align_up};
use crate::error::{Error, Result};
use std::ptr::NonNull;

/// Alignment of every chunk obtained from upstream.
const CHUNK_ALIGNMENT: usize = 16;

/// Default chunk size when none is given (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A chunk of arena memory with a non-atomic bump cursor.
///
/// The arena is guarded by the allocator handle's lock, so the cursor never
/// needs atomics.
struct Chunk {
    /// The memory region obtained from upstream.
    block: Block,
    /// Offset of the next free byte.
    cursor: usize,
    /// Offset of the most recent allocation (for in-place growth).
    last: Option<usize>,
}

impl Chunk {
    fn new(block: Block) -> Self {
        Chunk {
            block,
            cursor: 0,
            last: None,
        }
    }

    /// Allocates from this chunk, or `None` when it does not fit.
    #[must_use]
    #[inline(always)]
    fn alloc(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let base = self.block.addr();

        // Round up to alignment
        let aligned_start = align_up(base + self.cursor, align);
        let new_addr = aligned_start.saturating_add(size);

        // Check if we have enough space
        if new_addr > base + self.block.size() {
            return None;
        }

        let offset = aligned_start - base;
        self.cursor = new_addr - base;
        self.last = Some(offset);

        // SAFETY: offset is within the chunk bounds (checked above) and the
        // pointer is derived from the chunk allocation, keeping provenance.
        unsafe { Some(NonNull::new_unchecked(self.block.as_ptr().add(offset))) }
    }

    /// Grows or shrinks the most recent allocation in place.
    fn resize_last(&mut self, block: &Block, new_size: usize) -> bool {
        let Some(last) = self.last else {
            return false;
        };
        if block.addr() != self.block.addr() + last {
            return false;
        }
        let end = last.saturating_add(new_size);
        if end > self.block.size() {
            return false;
        }
        self.cursor = end;
        true
    }
}

pub(crate) struct ArenaAllocator {
    /// Chunks in allocation order; the last one is current.
    chunks: Vec<Chunk>,
    chunk_size: usize,
    source: ChunkSource,
    used: usize,
    highwater: usize,
}

impl ArenaAllocator {
    pub(crate) fn new(chunk_size: usize, source: ChunkSource) -> Self {
        ArenaAllocator {
            chunks: Vec::new(),
            chunk_size: chunk_size.max(CHUNK_ALIGNMENT),
            source,
            used: 0,
            highwater: 0,
        }
    }

    fn note_used(&mut self, delta: usize) {
        self.used += delta;
        self.highwater = self.highwater.max(self.used);
    }

    pub(crate) fn allocate(&mut self, size: usize, align: usize) -> Result<Block> {
        if let Some(chunk) = self.chunks.last_mut()
            && let Some(ptr) = chunk.alloc(size, align)
        {
            self.note_used(size);
            // SAFETY: ptr names `size` bytes aligned to `align`.
            return Ok(unsafe { Block::from_raw_parts(ptr, size, align) });
        }

        self.grow(size, align)?;

        let ptr = self
            .chunks
            .last_mut()
            .and_then(|chunk| chunk.alloc(size, align))
            .ok_or(Error::ChunkAllocationFailed { size })?;
        self.note_used(size);
        // SAFETY: ptr names `size` bytes aligned to `align`.
        Ok(unsafe { Block::from_raw_parts(ptr, size, align) })
    }

    /// Links a new chunk big enough for `size` bytes at `align`.
    #[cold]
    fn grow(&mut self, size: usize, align: usize) -> Result<()> {
        let needed = size.saturating_add(align);
        let chunk_size = self.chunk_size.max(needed);
        let block = self.source.acquire(chunk_size, CHUNK_ALIGNMENT)?;

        cairn_log::trace!(
            "arena linked chunk #{} of {} bytes",
            self.chunks.len() + 1,
            block.size()
        );

        self.chunks.push(Chunk::new(block));
        Ok(())
    }

    pub(crate) fn resize(&mut self, block: Block, new_size: usize) -> Result<Block> {
        if let Some(chunk) = self.chunks.last_mut()
            && chunk.resize_last(&block, new_size)
        {
            if new_size > block.size() {
                self.note_used(new_size - block.size());
            } else {
                self.used -= block.size() - new_size;
            }
            return Ok(block.with_size(new_size));
        }

        if new_size <= block.size() {
            return Ok(block.with_size(new_size));
        }

        let moved = self.allocate(new_size, block.align())?;
        // SAFETY: The new block is fresh arena memory and cannot overlap the
        // old one.
        unsafe {
            std::ptr::copy_nonoverlapping(block.as_ptr(), moved.as_ptr(), block.size());
        }
        Ok(moved)
    }

    /// Individual reclamation is not supported.
    pub(crate) fn release(&mut self, _block: Block) {}

    pub(crate) fn release_all(&mut self) {
        for chunk in self.chunks.drain(..) {
            // SAFETY: The caller of release_all guarantees that no block from
            // this arena is used again; the chunk came from this source.
            unsafe { self.source.give_back(chunk.block) };
        }
        self.used = 0;
    }

    pub(crate) fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            used: self.used,
            highwater: self.highwater,
            reserved: self.chunks.iter().map(|c| c.block.size()).sum(),
            chunks: self.chunks.len(),
            live_allocations: 0,
        }
    }
}

impl Drop for ArenaAllocator {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(chunk_size: usize) -> ArenaAllocator {
        ArenaAllocator::new(chunk_size, ChunkSource::default())
    }

    #[test]
    fn test_arena_starts_without_chunks() {
        let a = arena(512);
        assert_eq!(a.stats().chunks, 0);
        assert_eq!(a.stats().reserved, 0);
    }

    #[test]
    fn test_arena_multiple_allocations() {
        let mut a = arena(512);
        let b1 = a.allocate(4, 4).unwrap();
        let b2 = a.allocate(4, 4).unwrap();
        let b3 = a.allocate(4, 4).unwrap();

        unsafe {
            b1.as_ptr().cast::<u32>().write(1);
            b2.as_ptr().cast::<u32>().write(2);
            b3.as_ptr().cast::<u32>().write(3);
            assert_eq!(b1.as_ptr().cast::<u32>().read(), 1);
            assert_eq!(b2.as_ptr().cast::<u32>().read(), 2);
            assert_eq!(b3.as_ptr().cast::<u32>().read(), 3);
        }
        assert_eq!(a.stats().chunks, 1);
        assert_eq!(a.stats().used, 12);
    }

    #[test]
    fn test_arena_chunk_growth() {
        let mut a = arena(64);
        let blocks: Vec<Block> = (0..100u64)
            .map(|i| {
                let b = a.allocate(8, 8).unwrap();
                unsafe { b.as_ptr().cast::<u64>().write(i) };
                b
            })
            .collect();

        for (i, b) in blocks.iter().enumerate() {
            assert_eq!(unsafe { b.as_ptr().cast::<u64>().read() }, i as u64);
        }
        assert!(a.stats().chunks > 1);
    }

    #[test]
    fn test_arena_oversized_request_gets_own_chunk() {
        let mut a = arena(64);
        let big = a.allocate(1000, 8).unwrap();
        assert_eq!(big.size(), 1000);
        assert!(a.stats().reserved >= 1000);
    }

    #[test]
    fn test_arena_release_is_noop() {
        let mut a = arena(256);
        let b = a.allocate(32, 8).unwrap();
        a.release(b);
        assert_eq!(a.stats().used, 32);
    }

    #[test]
    fn test_arena_resize_last_in_place() {
        let mut a = arena(256);
        let b = a.allocate(16, 8).unwrap();
        let grown = a.resize(b, 64).unwrap();
        assert_eq!(grown.ptr(), b.ptr());
        assert_eq!(a.stats().used, 64);
    }

    #[test]
    fn test_arena_release_all_resets() {
        let mut a = arena(128);
        for _ in 0..50 {
            a.allocate(24, 8).unwrap();
        }
        assert!(a.stats().chunks > 1);

        a.release_all();
        let stats = a.stats();
        assert_eq!(stats.chunks, 0);
        assert_eq!(stats.used, 0);
        assert_eq!(stats.reserved, 0);
        assert!(stats.highwater >= 50 * 24);

        a.allocate(24, 8).unwrap();
        assert_eq!(a.stats().chunks, 1);
    }

    #[test]
    fn test_arena_virtual_memory_source() {
        let mut a = ArenaAllocator::new(4096, ChunkSource::VirtualMemory);
        let b = a.allocate(100, 8).unwrap();
        unsafe { b.as_mut_slice().fill(0x5A) };
        assert!(a.stats().reserved >= 4096);
    }
}
