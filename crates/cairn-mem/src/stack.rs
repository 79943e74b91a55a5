//! LIFO bump allocator over one fixed-capacity buffer.
//!
//! The backing buffer is acquired on the first allocation and kept until the
//! allocator is dropped, so repeated "push, allocate, release_all" cycles
//! reuse it without touching upstream.
//!
//! Releases must happen in LIFO order. Releasing anything other than the most
//! recent live allocation is ignored (the memory is retained, never reused
//! while still reachable), which costs space but cannot corrupt other blocks.

use crate::allocator::{AllocatorStats, ChunkSource};
use crate::block::{Block, align_up};
use crate::error::{Error, Result};
use std::ptr::NonNull;

/// Alignment of the backing buffer itself.
const BUFFER_ALIGNMENT: usize = 16;

/// One live allocation, in allocation order.
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Offset of the allocation from the start of the buffer.
    offset: usize,
    /// Cursor before the allocation (includes alignment padding).
    prev_cursor: usize,
}

pub(crate) struct StackAllocator {
    capacity: usize,
    source: ChunkSource,
    buffer: Option<Block>,
    cursor: usize,
    frames: Vec<Frame>,
    highwater: usize,
}

impl StackAllocator {
    pub(crate) fn new(capacity: usize, source: ChunkSource) -> Self {
        StackAllocator {
            capacity,
            source,
            buffer: None,
            cursor: 0,
            frames: Vec::new(),
            highwater: 0,
        }
    }

    fn buffer(&mut self) -> Result<Block> {
        if let Some(buffer) = self.buffer {
            return Ok(buffer);
        }
        let buffer = self.source.acquire(self.capacity, BUFFER_ALIGNMENT)?;
        cairn_log::debug!(
            "stack allocator acquired {} byte buffer at {:p}",
            buffer.size(),
            buffer.as_ptr()
        );
        self.buffer = Some(buffer);
        Ok(buffer)
    }

    pub(crate) fn allocate(&mut self, size: usize, align: usize) -> Result<Block> {
        let buffer = self.buffer()?;
        let base = buffer.addr();

        let start = align_up(base + self.cursor, align) - base;
        let end = start.checked_add(size).unwrap_or(usize::MAX);
        if end > self.capacity {
            cairn_log::debug!(
                "stack allocator exhausted: {} bytes requested, {} available",
                size,
                self.capacity - self.cursor
            );
            return Err(Error::OutOfMemory {
                requested: size,
                available: self.capacity - self.cursor,
            });
        }

        self.frames.push(Frame {
            offset: start,
            prev_cursor: self.cursor,
        });
        self.cursor = end;
        self.highwater = self.highwater.max(end);

        // SAFETY: start..end lies inside the buffer (checked above).
        let ptr = unsafe { NonNull::new_unchecked(buffer.as_ptr().add(start)) };
        // SAFETY: ptr is aligned to `align` by construction.
        Ok(unsafe { Block::from_raw_parts(ptr, size, align) })
    }

    fn offset_of(&self, block: &Block) -> Option<usize> {
        let buffer = self.buffer?;
        buffer
            .contains(block.addr(), block.size())
            .then(|| block.addr() - buffer.addr())
    }

    fn is_top(&self, block: &Block) -> bool {
        match (self.frames.last(), self.offset_of(block)) {
            (Some(top), Some(offset)) => top.offset == offset,
            _ => false,
        }
    }

    pub(crate) fn resize(&mut self, block: Block, new_size: usize) -> Result<Block> {
        if self.is_top(&block) {
            let offset = block.addr() - self.buffer.map_or(0, |b| b.addr());
            let end = offset.checked_add(new_size).unwrap_or(usize::MAX);
            if end > self.capacity {
                return Err(Error::OutOfMemory {
                    requested: new_size,
                    available: self.capacity - offset,
                });
            }
            self.cursor = end;
            self.highwater = self.highwater.max(end);
            return Ok(block.with_size(new_size));
        }

        if new_size <= block.size() {
            return Ok(block.with_size(new_size));
        }

        // Not on top: move it. The old extent stays retained until a
        // release_all, like any other out-of-order release.
        let moved = self.allocate(new_size, block.align())?;
        // SAFETY: Both extents live in the buffer and do not overlap (the new
        // one starts at or after the old cursor).
        unsafe {
            std::ptr::copy_nonoverlapping(block.as_ptr(), moved.as_ptr(), block.size());
        }
        Ok(moved)
    }

    pub(crate) fn release(&mut self, block: Block) {
        if self.is_top(&block) {
            if let Some(frame) = self.frames.pop() {
                self.cursor = frame.prev_cursor;
            }
            return;
        }

        cairn_log::warn!(
            "stack allocator: out-of-order release of {} bytes at {:p} ignored",
            block.size(),
            block.as_ptr()
        );
    }

    pub(crate) fn release_all(&mut self) {
        self.cursor = 0;
        self.frames.clear();
    }

    pub(crate) fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            used: self.cursor,
            highwater: self.highwater,
            reserved: self.buffer.map_or(0, |b| b.size()),
            chunks: usize::from(self.buffer.is_some()),
            live_allocations: self.frames.len(),
        }
    }
}

impl Drop for StackAllocator {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            // SAFETY: The buffer came from this source and nothing can reach
            // it once the last allocator handle is gone.
            unsafe { self.source.give_back(buffer) };
        }
    }
}
