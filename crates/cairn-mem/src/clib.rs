//! General-purpose allocator backed by the Rust system allocator.
//!
//! Stateless: every release is independent, and the system allocator is safe
//! to use from any thread, so this is the only strategy that needs no lock.

use crate::block::Block;
use crate::error::{Error, Result};
use crate::profile;
use std::alloc::{self, Layout};
use std::ptr::NonNull;

pub(crate) fn allocate(size: usize, align: usize) -> Result<Block> {
    let layout = Layout::from_size_align(size, align)
        .map_err(|_| Error::InvalidLayout { size, align })?;

    // SAFETY: Callers never pass a zero size (handled by `Allocator`).
    let raw = unsafe { alloc::alloc(layout) };
    let ptr = NonNull::new(raw).ok_or(Error::OutOfMemory {
        requested: size,
        available: 0,
    })?;

    profile::record_alloc(raw, size);

    // SAFETY: ptr names `size` bytes with alignment `align`.
    Ok(unsafe { Block::from_raw_parts(ptr, size, align) })
}

/// # Safety
///
/// `block` must be a live, non-empty block returned by this module.
pub(crate) unsafe fn resize(block: Block, new_size: usize) -> Result<Block> {
    Layout::from_size_align(new_size, block.align()).map_err(|_| {
        Error::InvalidLayout {
            size: new_size,
            align: block.align(),
        }
    })?;

    profile::record_free(block.as_ptr(), block.size());

    // SAFETY: block was allocated with block.layout(); new_size was validated
    // above and is non-zero (handled by `Allocator`).
    let raw = unsafe { alloc::realloc(block.as_ptr(), block.layout(), new_size) };
    let Some(ptr) = NonNull::new(raw) else {
        // The old block is still valid when realloc fails.
        profile::record_alloc(block.as_ptr(), block.size());
        return Err(Error::OutOfMemory {
            requested: new_size,
            available: 0,
        });
    };

    profile::record_alloc(raw, new_size);

    // SAFETY: realloc returned new_size bytes with the original alignment.
    Ok(unsafe { Block::from_raw_parts(ptr, new_size, block.align()) })
}

/// # Safety
///
/// `block` must be a live, non-empty block returned by this module.
pub(crate) unsafe fn release(block: Block) {
    profile::record_free(block.as_ptr(), block.size());
    // SAFETY: Upheld by the caller.
    unsafe { alloc::dealloc(block.as_ptr(), block.layout()) };
}
