//! Typed storage owned through a captured [`Allocator`].
//!
//! `RawBuf<T>` only manages capacity: it never reads, writes or drops
//! elements. `Buf` and `Ring` track which slots are initialised.

use cairn_mem::{Allocator, Block, Error, Result};
use std::marker::PhantomData;
use std::ptr::NonNull;

pub(crate) struct RawBuf<T> {
    ptr: NonNull<T>,
    cap: usize,
    allocator: Allocator,
    _marker: PhantomData<T>,
}

// SAFETY: RawBuf uniquely owns its storage; the allocator handle is Send + Sync.
unsafe impl<T: Send> Send for RawBuf<T> {}
// SAFETY: Shared access only hands out shared access to elements.
unsafe impl<T: Sync> Sync for RawBuf<T> {}

impl<T> RawBuf<T> {
    const IS_ZST: bool = size_of::<T>() == 0;

    pub(crate) fn new_in(allocator: Allocator) -> Self {
        RawBuf {
            ptr: NonNull::dangling(),
            cap: if Self::IS_ZST { usize::MAX } else { 0 },
            allocator,
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub(crate) fn ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.cap
    }

    pub(crate) fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    fn block(&self) -> Block {
        // SAFETY: ptr/cap describe the live block obtained from `allocator`.
        unsafe {
            Block::from_raw_parts(self.ptr.cast(), self.cap * size_of::<T>(), align_of::<T>())
        }
    }

    /// Ensures room for `required` elements, growing to
    /// `max(capacity * 2, required)`.
    pub(crate) fn try_grow_to(&mut self, required: usize) -> Result<()> {
        if required <= self.cap {
            return Ok(());
        }
        let new_cap = self.cap.saturating_mul(2).max(required);
        self.try_set_capacity(new_cap)
    }

    /// Ensures room for exactly `required` elements.
    pub(crate) fn try_reserve_exact(&mut self, required: usize) -> Result<()> {
        if required <= self.cap {
            return Ok(());
        }
        self.try_set_capacity(required)
    }

    fn try_set_capacity(&mut self, new_cap: usize) -> Result<()> {
        let bytes = new_cap
            .checked_mul(size_of::<T>())
            .ok_or(Error::InvalidLayout {
                size: usize::MAX,
                align: align_of::<T>(),
            })?;

        let block = if self.cap == 0 {
            self.allocator.allocate(bytes, align_of::<T>())?
        } else {
            // SAFETY: The current block came from this allocator; on success
            // it is replaced, on failure it is untouched.
            unsafe { self.allocator.resize(self.block(), bytes)? }
        };

        self.ptr = block.ptr().cast();
        self.cap = new_cap;
        Ok(())
    }
}

impl<T> Drop for RawBuf<T> {
    fn drop(&mut self) {
        if Self::IS_ZST || self.cap == 0 {
            return;
        }
        // SAFETY: The block came from this allocator and the elements were
        // already dropped by the owning container.
        unsafe { self.allocator.release(self.block()) };
    }
}

/// Panics for allocation failures in infallible container operations.
#[cold]
#[track_caller]
pub(crate) fn handle_alloc_error(err: Error) -> ! {
    cairn_log::error!("container allocation failed: {}", err);
    panic!("container allocation failed: {err}")
}
