//! Raw memory extents.

use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;

/// A raw memory extent: address, size and the alignment it was requested with.
///
/// A `Block` does not own anything. Ownership is established by the allocator
/// that produced it and by whichever container holds it. The alignment is kept
/// alongside the size because the system allocator needs the original layout
/// to resize or release an extent.
///
/// Zero-sized blocks are dangling but correctly aligned and never reach an
/// allocator backend.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    ptr: NonNull<u8>,
    size: usize,
    align: usize,
}

// SAFETY: A Block is a descriptor (address + extent). Access to the memory it
// names is governed by whoever owns the allocation, not by the descriptor.
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    /// Returns an empty, dangling block aligned to `align`.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    #[must_use]
    pub const fn dangling(align: usize) -> Self {
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        // SAFETY: align is a non-zero power of two, so the address is non-null.
        let ptr = unsafe {
            NonNull::new_unchecked(std::ptr::without_provenance_mut::<u8>(align))
        };
        Block {
            ptr,
            size: 0,
            align,
        }
    }

    /// Builds a block from its parts.
    ///
    /// # Safety
    ///
    /// `ptr` must be aligned to `align` and, when `size > 0`, name `size`
    /// bytes obtained from a single allocation.
    #[must_use]
    pub const unsafe fn from_raw_parts(
        ptr: NonNull<u8>,
        size: usize,
        align: usize,
    ) -> Self {
        Block { ptr, size, align }
    }

    /// Start of the extent.
    #[inline]
    #[must_use]
    pub const fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Start of the extent as a raw pointer.
    #[inline]
    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Address of the extent, for bookkeeping and diagnostics.
    #[inline]
    #[must_use]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr().addr()
    }

    /// Size of the extent in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Alignment the extent was requested with.
    #[inline]
    #[must_use]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// True for zero-sized blocks.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the same extent described with a different size.
    #[inline]
    #[must_use]
    pub(crate) const fn with_size(self, size: usize) -> Self {
        Block { size, ..self }
    }

    /// The layout this block was requested with.
    pub(crate) fn layout(&self) -> Layout {
        // SAFETY: Every non-empty block is created from a layout that passed
        // `Layout::from_size_align`, and empty blocks carry a power-of-two
        // alignment by construction.
        unsafe { Layout::from_size_align_unchecked(self.size, self.align) }
    }

    /// True when `addr..addr+len` lies entirely inside this block.
    #[must_use]
    pub fn contains(&self, addr: usize, len: usize) -> bool {
        let start = self.addr();
        addr >= start && addr.saturating_add(len) <= start + self.size
    }

    /// Views the block as bytes.
    ///
    /// # Safety
    ///
    /// The block must be live and its bytes initialized, with no concurrent
    /// mutable access.
    #[must_use]
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        // SAFETY: Upheld by the caller.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.size) }
    }

    /// Views the block as mutable bytes.
    ///
    /// # Safety
    ///
    /// The block must be live and not aliased for the returned lifetime.
    #[must_use]
    pub unsafe fn as_mut_slice<'a>(&self) -> &'a mut [u8] {
        // SAFETY: Upheld by the caller.
        unsafe { std::slice::from_raw_parts_mut(self.as_ptr(), self.size) }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("ptr", &self.ptr)
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

/// Rounds `value` up to the next multiple of `align` (a power of two).
#[inline(always)]
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangling_block_is_aligned_and_empty() {
        let block = Block::dangling(64);
        assert!(block.is_empty());
        assert_eq!(block.align(), 64);
        assert_eq!(block.addr() % 64, 0);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 16), 16);
    }

    #[test]
    fn test_contains() {
        let mut backing = [0u8; 32];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        let block = unsafe { Block::from_raw_parts(ptr, 32, 1) };

        assert!(block.contains(block.addr(), 32));
        assert!(block.contains(block.addr() + 8, 8));
        assert!(!block.contains(block.addr() + 30, 4));
        assert!(!block.contains(block.addr().wrapping_sub(1), 1));
    }
}
