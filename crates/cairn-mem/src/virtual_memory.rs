//! Page-granular virtual memory reservation.
//!
//! Used as an alternative chunk source for arena and stack allocators. On
//! Unix the pages come straight from `mmap`; elsewhere the system allocator is
//! asked for page-aligned memory.

use crate::block::{Block, align_up};
use crate::error::{Error, Result};
use std::ptr::NonNull;
use std::sync::OnceLock;

/// Returns the operating system page size.
#[must_use]
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(query_page_size)
}

#[cfg(unix)]
fn query_page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if raw > 0 { raw as usize } else { 4096 }
}

#[cfg(not(unix))]
fn query_page_size() -> usize {
    4096
}

/// Reserves and commits `size` bytes (rounded up to whole pages).
///
/// The returned block is page-aligned and zero-filled.
///
/// # Errors
///
/// Returns `Error::ReservationFailed` when the operating system refuses the
/// mapping, or `Error::InvalidLayout` when `size` is zero or overflows.
pub fn reserve(size: usize) -> Result<Block> {
    let page = page_size();
    if size == 0 || size > isize::MAX as usize - page {
        return Err(Error::InvalidLayout { size, align: page });
    }
    let size = align_up(size, page);
    let ptr = map(size)?;

    cairn_log::trace!("reserved {} bytes of virtual memory at {:p}", size, ptr);

    // SAFETY: map returned `size` bytes aligned to the page size.
    Ok(unsafe { Block::from_raw_parts(ptr, size, page) })
}

/// Returns a reservation to the operating system.
///
/// # Safety
///
/// `block` must come from [`reserve`] and must not be used afterwards.
pub unsafe fn release(block: Block) {
    if block.is_empty() {
        return;
    }
    // SAFETY: Upheld by the caller.
    unsafe { unmap(block) };
}

#[cfg(unix)]
fn map(size: usize) -> Result<NonNull<u8>> {
    // SAFETY: Anonymous private mapping with no address hint; the result is
    // checked against MAP_FAILED before use.
    let raw = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if raw == libc::MAP_FAILED {
        return Err(Error::ReservationFailed { size });
    }
    NonNull::new(raw.cast::<u8>()).ok_or(Error::ReservationFailed { size })
}

#[cfg(unix)]
unsafe fn unmap(block: Block) {
    // SAFETY: The block names a whole mapping created by `map`.
    let rc = unsafe { libc::munmap(block.as_ptr().cast(), block.size()) };
    if rc != 0 {
        cairn_log::warn!(
            "munmap of {} bytes at {:p} failed",
            block.size(),
            block.as_ptr()
        );
    }
}

#[cfg(not(unix))]
fn map(size: usize) -> Result<NonNull<u8>> {
    let layout = std::alloc::Layout::from_size_align(size, page_size())
        .map_err(|_| Error::InvalidLayout { size, align: page_size() })?;
    // SAFETY: layout has a non-zero size.
    let raw = unsafe { std::alloc::alloc_zeroed(layout) };
    NonNull::new(raw).ok_or(Error::ReservationFailed { size })
}

#[cfg(not(unix))]
unsafe fn unmap(block: Block) {
    // SAFETY: The block was allocated by `map` with exactly this layout.
    unsafe { std::alloc::dealloc(block.as_ptr(), block.layout()) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(page_size().is_power_of_two());
    }

    #[test]
    fn test_reserve_rounds_to_pages() {
        let block = reserve(1).unwrap();
        assert_eq!(block.size(), page_size());
        assert_eq!(block.addr() % page_size(), 0);

        unsafe {
            let bytes = block.as_mut_slice();
            assert!(bytes.iter().all(|&b| b == 0));
            bytes[0] = 0xAB;
            bytes[page_size() - 1] = 0xCD;
            release(block);
        }
    }

    #[test]
    fn test_reserve_large_region() {
        let size = 1024 * 1024 * 1024;
        let block = reserve(size).unwrap();
        assert_eq!(block.size(), size);
        unsafe { release(block) };
    }

    #[test]
    fn test_reserve_zero_is_invalid() {
        assert!(matches!(reserve(0), Err(Error::InvalidLayout { .. })));
    }
}
