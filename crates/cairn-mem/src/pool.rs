//! Fixed-size slot allocator.
//!
//! Slots are carved from slabs obtained from an upstream allocator. Released
//! slots go onto an intrusive LIFO free list (the link lives in the free slot
//! itself), so allocate and release are O(1) and a release followed by an
//! allocate returns the same address.

use crate::allocator::{Allocator, AllocatorStats};
use crate::block::{Block, align_up};
use crate::contract_violation;
use crate::error::Result;
use std::ptr::NonNull;

/// Alignment every slot satisfies.
pub const SLOT_ALIGNMENT: usize = 16;

pub(crate) struct PoolAllocator {
    /// Largest request a slot can hold.
    slot_size: usize,
    /// Distance between two slots.
    stride: usize,
    slots_per_slab: usize,
    upstream: Allocator,
    slabs: Vec<Block>,
    /// Next never-used slot index in the last slab.
    carve: usize,
    free: Option<NonNull<u8>>,
    live: usize,
}

// SAFETY: The free list only links slots inside slabs this pool owns
// exclusively; the pool is only reached through the handle's mutex.
unsafe impl Send for PoolAllocator {}

impl PoolAllocator {
    pub(crate) fn new(slot_size: usize, slots_per_slab: usize, upstream: Allocator) -> Self {
        let stride = align_up(slot_size.max(size_of::<usize>()), SLOT_ALIGNMENT);
        PoolAllocator {
            slot_size,
            stride,
            slots_per_slab: slots_per_slab.max(1),
            upstream,
            slabs: Vec::new(),
            carve: 0,
            free: None,
            live: 0,
        }
    }

    pub(crate) fn allocate(&mut self, size: usize, align: usize) -> Result<Block> {
        if size > self.slot_size {
            contract_violation!(
                "pool allocation of {} bytes exceeds the slot size of {} bytes",
                size,
                self.slot_size
            );
        }
        if align > SLOT_ALIGNMENT {
            contract_violation!(
                "pool allocation aligned to {} exceeds the slot alignment of {}",
                align,
                SLOT_ALIGNMENT
            );
        }

        let slot = match self.free {
            Some(slot) => {
                // SAFETY: Free slots hold the address of the next free slot.
                let next = unsafe { slot.as_ptr().cast::<*mut u8>().read() };
                self.free = NonNull::new(next);
                slot
            }
            None => self.carve()?,
        };

        self.live += 1;
        // SAFETY: The slot is SLOT_ALIGNMENT-aligned and holds slot_size bytes.
        Ok(unsafe { Block::from_raw_parts(slot, size, align) })
    }

    fn carve(&mut self) -> Result<NonNull<u8>> {
        if self.slabs.is_empty() || self.carve == self.slots_per_slab {
            let slab = self
                .upstream
                .allocate(self.stride * self.slots_per_slab, SLOT_ALIGNMENT)?;
            cairn_log::trace!(
                "pool linked slab #{} ({} slots of {} bytes)",
                self.slabs.len() + 1,
                self.slots_per_slab,
                self.stride
            );
            self.slabs.push(slab);
            self.carve = 0;
        }

        let slab = self.slabs[self.slabs.len() - 1];
        // SAFETY: carve < slots_per_slab, so the slot lies inside the slab.
        let slot = unsafe { slab.as_ptr().add(self.carve * self.stride) };
        self.carve += 1;
        // SAFETY: Derived from a non-null slab pointer.
        Ok(unsafe { NonNull::new_unchecked(slot) })
    }

    fn owns(&self, block: &Block) -> bool {
        self.slabs.iter().any(|slab| {
            slab.contains(block.addr(), 1)
                && (block.addr() - slab.addr()) % self.stride == 0
        })
    }

    pub(crate) fn resize(&mut self, block: Block, new_size: usize) -> Result<Block> {
        if new_size > self.slot_size {
            contract_violation!(
                "pool resize to {} bytes exceeds the slot size of {} bytes",
                new_size,
                self.slot_size
            );
        }
        Ok(block.with_size(new_size))
    }

    fn is_free(&self, block: &Block) -> bool {
        let mut cursor = self.free;
        while let Some(slot) = cursor {
            if slot == block.ptr() {
                return true;
            }
            // SAFETY: Every free-list slot holds the link written by release.
            cursor = NonNull::new(unsafe { slot.as_ptr().cast::<*mut u8>().read() });
        }
        false
    }

    /// Pushes `block` onto the free list.
    ///
    /// Foreign blocks and releases with no live slot are always rejected.
    /// Releasing a slot that is already free is only caught in debug builds,
    /// since it needs a walk of the free list; in release builds it corrupts
    /// the free list.
    pub(crate) fn release(&mut self, block: Block) {
        if !self.owns(&block) {
            contract_violation!(
                "pool release of {:p}, which is not a slot of this pool",
                block.as_ptr()
            );
        }
        if self.live == 0 || (cfg!(debug_assertions) && self.is_free(&block)) {
            contract_violation!("pool double release of slot {:p}", block.as_ptr());
        }

        let next = self.free.map_or(std::ptr::null_mut(), NonNull::as_ptr);
        // SAFETY: The slot is owned by this pool and large enough for a link.
        unsafe { block.as_ptr().cast::<*mut u8>().write(next) };
        self.free = Some(block.ptr());
        self.live -= 1;
    }

    pub(crate) fn release_all(&mut self) {
        for slab in self.slabs.drain(..) {
            // SAFETY: Every slab came from upstream; callers guarantee no slot
            // is used afterwards.
            unsafe { self.upstream.release(slab) };
        }
        self.free = None;
        self.carve = 0;
        self.live = 0;
    }

    pub(crate) fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            used: self.live * self.stride,
            highwater: 0,
            reserved: self.slabs.len() * self.slots_per_slab * self.stride,
            chunks: self.slabs.len(),
            live_allocations: self.live,
        }
    }
}

impl Drop for PoolAllocator {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(slot_size: usize, slots: usize) -> PoolAllocator {
        PoolAllocator::new(slot_size, slots, Allocator::clib())
    }

    #[test]
    fn test_pool_slot_reuse() {
        let mut p = pool(size_of::<i32>(), 1024);
        let a = p.allocate(4, 4).unwrap();
        unsafe { a.as_ptr().cast::<i32>().write(234) };
        p.release(a);

        let b = p.allocate(4, 4).unwrap();
        assert_eq!(a.ptr(), b.ptr());
    }

    #[test]
    fn test_pool_free_list_is_lifo() {
        let mut p = pool(32, 8);
        let a = p.allocate(32, 8).unwrap();
        let b = p.allocate(32, 8).unwrap();
        p.release(a);
        p.release(b);

        assert_eq!(p.allocate(32, 8).unwrap().ptr(), b.ptr());
        assert_eq!(p.allocate(32, 8).unwrap().ptr(), a.ptr());
    }

    #[test]
    fn test_pool_grows_new_slabs() {
        let mut p = pool(8, 4);
        let blocks: Vec<Block> = (0..10).map(|_| p.allocate(8, 8).unwrap()).collect();
        assert_eq!(p.stats().chunks, 3);
        assert_eq!(p.stats().live_allocations, 10);

        let mut addrs: Vec<usize> = blocks.iter().map(Block::addr).collect();
        addrs.sort_unstable();
        addrs.dedup();
        assert_eq!(addrs.len(), 10);
    }

    #[test]
    fn test_pool_slots_are_aligned() {
        let mut p = pool(3, 16);
        for _ in 0..16 {
            let b = p.allocate(3, 1).unwrap();
            assert_eq!(b.addr() % SLOT_ALIGNMENT, 0);
        }
    }

    #[test]
    #[should_panic(expected = "exceeds the slot size")]
    fn test_pool_oversized_request_is_violation() {
        let mut p = pool(16, 4);
        let _ = p.allocate(17, 8);
    }

    #[test]
    #[should_panic(expected = "not a slot of this pool")]
    fn test_pool_foreign_release_is_violation() {
        let mut p = pool(16, 4);
        let mut other = pool(16, 4);
        p.allocate(16, 8).unwrap();
        let foreign = other.allocate(16, 8).unwrap();
        p.release(foreign);
    }

    #[test]
    #[should_panic(expected = "pool double release")]
    fn test_pool_double_release_is_violation() {
        let mut p = pool(16, 4);
        let a = p.allocate(16, 8).unwrap();
        p.release(a);
        p.release(a);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "pool double release")]
    fn test_pool_double_release_with_live_slots_is_violation() {
        let mut p = pool(16, 4);
        let a = p.allocate(16, 8).unwrap();
        let _b = p.allocate(16, 8).unwrap();
        p.release(a);
        p.release(a);
    }

    #[test]
    fn test_pool_release_all() {
        let mut p = pool(16, 4);
        for _ in 0..6 {
            p.allocate(16, 8).unwrap();
        }
        p.release_all();
        assert_eq!(p.stats().chunks, 0);
        assert_eq!(p.stats().live_allocations, 0);
        p.allocate(16, 8).unwrap();
        assert_eq!(p.stats().chunks, 1);
    }
}
