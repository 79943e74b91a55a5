//! Allocator strategy and context integration tests.
//!
//! Exercises the public API the way containers do: capture the current
//! allocator, allocate through it, and release through the captured handle.

use cairn_mem::{Allocator, AllocatorKind, Block, ChunkSource, Error, context, virtual_memory};

fn fill(block: Block, byte: u8) {
    unsafe { block.as_mut_slice().fill(byte) };
}

fn holds(block: Block, byte: u8) -> bool {
    unsafe { block.as_slice() }.iter().all(|&b| b == byte)
}

#[test]
fn test_round_trip_without_growth() {
    let allocators = [
        Allocator::clib(),
        Allocator::stack(64 * 1024),
        Allocator::arena(64 * 1024),
        Allocator::pool(512, 32),
        Allocator::leak_tracking(Allocator::arena(64 * 1024)),
    ];

    for allocator in &allocators {
        for size in [1usize, 7, 64, 100, 511] {
            for align in [1usize, 2, 8, 16] {
                let first = allocator.allocate(size, align).unwrap();
                assert_eq!(first.addr() % align, 0);
                unsafe { allocator.release(first) };

                let before = allocator.stats().chunks;
                let second = allocator.allocate(size, align).unwrap();
                assert_eq!(allocator.stats().chunks, before, "{allocator:?}");
                unsafe { allocator.release(second) };
            }
        }
    }
}

#[test]
fn test_stack_out_of_order_release_never_corrupts() {
    let stack = Allocator::stack(4096);
    let blocks: Vec<Block> = (0..10u8)
        .map(|i| {
            let block = stack.allocate(48, 8).unwrap();
            fill(block, i);
            block
        })
        .collect();

    // None of these is the most recent allocation.
    for block in blocks.iter().step_by(2) {
        unsafe { stack.release(*block) };
    }

    let fresh: Vec<Block> = (0..5)
        .map(|_| {
            let block = stack.allocate(48, 8).unwrap();
            fill(block, 0xAA);
            block
        })
        .collect();

    for (i, block) in blocks.iter().enumerate() {
        assert!(holds(*block, i as u8), "block {i} was overwritten");
    }
    for block in fresh {
        assert!(holds(block, 0xAA));
    }
}

#[test]
fn test_stack_push_pop_reuse_cycle() {
    let stack = Allocator::stack(1024);
    for _ in 0..100 {
        {
            let _scope = context::scope(stack.clone());
            let allocator = context::current();
            for _ in 0..8 {
                allocator.allocate(100, 8).unwrap();
            }
        }
        // The pop does not reclaim; the owner rewinds for the next push.
        unsafe { stack.release_all() };
    }
    assert_eq!(stack.stats().chunks, 1);
    // Eight 100-byte blocks at 8-byte alignment.
    assert_eq!(stack.stats().highwater, 7 * 104 + 100);
}

#[test]
fn test_stack_reports_exhaustion() {
    let stack = Allocator::stack(256);
    let err = stack.allocate(512, 8).unwrap_err();
    assert_eq!(
        err,
        Error::OutOfMemory {
            requested: 512,
            available: 256
        }
    );
}

#[test]
fn test_stack_over_virtual_memory() {
    let stack = Allocator::stack_with_source(1 << 20, ChunkSource::VirtualMemory);
    let block = stack.allocate(1 << 19, 4096).unwrap();
    assert_eq!(block.addr() % 4096, 0);
    fill(block, 1);
    assert!(stack.stats().reserved >= 1 << 20);
}

#[test]
fn test_arena_bulk_free_resets() {
    let arena = Allocator::arena(4096);
    for i in 0..1000usize {
        arena.allocate(1 + i % 97, 1 << (i % 4)).unwrap();
    }
    let stats = arena.stats();
    assert!(stats.chunks > 1);
    assert!(stats.used > 0);

    unsafe { arena.release_all() };
    assert_eq!(arena.stats().chunks, 0);
    assert_eq!(arena.stats().used, 0);

    arena.allocate(16, 8).unwrap();
    assert_eq!(arena.stats().chunks, 1);
}

#[test]
fn test_arena_individual_release_is_noop() {
    let arena = Allocator::arena(4096);
    let a = arena.allocate(128, 8).unwrap();
    fill(a, 9);
    unsafe { arena.release(a) };
    let b = arena.allocate(128, 8).unwrap();
    assert_ne!(a.ptr(), b.ptr());
    assert!(holds(a, 9));
}

#[test]
fn test_pool_slot_reuse_is_identical() {
    let pool = Allocator::pool(size_of::<[u64; 4]>(), 16);
    let mut held = Vec::new();
    for _ in 0..40 {
        held.push(pool.allocate_for::<[u64; 4]>().unwrap());
    }

    for block in held.drain(..) {
        unsafe { pool.release(block) };
        let again = pool.allocate_for::<[u64; 4]>().unwrap();
        assert_eq!(again.ptr(), block.ptr());
        unsafe { pool.release(again) };
    }
    assert_eq!(pool.stats().live_allocations, 0);
    assert_eq!(pool.stats().chunks, 3);
}

#[test]
#[should_panic(expected = "exceeds the slot size")]
fn test_pool_oversized_request_panics() {
    let pool = Allocator::pool(16, 4);
    let _ = pool.allocate(32, 8);
}

#[test]
fn test_leak_tracker_three_allocate_two_release() {
    let tracker = Allocator::leak_tracking(Allocator::clib());
    let a = tracker.allocate(10, 8).unwrap();
    let b = tracker.allocate(20, 8).unwrap();
    let c = tracker.allocate(30, 8).unwrap();

    unsafe {
        tracker.release(a);
        tracker.release(c);
    }

    let report = tracker.leak_report().unwrap();
    assert_eq!(report.count, 1);
    assert_eq!(report.bytes, 20);
    assert_eq!(report.entries[0].size, 20);
    assert_eq!(report.entries[0].address, b.addr());
    assert!(report.entries[0].location.file().ends_with("allocators.rs"));

    unsafe { tracker.release(b) };
    assert!(tracker.leak_report().unwrap().is_clean());
}

#[test]
#[should_panic(expected = "double free or foreign pointer")]
fn test_leak_tracker_rejects_foreign_block() {
    let tracker = Allocator::leak_tracking(Allocator::clib());
    let foreign = Allocator::clib().allocate(16, 8).unwrap();
    unsafe { tracker.release(foreign) };
}

#[test]
fn test_leak_report_only_for_trackers() {
    assert!(Allocator::clib().leak_report().is_none());
    assert!(Allocator::arena(64).leak_report().is_none());
    assert_eq!(
        Allocator::leak_tracking(Allocator::clib()).kind(),
        AllocatorKind::LeakTracking
    );
}

#[test]
fn test_capture_survives_context_change() {
    let arena = Allocator::arena(4096);
    let captured = context::with_allocator(arena.clone(), context::current);

    // Context is back to the default; the captured handle still routes to the
    // arena.
    assert_ne!(context::current(), arena);
    captured.allocate(64, 8).unwrap();
    assert_eq!(arena.stats().used, 64);
}

#[test]
fn test_allocator_outlives_scope_through_handle() {
    let captured = {
        let arena = Allocator::arena(4096);
        let _scope = context::scope(arena);
        context::current()
    };
    let block = captured.allocate(32, 8).unwrap();
    fill(block, 3);
    assert!(holds(block, 3));
}

#[test]
fn test_virtual_memory_page_granular() {
    let page = virtual_memory::page_size();
    let block = virtual_memory::reserve(page + 1).unwrap();
    assert_eq!(block.size(), 2 * page);
    assert_eq!(block.addr() % page, 0);
    unsafe { virtual_memory::release(block) };
}
