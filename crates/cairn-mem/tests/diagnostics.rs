//! Diagnostics routed through `cairn-log`.
//!
//! The logger is process-wide, so every check runs inside one test to keep
//! the captured records free of interleaving from parallel tests.

use cairn_log::{CaptureSink, Level};
use cairn_mem::{Allocator, profile};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct Counter {
    allocs: AtomicUsize,
    frees: AtomicUsize,
}

impl profile::MemoryProfiler for Counter {
    fn on_alloc(&self, _ptr: *mut u8, _size: usize) {
        self.allocs.fetch_add(1, Ordering::SeqCst);
    }

    fn on_free(&self, _ptr: *mut u8, _size: usize) {
        self.frees.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_diagnostics_are_logged() {
    let sink = Arc::new(CaptureSink::new());
    cairn_log::set_sink(sink.clone());
    cairn_log::set_level(Level::Trace);

    // Leaks are reported when the last handle goes away.
    {
        let tracker = Allocator::leak_tracking(Allocator::clib());
        tracker.allocate(40, 8).unwrap();
    }
    assert!(sink.contains(Level::Error, "1 leaked allocation(s), 40 bytes"));

    // Out-of-order stack releases are tolerated but reported.
    let stack = Allocator::stack(256);
    let first = stack.allocate(16, 8).unwrap();
    let _second = stack.allocate(16, 8).unwrap();
    unsafe { stack.release(first) };
    assert!(sink.contains(Level::Warn, "out-of-order release of 16 bytes"));

    // Arena growth is traced.
    let arena = Allocator::arena(64);
    for _ in 0..4 {
        arena.allocate(48, 8).unwrap();
    }
    assert!(sink.contains(Level::Trace, "arena linked chunk #2"));
    assert!(sink.contains(Level::Debug, "created arena allocator"));

    // Contract violations are logged before the panic.
    let result = std::panic::catch_unwind(|| {
        let pool = Allocator::pool(8, 4);
        let _ = pool.allocate(64, 8);
    });
    assert!(result.is_err());
    assert!(sink.contains(Level::Error, "contract violation: pool allocation of 64 bytes"));

    cairn_log::reset_sink();
    cairn_log::set_level(Level::Info);
}

#[test]
fn test_profiler_sees_clib_traffic() {
    let counter = Arc::new(Counter::default());
    profile::set_memory_profiler(Some(counter.clone()));

    let clib = Allocator::clib();
    let block = clib.allocate(128, 8).unwrap();
    unsafe { clib.release(block) };

    // Arena chunks come from the general-purpose allocator too.
    let arena = Allocator::arena(1024);
    arena.allocate(8, 8).unwrap();
    unsafe { arena.release_all() };

    profile::set_memory_profiler(None);

    // Other tests in this binary may allocate concurrently.
    assert!(counter.allocs.load(Ordering::SeqCst) >= 2);
    assert!(counter.frees.load(Ordering::SeqCst) >= 2);
}
