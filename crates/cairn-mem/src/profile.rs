//! Memory profiling hooks.
//!
//! A process-wide [`MemoryProfiler`] can observe every allocation and release
//! made through the general-purpose allocator (which also backs arena chunks,
//! pool slabs and stack buffers by default). Profiling can be switched off per
//! thread, e.g. for the profiler's own worker thread.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Observer of general-purpose allocator traffic.
pub trait MemoryProfiler: Send + Sync {
    /// Called after `size` bytes were allocated at `ptr`.
    fn on_alloc(&self, ptr: *mut u8, size: usize);

    /// Called before `size` bytes at `ptr` are released.
    fn on_free(&self, ptr: *mut u8, size: usize);
}

static INSTALLED: AtomicBool = AtomicBool::new(false);
static PROFILER: RwLock<Option<Arc<dyn MemoryProfiler>>> = RwLock::new(None);

thread_local! {
    static DISABLED: Cell<bool> = const { Cell::new(false) };
}

/// Installs (or with `None`, removes) the process-wide profiler, returning the
/// previous one.
pub fn set_memory_profiler(
    profiler: Option<Arc<dyn MemoryProfiler>>,
) -> Option<Arc<dyn MemoryProfiler>> {
    let mut slot = PROFILER.write().unwrap_or_else(PoisonError::into_inner);
    INSTALLED.store(profiler.is_some(), Ordering::Release);
    std::mem::replace(&mut *slot, profiler)
}

/// Stops reporting this thread's allocations to the profiler.
pub fn disable_for_this_thread() {
    let _ = DISABLED.try_with(|d| d.set(true));
}

/// Resumes reporting this thread's allocations to the profiler.
pub fn enable_for_this_thread() {
    let _ = DISABLED.try_with(|d| d.set(false));
}

#[inline]
fn active() -> Option<Arc<dyn MemoryProfiler>> {
    if !INSTALLED.load(Ordering::Acquire) {
        return None;
    }
    if DISABLED.try_with(Cell::get).unwrap_or(true) {
        return None;
    }
    PROFILER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[inline]
pub(crate) fn record_alloc(ptr: *mut u8, size: usize) {
    if let Some(profiler) = active() {
        profiler.on_alloc(ptr, size);
    }
}

#[inline]
pub(crate) fn record_free(ptr: *mut u8, size: usize) {
    if let Some(profiler) = active() {
        profiler.on_free(ptr, size);
    }
}
