//! The [`Allocator`] handle and its closed set of strategies.
//!
//! An `Allocator` is a cheap, clonable handle. Containers capture one at
//! creation and keep it for their whole life, so every growth and release is
//! routed to the allocator that produced the memory, no matter what the
//! [context](crate::context) says later. The handle keeps its allocator alive:
//! an arena is only torn down once the last container using it is gone.
//!
//! Strategies:
//!
//! | kind            | allocate            | release                 | release_all            |
//! |-----------------|---------------------|-------------------------|------------------------|
//! | `Clib`          | system allocator    | independent             | no-op                  |
//! | `Stack`         | bump in one buffer  | LIFO rewinds, else kept | rewind to empty        |
//! | `Arena`         | bump, chain chunks  | no-op                   | return every chunk     |
//! | `Pool`          | pop free slot       | push free slot          | return every slab      |
//! | `LeakTracking`  | inner + record      | inner + forget record   | inner + forget all     |
//!
//! Dispatch is a `match` over the strategy enum; the general-purpose allocator
//! is a unit variant of the handle and never takes a lock.
//!
//! # Examples
//!
//! ```
//! use cairn_mem::Allocator;
//!
//! let pool = Allocator::pool(std::mem::size_of::<u64>(), 64);
//! let slot = pool.allocate(8, 8).unwrap();
//! unsafe { pool.release(slot) };
//! let again = pool.allocate(8, 8).unwrap();
//! assert_eq!(slot.ptr(), again.ptr());
//! unsafe { pool.release(again) };
//! ```

use crate::arena::{ArenaAllocator, DEFAULT_CHUNK_SIZE};
use crate::block::Block;
use crate::clib;
use crate::error::{Error, Result};
use crate::leak::{LeakAllocator, LeakReport};
use crate::pool::PoolAllocator;
use crate::stack::StackAllocator;
use crate::virtual_memory;
use std::fmt;
use std::panic::Location;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Which strategy an [`Allocator`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocatorKind {
    /// General-purpose, backed by the system allocator.
    Clib,
    /// LIFO bump allocator over a fixed buffer.
    Stack,
    /// Chunked bump allocator with bulk release.
    Arena,
    /// Fixed-size slot allocator.
    Pool,
    /// Wrapper recording live allocations.
    LeakTracking,
}

impl AllocatorKind {
    /// Human readable name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AllocatorKind::Clib => "clib",
            AllocatorKind::Stack => "stack",
            AllocatorKind::Arena => "arena",
            AllocatorKind::Pool => "pool",
            AllocatorKind::LeakTracking => "leak",
        }
    }
}

/// Allocation statistics.
///
/// Fields that a strategy does not track are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Bytes currently handed out.
    pub used: usize,
    /// Largest value `used` has reached.
    pub highwater: usize,
    /// Bytes obtained from upstream (buffers, chunks, slabs).
    pub reserved: usize,
    /// Number of upstream buffers, chunks or slabs held.
    pub chunks: usize,
    /// Number of live allocations, where tracked.
    pub live_allocations: usize,
}

/// Where arena chunks and stack buffers come from.
#[derive(Debug, Clone)]
pub enum ChunkSource {
    /// Another allocator (the general-purpose one by default).
    Allocator(Allocator),
    /// Page-granular virtual memory.
    VirtualMemory,
}

impl Default for ChunkSource {
    fn default() -> Self {
        ChunkSource::Allocator(Allocator::clib())
    }
}

impl ChunkSource {
    pub(crate) fn acquire(&self, size: usize, align: usize) -> Result<Block> {
        let block = match self {
            ChunkSource::Allocator(upstream) => upstream.allocate(size, align),
            ChunkSource::VirtualMemory => virtual_memory::reserve(size),
        };
        block.map_err(|err| match err {
            Error::InvalidLayout { .. } => err,
            _ => Error::ChunkAllocationFailed { size },
        })
    }

    /// # Safety
    ///
    /// `block` must come from `acquire` on this source and be unused.
    pub(crate) unsafe fn give_back(&self, block: Block) {
        match self {
            // SAFETY: Upheld by the caller.
            ChunkSource::Allocator(upstream) => unsafe { upstream.release(block) },
            // SAFETY: Upheld by the caller.
            ChunkSource::VirtualMemory => unsafe { virtual_memory::release(block) },
        }
    }
}

/// The stateful strategies.
enum Strategy {
    Stack(StackAllocator),
    Arena(ArenaAllocator),
    Pool(PoolAllocator),
    Leak(LeakAllocator),
}

impl Strategy {
    fn kind(&self) -> AllocatorKind {
        match self {
            Strategy::Stack(_) => AllocatorKind::Stack,
            Strategy::Arena(_) => AllocatorKind::Arena,
            Strategy::Pool(_) => AllocatorKind::Pool,
            Strategy::Leak(_) => AllocatorKind::LeakTracking,
        }
    }
}

struct Shared {
    kind: AllocatorKind,
    strategy: Mutex<Strategy>,
}

#[derive(Clone)]
enum Repr {
    Clib,
    Shared(Arc<Shared>),
}

/// Handle to an allocator.
///
/// Cloning is cheap and yields a handle to the *same* allocator; `==` compares
/// identity. Stateful strategies serialize their operations behind a mutex, so
/// handles are `Send + Sync`, but the allocator context that selects the
/// current allocator is per-thread.
#[derive(Clone)]
pub struct Allocator {
    repr: Repr,
}

impl Allocator {
    /// The general-purpose allocator.
    #[must_use]
    pub const fn clib() -> Self {
        Allocator { repr: Repr::Clib }
    }

    fn shared(strategy: Strategy) -> Self {
        let kind = strategy.kind();
        let shared = Arc::new(Shared {
            kind,
            strategy: Mutex::new(strategy),
        });
        cairn_log::debug!(
            "created {} allocator {:p}",
            kind.as_str(),
            Arc::as_ptr(&shared)
        );
        Allocator {
            repr: Repr::Shared(shared),
        }
    }

    /// A stack allocator with a `capacity`-byte buffer from the system
    /// allocator. The buffer is acquired on first use.
    #[must_use]
    pub fn stack(capacity: usize) -> Self {
        Self::stack_with_source(capacity, ChunkSource::default())
    }

    /// A stack allocator whose buffer comes from `source`.
    #[must_use]
    pub fn stack_with_source(capacity: usize, source: ChunkSource) -> Self {
        Self::shared(Strategy::Stack(StackAllocator::new(capacity, source)))
    }

    /// An arena whose chunks are at least `chunk_size` bytes and come from
    /// the system allocator.
    #[must_use]
    pub fn arena(chunk_size: usize) -> Self {
        Self::arena_with_source(chunk_size, ChunkSource::default())
    }

    /// An arena whose chunks come from `source`.
    #[must_use]
    pub fn arena_with_source(chunk_size: usize, source: ChunkSource) -> Self {
        Self::shared(Strategy::Arena(ArenaAllocator::new(chunk_size, source)))
    }

    /// An arena with [`DEFAULT_CHUNK_SIZE`] chunks.
    #[must_use]
    pub fn default_arena() -> Self {
        Self::arena(DEFAULT_CHUNK_SIZE)
    }

    /// A pool of `slot_size`-byte slots, carved from slabs of
    /// `slots_per_slab` slots obtained from the system allocator.
    #[must_use]
    pub fn pool(slot_size: usize, slots_per_slab: usize) -> Self {
        Self::pool_with_upstream(slot_size, slots_per_slab, Allocator::clib())
    }

    /// A pool whose slabs come from `upstream`.
    #[must_use]
    pub fn pool_with_upstream(
        slot_size: usize,
        slots_per_slab: usize,
        upstream: Allocator,
    ) -> Self {
        Self::shared(Strategy::Pool(PoolAllocator::new(
            slot_size,
            slots_per_slab,
            upstream,
        )))
    }

    /// A leak tracker around `inner`.
    #[must_use]
    pub fn leak_tracking(inner: Allocator) -> Self {
        Self::shared(Strategy::Leak(LeakAllocator::new(inner)))
    }

    /// The strategy of this allocator.
    #[must_use]
    pub fn kind(&self) -> AllocatorKind {
        match &self.repr {
            Repr::Clib => AllocatorKind::Clib,
            Repr::Shared(shared) => shared.kind,
        }
    }

    fn lock(shared: &Shared) -> MutexGuard<'_, Strategy> {
        // A contract violation panics with the lock held, before any state
        // is touched, so a poisoned strategy is still consistent.
        shared
            .strategy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates `size` bytes aligned to `align`.
    ///
    /// Zero-sized requests return a dangling, aligned block without touching
    /// the strategy.
    ///
    /// # Errors
    ///
    /// `Error::InvalidLayout` when `align` is not a power of two or the size
    /// overflows, `Error::OutOfMemory` / `Error::ChunkAllocationFailed` when
    /// the strategy cannot provide the memory.
    ///
    /// # Panics
    ///
    /// Requests a pool cannot serve (larger than its slots) are contract
    /// violations.
    #[track_caller]
    pub fn allocate(&self, size: usize, align: usize) -> Result<Block> {
        if !align.is_power_of_two() || size > isize::MAX as usize - (align - 1) {
            return Err(Error::InvalidLayout { size, align });
        }
        if size == 0 {
            return Ok(Block::dangling(align));
        }

        let location = Location::caller();
        match &self.repr {
            Repr::Clib => clib::allocate(size, align),
            Repr::Shared(shared) => match &mut *Self::lock(shared) {
                Strategy::Stack(s) => s.allocate(size, align),
                Strategy::Arena(a) => a.allocate(size, align),
                Strategy::Pool(p) => p.allocate(size, align),
                Strategy::Leak(l) => l.allocate(size, align, location),
            },
        }
    }

    /// Allocates room for one `T`.
    ///
    /// # Errors
    ///
    /// See [`Allocator::allocate`].
    #[track_caller]
    pub fn allocate_for<T>(&self) -> Result<Block> {
        self.allocate(size_of::<T>(), align_of::<T>())
    }

    /// Moves `value` into memory from this allocator.
    ///
    /// # Errors
    ///
    /// See [`Allocator::allocate`]; `value` is dropped on failure.
    #[track_caller]
    pub fn alloc<T>(&self, value: T) -> Result<NonNull<T>> {
        let block = self.allocate_for::<T>()?;
        let ptr = block.ptr().cast::<T>();
        // SAFETY: The block is fresh, sized and aligned for T.
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Drops the value at `ptr` and releases its memory.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`Allocator::alloc`] on this allocator and must
    /// not be used afterwards.
    pub unsafe fn free<T>(&self, ptr: NonNull<T>) {
        // SAFETY: Upheld by the caller.
        unsafe {
            std::ptr::drop_in_place(ptr.as_ptr());
            let block =
                Block::from_raw_parts(ptr.cast(), size_of::<T>(), align_of::<T>());
            self.release(block);
        }
    }

    /// Grows or shrinks `block` to `new_size` bytes, keeping its contents up
    /// to the smaller of the two sizes.
    ///
    /// On success `block` must no longer be used; on failure it is still valid.
    ///
    /// # Errors
    ///
    /// See [`Allocator::allocate`].
    ///
    /// # Safety
    ///
    /// `block` must be live and come from this allocator.
    #[track_caller]
    pub unsafe fn resize(&self, block: Block, new_size: usize) -> Result<Block> {
        if block.is_empty() {
            return self.allocate(new_size, block.align());
        }
        if new_size == 0 {
            // SAFETY: Upheld by the caller.
            unsafe { self.release(block) };
            return Ok(Block::dangling(block.align()));
        }
        if new_size > isize::MAX as usize - (block.align() - 1) {
            return Err(Error::InvalidLayout {
                size: new_size,
                align: block.align(),
            });
        }

        match &self.repr {
            // SAFETY: Upheld by the caller.
            Repr::Clib => unsafe { clib::resize(block, new_size) },
            Repr::Shared(shared) => match &mut *Self::lock(shared) {
                Strategy::Stack(s) => s.resize(block, new_size),
                Strategy::Arena(a) => a.resize(block, new_size),
                Strategy::Pool(p) => p.resize(block, new_size),
                Strategy::Leak(l) => l.resize(block, new_size),
            },
        }
    }

    /// Returns `block` to this allocator.
    ///
    /// # Safety
    ///
    /// `block` must be live, come from this allocator and not be used
    /// afterwards.
    pub unsafe fn release(&self, block: Block) {
        if block.is_empty() {
            return;
        }
        match &self.repr {
            // SAFETY: Upheld by the caller.
            Repr::Clib => unsafe { clib::release(block) },
            Repr::Shared(shared) => match &mut *Self::lock(shared) {
                Strategy::Stack(s) => s.release(block),
                Strategy::Arena(a) => a.release(block),
                Strategy::Pool(p) => p.release(block),
                Strategy::Leak(l) => l.release(block),
            },
        }
    }

    /// Releases every allocation made from this allocator at once.
    ///
    /// A no-op for the general-purpose allocator.
    ///
    /// # Safety
    ///
    /// No block obtained from this allocator may be used afterwards, including
    /// storage held by containers that captured it.
    pub unsafe fn release_all(&self) {
        if let Repr::Shared(shared) = &self.repr {
            match &mut *Self::lock(shared) {
                Strategy::Stack(s) => s.release_all(),
                Strategy::Arena(a) => a.release_all(),
                Strategy::Pool(p) => p.release_all(),
                Strategy::Leak(l) => l.release_all(),
            }
        }
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        match &self.repr {
            Repr::Clib => AllocatorStats::default(),
            Repr::Shared(shared) => match &*Self::lock(shared) {
                Strategy::Stack(s) => s.stats(),
                Strategy::Arena(a) => a.stats(),
                Strategy::Pool(p) => p.stats(),
                Strategy::Leak(l) => l.stats(),
            },
        }
    }

    /// The live allocations of a leak-tracking allocator, `None` for other
    /// strategies.
    #[must_use]
    pub fn leak_report(&self) -> Option<LeakReport> {
        match &self.repr {
            Repr::Shared(shared) => match &*Self::lock(shared) {
                Strategy::Leak(l) => Some(l.report()),
                _ => None,
            },
            Repr::Clib => None,
        }
    }
}

impl PartialEq for Allocator {
    fn eq(&self, other: &Self) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Clib, Repr::Clib) => true,
            (Repr::Shared(a), Repr::Shared(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Allocator {}

impl Default for Allocator {
    fn default() -> Self {
        Allocator::clib()
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Clib => write!(f, "Allocator(clib)"),
            Repr::Shared(shared) => {
                write!(f, "Allocator({}@{:p})", shared.kind.as_str(), Arc::as_ptr(shared))
            }
        }
    }
}
