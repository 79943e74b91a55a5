//! Explicit, swappable memory allocation for the `cairn` runtime.
//!
//! This crate provides:
//!
//! - **[`Allocator`]**: a handle over five strategies (general-purpose, stack,
//!   arena, pool, leak-tracking) sharing one capability set
//! - **[`context`]**: the per-thread stack deciding which allocator is current,
//!   with scope guards and a temporary arena
//! - **[`virtual_memory`]**: page-granular reservations usable as arena chunks
//!   or stack buffers
//! - **[`profile`]**: hooks observing general-purpose allocator traffic
//!
//! Containers built on top (see `cairn-ds`) capture [`context::current()`] when
//! created and route all later allocation through that allocator.
//!
//! # Features
//!
//! - `leak-check`: seed every thread's context with a leak tracker
//! - `leak-backtrace`: capture a backtrace for every leak-tracked allocation

mod allocator;
mod arena;
mod block;
mod clib;
pub mod config;
pub mod context;
mod error;
mod leak;
mod pool;
pub mod profile;
mod stack;
pub mod virtual_memory;

pub use allocator::{Allocator, AllocatorKind, AllocatorStats, ChunkSource};
pub use arena::DEFAULT_CHUNK_SIZE;
pub use block::Block;
pub use config::{ContextConfig, DefaultAllocator};
pub use context::AllocatorScope;
pub use error::{Error, Result};
pub use leak::{LeakEntry, LeakReport};
pub use pool::SLOT_ALIGNMENT;

#[doc(hidden)]
pub use cairn_log as __log;
