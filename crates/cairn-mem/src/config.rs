//! Process-wide configuration of the per-thread allocator context.
//!
//! Configuration is read once, the first time any thread touches its context.
//! Set it explicitly with [`configure`](crate::context::configure) before that,
//! or let it be read from the environment:
//!
//! | variable                   | values                 | default              |
//! |----------------------------|------------------------|----------------------|
//! | `CAIRN_DEFAULT_ALLOCATOR`  | `clib`, `leak`         | `clib` (`leak` with the `leak-check` feature) |
//! | `CAIRN_TMP_CHUNK_SIZE`     | bytes                  | 4 MiB                |

/// Default size of the per-thread scratch arena's chunks (4 MiB).
pub const DEFAULT_TMP_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Maximum depth of the allocator context stack.
pub const DEFAULT_STACK_CAPACITY: usize = 1024;

/// What seeds the bottom of every thread's allocator context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAllocator {
    /// The general-purpose allocator.
    Clib,
    /// A leak tracker around the general-purpose allocator.
    LeakTracking,
}

impl DefaultAllocator {
    /// Parses `clib` / `leak` (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clib" | "system" => Some(DefaultAllocator::Clib),
            "leak" | "leak-tracking" => Some(DefaultAllocator::LeakTracking),
            _ => None,
        }
    }
}

/// Configuration of the allocator context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Allocator at the bottom of each thread's stack.
    pub default_allocator: DefaultAllocator,
    /// Chunk size of the per-thread scratch arena.
    pub tmp_chunk_size: usize,
    /// Maximum number of allocators on a thread's stack.
    pub stack_capacity: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        let default_allocator = if cfg!(feature = "leak-check") {
            DefaultAllocator::LeakTracking
        } else {
            DefaultAllocator::Clib
        };
        ContextConfig {
            default_allocator,
            tmp_chunk_size: DEFAULT_TMP_CHUNK_SIZE,
            stack_capacity: DEFAULT_STACK_CAPACITY,
        }
    }
}

impl ContextConfig {
    /// Reads the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, falling back to the default
    /// for missing or malformed values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = ContextConfig::default();

        if let Some(value) = lookup("CAIRN_DEFAULT_ALLOCATOR") {
            match DefaultAllocator::from_str(&value) {
                Some(allocator) => config.default_allocator = allocator,
                None => cairn_log::warn!(
                    "ignoring CAIRN_DEFAULT_ALLOCATOR={value:?}; expected `clib` or `leak`"
                ),
            }
        }

        if let Some(value) = lookup("CAIRN_TMP_CHUNK_SIZE") {
            match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => config.tmp_chunk_size = size,
                _ => cairn_log::warn!(
                    "ignoring CAIRN_TMP_CHUNK_SIZE={value:?}; expected a positive byte count"
                ),
            }
        }

        config
    }
}
