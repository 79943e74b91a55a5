//! The per-thread allocator context.
//!
//! Every thread owns a stack of [`Allocator`] handles. The top of the stack is
//! the *current* allocator: containers capture [`current()`] when they are
//! created and use that allocator for the rest of their life.
//!
//! # Design
//!
//! - **Thread-local**: each thread has its own stack, seeded on first use with
//!   the default allocator from [`ContextConfig`]
//! - **Scoped**: [`scope`] returns a guard that pops on every exit path,
//!   including `?` returns and unwinding
//! - **Scratch memory**: each thread also owns a temporary arena, [`tmp()`],
//!   meant to be bulk-released by whoever uses it
//!
//! Misuse (popping the default allocator, more than
//! [`stack_capacity`](ContextConfig::stack_capacity) pushes, an unbalanced push
//! inside a scope) is a contract violation.
//!
//! # Example
//!
//! ```
//! use cairn_mem::{Allocator, context};
//!
//! let arena = Allocator::arena(4096);
//! {
//!     let _scope = context::scope(arena.clone());
//!     assert_eq!(context::current(), arena);
//!     let block = context::current().allocate(64, 8).unwrap();
//!     assert_eq!(block.size(), 64);
//! }
//! assert_ne!(context::current(), arena);
//!
//! // SAFETY: nothing allocated from the arena is used below.
//! unsafe { arena.release_all() };
//! ```

use crate::allocator::Allocator;
use crate::config::{ContextConfig, DefaultAllocator};
use crate::contract_violation;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::OnceLock;

// ============================================================================
// Configuration
// ============================================================================

static CONFIG: OnceLock<ContextConfig> = OnceLock::new();

/// Sets the process-wide context configuration.
///
/// Returns `false` (and changes nothing) when a configuration is already in
/// effect, i.e. after `configure` was called before or any thread touched its
/// context.
pub fn configure(config: ContextConfig) -> bool {
    CONFIG.set(config).is_ok()
}

/// The configuration in effect, read from the environment if none was set.
pub fn config() -> &'static ContextConfig {
    CONFIG.get_or_init(ContextConfig::from_env)
}

// ============================================================================
// Context
// ============================================================================

struct Context {
    /// Never empty: index 0 holds the default allocator.
    stack: Vec<Allocator>,
    capacity: usize,
    tmp: Allocator,
}

impl Context {
    fn new() -> Self {
        let config = config();
        let seed = match config.default_allocator {
            DefaultAllocator::Clib => Allocator::clib(),
            DefaultAllocator::LeakTracking => Allocator::leak_tracking(Allocator::clib()),
        };
        cairn_log::debug!(
            "allocator context initialised with {:?} default",
            config.default_allocator
        );

        let mut stack = Vec::with_capacity(config.stack_capacity.min(16));
        stack.push(seed);
        Context {
            stack,
            capacity: config.stack_capacity.max(1),
            tmp: Allocator::arena(config.tmp_chunk_size),
        }
    }

    fn top(&self) -> Allocator {
        self.stack.last().cloned().unwrap_or_default()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let tmp = self.tmp.stats();
        cairn_log::debug!(
            "allocator context torn down: tmp arena used {} bytes, highwater {} bytes, {} chunk(s)",
            tmp.used,
            tmp.highwater,
            tmp.chunks
        );
        if self.stack.len() > 1 {
            cairn_log::warn!(
                "allocator context torn down with {} allocator(s) still pushed",
                self.stack.len() - 1
            );
        }
    }
}

thread_local! {
    static CONTEXT: RefCell<Context> = RefCell::new(Context::new());
}

// ============================================================================
// Stack operations
// ============================================================================

/// Makes `allocator` the current allocator until the matching [`pop`].
///
/// Prefer [`scope`] or [`with_allocator`], which cannot forget the pop.
///
/// # Panics
///
/// Pushing past the configured stack capacity, or after the thread's context
/// was torn down, is a contract violation.
pub fn push(allocator: Allocator) {
    let pushed = CONTEXT.try_with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        if ctx.stack.len() >= ctx.capacity {
            return Err(ctx.capacity);
        }
        ctx.stack.push(allocator);
        Ok(())
    });

    match pushed {
        Ok(Ok(())) => {}
        Ok(Err(capacity)) => {
            contract_violation!("allocator context overflow: more than {} allocators pushed", capacity)
        }
        Err(_) => contract_violation!("allocator push after the thread's context was torn down"),
    }
}

/// Removes and returns the current allocator, restoring the previous one.
///
/// # Panics
///
/// Popping the default allocator, or popping after the thread's context was
/// torn down, is a contract violation.
pub fn pop() -> Allocator {
    let popped = CONTEXT.try_with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        if ctx.stack.len() <= 1 {
            return None;
        }
        ctx.stack.pop()
    });

    match popped {
        Ok(Some(allocator)) => allocator,
        Ok(None) => contract_violation!("allocator pop without a matching push (would pop the default allocator)"),
        Err(_) => contract_violation!("allocator pop after the thread's context was torn down"),
    }
}

/// The allocator on top of this thread's stack.
///
/// During thread teardown, once the context is gone, this falls back to the
/// general-purpose allocator.
#[must_use]
pub fn current() -> Allocator {
    CONTEXT.try_with(|ctx| ctx.borrow().top()).unwrap_or_else(|_| {
        cairn_log::warn!("allocator context used during thread teardown; using clib");
        Allocator::clib()
    })
}

/// Number of allocators on this thread's stack, the default one included.
///
/// Returns 0 once the context has been torn down.
#[must_use]
pub fn depth() -> usize {
    CONTEXT.try_with(|ctx| ctx.borrow().stack.len()).unwrap_or(0)
}

/// This thread's temporary arena.
///
/// Nothing releases it automatically; callers that use it for scratch data
/// call `release_all` when done.
///
/// # Panics
///
/// Calling it after the thread's context was torn down is a contract
/// violation.
#[must_use]
pub fn tmp() -> Allocator {
    match CONTEXT.try_with(|ctx| ctx.borrow().tmp.clone()) {
        Ok(tmp) => tmp,
        Err(_) => contract_violation!("tmp allocator requested after the thread's context was torn down"),
    }
}

// ============================================================================
// Scopes
// ============================================================================

/// Guard returned by [`scope`]; pops its allocator when dropped.
#[must_use = "the allocator is popped as soon as the scope is dropped"]
pub struct AllocatorScope {
    allocator: Allocator,
    /// Stack depth right after the push.
    depth: usize,
    /// Tied to the thread whose stack it modified.
    _not_send: PhantomData<*const ()>,
}

impl AllocatorScope {
    /// The allocator this scope pushed.
    #[must_use]
    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }
}

/// Pushes `allocator` and returns a guard that pops it.
///
/// # Example
///
/// ```
/// use cairn_mem::{Allocator, context};
///
/// fn build() -> cairn_mem::Result<usize> {
///     let _scope = context::scope(Allocator::stack(1024));
///     let block = context::current().allocate(128, 16)?;
///     Ok(block.size())
/// }
///
/// let depth = context::depth();
/// assert_eq!(build().unwrap(), 128);
/// assert_eq!(context::depth(), depth);
/// ```
pub fn scope(allocator: Allocator) -> AllocatorScope {
    push(allocator.clone());
    AllocatorScope {
        allocator,
        depth: depth(),
        _not_send: PhantomData,
    }
}

impl Drop for AllocatorScope {
    fn drop(&mut self) {
        let unwinding = std::thread::panicking();
        let outcome = CONTEXT.try_with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            let balanced = ctx.stack.len() == self.depth
                && ctx.stack.last() == Some(&self.allocator);
            if balanced || unwinding {
                // While unwinding, also discard whatever inner code pushed
                // without popping.
                let keep = (self.depth - 1).clamp(1, ctx.stack.len());
                Ok(ctx.stack.split_off(keep))
            } else {
                Err(ctx.stack.len())
            }
        });

        match outcome {
            Ok(Ok(popped)) => drop(popped),
            Ok(Err(depth)) => contract_violation!(
                "unbalanced allocator scope: opened at depth {} but closed at depth {}",
                self.depth,
                depth
            ),
            // The stack died with the thread.
            Err(_) => {}
        }
    }
}

/// Runs `f` with `allocator` as the current allocator.
pub fn with_allocator<R>(allocator: Allocator, f: impl FnOnce() -> R) -> R {
    let _scope = scope(allocator);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use std::panic::{self, AssertUnwindSafe};

    #[test]
    fn test_context_is_seeded() {
        assert_eq!(depth(), 1);
        assert!(matches!(
            current().kind(),
            crate::AllocatorKind::Clib | crate::AllocatorKind::LeakTracking
        ));
    }

    #[test]
    fn test_push_pop_nesting() {
        let seed = current();
        let arena = Allocator::arena(1024);
        let stack = Allocator::stack(1024);

        push(arena.clone());
        push(stack.clone());
        assert_eq!(current(), stack);
        assert_eq!(depth(), 3);

        assert_eq!(pop(), stack);
        assert_eq!(current(), arena);
        assert_eq!(pop(), arena);
        assert_eq!(current(), seed);
    }

    #[test]
    #[should_panic(expected = "would pop the default allocator")]
    fn test_pop_of_default_is_violation() {
        pop();
    }

    #[test]
    #[should_panic(expected = "allocator context overflow")]
    fn test_push_overflow_is_violation() {
        for _ in 0..config().stack_capacity {
            push(Allocator::clib());
        }
    }

    #[test]
    fn test_scope_pops_on_early_return() {
        fn failing(arena: &Allocator) -> Result<()> {
            let _scope = scope(arena.clone());
            current().allocate(8, 8)?;
            Err(Error::OutOfMemory {
                requested: 8,
                available: 0,
            })
        }

        let arena = Allocator::arena(1024);
        assert!(failing(&arena).is_err());
        assert_eq!(depth(), 1);
        assert_eq!(arena.stats().used, 8);
    }

    #[test]
    fn test_scope_pops_on_panic() {
        let seed = current();
        let arena = Allocator::arena(1024);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            with_allocator(arena.clone(), || {
                // Left unbalanced on purpose: unwinding discards it too.
                push(Allocator::stack(64));
                panic!("boom");
            })
        }));

        assert!(result.is_err());
        assert_eq!(depth(), 1);
        assert_eq!(current(), seed);
    }

    #[test]
    #[should_panic(expected = "unbalanced allocator scope")]
    fn test_scope_detects_unbalanced_push() {
        let _scope = scope(Allocator::arena(64));
        push(Allocator::clib());
    }

    #[test]
    fn test_with_allocator_returns_value() {
        let pool = Allocator::pool(16, 8);
        let kind = with_allocator(pool.clone(), || current().kind());
        assert_eq!(kind, crate::AllocatorKind::Pool);
        assert_ne!(current(), pool);
    }

    #[test]
    fn test_tmp_arena_is_reusable() {
        let tmp = tmp();
        assert_eq!(tmp, super::tmp());
        assert_eq!(tmp.kind(), crate::AllocatorKind::Arena);

        for _ in 0..3 {
            for _ in 0..16 {
                tmp.allocate(256, 8).unwrap();
            }
            assert!(tmp.stats().used >= 16 * 256);
            unsafe { tmp.release_all() };
            assert_eq!(tmp.stats().used, 0);
            assert_eq!(tmp.stats().chunks, 0);
        }
    }

    #[test]
    fn test_contexts_are_per_thread() {
        let arena = Allocator::arena(1024);
        let _scope = scope(arena.clone());

        let other = std::thread::spawn(|| (depth(), current().kind()))
            .join()
            .unwrap();
        assert_eq!(other.0, 1);
        assert_ne!(other.1, crate::AllocatorKind::Arena);
        assert_eq!(current(), arena);
    }

    #[test]
    fn test_configure_after_first_use_is_rejected() {
        let _ = current();
        assert!(!configure(ContextConfig::default()));
    }
}
