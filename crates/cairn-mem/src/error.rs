//! Error types for the `cairn` allocators.
//!
//! Only *resource exhaustion* is an error value. Misuse of an allocator
//! (double free, oversized pool request, unbalanced context pops) is a
//! contract violation and is reported through [`contract_violation!`]
//! instead, because continuing with corrupted allocator state is unsafe.
//!
//! [`contract_violation!`]: crate::contract_violation

use std::fmt;

/// Errors that can occur while obtaining memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The allocator cannot satisfy the request.
    OutOfMemory {
        /// The requested allocation size.
        requested: usize,
        /// The space still available in the allocator.
        available: usize,
    },

    /// Upstream refused to provide a new chunk, slab or backing buffer.
    ChunkAllocationFailed {
        /// The requested chunk size.
        size: usize,
    },

    /// Size/alignment pair that cannot describe a valid allocation.
    InvalidLayout {
        /// The requested size.
        size: usize,
        /// The requested alignment.
        align: usize,
    },

    /// The operating system refused a virtual memory reservation.
    ReservationFailed {
        /// The requested reservation size.
        size: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory {
                requested,
                available,
            } => {
                write!(
                    f,
                    "Out of memory: requested {requested} bytes, available {available} bytes"
                )
            }
            Error::ChunkAllocationFailed { size } => {
                write!(f, "Failed to allocate chunk of size {size} bytes")
            }
            Error::InvalidLayout { size, align } => {
                write!(
                    f,
                    "Invalid layout: size {size} with alignment {align}"
                )
            }
            Error::ReservationFailed { size } => {
                write!(f, "Failed to reserve {size} bytes of virtual memory")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type for allocation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reports a contract violation and aborts the offending operation.
///
/// The message is logged at `error` level through `cairn-log` and the current
/// thread panics with `contract violation: <message>`.
#[macro_export]
macro_rules! contract_violation {
    ($($arg:tt)*) => {{
        let message = ::std::format!($($arg)*);
        $crate::__log::error!("contract violation: {}", message);
        ::std::panic!("contract violation: {}", message)
    }};
}
