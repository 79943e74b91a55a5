//! Allocator-aware containers for the `cairn` runtime.
//!
//! Every container captures [`cairn_mem::context::current()`] when it is
//! created (or takes an explicit [`Allocator`](cairn_mem::Allocator)) and
//! performs all of its growth and its final release through that allocator.
//!
//! - **[`Buf`]**: growable contiguous sequence
//! - **[`Map`]**: open-addressing hash map with tombstone deletion
//! - **[`Ring`]**: circular double-ended queue
//! - **[`Str`]**: UTF-8 string with split/find helpers
//! - **[`Bytes`]** and **[`MemoryStream`]**: byte codecs and streams
//! - **[`StrIntern`]**: string interning into an owned arena
//! - **[`json`]**: JSON values, parser and printer (feature `json`)
//!
//! # Examples
//!
//! ```
//! use cairn_ds::{Buf, Map};
//! use cairn_mem::{Allocator, context};
//!
//! let arena = Allocator::arena(16 * 1024);
//! let (names, index) = context::with_allocator(arena.clone(), || {
//!     let names: Buf<&str> = ["ada", "alan"].into_iter().collect();
//!     let index: Map<&str, usize> = names.iter().copied().zip(0..).collect();
//!     (names, index)
//! });
//!
//! assert_eq!(names.allocator(), &arena);
//! assert_eq!(index.lookup("alan"), Some(&1));
//! ```

pub mod buf;
pub mod bytes;
pub mod intern;
#[cfg(feature = "json")]
pub mod json;
pub mod map;
mod raw;
pub mod ring;
pub mod string;
pub mod stream;

pub use buf::Buf;
pub use bytes::Bytes;
pub use intern::{StrIntern, Symbol};
pub use map::Map;
pub use ring::Ring;
pub use string::Str;
pub use stream::MemoryStream;
