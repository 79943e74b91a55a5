//! Growable contiguous sequence backed by a captured allocator.
//!
//! A [`Buf`] captures [`context::current()`] when it is created and performs
//! every later growth and the final release through that allocator, whatever
//! the context says by then.
//!
//! # Examples
//!
//! ```
//! use cairn_ds::Buf;
//! use cairn_mem::{Allocator, context};
//!
//! let arena = Allocator::arena(4096);
//! let mut numbers = context::with_allocator(arena.clone(), Buf::new);
//! for i in 0..10 {
//!     numbers.push(i);
//! }
//! assert_eq!(numbers.allocator(), &arena);
//! assert_eq!(numbers[3], 3);
//! ```

use crate::raw::{RawBuf, handle_alloc_error};
use cairn_mem::{Allocator, Result, context};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::slice;

/// A growable sequence owning its elements.
pub struct Buf<T> {
    raw: RawBuf<T>,
    len: usize,
}

impl<T> Buf<T> {
    /// Creates an empty buffer capturing the current allocator.
    ///
    /// Nothing is allocated until the first push.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(context::current())
    }

    /// Creates an empty buffer using `allocator`.
    #[must_use]
    pub fn with_allocator(allocator: Allocator) -> Self {
        Buf {
            raw: RawBuf::new_in(allocator),
            len: 0,
        }
    }

    /// Creates an empty buffer with room for `capacity` elements, capturing
    /// the current allocator.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, context::current())
    }

    /// Creates an empty buffer with room for `capacity` elements.
    #[must_use]
    pub fn with_capacity_in(capacity: usize, allocator: Allocator) -> Self {
        let mut buf = Self::with_allocator(allocator);
        buf.reserve(capacity);
        buf
    }

    /// The allocator that owns this buffer's storage.
    #[must_use]
    pub fn allocator(&self) -> &Allocator {
        self.raw.allocator()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        self
    }

    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }

    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.raw.ptr()
    }

    /// Makes room for at least `additional` more elements.
    ///
    /// # Panics
    ///
    /// Panics if the allocator cannot provide the memory.
    #[track_caller]
    pub fn reserve(&mut self, additional: usize) {
        if let Err(err) = self.try_reserve(additional) {
            handle_alloc_error(err);
        }
    }

    /// Makes room for at least `additional` more elements.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error when it cannot provide the memory; the
    /// buffer is unchanged in that case.
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        let required = self.len.saturating_add(additional);
        self.raw.try_grow_to(required)
    }

    /// Makes room for exactly `additional` more elements.
    ///
    /// # Errors
    ///
    /// See [`Buf::try_reserve`].
    pub fn try_reserve_exact(&mut self, additional: usize) -> Result<()> {
        let required = self.len.saturating_add(additional);
        self.raw.try_reserve_exact(required)
    }

    /// Appends `value`.
    ///
    /// # Panics
    ///
    /// Panics if the allocator cannot provide the memory.
    #[track_caller]
    pub fn push(&mut self, value: T) {
        if let Err(err) = self.try_push(value) {
            handle_alloc_error(err);
        }
    }

    /// Appends `value`, reporting allocation failure instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error; `value` is dropped in that case.
    pub fn try_push(&mut self, value: T) -> Result<()> {
        if self.len == self.raw.capacity() {
            self.raw.try_grow_to(self.len + 1)?;
        }
        // SAFETY: len < capacity, so the slot is allocated and uninitialised.
        unsafe { self.raw.ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: The slot at the old `len - 1` is initialised and no longer
        // counted as live.
        Some(unsafe { self.raw.ptr().add(self.len).read() })
    }

    /// Inserts `value` at `index`, shifting the tail right.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    #[track_caller]
    pub fn insert(&mut self, index: usize, value: T) {
        assert!(
            index <= self.len,
            "insertion index (is {index}) should be <= len (is {})",
            self.len
        );
        self.reserve(1);
        // SAFETY: Capacity covers len + 1; the tail is shifted by one within it.
        unsafe {
            let at = self.raw.ptr().add(index);
            ptr::copy(at, at.add(1), self.len - index);
            at.write(value);
        }
        self.len += 1;
    }

    /// Removes and returns the element at `index`, shifting the tail left.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[track_caller]
    pub fn remove(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "removal index (is {index}) should be < len (is {})",
            self.len
        );
        // SAFETY: index < len; the element is read out before its slot is
        // overwritten by the shifted tail.
        unsafe {
            let at = self.raw.ptr().add(index);
            let value = at.read();
            ptr::copy(at.add(1), at, self.len - index - 1);
            self.len -= 1;
            value
        }
    }

    /// Removes the element at `index`, replacing it with the last element.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[track_caller]
    pub fn swap_remove(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "swap_remove index (is {index}) should be < len (is {})",
            self.len
        );
        let last = self.len - 1;
        self.as_mut_slice().swap(index, last);
        match self.pop() {
            Some(value) => value,
            None => unreachable!("buffer is non-empty"),
        }
    }

    /// Drops every element past `len`.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        let tail = ptr::slice_from_raw_parts_mut(
            // SAFETY: len < self.len, so the offset is in bounds.
            unsafe { self.raw.ptr().add(len) },
            self.len - len,
        );
        // Shorten first so a panicking destructor cannot cause a double drop.
        self.len = len;
        // SAFETY: The tail elements are initialised and no longer counted.
        unsafe { ptr::drop_in_place(tail) };
    }

    /// Drops every element, keeping the storage for reuse.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Keeps only the elements for which `keep` returns true, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        let len = self.len;
        // Elements are moved out one at a time; a panic in `keep` leaks the
        // unprocessed tail instead of double dropping.
        self.len = 0;
        let base = self.raw.ptr();
        let mut kept = 0;
        for i in 0..len {
            // SAFETY: i < len and every slot in 0..len is initialised and not
            // yet visited.
            unsafe {
                let item = base.add(i);
                if keep(&*item) {
                    if i != kept {
                        ptr::copy_nonoverlapping(item, base.add(kept), 1);
                    }
                    kept += 1;
                } else {
                    ptr::drop_in_place(item);
                }
            }
        }
        self.len = kept;
    }

    /// Appends every element of `items`.
    pub fn extend_from_slice(&mut self, items: &[T])
    where
        T: Clone,
    {
        self.reserve(items.len());
        for item in items {
            self.push(item.clone());
        }
    }

    /// Resizes to `new_len`, filling with clones of `value` or truncating.
    pub fn resize(&mut self, new_len: usize, value: T)
    where
        T: Clone,
    {
        if new_len <= self.len {
            self.truncate(new_len);
            return;
        }
        self.reserve(new_len - self.len);
        while self.len < new_len {
            self.push(value.clone());
        }
    }

    /// Clones this buffer into storage from `allocator`.
    #[must_use]
    pub fn clone_in(&self, allocator: Allocator) -> Self
    where
        T: Clone,
    {
        let mut copy = Self::with_capacity_in(self.len, allocator);
        copy.extend_from_slice(self);
        copy
    }
}

impl<T> Drop for Buf<T> {
    fn drop(&mut self) {
        // Storage is released by RawBuf afterwards.
        self.clear();
    }
}

impl<T> Default for Buf<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for Buf<T> {
    type Target = [T];

    #[inline(always)]
    fn deref(&self) -> &[T] {
        // SAFETY: The first `len` slots are initialised.
        unsafe { slice::from_raw_parts(self.raw.ptr(), self.len) }
    }
}

impl<T> DerefMut for Buf<T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: The first `len` slots are initialised and uniquely borrowed.
        unsafe { slice::from_raw_parts_mut(self.raw.ptr(), self.len) }
    }
}

/// Clones into storage from the *current* allocator, not the source's.
impl<T: Clone> Clone for Buf<T> {
    fn clone(&self) -> Self {
        self.clone_in(context::current())
    }
}

impl<T: fmt::Debug> fmt::Debug for Buf<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for Buf<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq> Eq for Buf<T> {}

impl<T: PartialEq> PartialEq<[T]> for Buf<T> {
    fn eq(&self, other: &[T]) -> bool {
        self.as_slice() == other
    }
}

impl<T: PartialEq, const N: usize> PartialEq<[T; N]> for Buf<T> {
    fn eq(&self, other: &[T; N]) -> bool {
        self.as_slice() == other
    }
}

impl<T: Hash> Hash for Buf<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl<T> Extend<T> for Buf<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for item in iter {
            self.push(item);
        }
    }
}

impl<T> FromIterator<T> for Buf<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut buf = Buf::new();
        buf.extend(iter);
        buf
    }
}

impl<'a, T> IntoIterator for &'a Buf<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut Buf<T> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T> IntoIterator for Buf<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        let this = std::mem::ManuallyDrop::new(self);
        IntoIter {
            // SAFETY: `this` is never dropped, so the storage moves exactly once.
            raw: unsafe { ptr::read(&this.raw) },
            front: 0,
            back: this.len,
        }
    }
}

/// Owning iterator over a [`Buf`].
pub struct IntoIter<T> {
    raw: RawBuf<T>,
    front: usize,
    back: usize,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.front == self.back {
            return None;
        }
        // SAFETY: front < back, so the slot is initialised and not yet taken.
        let item = unsafe { self.raw.ptr().add(self.front).read() };
        self.front += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl<T> DoubleEndedIterator for IntoIter<T> {
    fn next_back(&mut self) -> Option<T> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        // SAFETY: The slot at back is initialised and not yet taken.
        Some(unsafe { self.raw.ptr().add(self.back).read() })
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}
impl<T> FusedIterator for IntoIter<T> {}

impl<T> Drop for IntoIter<T> {
    fn drop(&mut self) {
        let rest = ptr::slice_from_raw_parts_mut(
            // SAFETY: front <= back <= capacity.
            unsafe { self.raw.ptr().add(self.front) },
            self.back - self.front,
        );
        // SAFETY: The remaining slots are initialised and owned by the iterator.
        unsafe { ptr::drop_in_place(rest) };
    }
}
