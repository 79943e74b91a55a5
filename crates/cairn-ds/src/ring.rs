//! Circular double-ended buffer.
//!
//! Shares its storage type with [`Buf`](crate::Buf). When full, the storage
//! doubles and the wrapped-around prefix is moved behind the old end, so the
//! live elements stay contiguous modulo the capacity.

use crate::raw::{RawBuf, handle_alloc_error};
use cairn_mem::{Allocator, Result, context};
use std::fmt;
use std::iter::FusedIterator;
use std::ops::{Index, IndexMut};
use std::ptr;

/// A double-ended queue over a circular buffer.
pub struct Ring<T> {
    raw: RawBuf<T>,
    head: usize,
    len: usize,
}

impl<T> Ring<T> {
    /// Creates an empty ring capturing the current allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(context::current())
    }

    /// Creates an empty ring using `allocator`.
    #[must_use]
    pub fn with_allocator(allocator: Allocator) -> Self {
        Ring {
            raw: RawBuf::new_in(allocator),
            head: 0,
            len: 0,
        }
    }

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

    /// Physical slot of logical index `i` (`i <= len`).
    #[inline(always)]
    fn slot(&self, i: usize) -> usize {
        let room = self.raw.capacity() - self.head;
        if i >= room { i - room } else { self.head + i }
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

    /// Fallible [`Ring::reserve`].
    ///
    /// # Errors
    ///
    /// Returns the allocator's error; the ring is unchanged in that case.
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        let old_cap = self.raw.capacity();
        let required = self.len.saturating_add(additional);
        if required <= old_cap {
            return Ok(());
        }
        self.raw.try_grow_to(required)?;

        // Un-wrap: move the prefix that wrapped past the old end.
        if self.head + self.len > old_cap {
            let wrapped = self.head + self.len - old_cap;
            // SAFETY: wrapped <= len <= old_cap and the capacity at least
            // doubled, so old_cap..old_cap + wrapped is allocated and unused;
            // 0..wrapped holds initialised elements.
            unsafe {
                let base = self.raw.ptr();
                ptr::copy_nonoverlapping(base, base.add(old_cap), wrapped);
            }
        }
        Ok(())
    }

    fn grow_for_one(&mut self) {
        if self.len == self.raw.capacity() {
            self.reserve(1);
        }
    }

    pub fn push_back(&mut self, value: T) {
        self.grow_for_one();
        let at = self.slot(self.len);
        // SAFETY: len < capacity, so the slot after the last element is free.
        unsafe { self.raw.ptr().add(at).write(value) };
        self.len += 1;
    }

    pub fn push_front(&mut self, value: T) {
        self.grow_for_one();
        let cap = self.raw.capacity();
        self.head = if self.head == 0 { cap - 1 } else { self.head - 1 };
        // SAFETY: len < capacity, so the slot before the head is free.
        unsafe { self.raw.ptr().add(self.head).write(value) };
        self.len += 1;
    }

    pub fn pop_back(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        let at = self.slot(self.len);
        // SAFETY: The old last element is initialised and no longer counted.
        Some(unsafe { self.raw.ptr().add(at).read() })
    }

    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let at = self.head;
        self.head = self.slot(1);
        self.len -= 1;
        // SAFETY: The old head is initialised and no longer counted.
        Some(unsafe { self.raw.ptr().add(at).read() })
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        // SAFETY: index < len, so the slot holds a live element.
        Some(unsafe { &*self.raw.ptr().add(self.slot(index)) })
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.len {
            return None;
        }
        // SAFETY: index < len, and self is uniquely borrowed.
        Some(unsafe { &mut *self.raw.ptr().add(self.slot(index)) })
    }

    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    #[must_use]
    pub fn back(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.get_mut(0)
    }

    pub fn back_mut(&mut self) -> Option<&mut T> {
        match self.len.checked_sub(1) {
            Some(i) => self.get_mut(i),
            None => None,
        }
    }

    /// Drops every element, keeping the storage.
    pub fn clear(&mut self) {
        while self.pop_back().is_some() {}
        self.head = 0;
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            ring: self,
            front: 0,
            back: self.len,
        }
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> Default for Ring<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for Ring<T> {
    type Output = T;

    #[track_caller]
    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(value) => value,
            None => panic!("ring index {index} out of bounds (len {})", self.len),
        }
    }
}

impl<T> IndexMut<usize> for Ring<T> {
    #[track_caller]
    fn index_mut(&mut self, index: usize) -> &mut T {
        let len = self.len;
        match self.get_mut(index) {
            Some(value) => value,
            None => panic!("ring index {index} out of bounds (len {len})"),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Ring<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Extend<T> for Ring<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push_back(item);
        }
    }
}

impl<T> FromIterator<T> for Ring<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut ring = Ring::new();
        ring.extend(iter);
        ring
    }
}

/// Front-to-back iterator over a [`Ring`].
pub struct Iter<'a, T> {
    ring: &'a Ring<T>,
    front: usize,
    back: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.front == self.back {
            return None;
        }
        let item = self.ring.get(self.front);
        self.front += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        self.ring.get(self.back)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a Ring<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
