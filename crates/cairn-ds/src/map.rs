//! Open-addressing hash map over a [`Buf`] of slots.
//!
//! # Design
//!
//! - **Linear probing** over a power-of-two slot array
//! - **Tombstones**: removal marks the slot instead of emptying it, so probe
//!   chains running through it still reach keys inserted after a collision
//! - **Rehash** when `occupied + tombstones + 1` would exceed 3/4 of the
//!   slots. Tombstones are dropped by every rehash and are otherwise left to
//!   accumulate. The capacity is kept when live entries fill at most half the
//!   slots (the trigger came from tombstones) and doubled otherwise.
//!
//! Iteration visits occupied slots in storage order, unrelated to insertion
//! order.
//!
//! # Examples
//!
//! ```
//! use cairn_ds::Map;
//!
//! let mut ages = Map::new();
//! ages.insert("ada", 36);
//! ages.insert("alan", 41);
//! ages.insert("ada", 37);
//!
//! assert_eq!(ages.len(), 2);
//! assert_eq!(ages.lookup("ada"), Some(&37));
//! assert!(ages.remove("alan"));
//! assert_eq!(ages.lookup("alan"), None);
//! ```

use crate::buf::{self, Buf};
use crate::raw::handle_alloc_error;
use cairn_mem::{Allocator, Result, context};
use fxhash::FxBuildHasher;
use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::iter::FusedIterator;
use std::mem;
use std::slice;

/// Slot count of the first allocation.
const MIN_CAPACITY: usize = 8;

#[derive(Clone)]
enum Slot<K, V> {
    Empty,
    Tombstone,
    Occupied { hash: u64, key: K, value: V },
}

/// Where a probe for a key ended.
enum Probe {
    Found(usize),
    Vacant(usize),
}

/// A hash map with tombstone deletion.
pub struct Map<K, V, S = FxBuildHasher> {
    slots: Buf<Slot<K, V>>,
    len: usize,
    tombstones: usize,
    hasher: S,
}

impl<K, V> Map<K, V, FxBuildHasher> {
    /// Creates an empty map capturing the current allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hasher(FxBuildHasher::default())
    }

    /// Creates an empty map using `allocator`.
    #[must_use]
    pub fn with_allocator(allocator: Allocator) -> Self {
        Self::with_hasher_in(FxBuildHasher::default(), allocator)
    }
}

impl<K, V, S> Map<K, V, S> {
    /// Creates an empty map with a custom hasher, capturing the current
    /// allocator.
    #[must_use]
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_hasher_in(hasher, context::current())
    }

    /// Creates an empty map with a custom hasher using `allocator`.
    #[must_use]
    pub fn with_hasher_in(hasher: S, allocator: Allocator) -> Self {
        Map {
            slots: Buf::with_allocator(allocator),
            len: 0,
            tombstones: 0,
            hasher,
        }
    }

    /// The allocator that owns the slot array.
    #[must_use]
    pub fn allocator(&self) -> &Allocator {
        self.slots.allocator()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots holding a tombstone.
    #[must_use]
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// The map's hasher.
    #[must_use]
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Drops every entry and tombstone, keeping the slot array.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = Slot::Empty;
        }
        self.len = 0;
        self.tombstones = 0;
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: self.slots.iter(),
            remaining: self.len,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            slots: self.slots.iter_mut(),
            remaining: self.len,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> + '_ {
        self.iter_mut().map(|(_, v)| v)
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }
}

impl<K, V, S> Map<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn hash_of<Q: Hash + ?Sized>(&self, key: &Q) -> u64 {
        self.hasher.hash_one(key)
    }

    /// Finds the slot of `key`.
    fn find<Q>(&self, hash: u64, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        if self.slots.is_empty() {
            return None;
        }
        let mask = self.mask();
        let mut index = hash as usize & mask;
        for _ in 0..self.slots.len() {
            match &self.slots[index] {
                Slot::Empty => return None,
                Slot::Occupied { hash: h, key: k, .. }
                    if *h == hash && <K as Borrow<Q>>::borrow(k) == key =>
                {
                    return Some(index);
                }
                _ => {}
            }
            index = (index + 1) & mask;
        }
        None
    }

    /// Finds the slot of `key`, or the slot an insert of it should use (the
    /// first tombstone on the probe path, else the terminating empty slot).
    fn probe(&self, hash: u64, key: &K) -> Probe {
        let mask = self.mask();
        let mut index = hash as usize & mask;
        let mut reusable = None;
        for _ in 0..self.slots.len() {
            match &self.slots[index] {
                Slot::Empty => return Probe::Vacant(reusable.unwrap_or(index)),
                Slot::Tombstone => {
                    reusable.get_or_insert(index);
                }
                Slot::Occupied { hash: h, key: k, .. } if *h == hash && k == key => {
                    return Probe::Found(index);
                }
                Slot::Occupied { .. } => {}
            }
            index = (index + 1) & mask;
        }
        match reusable {
            Some(index) => Probe::Vacant(index),
            None => unreachable!("map probe found neither key nor free slot"),
        }
    }

    /// Makes room for `additional` more entries without exceeding the load
    /// factor.
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

    /// Fallible [`Map::reserve`].
    ///
    /// # Errors
    ///
    /// Returns the allocator's error; the map is unchanged in that case.
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self.len.saturating_add(additional);
        if !over_load(needed + self.tombstones, self.capacity()) {
            return Ok(());
        }
        let mut capacity = self.capacity().max(MIN_CAPACITY);
        while over_load(needed, capacity) {
            capacity = capacity.saturating_mul(2);
        }
        self.rehash(capacity)
    }

    /// Ensures one more entry fits, rehashing if needed.
    fn reserve_one(&mut self) -> Result<()> {
        let capacity = self.capacity();
        if !over_load(self.len + self.tombstones + 1, capacity) {
            return Ok(());
        }
        let new_capacity = if capacity == 0 {
            MIN_CAPACITY
        } else if (self.len + 1) * 2 <= capacity {
            capacity
        } else {
            capacity * 2
        };
        self.rehash(new_capacity)
    }

    /// Moves every entry into a fresh slot array of `capacity` slots,
    /// dropping tombstones.
    fn rehash(&mut self, capacity: usize) -> Result<()> {
        debug_assert!(capacity.is_power_of_two());

        let mut slots = Buf::with_allocator(self.allocator().clone());
        slots.try_reserve_exact(capacity)?;
        for _ in 0..capacity {
            slots.push(Slot::Empty);
        }

        cairn_log::trace!(
            "map rehash: {} -> {} slots, {} entries, {} tombstones dropped",
            self.capacity(),
            capacity,
            self.len,
            self.tombstones
        );

        let old = mem::replace(&mut self.slots, slots);
        self.tombstones = 0;
        let mask = capacity - 1;
        for slot in old {
            if let Slot::Occupied { hash, key, value } = slot {
                let mut index = hash as usize & mask;
                while !matches!(self.slots[index], Slot::Empty) {
                    index = (index + 1) & mask;
                }
                self.slots[index] = Slot::Occupied { hash, key, value };
            }
        }
        Ok(())
    }

    /// Probes for `key`, making room first only when it is absent and one
    /// more entry would cross the load factor.
    #[track_caller]
    fn probe_for_insert(&mut self, hash: u64, key: &K) -> Probe {
        if !self.slots.is_empty() {
            let probe = self.probe(hash, key);
            if matches!(probe, Probe::Found(_))
                || !over_load(self.len + self.tombstones + 1, self.capacity())
            {
                return probe;
            }
        }
        if let Err(err) = self.reserve_one() {
            handle_alloc_error(err);
        }
        self.probe(hash, key)
    }

    fn occupy(&mut self, index: usize, hash: u64, key: K, value: V) {
        if matches!(self.slots[index], Slot::Tombstone) {
            self.tombstones -= 1;
        }
        self.slots[index] = Slot::Occupied { hash, key, value };
        self.len += 1;
    }

    /// Inserts `key -> value`. For an existing key the old value is dropped
    /// and replaced (the stored key is kept). Returns `true` when the key was
    /// new.
    ///
    /// Replacing never allocates.
    ///
    /// # Panics
    ///
    /// Panics if the allocator cannot provide the memory for a new key.
    #[track_caller]
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let hash = self.hash_of(&key);
        match self.probe_for_insert(hash, &key) {
            Probe::Found(index) => match &mut self.slots[index] {
                // The old value is dropped before the new one is written.
                Slot::Occupied { value: old, .. } => {
                    *old = value;
                    false
                }
                _ => unreachable!("probe found a non-occupied slot"),
            },
            Probe::Vacant(index) => {
                self.occupy(index, hash, key, value);
                true
            }
        }
    }

    /// Inserts `key -> value`, returning the value it replaced.
    ///
    /// # Panics
    ///
    /// Panics if the allocator cannot provide the memory for a new key.
    #[track_caller]
    pub fn replace(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.hash_of(&key);
        match self.probe_for_insert(hash, &key) {
            Probe::Found(index) => match &mut self.slots[index] {
                Slot::Occupied { value: old, .. } => Some(mem::replace(old, value)),
                _ => unreachable!("probe found a non-occupied slot"),
            },
            Probe::Vacant(index) => {
                self.occupy(index, hash, key, value);
                None
            }
        }
    }

    #[must_use]
    pub fn lookup<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lookup_key_value(key).map(|(_, v)| v)
    }

    #[must_use]
    pub fn lookup_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.find(self.hash_of(key), key)?;
        match &self.slots[index] {
            Slot::Occupied { key, value, .. } => Some((key, value)),
            _ => None,
        }
    }

    pub fn lookup_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.find(self.hash_of(key), key)?;
        match &mut self.slots[index] {
            Slot::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(self.hash_of(key), key).is_some()
    }

    /// Removes `key`, dropping its entry. Returns whether it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.take(key).is_some()
    }

    /// Removes `key` and returns its entry.
    pub fn take<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.find(self.hash_of(key), key)?;
        let slot = mem::replace(&mut self.slots[index], Slot::Tombstone);
        self.len -= 1;
        self.tombstones += 1;
        match slot {
            Slot::Occupied { key, value, .. } => Some((key, value)),
            _ => None,
        }
    }
}

#[inline(always)]
fn over_load(entries: usize, capacity: usize) -> bool {
    entries.saturating_mul(4) > capacity.saturating_mul(3)
}

impl<K, V, S: Default> Default for Map<K, V, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

/// Clones into storage from the *current* allocator.
impl<K: Clone, V: Clone, S: Clone> Clone for Map<K, V, S> {
    fn clone(&self) -> Self {
        Map {
            slots: self.slots.clone(),
            len: self.len,
            tombstones: self.tombstones,
            hasher: self.hasher.clone(),
        }
    }
}

impl<K, V, S> PartialEq for Map<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self
                .iter()
                .all(|(k, v)| other.lookup(k).is_some_and(|o| o == v))
    }
}

impl<K: Hash + Eq, V: Eq, S: BuildHasher> Eq for Map<K, V, S> {}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for Map<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> Extend<(K, V)> for Map<K, V, S> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K: Hash + Eq, V, S: BuildHasher + Default> FromIterator<(K, V)> for Map<K, V, S> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Map::default();
        map.extend(iter);
        map
    }
}

/// Borrowing iterator over a [`Map`].
pub struct Iter<'a, K, V> {
    slots: slice::Iter<'a, Slot<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.slots.by_ref() {
            if let Slot::Occupied { key, value, .. } = slot {
                self.remaining -= 1;
                return Some((key, value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// Mutable iterator over a [`Map`].
pub struct IterMut<'a, K, V> {
    slots: slice::IterMut<'a, Slot<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.slots.by_ref() {
            if let Slot::Occupied { key, value, .. } = slot {
                self.remaining -= 1;
                return Some((&*key, value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// Owning iterator over a [`Map`].
pub struct IntoIter<K, V> {
    slots: buf::IntoIter<Slot<K, V>>,
    remaining: usize,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.slots.by_ref() {
            if let Slot::Occupied { key, value, .. } = slot {
                self.remaining -= 1;
                return Some((key, value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

impl<K, V, S> IntoIterator for Map<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            remaining: self.len,
            slots: self.slots.into_iter(),
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a Map<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut Map<K, V, S> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
