//! Container behavior against real allocators.
//!
//! Each test builds containers under a specific allocator and checks both
//! the container semantics and what the allocator saw.

use cairn_ds::{Buf, Map, Ring, Str};
use cairn_mem::{Allocator, context};
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn test_concrete_scenario() {
    let mut seq = Buf::new();
    for i in 0..10 {
        seq.push(i);
    }
    for i in 0..10 {
        assert_eq!(seq[i], i);
    }

    let mut map = Map::new();
    for key in 0..10 {
        map.insert(key, key + 10);
    }
    for key in 0..10 {
        assert_eq!(map.lookup(&key), Some(&(key + 10)));
    }
    for key in (0..10).step_by(2) {
        assert!(map.remove(&key));
    }

    assert_eq!(map.len(), 5);
    assert_eq!(map.iter().count(), 5);
    assert!(map.iter().all(|(k, v)| k % 2 == 1 && *v == k + 10));
}

#[test]
fn test_push_pop_returns_to_empty() {
    let mut seq = Buf::new();
    for i in 0..100u64 {
        seq.push(i * 3);
    }
    assert!(seq.iter().copied().eq((0..100).map(|i| i * 3)));
    for i in (0..100u64).rev() {
        assert_eq!(seq.pop(), Some(i * 3));
    }
    assert!(seq.is_empty());
    assert_eq!(seq.pop(), None);
}

#[test]
fn test_map_key_uniqueness() {
    let mut map = Map::new();
    assert!(map.insert(Str::from("key"), 1));
    assert!(!map.insert(Str::from("key"), 2));
    assert_eq!(map.len(), 1);
    assert_eq!(map.lookup("key"), Some(&2));
}

#[test]
fn test_remove_keeps_probe_chains() {
    let mut map = Map::new();
    for key in 0..40u32 {
        map.insert(key, key);
    }
    assert!(map.remove(&17));
    assert_eq!(map.lookup(&17), None);
    for key in (0..40u32).filter(|&k| k != 17) {
        assert_eq!(map.lookup(&key), Some(&key));
    }
    map.insert(100, 100);
    assert_eq!(map.lookup(&100), Some(&100));
    assert_eq!(map.lookup(&39), Some(&39));
}

#[test]
fn test_containers_capture_the_current_allocator() {
    let arena = Allocator::arena(16 * 1024);
    let (mut names, mut index) = context::with_allocator(arena.clone(), || {
        (Buf::<Str>::new(), Map::<Str, usize>::new())
    });

    // Growth after the scope ended still goes to the arena.
    for i in 0..50 {
        let name = Str::from_str_in(&format!("name-{i}"), arena.clone());
        index.insert(name.clone(), i);
        names.push(name);
    }

    assert_eq!(names.allocator(), &arena);
    assert_eq!(index.allocator(), &arena);
    assert!(arena.stats().used > 0);
    assert_eq!(index.lookup("name-42"), Some(&42));
}

#[test]
fn test_ring_of_strings_under_leak_tracker() {
    let tracker = Allocator::leak_tracking(Allocator::clib());
    context::with_allocator(tracker.clone(), || {
        let mut ring = Ring::new();
        for i in 0..10 {
            ring.push_back(Str::from(format!("item {i}").as_str()));
        }
        for i in 0..10 {
            ring.push_front(Str::from(format!("front {i}").as_str()));
        }
        assert_eq!(ring.len(), 20);
        assert_eq!(ring.front().map(|s| s.as_str()), Some("front 9"));
        assert_eq!(ring.back().map(|s| s.as_str()), Some("item 9"));

        for _ in 0..5 {
            ring.pop_front();
            ring.pop_back();
        }
        assert_eq!(ring.len(), 10);
    });

    let report = tracker.leak_report().unwrap();
    assert!(report.is_clean(), "{report}");
}

#[test]
fn test_clone_uses_allocator_current_at_clone_time() {
    let first = Allocator::arena(4096);
    let second = Allocator::arena(4096);

    let original: Buf<u32> = context::with_allocator(first.clone(), || (0..8).collect());
    let copy = context::with_allocator(second.clone(), || original.clone());

    assert_eq!(original.allocator(), &first);
    assert_eq!(copy.allocator(), &second);
    assert_eq!(original, copy);

    let explicit = original.clone_in(Allocator::clib());
    assert_eq!(explicit.allocator().kind(), cairn_mem::AllocatorKind::Clib);
}

#[derive(Clone)]
struct DropCounter(Rc<Cell<usize>>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

#[test]
fn test_elements_drop_exactly_once() {
    let drops = Rc::new(Cell::new(0));
    {
        let mut buf = Buf::new();
        let mut map = Map::new();
        let mut ring = Ring::new();
        for i in 0..10 {
            buf.push(DropCounter(drops.clone()));
            map.insert(i, DropCounter(drops.clone()));
            ring.push_back(DropCounter(drops.clone()));
        }
        // Replacing and removing drop the displaced values now.
        map.insert(0, DropCounter(drops.clone()));
        map.remove(&1);
        buf.truncate(5);
        ring.pop_front();
        assert_eq!(drops.get(), 8);
    }
    assert_eq!(drops.get(), 31);
}

#[test]
#[should_panic(expected = "container allocation failed")]
fn test_push_panics_when_the_allocator_is_exhausted() {
    let stack = Allocator::stack(64);
    let mut buf = Buf::with_allocator(stack);
    for i in 0..100u64 {
        buf.push(i);
    }
}

#[test]
fn test_try_push_reports_exhaustion() {
    let stack = Allocator::stack(64);
    let mut buf = Buf::with_allocator(stack);
    let mut pushed = 0u64;
    while buf.try_push(pushed).is_ok() {
        pushed += 1;
    }
    assert_eq!(buf.len() as u64, pushed);
    assert!(pushed > 0);
}

#[test]
fn test_replacing_a_key_never_grows_a_bounded_map() {
    // Room for the 8-slot table and nothing more.
    let stack = Allocator::stack(256);
    let mut map = Map::with_allocator(stack.clone());
    for key in 0..6u32 {
        map.insert(key, key);
    }
    let capacity = map.capacity();
    let used = stack.stats().used;

    for round in 0..10u32 {
        assert!(!map.insert(round % 6, round * 100));
    }
    assert_eq!(map.replace(3, 7), Some(900));

    assert_eq!(map.capacity(), capacity);
    assert_eq!(map.len(), 6);
    assert_eq!(stack.stats().used, used);
    assert_eq!(map.lookup(&3), Some(&7));
}
