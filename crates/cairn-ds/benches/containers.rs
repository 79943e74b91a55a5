//! Container performance benchmarks.
//!
//! Measures:
//! - `Buf` push throughput per allocator strategy
//! - `Map` insert/lookup with the default Fx hasher against aHash and the
//!   standard library map
//! - String interning of new and duplicate strings
//! - JSON parsing of a small document

use ahash::RandomState;
use cairn_ds::{Buf, Map, StrIntern, json};
use cairn_mem::{Allocator, context};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::collections::HashMap;

fn bench_buf_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("buf_push");

    for size in [100usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("clib", size), &size, |b, &size| {
            b.iter(|| {
                let mut buf = Buf::with_allocator(Allocator::clib());
                for i in 0..size {
                    buf.push(black_box(i));
                }
                buf
            });
        });

        group.bench_with_input(BenchmarkId::new("arena", size), &size, |b, &size| {
            let arena = Allocator::arena(1024 * 1024);
            b.iter(|| {
                {
                    let mut buf = Buf::with_allocator(arena.clone());
                    for i in 0..size {
                        buf.push(black_box(i));
                    }
                }
                // SAFETY: The buffer above was dropped.
                unsafe { arena.release_all() };
            });
        });
    }

    group.finish();
}

fn bench_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_insert_lookup");
    let keys: Vec<String> = (0..1_000).map(|i| format!("identifier_{i}")).collect();

    group.bench_function("cairn_fx", |b| {
        b.iter(|| {
            let mut map = Map::new();
            for (i, key) in keys.iter().enumerate() {
                map.insert(key.as_str(), i);
            }
            for key in &keys {
                black_box(map.lookup(key.as_str()));
            }
        });
    });

    group.bench_function("cairn_ahash", |b| {
        b.iter(|| {
            let mut map = Map::with_hasher(RandomState::new());
            for (i, key) in keys.iter().enumerate() {
                map.insert(key.as_str(), i);
            }
            for key in &keys {
                black_box(map.lookup(key.as_str()));
            }
        });
    });

    group.bench_function("std_hashmap", |b| {
        b.iter(|| {
            let mut map = HashMap::new();
            for (i, key) in keys.iter().enumerate() {
                map.insert(key.as_str(), i);
            }
            for key in &keys {
                black_box(map.get(key.as_str()));
            }
        });
    });

    group.finish();
}

fn bench_map_churn(c: &mut Criterion) {
    c.bench_function("map_insert_remove_churn", |b| {
        b.iter(|| {
            let mut map = Map::new();
            for i in 0..10_000u32 {
                map.insert(i, i);
                if i >= 64 {
                    map.remove(&(i - 64));
                }
            }
            black_box(map.tombstones())
        });
    });
}

fn bench_intern(c: &mut Criterion) {
    let strings: Vec<String> = (0..1_000).map(|i| format!("identifier_{i}")).collect();

    c.bench_function("intern_new_then_duplicates", |b| {
        b.iter(|| {
            let mut interner = StrIntern::new();
            for s in &strings {
                interner.intern(s);
            }
            for s in &strings {
                black_box(interner.intern(s));
            }
        });
    });
}

fn bench_json_parse(c: &mut Criterion) {
    let doc = r#"{"name":"cairn","tags":["mem","ds","json"],"nested":{"depth":3,"ok":true,"ratio":0.5}}"#;
    let arena = Allocator::arena(64 * 1024);

    c.bench_function("json_parse_in_arena", |b| {
        b.iter(|| {
            context::with_allocator(arena.clone(), || {
                black_box(json::parse(black_box(doc)).ok());
            });
            // SAFETY: The parsed value was dropped inside the closure.
            unsafe { arena.release_all() };
        });
    });
}

criterion_group!(
    benches,
    bench_buf_push,
    bench_map,
    bench_map_churn,
    bench_intern,
    bench_json_parse
);
criterion_main!(benches);
