//! Benchmarks for update propagation through signals, memos and stores.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kinetic_core::{create_effect, create_memo, create_store, path, Memo, Signal};
use serde_json::{json, Value};

/// Benchmark a write at the head of a chain of memos read by one effect
fn bench_memo_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("memo_chain");

    for depth in [10_usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let head = Signal::new(0_u64);
            let h = head.clone();
            let mut tail: Memo<u64> = create_memo(move |_| h.get());
            for _ in 1..depth {
                let prev = tail.clone();
                tail = create_memo(move |_| prev.get() + 1);
            }
            let t = tail.clone();
            create_effect(move |_| black_box(t.get()));

            let mut next = 0;
            b.iter(|| {
                next += 1;
                head.set(next);
            });
        });
    }

    group.finish();
}

/// Benchmark one signal observed by many effects
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for width in [10_usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let source = Signal::new(0_u64);
            for _ in 0..width {
                let s = source.clone();
                create_effect(move |_| black_box(s.get()));
            }

            let mut next = 0;
            b.iter(|| {
                next += 1;
                source.set(next);
            });
        });
    }

    group.finish();
}

/// Benchmark toggling one field across a list of records
fn bench_store_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_toggle_all");

    for n in [10_usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let items: Vec<Value> = (0..n)
                .map(|i| json!({"task": format!("Item {i}"), "completed": false}))
                .collect();
            let (state, set_state) = create_store(json!({ "todos": items })).unwrap();

            // Subscribe to every row so the write has readers to notify
            let todos = state.at("todos").unwrap();
            for i in 0..n {
                let row = todos.at(i).unwrap();
                create_effect(move |_| black_box(row.get("completed")));
            }

            let mut done = false;
            b.iter(|| {
                done = !done;
                set_state
                    .set(path!["todos", 0..=n - 1, "completed"], done)
                    .unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_memo_chain, bench_fan_out, bench_store_updates);
criterion_main!(benches);
