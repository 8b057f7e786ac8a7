use consul_uid::{Allocator, AllocatorConfig, Backoff, MemoryCoordinator, ThreadYield};
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::{Duration, Instant},
};

// Number of clients allocated per benchmark iteration (per-thread for
// multi-threaded).
const TOTAL_CLIENTS: usize = 256;

/// Benchmarks the lookup path: the client already has an id, so `get` is a
/// single record read.
fn bench_assigned(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory/assigned");
    group.throughput(Throughput::Elements(TOTAL_CLIENTS as u64));

    let store = MemoryCoordinator::new();
    let allocator = Allocator::new(&store, AllocatorConfig::new("bench").with_client_id("cat"))
        .expect("valid config");
    allocator.get().expect("first allocation");

    group.bench_function(format!("elems/{TOTAL_CLIENTS}"), |b| {
        b.iter(|| {
            for _ in 0..TOTAL_CLIENTS {
                black_box(allocator.get().expect("assigned"));
            }
        });
    });

    group.finish();
}

/// Benchmarks the full locked protocol: every `get` is a fresh client.
fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory/allocate");
    group.throughput(Throughput::Elements(TOTAL_CLIENTS as u64));

    group.bench_function(format!("elems/{TOTAL_CLIENTS}"), |b| {
        b.iter_custom(|iters| {
            let mut elapsed = Duration::ZERO;
            for _ in 0..iters {
                let store = MemoryCoordinator::new();
                let start = Instant::now();
                for i in 0..TOTAL_CLIENTS {
                    let allocator = Allocator::new(
                        &store,
                        AllocatorConfig::new("bench").with_client_id(format!("client-{i}")),
                    )
                    .expect("valid config");
                    black_box(allocator.get().expect("uncontended allocation"));
                }
                elapsed += start.elapsed();
            }
            elapsed
        });
    });

    group.finish();
}

/// Allocates `TOTAL_CLIENTS` fresh clients, retrying the lock for as long as
/// it takes.
fn allocate_all(store: &MemoryCoordinator, thread: usize) {
    for i in 0..TOTAL_CLIENTS {
        let config = AllocatorConfig::new("bench")
            .with_client_id(format!("client-{thread}-{i}"))
            .with_max_attempts(u32::MAX)
            .with_backoff(Backoff::Fixed(Duration::from_micros(1)));
        let allocator = Allocator::with_sleep(store, config, ThreadYield).expect("valid config");
        black_box(allocator.get().expect("contended allocation"));
    }
}

/// Benchmarks allocation with several threads racing for the lock key.
fn bench_allocate_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory/allocate_contended");

    for thread_count in [2, 4, 8] {
        group.throughput(Throughput::Elements((TOTAL_CLIENTS * thread_count) as u64));
        group.bench_function(
            format!("elems/{TOTAL_CLIENTS}/threads/{thread_count}"),
            |b| {
                b.iter_custom(|iters| {
                    let mut elapsed = Duration::ZERO;
                    for _ in 0..iters {
                        let store = MemoryCoordinator::new();
                        let barrier = Arc::new(Barrier::new(thread_count + 1));
                        let start = scope(|s| {
                            for t in 0..thread_count {
                                let store = &store;
                                let barrier = Arc::clone(&barrier);
                                s.spawn(move || {
                                    barrier.wait();
                                    allocate_all(store, t);
                                });
                            }
                            barrier.wait();
                            Instant::now()
                        });
                        elapsed += start.elapsed();
                    }
                    elapsed
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_assigned,
    bench_allocate,
    bench_allocate_contended
);
criterion_main!(benches);
