//! Micro-benchmarks for the lock-free primitives under contention.
//!
//! Throughput isn't a correctness property these benchmarks assert on;
//! they exist to make regressions visible, the same role `benches/`
//! plays for other throughput-sensitive crates.

use concourse::mpmc::MpmcBoundedQueue;
use concourse::mpsc_stack::MpscStack;
use concourse::spinlock::RwSpinLock;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn bench_mpmc_single_threaded(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpmc_single_threaded");

    group.bench_function("enqueue_dequeue", |b| {
        let q = MpmcBoundedQueue::new(1024).unwrap();
        b.iter(|| {
            q.enqueue(black_box(1)).unwrap();
            black_box(q.dequeue().unwrap());
        });
    });

    group.finish();
}

fn bench_mpmc_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpmc_contended");
    group.sample_size(20);

    group.bench_function("4_producers_4_consumers", |b| {
        b.iter(|| {
            let q = Arc::new(MpmcBoundedQueue::new(4096).unwrap());
            let remaining = Arc::new(AtomicUsize::new(40_000));

            let producers: Vec<_> = (0..4)
                .map(|_| {
                    let q = q.clone();
                    std::thread::spawn(move || {
                        for i in 0..10_000 {
                            loop {
                                if q.enqueue(i).is_ok() {
                                    break;
                                }
                                std::thread::yield_now();
                            }
                        }
                    })
                })
                .collect();

            let consumers: Vec<_> = (0..4)
                .map(|_| {
                    let q = q.clone();
                    let remaining = remaining.clone();
                    std::thread::spawn(move || {
                        while remaining.load(Ordering::SeqCst) > 0 {
                            if q.dequeue().is_some() {
                                remaining.fetch_sub(1, Ordering::SeqCst);
                            } else {
                                std::thread::yield_now();
                            }
                        }
                    })
                })
                .collect();

            for p in producers {
                p.join().unwrap();
            }
            for c in consumers {
                c.join().unwrap();
            }
        });
    });

    group.finish();
}

fn bench_mpsc_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpsc_stack");

    group.bench_function("push_pop_single_threaded", |b| {
        let s = MpscStack::new();
        b.iter(|| {
            s.push(black_box(1));
            black_box(s.pop().unwrap());
        });
    });

    group.bench_function("8_concurrent_pushers", |b| {
        b.iter(|| {
            let s = Arc::new(MpscStack::new());
            let pushers: Vec<_> = (0..8)
                .map(|_| {
                    let s = s.clone();
                    std::thread::spawn(move || {
                        for i in 0..1000 {
                            s.push(i);
                        }
                    })
                })
                .collect();
            for p in pushers {
                p.join().unwrap();
            }
            while s.pop().is_some() {}
        });
    });

    group.finish();
}

fn bench_rwspinlock(c: &mut Criterion) {
    let mut group = c.benchmark_group("rwspinlock");

    group.bench_function("read_uncontended", |b| {
        let lock = RwSpinLock::new();
        b.iter(|| {
            lock.with_read(|| black_box(1));
        });
    });

    group.bench_function("write_uncontended", |b| {
        let lock = RwSpinLock::new();
        b.iter(|| {
            lock.with_write(|| black_box(1));
        });
    });

    group.bench_function("8_concurrent_readers", |b| {
        b.iter(|| {
            let lock = Arc::new(RwSpinLock::new());
            let readers: Vec<_> = (0..8)
                .map(|_| {
                    let lock = lock.clone();
                    std::thread::spawn(move || {
                        for _ in 0..1000 {
                            lock.with_read(|| black_box(1));
                        }
                    })
                })
                .collect();
            for r in readers {
                r.join().unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_mpmc_single_threaded,
    bench_mpmc_contended,
    bench_mpsc_stack,
    bench_rwspinlock,
);
criterion_main!(benches);
