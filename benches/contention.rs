use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, Criterion};

const SIZE: usize = 1 << 14;
const CAPACITY: usize = SIZE * 4;

// Runs `op` on every thread at once, returning the time until the slowest thread
// is done.
fn run_threads<T: Sync>(
    map: &T,
    threads: usize,
    iters: u64,
    op: impl Fn(&T, usize, usize) + Sync,
) -> Duration {
    let barrier = Barrier::new(threads + 1);

    thread::scope(|s| {
        for t in 0..threads {
            let (barrier, op) = (&barrier, &op);
            s.spawn(move || {
                barrier.wait();
                for _ in 0..iters {
                    for i in 0..SIZE {
                        op(map, t, i);
                    }
                }
                barrier.wait();
            });
        }

        barrier.wait();
        let start = Instant::now();
        barrier.wait();
        start.elapsed()
    })
}

// Every thread reads the same keys while one thread churns its own keys through
// the table.
fn read_mostly(c: &mut Criterion) {
    let threads = num_cpus::get_physical().clamp(2, 16);
    let mut group = c.benchmark_group("read_mostly");

    group.bench_function("hoodtable", |b| {
        let m = hoodtable::HashTable::<usize, usize>::with_capacity(CAPACITY);
        for i in 0..SIZE {
            m.insert(i, i).unwrap();
        }

        b.iter_custom(|iters| {
            run_threads(&m, threads, iters, |m, t, i| {
                if t == 0 {
                    let key = SIZE + i;
                    m.insert(key, key).unwrap();
                    black_box(m.remove(&key));
                } else {
                    black_box(m.get(&i));
                }
            })
        });
    });

    group.bench_function("dashmap", |b| {
        let m = dashmap::DashMap::<usize, usize>::with_capacity(CAPACITY);
        for i in 0..SIZE {
            m.insert(i, i);
        }

        b.iter_custom(|iters| {
            run_threads(&m, threads, iters, |m, t, i| {
                if t == 0 {
                    let key = SIZE + i;
                    m.insert(key, key);
                    black_box(m.remove(&key));
                } else {
                    black_box(m.get(&i).map(|v| *v));
                }
            })
        });
    });

    group.finish();
}

// Every thread inserts and removes its own keys.
fn write_heavy(c: &mut Criterion) {
    let threads = num_cpus::get_physical().clamp(2, 16);
    let mut group = c.benchmark_group("write_heavy");

    group.bench_function("hoodtable", |b| {
        let m = hoodtable::HashTable::<usize, usize>::with_capacity(CAPACITY * threads);

        b.iter_custom(|iters| {
            run_threads(&m, threads, iters, |m, t, i| {
                let key = t * SIZE + i;
                m.insert(key, key).unwrap();
                black_box(m.remove(&key));
            })
        });
    });

    group.bench_function("dashmap", |b| {
        let m = dashmap::DashMap::<usize, usize>::with_capacity(CAPACITY * threads);

        b.iter_custom(|iters| {
            run_threads(&m, threads, iters, |m, t, i| {
                let key = t * SIZE + i;
                m.insert(key, key);
                black_box(m.remove(&key));
            })
        });
    });

    group.finish();
}

criterion_group!(benches, read_mostly, write_heavy);
criterion_main!(benches);
