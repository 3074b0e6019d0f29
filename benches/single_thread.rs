use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

const SIZE: usize = 10_000;

// Tables are sized with headroom, as a full fixed-capacity table fails inserts.
const CAPACITY: usize = SIZE * 4;

#[derive(Clone, Copy)]
struct RandomKeys {
    state: usize,
}

impl RandomKeys {
    fn new() -> Self {
        RandomKeys { state: 0 }
    }
}

impl Iterator for RandomKeys {
    type Item = usize;
    fn next(&mut self) -> Option<usize> {
        // Add 1 then multiply by some 32 bit prime.
        self.state = self.state.wrapping_add(1).wrapping_mul(3_787_392_781);
        Some(self.state)
    }
}

fn read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    group.bench_function("hoodtable", |b| {
        let m = hoodtable::HashTable::<usize, usize>::with_capacity(CAPACITY);
        for i in RandomKeys::new().take(SIZE) {
            m.insert(i, i).unwrap();
        }

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                black_box(assert_eq!(m.get(&i), Some(i)));
            }
        });
    });

    group.bench_function("hoodtable-masked", |b| {
        let m = hoodtable::HashTable::<usize, usize>::builder()
            .capacity(CAPACITY.next_power_of_two())
            .table_index(hoodtable::PowerOfTwo)
            .build()
            .unwrap();
        for i in RandomKeys::new().take(SIZE) {
            m.insert(i, i).unwrap();
        }

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                black_box(assert_eq!(m.get(&i), Some(i)));
            }
        });
    });

    group.bench_function("std", |b| {
        let mut m = HashMap::<usize, usize>::with_capacity(CAPACITY);
        for i in RandomKeys::new().take(SIZE) {
            m.insert(i, i);
        }

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                black_box(assert_eq!(m.get(&i), Some(&i)));
            }
        });
    });

    group.bench_function("dashmap", |b| {
        let m = dashmap::DashMap::<usize, usize>::with_capacity(CAPACITY);
        for i in RandomKeys::new().take(SIZE) {
            m.insert(i, i);
        }

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                black_box(assert_eq!(*m.get(&i).unwrap(), i));
            }
        });
    });

    group.finish();
}

fn insert_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_remove");

    group.bench_function("hoodtable", |b| {
        let m = hoodtable::HashTable::<usize, usize>::with_capacity(CAPACITY);

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                m.insert(i, i).unwrap();
            }
            for i in RandomKeys::new().take(SIZE) {
                black_box(m.remove(&i));
            }
        });
    });

    group.bench_function("std", |b| {
        let mut m = HashMap::<usize, usize>::with_capacity(CAPACITY);

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                m.insert(i, i);
            }
            for i in RandomKeys::new().take(SIZE) {
                black_box(m.remove(&i));
            }
        });
    });

    group.bench_function("dashmap", |b| {
        let m = dashmap::DashMap::<usize, usize>::with_capacity(CAPACITY);

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                m.insert(i, i);
            }
            for i in RandomKeys::new().take(SIZE) {
                black_box(m.remove(&i));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, read, insert_remove);
criterion_main!(benches);
