#![allow(dead_code)]

use hoodtable::{HashTable, Modulo, PowerOfTwo};

use std::collections::hash_map::RandomState;

// Run the test on different configurations of a `HashTable`.
//
// Tables are sized at four times the number of entries the test needs, which keeps
// probe sequences far from the maximum distance for any reasonable hash distribution.
pub fn with_table<K, V>(
    entries: usize,
    mut test: impl FnMut(&dyn Fn() -> HashTable<K, V, RandomState, Modulo>),
) {
    let capacity = (entries * 4).max(16);

    // Modulo indexing over an odd capacity.
    test(&(|| HashTable::with_capacity(capacity | 1)));

    // Modulo indexing over a power-of-two capacity.
    test(&(|| HashTable::with_capacity(capacity.next_power_of_two())));
}

// Run the test on a table using power-of-two masking.
pub fn with_masked_table<K, V>(
    entries: usize,
    mut test: impl FnMut(&dyn Fn() -> HashTable<K, V, RandomState, PowerOfTwo>),
) {
    let capacity = (entries * 4).max(16).next_power_of_two();

    test(
        &(|| {
            HashTable::builder()
                .capacity(capacity)
                .table_index(PowerOfTwo)
                .build()
                .unwrap()
        }),
    );
}

// Prints a log message if `RUST_LOG=debug` is set.
#[macro_export]
macro_rules! debug {
    ($($x:tt)*) => {
        if std::env::var("RUST_LOG").as_deref() == Ok("debug") {
            println!($($x)*);
        }
    };
}

// Returns the number of threads to use for stress testing.
pub fn threads() -> usize {
    if cfg!(miri) {
        2
    } else {
        num_cpus::get_physical().next_power_of_two().clamp(2, 16)
    }
}
