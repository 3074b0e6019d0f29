use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Pads and aligns a value to the length of a cache line.
#[derive(Default)]
// Source: https://github.com/crossbeam-rs/crossbeam/blob/master/crossbeam-utils/src/cache_padded.rs#L63.
#[cfg_attr(
    any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "powerpc64",
    ),
    repr(align(128))
)]
#[cfg_attr(
    any(
        target_arch = "arm",
        target_arch = "mips",
        target_arch = "mips64",
        target_arch = "riscv64",
    ),
    repr(align(32))
)]
#[cfg_attr(target_arch = "s390x", repr(align(256)))]
#[cfg_attr(
    not(any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "powerpc64",
        target_arch = "arm",
        target_arch = "mips",
        target_arch = "mips64",
        target_arch = "riscv64",
        target_arch = "s390x",
    )),
    repr(align(64))
)]
pub struct CachePadded<T> {
    value: T,
}

// A sharded atomic counter.
//
// Inserts and removals touch a handful of slot locks at most. A single shared
// length counter would be the only point of contention left between them.
pub struct Counter(Box<[CachePadded<AtomicIsize>]>);

impl Default for Counter {
    fn default() -> Counter {
        // available_parallelism is quite slow (microseconds).
        static CPUS: OnceLock<usize> = OnceLock::new();
        let num_cpus = *CPUS.get_or_init(|| {
            std::thread::available_parallelism()
                .map(Into::into)
                .unwrap_or(1)
        });

        // Round up to the next power-of-two for fast modulo.
        let shards = (0..num_cpus.next_power_of_two())
            .map(|_| Default::default())
            .collect();

        Counter(shards)
    }
}

impl Counter {
    // Return the shard for the current thread.
    #[inline]
    pub fn get(&self) -> &AtomicIsize {
        &self.0[thread_id() & (self.0.len() - 1)].value
    }

    // Returns the sum of all counter shards.
    #[inline]
    pub fn sum(&self) -> usize {
        self.0
            .iter()
            .map(|x| x.value.load(Ordering::Relaxed))
            .sum::<isize>()
            .try_into()
            // Depending on the order of deletion/insertions this might be negative,
            // in which case we assume the table is empty.
            .unwrap_or(0)
    }

    // Reset every shard to zero.
    pub fn reset(&mut self) {
        for shard in self.0.iter_mut() {
            *shard.value.get_mut() = 0;
        }
    }
}

// Returns a small, sequentially allocated identifier for the current thread.
#[inline]
fn thread_id() -> usize {
    static NEXT: AtomicUsize = AtomicUsize::new(0);

    thread_local! {
        static ID: usize = NEXT.fetch_add(1, Ordering::Relaxed);
    }

    ID.with(|id| *id)
}

#[test]
fn counter() {
    let mut counter = Counter::default();

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..100 {
                    counter.get().fetch_add(1, Ordering::Relaxed);
                }
                counter.get().fetch_sub(10, Ordering::Relaxed);
            });
        }
    });

    assert_eq!(counter.sum(), 360);

    counter.reset();
    assert_eq!(counter.sum(), 0);
}
