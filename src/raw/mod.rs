mod layout;
mod lock;
mod probe;
mod utils;

pub use self::layout::Nodes;
pub use self::probe::hash_bits;
pub use self::utils::Counter;

use std::ptr::{self, NonNull};

use self::lock::{ReadGuard, WriteGuard};
use self::probe::{Probe, MAX_DISTANCE, OVERFLOW};
use crate::cfg::trace;

// A fixed-capacity Robin Hood hash table with a reader/writer lock per slot.
//
// Entries are identified by their start slot, the cached hash bits, and a key
// comparison provided by the caller. Probing only ever moves forward, and never
// wraps around: chains that start near the end of the table run into the
// overflow slots instead. As a result every operation acquires slot locks in
// ascending index order, which rules out deadlocks between them.
//
// Operations walking a chain keep the lock on the slot behind them until the lock on
// the next slot is acquired. Entries only move between adjacent slots while both are
// locked, so a walk can never be overtaken by an entry moving in either direction.
pub struct RawTable<K, V> {
    nodes: Nodes<K, V>,
}

// The raw result of an insert operation.
pub enum InsertResult<K, V> {
    // Inserted the entry.
    Inserted,

    // An equal key is already present, the entry was not inserted.
    Occupied(K, V),

    // Ran out of probe distance while carrying the given entry.
    Full(K, V),
}

impl<K, V> RawTable<K, V> {
    // Creates a table over an initialized slot array.
    pub fn new(nodes: Nodes<K, V>) -> RawTable<K, V> {
        RawTable { nodes }
    }

    // Returns the logical capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }

    // Returns the number of slots a probe sequence may reach.
    #[inline]
    pub fn extended_capacity(&self) -> usize {
        self.nodes.capacity() + OVERFLOW
    }

    // Returns a pointer to the backing buffer.
    #[inline]
    pub fn buffer(&self) -> NonNull<u8> {
        self.nodes.buffer()
    }

    // Finds the slot holding a key, returning its index and a read lock on it.
    #[inline]
    fn find_locked(
        &self,
        start: usize,
        hash_bits: u8,
        eq: impl Fn(&K) -> bool,
    ) -> Option<(usize, ReadGuard<'_>)> {
        let mut probe = Probe::start(start);
        let mut behind = None;

        loop {
            let node = self.nodes.get(probe.i);
            let guard = ReadGuard::new(&node.lock);
            drop(behind.take());

            // Safety: We hold the read lock.
            let distance = unsafe { *node.distance.get() };

            // Robin Hood ordering guarantees the key cannot be further down the chain.
            if distance < probe.distance {
                return None;
            }

            // Safety: A non-zero distance means the slot is initialized.
            if distance == probe.distance
                && unsafe { *node.hash_bits.get() } == hash_bits
                && eq(unsafe { (*node.key.get()).assume_init_ref() })
            {
                return Some((probe.i, guard));
            }

            behind = Some(guard);
            probe.next();
        }
    }

    // Calls `f` with the entry for a key, under the slot's read lock.
    #[inline]
    pub fn get<R>(
        &self,
        start: usize,
        hash_bits: u8,
        eq: impl Fn(&K) -> bool,
        f: impl FnOnce(&K, &V) -> R,
    ) -> Option<R> {
        let (i, _guard) = self.find_locked(start, hash_bits, eq)?;
        let node = self.nodes.get(i);

        // Safety: We hold the read lock on an occupied slot.
        unsafe {
            Some(f(
                (*node.key.get()).assume_init_ref(),
                (*node.value.get()).assume_init_ref(),
            ))
        }
    }

    // Inserts an entry.
    //
    // At most two write locks are held at any time, on adjacent slots. An entry displaced
    // from its slot is carried on the stack until it is placed further down the chain.
    pub fn insert(
        &self,
        start: usize,
        hash_bits: u8,
        key: K,
        value: V,
        eq: impl Fn(&K, &K) -> bool,
    ) -> InsertResult<K, V> {
        let mut probe = Probe::start(start);
        let (mut key, mut value, mut hash_bits) = (key, value, hash_bits);

        // Whether we are still carrying the entry that was passed in. Once it has been
        // placed, the carried entries were already in the table and cannot be duplicates.
        let mut original = true;
        let mut behind = None;

        while probe.distance < MAX_DISTANCE {
            let node = self.nodes.get(probe.i);
            let guard = WriteGuard::new(&node.lock);
            drop(behind.take());

            // Safety: We hold the write lock for all accesses below.
            unsafe {
                let distance = *node.distance.get();

                // Found an empty slot, claim it.
                if distance == 0 {
                    *node.distance.get() = probe.distance;
                    *node.hash_bits.get() = hash_bits;
                    (*node.key.get()).write(key);
                    (*node.value.get()).write(value);
                    return InsertResult::Inserted;
                }

                if original
                    && distance == probe.distance
                    && *node.hash_bits.get() == hash_bits
                    && eq(&key, (*node.key.get()).assume_init_ref())
                {
                    return InsertResult::Occupied(key, value);
                }

                // The incumbent is closer to its start slot than we are to ours.
                // Take its slot and carry it further instead.
                if distance < probe.distance {
                    key = (*node.key.get()).as_mut_ptr().replace(key);
                    value = (*node.value.get()).as_mut_ptr().replace(value);
                    hash_bits = node.hash_bits.get().replace(hash_bits);
                    *node.distance.get() = probe.distance;

                    probe.distance = distance;
                    original = false;
                }
            }

            behind = Some(guard);
            probe.next();
        }

        drop(behind);

        trace!(
            "insert from slot {} ran out of probe distance at slot {}",
            start,
            probe.i
        );

        InsertResult::Full(key, value)
    }

    // Removes the entry for a key.
    //
    // The entry is located under read locks, which is then upgraded. Every entry after it
    // in the chain is shifted back by one slot while holding the locks of both the slot it
    // moves out of and the slot it moves into.
    pub fn remove(&self, start: usize, hash_bits: u8, eq: impl Fn(&K) -> bool) -> Option<(K, V)> {
        'retry: loop {
            let (mut i, guard) = self.find_locked(start, hash_bits, &eq)?;
            let guard = guard.upgrade();
            let node = self.nodes.get(i);

            if !guard.upgraded() {
                // Another thread upgraded first, our read lock was released in the meantime.
                //
                // Safety: We hold the write lock.
                let still_here = unsafe {
                    let distance = *node.distance.get();
                    distance != 0
                        && Probe::origin(i, distance) == start
                        && *node.hash_bits.get() == hash_bits
                        && eq((*node.key.get()).assume_init_ref())
                };

                if !still_here {
                    trace!("slot {} changed during upgrade, retrying removal", i);
                    continue 'retry;
                }
            }

            // Safety: We hold the write lock on an occupied slot. The slot is either
            // refilled or marked empty below.
            let removed = unsafe {
                (
                    (*node.key.get()).assume_init_read(),
                    (*node.value.get()).assume_init_read(),
                )
            };

            // The lock on the slot being refilled. This starts out as the upgraded lock on
            // the removed slot, and is then the write lock on the slot last shifted from.
            let mut upgraded = Some(guard);
            let mut held = None;

            loop {
                let current = self.nodes.get(i);

                // There is always a next slot, as the trailing dummy slot is never occupied.
                let next = self.nodes.get(i + 1);
                let next_guard = WriteGuard::new(&next.lock);

                // Safety: We hold the write locks on both slots.
                unsafe {
                    let distance = *next.distance.get();

                    // The next slot is empty or sits at its start slot, the chain ends here.
                    if distance <= 1 {
                        *current.distance.get() = 0;
                        break;
                    }

                    ptr::copy_nonoverlapping(next.key.get(), current.key.get(), 1);
                    ptr::copy_nonoverlapping(next.value.get(), current.value.get(), 1);
                    *current.hash_bits.get() = *next.hash_bits.get();
                    *current.distance.get() = distance - 1;
                }

                // Release the slot we just filled and continue from the one we moved out of.
                drop(upgraded.take());
                held = Some(next_guard);
                i += 1;
            }

            drop((upgraded, held));
            return Some(removed);
        }
    }

    // Calls `f` with the entry in slot `i`, if any, under the slot's read lock.
    #[inline]
    pub fn read_slot<R>(&self, i: usize, f: impl FnOnce(&K, &V, u8) -> R) -> Option<R> {
        let node = self.nodes.get(i);
        let _guard = ReadGuard::new(&node.lock);

        // Safety: We hold the read lock.
        unsafe {
            let distance = *node.distance.get();
            if distance == 0 {
                return None;
            }

            Some(f(
                (*node.key.get()).assume_init_ref(),
                (*node.value.get()).assume_init_ref(),
                distance,
            ))
        }
    }

    // Drops every entry and resets every slot to empty and unlocked.
    pub fn clear(&mut self) {
        trace!("clearing {} slots", self.nodes.len());

        for i in 0..self.nodes.len() {
            let node = self.nodes.get_mut(i);
            node.lock.reset();

            let distance = std::mem::replace(node.distance.get_mut(), 0);
            if distance != 0 {
                // Safety: The slot was occupied and is now marked empty.
                unsafe {
                    node.key.get_mut().assume_init_drop();
                    node.value.get_mut().assume_init_drop();
                }
            }
        }
    }
}
