use crate::alloc::{AllocError, Allocator, Global};
use crate::cfg::trace;
use crate::error::InsertError;
use crate::hash::{self, Equivalent, Modulo, TableIndex};
use crate::raw::{self, Counter, InsertResult, Nodes, RawTable};

use std::alloc::Layout;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

/// A fixed-capacity concurrent hash table.
///
/// Entries are stored inline in a single buffer of slots, each guarded by its own
/// reader/writer lock, and placed using Robin Hood hashing. See the
/// [crate-level documentation](crate) for details.
pub struct HashTable<K, V, S = RandomState, I = Modulo, A: Allocator = Global> {
    raw: RawTable<K, V>,
    build_hasher: S,
    index: I,
    count: Counter,
    storage: Storage<A>,
}

// Who owns the table buffer.
enum Storage<A> {
    // Allocated by the table, returned to the allocator on drop.
    Owned { allocator: A, layout: Layout },
    // Provided by the caller, who is responsible for it.
    Borrowed,
}

// Safety: Keys and values are moved in and out of the table from any thread, and
// shared references to them are handed out under slot read locks.
unsafe impl<K: Send, V: Send, S: Send, I: Send, A: Allocator + Send> Send
    for HashTable<K, V, S, I, A>
{
}
unsafe impl<K, V, S, I, A> Sync for HashTable<K, V, S, I, A>
where
    K: Send + Sync,
    V: Send + Sync,
    S: Sync,
    I: Sync,
    A: Allocator + Sync,
{
}

/// A builder for a [`HashTable`].
///
/// # Examples
///
/// ```rust
/// use hoodtable::{Global, HashTable, PowerOfTwo};
/// use std::collections::hash_map::RandomState;
///
/// let table: HashTable<u64, String, _, _> = HashTable::builder()
///     // Set the capacity, which is fixed for the table's lifetime.
///     .capacity(1024)
///     // Set the hasher.
///     .hasher(RandomState::new())
///     // Map hashes to slots by masking.
///     .table_index(PowerOfTwo)
///     // Set the allocator for the table buffer.
///     .allocator(Global)
///     // Allocate the table.
///     .build()
///     .unwrap();
///
/// assert_eq!(table.capacity(), 1024);
/// ```
pub struct HashTableBuilder<K, V, S = RandomState, I = Modulo, A = Global> {
    capacity: usize,
    hasher: S,
    index: I,
    allocator: A,
    _kv: PhantomData<(K, V)>,
}

impl<K, V> HashTableBuilder<K, V> {
    /// Set the hash builder used to hash keys.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed to allow
    /// tables to be resistant to attacks that cause many collisions. With a fixed capacity,
    /// collisions fail inserts rather than just slowing them down. Setting it manually using
    /// this function can expose a DoS attack vector.
    pub fn hasher<S>(self, hasher: S) -> HashTableBuilder<K, V, S> {
        HashTableBuilder {
            hasher,
            capacity: self.capacity,
            index: self.index,
            allocator: self.allocator,
            _kv: PhantomData,
        }
    }
}

impl<K, V, S> HashTableBuilder<K, V, S> {
    /// Set the policy mapping hashes to start slots. See [`TableIndex`] for details.
    pub fn table_index<I>(self, index: I) -> HashTableBuilder<K, V, S, I> {
        HashTableBuilder {
            index,
            capacity: self.capacity,
            hasher: self.hasher,
            allocator: self.allocator,
            _kv: PhantomData,
        }
    }
}

impl<K, V, S, I> HashTableBuilder<K, V, S, I> {
    /// Set the allocator that provides the table buffer.
    pub fn allocator<A>(self, allocator: A) -> HashTableBuilder<K, V, S, I, A> {
        HashTableBuilder {
            allocator,
            capacity: self.capacity,
            hasher: self.hasher,
            index: self.index,
            _kv: PhantomData,
        }
    }
}

impl<K, V, S, I, A> HashTableBuilder<K, V, S, I, A>
where
    I: TableIndex,
    A: Allocator,
{
    /// Set the capacity of the table.
    ///
    /// The table never grows. Inserts start failing once entries can no longer be placed
    /// close enough to their start slots, which depends on the hash distribution. Tables
    /// should be sized with ample headroom.
    pub fn capacity(self, capacity: usize) -> Self {
        HashTableBuilder { capacity, ..self }
    }

    /// Allocate the table buffer and construct a [`HashTable`].
    ///
    /// # Panics
    ///
    /// Panics if the capacity is zero or not supported by the [`TableIndex`].
    pub fn build(self) -> Result<HashTable<K, V, S, I, A>, AllocError> {
        self.check_capacity();

        let layout = HashTable::<K, V>::buffer_layout(self.capacity);
        trace!("allocating {} bytes for {} slots", layout.size(), self.capacity);
        let buffer = self.allocator.allocate(layout)?;

        // Safety: The allocator returned a buffer of the table layout, which we now own.
        let nodes = unsafe { Nodes::init(buffer, self.capacity) };

        Ok(HashTable {
            raw: RawTable::new(nodes),
            build_hasher: self.hasher,
            index: self.index,
            count: Counter::default(),
            storage: Storage::Owned {
                allocator: self.allocator,
                layout,
            },
        })
    }

    /// Construct a [`HashTable`] in a caller-provided buffer.
    ///
    /// The buffer is never deallocated by the table, the configured allocator is unused.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is zero or not supported by the [`TableIndex`].
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for reads and writes of at least
    /// [`HashTable::memory_of`]`(capacity)` bytes, aligned to the alignment of
    /// [`HashTable::buffer_layout`]`(capacity)`, and must not be accessed by anything other
    /// than the table until the table is dropped.
    pub unsafe fn build_in(self, buffer: NonNull<u8>) -> HashTable<K, V, S, I, A> {
        self.check_capacity();

        // Safety: Guaranteed by the caller.
        let nodes = unsafe { Nodes::init(buffer, self.capacity) };

        HashTable {
            raw: RawTable::new(nodes),
            build_hasher: self.hasher,
            index: self.index,
            count: Counter::default(),
            storage: Storage::Borrowed,
        }
    }

    fn check_capacity(&self) {
        assert!(self.capacity > 0, "table capacity must be non-zero");
        assert!(
            self.index.supports(self.capacity),
            "capacity {} is not supported by the table index",
            self.capacity
        );
    }
}

impl<K, V, S, I, A> fmt::Debug for HashTableBuilder<K, V, S, I, A>
where
    I: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashTableBuilder")
            .field("capacity", &self.capacity)
            .field("table_index", &self.index)
            .finish()
    }
}

impl<K, V> HashTable<K, V> {
    /// Creates an empty `HashTable` with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Aborts on allocation failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use hoodtable::HashTable;
    /// let table: HashTable<&str, i32> = HashTable::with_capacity(64);
    /// ```
    pub fn with_capacity(capacity: usize) -> HashTable<K, V> {
        HashTable::with_capacity_and_hasher(capacity, RandomState::new())
    }

    /// Returns a builder for a `HashTable`.
    ///
    /// The builder can be used for more complex configuration, such as using a custom
    /// [`TableIndex`], allocator, or a caller-provided buffer.
    pub fn builder() -> HashTableBuilder<K, V> {
        HashTableBuilder {
            capacity: 0,
            hasher: RandomState::default(),
            index: Modulo,
            allocator: Global,
            _kv: PhantomData,
        }
    }

    /// Returns the number of bytes a buffer must provide for a table of the given capacity.
    ///
    /// This covers `capacity` slots, the overflow slots that probe sequences starting near
    /// the end of the table run into, and one trailing sentinel slot.
    pub fn memory_of(capacity: usize) -> usize {
        Nodes::<K, V>::memory_of(capacity)
    }

    /// Returns the layout a buffer must have for a table of the given capacity.
    pub fn buffer_layout(capacity: usize) -> Layout {
        Nodes::<K, V>::layout(capacity)
    }
}

impl<K, V, S> HashTable<K, V, S> {
    /// Creates an empty `HashTable` with the given capacity, using `hash_builder` to hash
    /// the keys.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Aborts on allocation failure.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> HashTable<K, V, S> {
        let builder = HashTable::builder().hasher(hash_builder).capacity(capacity);

        match builder.build() {
            Ok(table) => table,
            Err(err) => std::alloc::handle_alloc_error(err.layout()),
        }
    }
}

impl<K, V, S, I, A> HashTable<K, V, S, I, A>
where
    A: Allocator,
{
    /// Returns the capacity of the table.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Returns the number of slots probe sequences may use: the capacity plus the
    /// overflow slots following it.
    #[inline]
    pub fn extended_capacity(&self) -> usize {
        self.raw.extended_capacity()
    }

    /// Returns the number of entries in the table.
    ///
    /// With operations in flight on other threads this is an estimate.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.sum()
    }

    /// Returns `true` if the table is empty. Otherwise returns `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a reference to the table's [`BuildHasher`].
    #[inline]
    pub fn hasher(&self) -> &S {
        &self.build_hasher
    }

    /// Removes every entry from the table.
    ///
    /// The buffer is kept, every slot is marked empty and its lock reset. This requires
    /// exclusive access, so it can never run concurrently with another operation.
    pub fn clear(&mut self) {
        self.raw.clear();
        self.count.reset();
    }

    /// Returns an iterator over clones of the entries in the table, in slot order.
    ///
    /// Each slot is read-locked while its entry is cloned. Entries moved by concurrent
    /// inserts or removals may be missed or yielded twice.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            raw: &self.raw,
            i: 0,
        }
    }
}

impl<K, V, S, I, A> HashTable<K, V, S, I, A>
where
    K: Hash + Eq,
    S: BuildHasher,
    I: TableIndex,
    A: Allocator,
{
    /// Returns a clone of the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the table's key type, but [`Hash`] and
    /// [`Eq`] on the borrowed form *must* match those for the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use hoodtable::HashTable;
    ///
    /// let table = HashTable::with_capacity(16);
    /// table.insert(1, "a").unwrap();
    /// assert_eq!(table.get(&1), Some("a"));
    /// assert_eq!(table.get(&2), None);
    /// ```
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        V: Clone,
        Q: Equivalent<K> + Hash + ?Sized,
    {
        self.get_with(key, V::clone)
    }

    /// Calls `f` with a reference to the value corresponding to the key, returning its
    /// result.
    ///
    /// The slot holding the entry is read-locked while `f` runs. Writers to that slot,
    /// including inserts and removals passing through it, wait until `f` returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use hoodtable::HashTable;
    ///
    /// let table = HashTable::with_capacity(16);
    /// table.insert("a", vec![1, 2, 3]).unwrap();
    /// assert_eq!(table.get_with("a", |v| v.len()), Some(3));
    /// ```
    #[inline]
    pub fn get_with<Q, R>(&self, key: &Q, f: impl FnOnce(&V) -> R) -> Option<R>
    where
        Q: Equivalent<K> + Hash + ?Sized,
    {
        let (start, hash_bits) = self.locate(key);
        self.raw
            .get(start, hash_bits, |k| key.equivalent(k), |_, v| f(v))
    }

    /// Returns `true` if the table contains a value for the specified key.
    ///
    /// # Examples
    ///
    /// ```
    /// use hoodtable::HashTable;
    ///
    /// let table = HashTable::with_capacity(16);
    /// table.insert(1, "a").unwrap();
    /// assert!(table.contains_key(&1));
    /// assert!(!table.contains_key(&2));
    /// ```
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: Equivalent<K> + Hash + ?Sized,
    {
        self.get_with(key, |_| ()).is_some()
    }

    /// Inserts a key-value pair into the table.
    ///
    /// If the table already contains the key, [`InsertError::Occupied`] is returned along
    /// with the entry and the table is left unchanged. Existing values are never replaced.
    ///
    /// If the entry cannot be placed close enough to its start slot, [`InsertError::Full`]
    /// is returned. The table is effectively full and a larger one is needed.
    ///
    /// # Examples
    ///
    /// ```
    /// use hoodtable::{HashTable, InsertError};
    ///
    /// let table = HashTable::with_capacity(16);
    /// assert!(table.insert(37, "a").is_ok());
    ///
    /// let err = table.insert(37, "b").unwrap_err();
    /// assert!(matches!(err, InsertError::Occupied { key: 37, value: "b" }));
    /// assert_eq!(table.get(&37), Some("a"));
    /// ```
    pub fn insert(&self, key: K, value: V) -> Result<(), InsertError<K, V>> {
        let (start, hash_bits) = self.locate(&key);

        match self.raw.insert(start, hash_bits, key, value, K::eq) {
            InsertResult::Inserted => {
                self.count.get().fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            InsertResult::Occupied(key, value) => Err(InsertError::Occupied { key, value }),
            InsertResult::Full(key, value) => Err(InsertError::Full { key, value }),
        }
    }

    /// Removes a key from the table, returning the value at the key if the key was
    /// previously in the table.
    ///
    /// # Examples
    ///
    /// ```
    /// use hoodtable::HashTable;
    ///
    /// let table = HashTable::with_capacity(16);
    /// table.insert(1, "a").unwrap();
    /// assert_eq!(table.remove(&1), Some("a"));
    /// assert_eq!(table.remove(&1), None);
    /// ```
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Equivalent<K> + Hash + ?Sized,
    {
        let (start, hash_bits) = self.locate(key);
        let (_, value) = self.raw.remove(start, hash_bits, |k| key.equivalent(k))?;
        self.count.get().fetch_sub(1, Ordering::Relaxed);
        Some(value)
    }

    // Returns the start slot and hash bits of a key.
    #[inline]
    fn locate<Q>(&self, key: &Q) -> (usize, u8)
    where
        Q: Hash + ?Sized,
    {
        let hash = hash::hash_one(&self.build_hasher, key);
        let start = self.index.index(hash, self.raw.capacity());
        assert!(
            start < self.raw.capacity(),
            "table index returned slot {} for a capacity of {}",
            start,
            self.raw.capacity()
        );

        (start, raw::hash_bits(hash))
    }
}

impl<K, V, S, I, A> Drop for HashTable<K, V, S, I, A>
where
    A: Allocator,
{
    fn drop(&mut self) {
        if std::mem::needs_drop::<(K, V)>() {
            self.raw.clear();
        }

        if let Storage::Owned { allocator, layout } = &self.storage {
            // Safety: We allocated the buffer with this layout, and the table is not
            // accessed after this point.
            unsafe { allocator.deallocate(self.raw.buffer(), *layout) }
        }
    }
}

impl<K, V, S, I, A> fmt::Debug for HashTable<K, V, S, I, A>
where
    K: fmt::Debug + Clone,
    V: fmt::Debug + Clone,
    A: Allocator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// An iterator over the entries of a [`HashTable`].
///
/// This struct is created by the [`iter`](HashTable::iter) method on [`HashTable`]. See its
/// documentation for details.
pub struct Iter<'table, K, V> {
    raw: &'table RawTable<K, V>,
    i: usize,
}

impl<K, V> Iterator for Iter<'_, K, V>
where
    K: Clone,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.i < self.raw.extended_capacity() {
            let i = self.i;
            self.i += 1;

            if let Some(entry) = self.raw.read_slot(i, |k, v, _| (k.clone(), v.clone())) {
                return Some(entry);
            }
        }

        None
    }
}

impl<K, V> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("slot", &self.i).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::hash::{BuildHasherDefault, Hasher};

    // Hashes integers to themselves, so that tests control the start slots.
    #[derive(Default)]
    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, _: &[u8]) {
            unimplemented!()
        }

        fn write_u32(&mut self, n: u32) {
            self.0 = n.into();
        }
    }

    type Identity = BuildHasherDefault<IdentityHasher>;

    fn table(capacity: usize) -> HashTable<u32, &'static str, Identity> {
        HashTable::with_capacity_and_hasher(capacity, Identity::default())
    }

    // Returns the key and distance stored in a slot.
    fn slot<S, I, A: Allocator>(
        table: &HashTable<u32, &'static str, S, I, A>,
        i: usize,
    ) -> Option<(u32, u8)> {
        table.raw.read_slot(i, |k, _, distance| (*k, distance))
    }

    #[test]
    fn robin_hood_placement() {
        const A: u32 = 3;
        const B: u32 = 19;
        const C: u32 = 4;

        let table = table(16);
        table.insert(A, "a").unwrap();
        table.insert(B, "b").unwrap();
        table.insert(C, "c").unwrap();

        assert_eq!(slot(&table, 3), Some((A, 1)));
        assert_eq!(slot(&table, 4), Some((B, 2)));
        assert_eq!(slot(&table, 5), Some((C, 2)));

        assert_eq!(table.get(&B), Some("b"));
        assert_eq!(table.get(&C), Some("c"));

        assert_eq!(table.remove(&A), Some("a"));
        assert_eq!(slot(&table, 3), Some((B, 1)));
        assert_eq!(slot(&table, 4), Some((C, 1)));
        assert_eq!(slot(&table, 5), None);

        assert_eq!(table.get(&A), None);
        assert_eq!(table.get(&B), Some("b"));
        assert_eq!(table.get(&C), Some("c"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn steal_from_the_rich() {
        let table = table(16);

        // 5 sits at its start slot, 3 and 19 collide before it.
        table.insert(5, "five").unwrap();
        table.insert(3, "three").unwrap();
        table.insert(19, "nineteen").unwrap();
        assert_eq!(slot(&table, 3), Some((3, 1)));
        assert_eq!(slot(&table, 4), Some((19, 2)));
        assert_eq!(slot(&table, 5), Some((5, 1)));

        // 35 starts at 3 as well, and takes slot 5 from 5, which is pushed on to 6.
        table.insert(35, "thirty-five").unwrap();
        assert_eq!(slot(&table, 5), Some((35, 3)));
        assert_eq!(slot(&table, 6), Some((5, 2)));

        for key in [3, 5, 19, 35] {
            assert!(table.contains_key(&key));
        }
    }

    #[test]
    fn remove_before_fresh_chain() {
        let table = table(16);

        // The successor of the removed entry sits at its own start slot.
        table.insert(3, "a").unwrap();
        table.insert(4, "b").unwrap();

        assert_eq!(table.remove(&3), Some("a"));
        assert_eq!(slot(&table, 3), None);
        assert_eq!(slot(&table, 4), Some((4, 1)));
        assert_eq!(table.get(&3), None);
        assert_eq!(table.get(&4), Some("b"));

        // The vacated slot is reused by the next key starting there.
        table.insert(19, "c").unwrap();
        assert_eq!(slot(&table, 3), Some((19, 1)));
    }

    #[test]
    fn remove_before_empty_slot() {
        let table = table(16);
        table.insert(7, "a").unwrap();

        assert_eq!(table.remove(&7), Some("a"));
        assert_eq!(slot(&table, 7), None);
        assert!(table.is_empty());
    }

    #[test]
    fn remove_frees_successor_slot() {
        let table = table(16);
        table.insert(3, "a").unwrap();
        table.insert(19, "b").unwrap();
        table.insert(35, "c").unwrap();
        assert_eq!(slot(&table, 5), Some((35, 3)));

        // Removing from the middle of the chain shifts the tail back.
        assert_eq!(table.remove(&19), Some("b"));
        assert_eq!(slot(&table, 3), Some((3, 1)));
        assert_eq!(slot(&table, 4), Some((35, 2)));
        assert_eq!(slot(&table, 5), None);

        // A key starting at the freed slot lands there at distance one.
        table.insert(5, "d").unwrap();
        assert_eq!(slot(&table, 5), Some((5, 1)));
    }

    #[test]
    fn chains_run_into_overflow() {
        let table = table(16);

        // Every key starts at the last slot.
        let keys: Vec<u32> = (0..10).map(|i| 15 + i * 16).collect();
        for &key in &keys {
            table.insert(key, "x").unwrap();
        }

        assert_eq!(slot(&table, 15), Some((keys[0], 1)));
        assert_eq!(slot(&table, 24), Some((keys[9], 10)));
        assert_eq!(slot(&table, 0), None);
        assert_eq!(table.iter().count(), 10);

        for &key in &keys {
            assert_eq!(table.remove(&key), Some("x"));
        }
        assert!(table.iter().next().is_none());
    }

    #[test]
    fn full_after_max_distance() {
        let table = table(64);

        for i in 0..30 {
            table.insert(i * 64, "x").unwrap();
        }
        assert_eq!(slot(&table, 29), Some((29 * 64, 30)));

        let err = table.insert(30 * 64, "y").unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_inner(), (30 * 64, "y"));

        // Keys starting elsewhere are unaffected.
        table.insert(40, "z").unwrap();
        assert_eq!(table.len(), 31);
    }

    #[test]
    fn full_returns_displaced_entry() {
        let table = table(64);

        // A chain of 29 keys from slot 0, followed by two keys from slot 1 at
        // distances 29 and 30.
        for i in 0..29 {
            table.insert(i * 64, "a").unwrap();
        }
        table.insert(1, "b").unwrap();
        table.insert(65, "c").unwrap();
        assert_eq!(slot(&table, 29), Some((1, 29)));
        assert_eq!(slot(&table, 30), Some((65, 30)));

        // The next key from slot 0 takes slot 29 from 1, which then runs out of distance.
        let err = table.insert(29 * 64, "new").unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_inner(), (1, "b"));

        assert_eq!(slot(&table, 29), Some((29 * 64, 30)));
        assert_eq!(table.get(&(29 * 64)), Some("new"));
        assert_eq!(table.get(&65), Some("c"));
        assert!(!table.contains_key(&1));
    }

    #[test]
    fn clear_resets_slots() {
        let mut table = table(16);
        for key in [3, 19, 35, 4] {
            table.insert(key, "x").unwrap();
        }

        table.clear();
        assert!(table.is_empty());
        for i in 0..table.extended_capacity() + 1 {
            assert_eq!(slot(&table, i), None);
        }

        table.insert(3, "y").unwrap();
        assert_eq!(slot(&table, 3), Some((3, 1)));
    }

    #[test]
    fn capacities() {
        let table = table(10);
        assert_eq!(table.capacity(), 10);
        assert_eq!(table.extended_capacity(), 41);

        type T = HashTable<u32, u32>;
        assert_eq!(T::memory_of(10), T::buffer_layout(10).size());
        assert_eq!(T::memory_of(10) / 42, T::memory_of(1) / 33);
    }
}
