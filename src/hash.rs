//! Hashing policies.
//!
//! A key's position in the table is determined in two steps. The table's
//! [`BuildHasher`] hashes the key and the result is folded to 32 bits. A
//! [`TableIndex`] then maps that hash to the start slot of the key's probe sequence.

use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};

/// Maps a 32-bit hash to a start slot in a table of a given capacity.
pub trait TableIndex {
    /// Returns the start slot for `hash`. The result must be less than `capacity`.
    fn index(&self, hash: u32, capacity: usize) -> usize;

    /// Returns `true` if this policy can index a table of the given capacity.
    ///
    /// Tables panic on construction if this returns `false`.
    fn supports(&self, capacity: usize) -> bool {
        capacity > 0
    }
}

/// Indexes by the remainder of the hash divided by the capacity.
///
/// Any capacity is supported.
#[derive(Clone, Copy, Debug, Default)]
pub struct Modulo;

impl TableIndex for Modulo {
    #[inline]
    fn index(&self, hash: u32, capacity: usize) -> usize {
        hash as usize % capacity
    }
}

/// Indexes by masking the mixed hash with `capacity - 1`.
///
/// Only power-of-two capacities are supported.
#[derive(Clone, Copy, Debug, Default)]
pub struct PowerOfTwo;

impl TableIndex for PowerOfTwo {
    #[inline]
    fn index(&self, hash: u32, capacity: usize) -> usize {
        debug_assert!(capacity.is_power_of_two());

        // Fold the high bits into the low bits used for the mask.
        let hash = hash ^ (hash >> 16);
        hash as usize & (capacity - 1)
    }

    fn supports(&self, capacity: usize) -> bool {
        capacity.is_power_of_two()
    }
}

/// Key equivalence.
///
/// Lookups accept any `Q: Equivalent<K>`. This is implemented for every `Q: Eq` that `K`
/// borrows as, so plain `==` comparison works out of the box. Types that compare
/// against a key some other way can implement it directly.
///
/// # Examples
///
/// ```
/// use hoodtable::{Equivalent, HashTable};
/// use std::hash::{Hash, Hasher};
///
/// #[derive(Hash, PartialEq, Eq)]
/// struct Name(String);
///
/// // Looks up a `Name` by `&str`, without allocating.
/// struct ByStr<'a>(&'a str);
///
/// impl Hash for ByStr<'_> {
///     fn hash<H: Hasher>(&self, state: &mut H) {
///         self.0.hash(state)
///     }
/// }
///
/// impl Equivalent<Name> for ByStr<'_> {
///     fn equivalent(&self, key: &Name) -> bool {
///         self.0 == key.0
///     }
/// }
///
/// let table = HashTable::with_capacity(16);
/// table.insert(Name("a".to_owned()), 1).unwrap();
/// assert_eq!(table.get(&ByStr("a")), Some(1));
/// ```
pub trait Equivalent<K: ?Sized> {
    /// Returns `true` if `self` identifies `key`.
    fn equivalent(&self, key: &K) -> bool;
}

impl<Q, K> Equivalent<K> for Q
where
    Q: Eq + ?Sized,
    K: Borrow<Q> + ?Sized,
{
    #[inline]
    fn equivalent(&self, key: &K) -> bool {
        self == key.borrow()
    }
}

// Hash a key to 32 bits.
#[inline]
pub(crate) fn hash_one<Q, S>(build_hasher: &S, key: &Q) -> u32
where
    Q: Hash + ?Sized,
    S: BuildHasher,
{
    let hash = build_hasher.hash_one(key);
    (hash ^ (hash >> 32)) as u32
}
