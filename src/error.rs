use std::error::Error;
use std::fmt;

/// The error returned by [`HashTable::insert`](crate::HashTable::insert).
///
/// Both variants hand ownership of an entry back to the caller.
#[derive(Clone, PartialEq, Eq)]
pub enum InsertError<K, V> {
    /// The table already contains an entry for the key. The table is unchanged.
    Occupied {
        /// The key that was not inserted.
        key: K,
        /// The value that was not inserted.
        value: V,
    },

    /// The entry could not be placed within the maximum probe distance of its start slot.
    ///
    /// While placing an entry, inserts displace entries that sit closer to their own start
    /// slot. If the insert then runs out of room, the entry returned here is the one that
    /// was being carried at that point, which is not necessarily the one that was passed
    /// to `insert`. Either way the table no longer contains it.
    ///
    /// The table is effectively full. Retrying the same insert will fail again; a larger
    /// table is needed.
    Full {
        /// The key of the entry that could not be placed.
        key: K,
        /// The value of the entry that could not be placed.
        value: V,
    },
}

impl<K, V> InsertError<K, V> {
    /// Returns the entry that was not inserted.
    pub fn into_inner(self) -> (K, V) {
        match self {
            InsertError::Occupied { key, value } | InsertError::Full { key, value } => (key, value),
        }
    }

    /// Returns `true` if the insert failed because the table is full.
    pub fn is_full(&self) -> bool {
        matches!(self, InsertError::Full { .. })
    }
}

impl<K, V> fmt::Debug for InsertError<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertError::Occupied { .. } => f.write_str("Occupied"),
            InsertError::Full { .. } => f.write_str("Full"),
        }
    }
}

impl<K, V> fmt::Display for InsertError<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertError::Occupied { .. } => f.write_str("key already exists in the table"),
            InsertError::Full { .. } => {
                f.write_str("no free slot within the maximum probe distance, the table is full")
            }
        }
    }
}

impl<K, V> Error for InsertError<K, V> {}
