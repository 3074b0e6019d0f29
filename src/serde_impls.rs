use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use std::fmt::{self, Formatter};
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use crate::{Allocator, Global, HashTable, TableIndex};

// The capacity of a deserialized table, relative to its number of entries.
const HEADROOM: usize = 2;

// The smallest capacity of a deserialized table.
const MIN_CAPACITY: usize = 16;

struct TableVisitor<K, V, S, I> {
    _marker: PhantomData<HashTable<K, V, S, I>>,
}

impl<K, V, S, I, A> Serialize for HashTable<K, V, S, I, A>
where
    K: Serialize + Clone,
    V: Serialize + Clone,
    A: Allocator,
{
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        serializer.collect_map(self.iter())
    }
}

/// Deserializes into a table with twice as many slots as entries, and at least 16.
impl<'de, K, V, S, I> Deserialize<'de> for HashTable<K, V, S, I, Global>
where
    K: Deserialize<'de> + Hash + Eq,
    V: Deserialize<'de>,
    S: Default + BuildHasher,
    I: Default + TableIndex,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(TableVisitor::new())
    }
}

impl<K, V, S, I> TableVisitor<K, V, S, I> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<'de, K, V, S, I> Visitor<'de> for TableVisitor<K, V, S, I>
where
    K: Deserialize<'de> + Hash + Eq,
    V: Deserialize<'de>,
    S: Default + BuildHasher,
    I: Default + TableIndex,
{
    type Value = HashTable<K, V, S, I>;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "a map")
    }

    fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        // The capacity is fixed, so all entries are needed up front to size the table.
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(entry) = access.next_entry::<K, V>()? {
            entries.push(entry);
        }

        let index = I::default();
        let mut capacity = (entries.len() * HEADROOM).max(MIN_CAPACITY);
        if !index.supports(capacity) {
            capacity = capacity.next_power_of_two();
        }

        let table = HashTable::builder()
            .capacity(capacity)
            .hasher(S::default())
            .table_index(index)
            .build()
            .map_err(de::Error::custom)?;

        for (key, value) in entries {
            table.insert(key, value).map_err(de::Error::custom)?;
        }

        Ok(table)
    }
}
