#![no_main]

use arbitrary::Arbitrary;
use hoodtable::{HashTable, InsertError, PowerOfTwo};
use libfuzzer_sys::fuzz_target;

use std::collections::hash_map::RandomState;
use std::collections::HashMap as StdHashMap;

#[derive(Debug, Arbitrary)]
enum Operation<K, V> {
    Insert(K, V),
    Remove(K),
    Get(K),
    Contains(K),
    Clear,
    Len,
    IsEmpty,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    masked: bool,
    operations: Vec<Operation<u16, u32>>,
}

// Large enough that no key set can fill a chain.
const CAPACITY: usize = 1 << 18;

fn fuzz_table(input: FuzzInput) {
    if input.masked {
        let table = HashTable::builder()
            .capacity(CAPACITY)
            .table_index(PowerOfTwo)
            .build()
            .unwrap();
        run(table, input.operations);
    } else {
        run(HashTable::with_capacity(CAPACITY | 1), input.operations);
    }
}

fn run<I>(mut table: HashTable<u16, u32, RandomState, I>, operations: Vec<Operation<u16, u32>>)
where
    I: hoodtable::TableIndex,
{
    let mut std_map = StdHashMap::new();

    for op in operations {
        match op {
            Operation::Insert(k, v) => {
                let table_result = table.insert(k, v);
                match std_map.get(&k) {
                    Some(_) => {
                        assert_eq!(table_result, Err(InsertError::Occupied { key: k, value: v }))
                    }
                    None => {
                        assert_eq!(table_result, Ok(()));
                        std_map.insert(k, v);
                    }
                }
            }
            Operation::Remove(k) => {
                assert_eq!(std_map.remove(&k), table.remove(&k));
            }
            Operation::Get(k) => {
                assert_eq!(std_map.get(&k).copied(), table.get(&k));
            }
            Operation::Contains(k) => {
                assert_eq!(std_map.contains_key(&k), table.contains_key(&k));
            }
            Operation::Clear => {
                std_map.clear();
                table.clear();
            }
            Operation::Len => {
                assert_eq!(std_map.len(), table.len());
            }
            Operation::IsEmpty => {
                assert_eq!(std_map.is_empty(), table.is_empty());
            }
        }
    }

    // Final consistency checks
    for (k, v) in std_map.iter() {
        assert_eq!(Some(*v), table.get(k));
    }
    assert_eq!(std_map.len(), table.len());
    assert_eq!(std_map.len(), table.iter().count());
}

fuzz_target!(|data: FuzzInput| {
    fuzz_table(data);
});
