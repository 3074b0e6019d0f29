#![doc = include_str!("../README.md")]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

mod cfg;
mod error;
mod raw;
mod table;

pub mod alloc;
pub mod hash;

#[cfg(feature = "serde")]
mod serde_impls;

pub use alloc::{AllocError, Allocator, Global};
pub use error::InsertError;
pub use hash::{Equivalent, Modulo, PowerOfTwo, TableIndex};
pub use table::{HashTable, HashTableBuilder, Iter};
