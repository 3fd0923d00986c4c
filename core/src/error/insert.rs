//! Contains the error for the insert() and delete() functions.

use std::error::Error;
use std::fmt;

/// Custom error type for Inserts (and deletes, which insert a tombstone).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    /// The table holds capacity() keys, a new key can not be added until it is resized.
    TableFull,
    /// No bucket could be freed for the key even with every allowed hash function.
    /// This is fatal for the table instance, the caller needs to stretch or rebuild it.
    NoPlacement {
        /// Hash functions in use when the search gave up.
        nu_hash_func: u8,
    },
    /// Table was mounted read-only.
    ReadOnly,
    /// The key is one of the sentinel keys the bucket uses for its state.
    SpecialKey,
}

impl Error for InsertError {}

impl fmt::Display for InsertError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::TableFull => write!(f, "table is full"),
            Self::NoPlacement { nu_hash_func } => {
                write!(f, "no bucket found with {} hash functions", nu_hash_func)
            }
            Self::ReadOnly => write!(f, "read only"),
            Self::SpecialKey => write!(f, "sentinel key needs a special key table"),
        }
    }
}
