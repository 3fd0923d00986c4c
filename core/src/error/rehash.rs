//! Contains the error for the rehash(), shrink() and stretch() functions.

use std::error::Error;
use std::fmt;

/// Error from resizing a table.  Whenever one of these is returned the table still has its old
/// bucket count and contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RehashError {
    /// stretch() was called but no memory was reserved (or it was already used).
    NoStretchReserved,
    /// The new bucket count does not fit in the mounted region.
    InsufficientMemory {
        /// Buckets requested.
        buckets: u64,
        /// Buckets the region can hold.
        available: u64,
    },
    /// The new bucket count can not hold the keys already in the table.
    TooManyKeys {
        /// Keys in the table.
        keys: u64,
        /// Buckets requested.
        buckets: u64,
    },
    /// Bucket count is zero or not a multiple of the block size.
    InvalidBucketCount(u64),
    /// A key could not be placed in the new layout, the table was rolled back.
    PlacementFailed,
    /// Table was mounted read-only.
    ReadOnly,
}

impl Error for RehashError {}

impl fmt::Display for RehashError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::NoStretchReserved => write!(f, "no stretch memory reserved"),
            Self::InsufficientMemory { buckets, available } => write!(
                f,
                "insufficient memory for {} buckets ({} available)",
                buckets, available
            ),
            Self::TooManyKeys { keys, buckets } => {
                write!(f, "{} keys do not fit in {} buckets", keys, buckets)
            }
            Self::InvalidBucketCount(count) => write!(f, "invalid bucket count {}", count),
            Self::PlacementFailed => write!(f, "placement failed, table rolled back"),
            Self::ReadOnly => write!(f, "read only"),
        }
    }
}
