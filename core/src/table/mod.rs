//! Closed hash tables mounted onto caller supplied memory.
//!
//! A table region is a header followed by bucket_count buckets, the stretch reserve and (for
//! tables with special key support) two special buckets.  Regions can be anything that derefs
//! to bytes: a Vec, a slice or a memory mapped file.

pub mod cuckoo;
pub mod dense;
pub mod header;
pub mod special_key;

pub use cuckoo::CuckooHashTableBase;
pub use dense::DenseHashTableBase;
pub use header::{CuckooHeader, DenseHeader, TableHeader, BLOCK_SIZE, MAX_BUCKET_COUNT};
pub use special_key::SpecialKeyTable;

use crate::bucket::{HashBucket, SpecialKeyBucket, SpecialValueBucket};
use crate::error::insert::InsertError;
use crate::error::rehash::RehashError;
use crate::value::TableValue;
use std::cmp::Ordering;

/// Cuckoo table whose values carry the empty/deleted state.
pub type CuckooHashTable<K, V, S = Vec<u8>> = CuckooHashTableBase<SpecialValueBucket<K, V>, S>;
/// Cuckoo table with key sentinels (value must be at least as wide as the key).
pub type SpecialKeyCuckooHashTable<K, V, S = Vec<u8>> =
    CuckooHashTableBase<SpecialKeyBucket<K, V>, S>;
/// Dense table whose values carry the empty/deleted state.
pub type DenseHashTable<K, V, S = Vec<u8>> = DenseHashTableBase<SpecialValueBucket<K, V>, S>;
/// Dense table with key sentinels.
pub type SpecialKeyDenseHashTable<K, V, S = Vec<u8>> =
    DenseHashTableBase<SpecialKeyBucket<K, V>, S>;

/// Result of a find.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Lookup<V> {
    /// Key is not in the table.
    NotFound,
    /// Key is in the table as a tombstone.
    Deleted(V),
    /// Key is in the table.
    Found(V),
}

impl<V> Lookup<V> {
    /// The value if the key was found (not deleted).
    pub fn found(self) -> Option<V> {
        match self {
            Self::Found(v) => Some(v),
            _ => None,
        }
    }

    /// True for Deleted.
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }

    /// True for NotFound.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// A key/value pair produced by the iterators.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TableEntry<K, V> {
    /// Entry key.
    pub key: K,
    /// Entry value (as stored, may be a sentinel wrapper).
    pub value: V,
    /// True for tombstones.
    pub deleted: bool,
}

impl<K: Ord, V: TableValue> TableEntry<K, V> {
    /// Order by key.
    pub fn key_cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }

    /// Order by value: deleted entries first (by timestamp then key), then valid entries by
    /// value with the key breaking ties.
    pub fn value_cmp(&self, other: &Self) -> Ordering {
        match (self.deleted, other.deleted) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (true, true) => self
                .value
                .timestamp()
                .cmp(&other.value.timestamp())
                .then_with(|| self.key.cmp(&other.key)),
            (false, false) => self
                .value
                .value_cmp(&other.value)
                .then_with(|| self.key.cmp(&other.key)),
        }
    }
}

/// Operations shared by the writable tables.  Writes and resizes take `&mut self`, callers that
/// share a table across threads wrap it in a lock.
pub trait ClosedHashTable {
    /// Key type.
    type Key;
    /// Value type as stored.
    type Value;

    /// Look up key.
    fn find(&self, key: &Self::Key) -> Lookup<Self::Value>;

    /// Insert or update key.
    fn insert(&mut self, key: Self::Key, value: Self::Value) -> Result<(), InsertError>;

    /// Turn key into a tombstone, inserting one if the key is not present.
    fn delete(&mut self, key: Self::Key, value: Self::Value) -> Result<(), InsertError>;

    /// Non empty entries (valid plus deleted).
    fn key_count(&self) -> u64;

    /// Tombstones.
    fn delete_count(&self) -> u64;

    /// Active buckets.
    fn bucket_count(&self) -> u64;

    /// Most entries the table accepts at its occupancy.
    fn capacity(&self) -> u64;

    /// True when no new key can be inserted.
    fn is_full(&self) -> bool {
        self.key_count() >= self.capacity()
    }

    /// Grow into the reserved stretch memory (single use).
    fn stretch(&mut self) -> Result<(), RehashError>;

    /// Rebuild at the smallest bucket count holding the current keys at occupancy_pct.
    fn shrink(&mut self, occupancy_pct: u8) -> Result<(), RehashError>;

    /// Rebuild with new_bucket_count buckets.  On error the table is unchanged.
    fn rehash(&mut self, new_bucket_count: u64) -> Result<(), RehashError>;

    /// Every non empty entry, in bucket order.
    fn entries(&self) -> Vec<TableEntry<Self::Key, Self::Value>>;
}

/// Access to the raw bucket area, used by the special key wrapper and the iterators.
pub trait BucketRegion {
    /// Bucket type.
    type Bucket: HashBucket;

    /// Bytes of the bucket slot at idx, idx may address the special buckets past bucket_count.
    fn slot_bytes(&self, idx: u64) -> &[u8];

    /// Mutable bytes of the bucket slot at idx.
    fn slot_bytes_mut(&mut self, idx: u64) -> &mut [u8];

    /// True if the region reserves two special buckets.
    fn has_special_slots(&self) -> bool;

    /// Bucket area (active buckets only).
    fn bucket_bytes(&self) -> &[u8];
}

/// Buckets needed for max_keys at occupancy_pct, rounded up to a multiple of round_to.
pub(crate) fn buckets_for(max_keys: u64, occupancy_pct: u8, round_to: u64) -> u64 {
    let occupancy_pct = occupancy_pct.max(1) as u64;
    let buckets = (max_keys * 100 + occupancy_pct - 1) / occupancy_pct;
    let buckets = buckets.max(1);
    (buckets + round_to - 1) / round_to * round_to
}

/// Stretch reserve for a table of bucket_count buckets: 1% plus one block.
pub(crate) fn stretch_reserve(bucket_count: u64, round_to: u64) -> u64 {
    let one_pct = (bucket_count + 99) / 100;
    (one_pct + round_to - 1) / round_to * round_to + BLOCK_SIZE.max(round_to)
}

/// Largest bucket count (multiple of round_to) that fits, with its reserve, in total buckets.
pub(crate) fn fit_bucket_count(total: u64, stretch: bool, round_to: u64) -> (u64, u64) {
    if !stretch {
        return (total / round_to * round_to, 0);
    }
    let mut bucket_count = (total * 100 / 101) / round_to * round_to;
    while bucket_count > 0 && bucket_count + stretch_reserve(bucket_count, round_to) > total {
        bucket_count -= round_to;
    }
    let stretch_size = if bucket_count == 0 {
        0
    } else {
        (total - bucket_count) / round_to * round_to
    };
    (bucket_count, stretch_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizing() {
        assert_eq!(buckets_for(1000, 80, 4), 1252);
        assert_eq!(buckets_for(800, 80, 4), 1000);
        assert_eq!(buckets_for(800, 90, 4), 892);
        assert_eq!(buckets_for(0, 80, 4), 4);
        assert_eq!(stretch_reserve(1000, 4), 16);
        let total = 1000 + stretch_reserve(1000, 4);
        assert_eq!(fit_bucket_count(total, true, 4), (1000, 16));
        assert_eq!(fit_bucket_count(1002, false, 4), (1000, 0));
        assert_eq!(fit_bucket_count(7, true, 4), (0, 0));
    }

    #[test]
    fn test_value_order() {
        let e = |key, value, deleted| TableEntry {
            key,
            value,
            deleted,
        };
        let mut entries = vec![e(5_u32, 10_u32, false), e(2, 0, true), e(7, 10, false)];
        entries.sort_by(|a, b| a.value_cmp(b));
        let keys: Vec<u32> = entries.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![2, 5, 7]);
        entries.sort_by(|a, b| a.key_cmp(b));
        let keys: Vec<u32> = entries.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![2, 5, 7]);
    }
}
