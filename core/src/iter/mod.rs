//! Iterators over the non empty buckets of a table, in memory or from a dumped table file.
//!
//! Sorting never touches the table, the entries are copied out and sorted on the side.  Order
//! by key is ascending key, order by value puts tombstones first (by timestamp then key) and
//! the valid entries after them by value with the key breaking ties.

pub mod buffered;
pub mod file;
pub mod memory;

pub use buffered::ClosedHashTableBufferedFileIterator;
pub use file::ClosedHashTableFileIterator;
pub use memory::ClosedHashTableIterator;

use crate::bucket::HashBucket;
use crate::table::TableEntry;

/// Entry for a non empty bucket.
#[inline]
pub(crate) fn bucket_entry<B: HashBucket>(bucket: &B) -> TableEntry<B::Key, B::Value> {
    TableEntry {
        key: bucket.key(),
        value: bucket.value(),
        deleted: bucket.is_deleted(),
    }
}

/// Decode every non empty bucket of a bucket area.
pub(crate) fn scan_entries<B: HashBucket>(
    buckets: &[u8],
    bucket_count: u64,
) -> Vec<TableEntry<B::Key, B::Value>> {
    (0..bucket_count as usize)
        .map(|idx| B::read(&buckets[idx * B::SIZE..]))
        .filter(|bucket| !bucket.is_empty())
        .map(|bucket| bucket_entry(&bucket))
        .collect()
}

/// Sort order for the iterators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending key.
    Key,
    /// Tombstones first, then ascending value.
    Value,
}

pub(crate) fn sort_entries<B: HashBucket>(
    entries: &mut [TableEntry<B::Key, B::Value>],
    order: SortOrder,
) {
    match order {
        SortOrder::Key => entries.sort_by(|a, b| a.key_cmp(b)),
        SortOrder::Value => entries.sort_by(|a, b| a.value_cmp(b)),
    }
}
