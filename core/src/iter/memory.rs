//! Iterator over a mounted table.

use crate::bucket::HashBucket;
use crate::iter::{bucket_entry, scan_entries, sort_entries, SortOrder};
use crate::table::TableEntry;

/// Walks the bucket area skipping empty buckets, then any extra entries (the special key
/// slots).  After a sort it walks the sorted copy from the start.
pub struct ClosedHashTableIterator<'a, B: HashBucket> {
    buckets: &'a [u8],
    bucket_count: u64,
    pos: u64,
    extra: Vec<TableEntry<B::Key, B::Value>>,
    extra_pos: usize,
    sorted: Option<Vec<TableEntry<B::Key, B::Value>>>,
    sorted_pos: usize,
}

impl<'a, B: HashBucket> ClosedHashTableIterator<'a, B> {
    /// Iterate bucket_count buckets in buckets.
    pub fn new(buckets: &'a [u8], bucket_count: u64) -> Self {
        Self::with_extra(buckets, bucket_count, Vec::new())
    }

    /// Iterate the buckets then extra.
    pub fn with_extra(
        buckets: &'a [u8],
        bucket_count: u64,
        extra: Vec<TableEntry<B::Key, B::Value>>,
    ) -> Self {
        Self {
            buckets,
            bucket_count,
            pos: 0,
            extra,
            extra_pos: 0,
            sorted: None,
            sorted_pos: 0,
        }
    }

    /// Restart from the first entry (keeps a sort).
    pub fn reset(&mut self) {
        self.pos = 0;
        self.extra_pos = 0;
        self.sorted_pos = 0;
    }

    /// Sort every entry by key and restart.
    pub fn sort_by_key(&mut self) {
        self.sort(SortOrder::Key);
    }

    /// Sort every entry by value and restart.
    pub fn sort_by_value(&mut self) {
        self.sort(SortOrder::Value);
    }

    fn sort(&mut self, order: SortOrder) {
        let mut entries = scan_entries::<B>(self.buckets, self.bucket_count);
        entries.extend(self.extra.iter().copied());
        sort_entries::<B>(&mut entries, order);
        self.sorted = Some(entries);
        self.reset();
    }
}

impl<'a, B: HashBucket> Iterator for ClosedHashTableIterator<'a, B> {
    type Item = TableEntry<B::Key, B::Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(sorted) = &self.sorted {
            let entry = sorted.get(self.sorted_pos).copied();
            self.sorted_pos += 1;
            return entry;
        }
        while self.pos < self.bucket_count {
            let bucket = B::read(&self.buckets[self.pos as usize * B::SIZE..]);
            self.pos += 1;
            if !bucket.is_empty() {
                return Some(bucket_entry(&bucket));
            }
        }
        let entry = self.extra.get(self.extra_pos).copied();
        self.extra_pos += 1;
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::SpecialValueBucket;
    use crate::table::{
        ClosedHashTable, CuckooHashTable, CuckooHashTableBase, SpecialKeyCuckooHashTable,
        SpecialKeyTable,
    };
    use crate::table_config::TableConfig;
    use crate::value::{SentinelValue, SpecialValue, TimestampValue};

    #[test]
    fn test_skips_empty_buckets() {
        type Table = CuckooHashTable<u32, SpecialValue<u32>>;
        let config = TableConfig::new();
        let mem = Table::table_memory_for(100, &config);
        let mut table = Table::mount_for_write(vec![0; mem], &config).unwrap();
        for key in 0..50_u32 {
            table.insert(key, SpecialValue::new(key)).unwrap();
        }
        let mut keys: Vec<u32> = table.iter().map(|e| e.key).collect();
        assert_eq!(keys.len(), 50);
        keys.sort();
        assert_eq!(keys, (0..50).collect::<Vec<u32>>());
        let mut iter = table.iter();
        iter.sort_by_key();
        let sorted: Vec<u32> = iter.by_ref().map(|e| e.key).collect();
        assert_eq!(sorted, (0..50).collect::<Vec<u32>>());
        iter.reset();
        assert_eq!(iter.next().map(|e| e.key), Some(0));
        // The table is still usable after sorting.
        assert_eq!(table.find(&49).found().map(|v| v.value()), Some(49));
    }

    #[test]
    fn test_sort_by_value_order() {
        type Table = SpecialKeyCuckooHashTable<u32, u32>;
        let config = TableConfig::new().special_key();
        let mem = Table::table_memory_for(20, &config);
        let mut table =
            SpecialKeyTable::new(Table::mount_for_write(vec![0; mem], &config).unwrap()).unwrap();
        table.insert(5, 10).unwrap();
        table.delete(2, 0).unwrap();
        table.insert(7, 10).unwrap();
        table.insert(u32::MAX, 1).unwrap();
        let mut iter = table.iter();
        iter.sort_by_value();
        let order: Vec<(u32, bool)> = iter.map(|e| (e.key, e.deleted)).collect();
        assert_eq!(
            order,
            vec![(2, true), (u32::MAX, false), (5, false), (7, false)]
        );
    }

    #[test]
    fn test_deleted_ordered_by_timestamp() {
        type Table = CuckooHashTableBase<SpecialValueBucket<u32, TimestampValue<u32>>, Vec<u8>>;
        let config = TableConfig::new();
        let mem = Table::table_memory_for(20, &config);
        let mut table = Table::mount_for_write(vec![0; mem], &config).unwrap();
        table.delete(1, TimestampValue::deleted(30)).unwrap();
        table.delete(2, TimestampValue::deleted(10)).unwrap();
        table.delete(3, TimestampValue::deleted(10)).unwrap();
        table.insert(4, TimestampValue::new(1, 0)).unwrap();
        let mut iter = table.iter();
        iter.sort_by_value();
        let keys: Vec<u32> = iter.map(|e| e.key).collect();
        assert_eq!(keys, vec![2, 3, 1, 4]);
    }
}
