//! Dense (linear probing) hash table.
//!
//! Keys are never removed, a delete turns the bucket into a tombstone that still owns its key.
//! So a probe for a key can stop at the first empty bucket, and never has to look further than
//! the longest probe sequence an insert has needed (ite_count in the header).

use crate::bucket::HashBucket;
use crate::error::insert::InsertError;
use crate::error::rehash::RehashError;
use crate::error::{LoadHeaderError, MountError};
use crate::iter::memory::ClosedHashTableIterator;
use crate::table::header::{DenseHeader, TableHeader};
use crate::table::{
    buckets_for, fit_bucket_count, stretch_reserve, BucketRegion, ClosedHashTable, Lookup,
    TableEntry,
};
use crate::table_config::{TableConfig, DEFAULT_DENSE_OCCUPANCY_PCT};
use crate::table_key::TableKey;
use std::marker::PhantomData;
use tracing::{debug, error, info};

const HEADER_SIZE: usize = DenseHeader::SIZE;

/// Dense table over bucket type B stored in region S.
pub struct DenseHashTableBase<B: HashBucket, S> {
    region: S,
    header: DenseHeader,
    delete_count: u64,
    stretch_size: u64,
    read_only: bool,
    _bucket: PhantomData<B>,
}

impl<B: HashBucket, S> DenseHashTableBase<B, S> {
    /// Bytes of region needed to hold max_keys at the configured occupancy.
    pub fn table_memory_for(max_keys: u64, config: &TableConfig) -> usize {
        let occupancy_pct = config.occupancy_or(DEFAULT_DENSE_OCCUPANCY_PCT);
        let bucket_count = buckets_for(max_keys, occupancy_pct, 1);
        let mut total = bucket_count;
        if config.stretch {
            total += stretch_reserve(bucket_count, 1);
        }
        if config.special_key {
            total += 2;
        }
        HEADER_SIZE + total as usize * B::SIZE
    }

    #[inline(always)]
    fn bucket_pos(idx: u64) -> usize {
        HEADER_SIZE + idx as usize * B::SIZE
    }
}

impl<B: HashBucket, S: AsRef<[u8]>> DenseHashTableBase<B, S> {
    /// Attach to a formatted region.  The table will refuse writes.
    pub fn mount_for_read(region: S) -> Result<Self, MountError> {
        let header = DenseHeader::load(region.as_ref())?;
        let needed = header
            .image_len(B::SIZE)
            .ok_or(LoadHeaderError::InvalidLayout("image too large"))?;
        let actual = region.as_ref().len();
        if actual < needed {
            return Err(MountError::RegionTooSmall { needed, actual });
        }
        let mut table = Self {
            region,
            header,
            delete_count: 0,
            stretch_size: 0,
            read_only: true,
            _bucket: PhantomData,
        };
        table.delete_count = table.iter().filter(|e| e.deleted).count() as u64;
        Ok(table)
    }

    /// The table header.
    pub fn header(&self) -> &DenseHeader {
        &self.header
    }

    /// True if mounted with mount_for_read().
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Occupancy in percent used for capacity().
    pub fn occupancy_pct(&self) -> u8 {
        self.header.occupancy_pct
    }

    /// The underlying region.
    pub fn region(&self) -> &S {
        &self.region
    }

    /// Give back the region.
    pub fn into_region(self) -> S {
        self.region
    }

    /// Non empty buckets (valid plus deleted).
    pub fn key_count(&self) -> u64 {
        self.header.key_count
    }

    /// Tombstones.
    pub fn delete_count(&self) -> u64 {
        self.delete_count
    }

    /// Active buckets.
    pub fn bucket_count(&self) -> u64 {
        self.header.bucket_count
    }

    /// Buckets reserved for stretch(), 0 once used (or for read only tables).
    pub fn stretch_size(&self) -> u64 {
        self.stretch_size
    }

    /// Most keys the table accepts.
    pub fn capacity(&self) -> u64 {
        let capacity = self.header.bucket_count * self.header.occupancy_pct as u64 / 100;
        // One bucket always stays empty to end probe sequences.
        capacity.min(self.header.bucket_count - 1)
    }

    /// Look up key.
    pub fn find(&self, key: &B::Key) -> Lookup<B::Value> {
        if B::KEY_SENTINELS && key.is_special() {
            return Lookup::NotFound;
        }
        let mut idx = self.home(key);
        for _ in 0..self.header.ite_count {
            let bucket = self.read_bucket(idx);
            if bucket.is_empty() {
                break;
            }
            if bucket.is_equal(key) {
                return if bucket.is_deleted() {
                    Lookup::Deleted(bucket.value())
                } else {
                    Lookup::Found(bucket.value())
                };
            }
            idx = self.next(idx);
        }
        Lookup::NotFound
    }

    /// Every non empty entry in bucket order.
    pub fn entries(&self) -> Vec<TableEntry<B::Key, B::Value>> {
        self.iter().collect()
    }

    /// Iterate the non empty buckets.
    pub fn iter(&self) -> ClosedHashTableIterator<'_, B> {
        ClosedHashTableIterator::new(self.active_bytes(), self.header.bucket_count)
    }

    #[inline]
    fn home(&self, key: &B::Key) -> u64 {
        key.hash_with(0) % self.header.bucket_count
    }

    #[inline(always)]
    fn next(&self, idx: u64) -> u64 {
        if idx + 1 == self.header.bucket_count {
            0
        } else {
            idx + 1
        }
    }

    #[inline]
    fn read_bucket(&self, idx: u64) -> B {
        B::read(&self.region.as_ref()[Self::bucket_pos(idx)..])
    }

    fn active_bytes(&self) -> &[u8] {
        &self.region.as_ref()[HEADER_SIZE..Self::bucket_pos(self.header.bucket_count)]
    }

    fn region_buckets(&self) -> u64 {
        let special = if self.header.has_special_key { 2 } else { 0 };
        ((self.region.as_ref().len() - HEADER_SIZE) / B::SIZE) as u64 - special
    }

    /// Bucket holding key, or the empty bucket ending its probe sequence with the probe length.
    fn probe(&self, key: &B::Key) -> (u64, Option<B>, u64) {
        let mut idx = self.home(key);
        let mut steps = 1;
        loop {
            let bucket = self.read_bucket(idx);
            if bucket.is_empty() {
                return (idx, None, steps);
            }
            if bucket.is_equal(key) {
                return (idx, Some(bucket), steps);
            }
            idx = self.next(idx);
            steps += 1;
        }
    }
}

impl<B: HashBucket, S: AsRef<[u8]> + AsMut<[u8]>> DenseHashTableBase<B, S> {
    /// Format region as an empty table.
    pub fn mount_for_write(region: S, config: &TableConfig) -> Result<Self, MountError> {
        config.validate(DEFAULT_DENSE_OCCUPANCY_PCT)?;
        let special = if config.special_key { 2 } else { 0 };
        let actual = region.as_ref().len();
        let total = if actual > HEADER_SIZE {
            ((actual - HEADER_SIZE) / B::SIZE) as u64
        } else {
            0
        };
        let (bucket_count, stretch_size) =
            fit_bucket_count(total.saturating_sub(special), config.stretch, 1);
        if bucket_count < 2 {
            let min_buckets = if config.stretch {
                2 + stretch_reserve(2, 1)
            } else {
                2
            };
            return Err(MountError::RegionTooSmall {
                needed: Self::bucket_pos(min_buckets + special),
                actual,
            });
        }
        let header = DenseHeader {
            ite_count: 0,
            bucket_count,
            key_count: 0,
            has_special_key: config.special_key,
            occupancy_pct: config.occupancy_or(DEFAULT_DENSE_OCCUPANCY_PCT),
        };
        let mut table = Self {
            region,
            header,
            delete_count: 0,
            stretch_size,
            read_only: false,
            _bucket: PhantomData,
        };
        table.clear_buckets(0, bucket_count);
        if config.special_key {
            let start = Self::bucket_pos(bucket_count);
            let end = Self::bucket_pos(bucket_count + 2);
            table.region.as_mut()[start..end]
                .iter_mut()
                .for_each(|b| *b = 0);
        }
        table.store_header();
        debug!(bucket_count, stretch_size, "mounted dense table for write");
        Ok(table)
    }

    /// Insert or update key.
    pub fn insert(&mut self, key: B::Key, value: B::Value) -> Result<(), InsertError> {
        self.write_key(key, value, false)
    }

    /// Mark key deleted, inserting a tombstone if it is not in the table.
    pub fn delete(&mut self, key: B::Key, value: B::Value) -> Result<(), InsertError> {
        self.write_key(key, value, true)
    }

    /// Grow into the stretch reserve.  Single use.
    pub fn stretch(&mut self) -> Result<(), RehashError> {
        if self.read_only {
            return Err(RehashError::ReadOnly);
        }
        if self.stretch_size == 0 {
            return Err(RehashError::NoStretchReserved);
        }
        let new_count = self.header.bucket_count + self.stretch_size;
        self.rehash(new_count)?;
        self.stretch_size = 0;
        info!(bucket_count = new_count, "stretched dense table");
        Ok(())
    }

    /// Rebuild at the smallest bucket count holding the keys at occupancy_pct, which becomes the
    /// table occupancy.
    pub fn shrink(&mut self, occupancy_pct: u8) -> Result<(), RehashError> {
        if occupancy_pct == 0 || occupancy_pct > 100 {
            return Err(RehashError::InvalidBucketCount(0));
        }
        let new_count = buckets_for(self.header.key_count, occupancy_pct, 1)
            .max(self.header.key_count + 1);
        self.rehash(new_count)?;
        self.header.occupancy_pct = occupancy_pct;
        self.store_header();
        Ok(())
    }

    /// Rebuild with new_bucket_count buckets.  On error the table is unchanged.
    pub fn rehash(&mut self, new_bucket_count: u64) -> Result<(), RehashError> {
        if self.read_only {
            return Err(RehashError::ReadOnly);
        }
        if new_bucket_count < 2 {
            return Err(RehashError::InvalidBucketCount(new_bucket_count));
        }
        let available = self.region_buckets();
        if new_bucket_count > available {
            return Err(RehashError::InsufficientMemory {
                buckets: new_bucket_count,
                available,
            });
        }
        // Probing needs one empty bucket.
        if self.header.key_count >= new_bucket_count {
            return Err(RehashError::TooManyKeys {
                keys: self.header.key_count,
                buckets: new_bucket_count,
            });
        }
        let old_header = self.header.clone();
        let old_delete_count = self.delete_count;
        let old_count = old_header.bucket_count;
        debug!(
            from = old_count,
            to = new_bucket_count,
            keys = old_header.key_count,
            "rehash dense table"
        );
        let backup = self.active_bytes().to_vec();
        self.header.bucket_count = new_bucket_count;
        self.header.key_count = 0;
        self.header.ite_count = 0;
        self.delete_count = 0;
        self.clear_buckets(0, new_bucket_count);

        let split = old_count.min(new_bucket_count);
        for idx in (0..split).chain(split..old_count) {
            let bucket = B::read(&backup[idx as usize * B::SIZE..]);
            if bucket.is_empty() {
                continue;
            }
            let (slot, existing, steps) = self.probe(&bucket.key());
            if existing.is_some() {
                error!(
                    from = old_count,
                    to = new_bucket_count,
                    "duplicate key while rehashing, restoring table"
                );
                self.header = old_header;
                self.delete_count = old_delete_count;
                self.region.as_mut()[HEADER_SIZE..Self::bucket_pos(old_count)]
                    .copy_from_slice(&backup);
                self.store_header();
                return Err(RehashError::PlacementFailed);
            }
            self.write_bucket(slot, &bucket);
            self.header.ite_count = self.header.ite_count.max(steps);
            self.header.key_count += 1;
            if bucket.is_deleted() {
                self.delete_count += 1;
            }
        }
        self.store_header();
        Ok(())
    }

    fn write_key(&mut self, key: B::Key, value: B::Value, delete: bool) -> Result<(), InsertError> {
        if self.read_only {
            return Err(InsertError::ReadOnly);
        }
        if B::KEY_SENTINELS && key.is_special() {
            return Err(InsertError::SpecialKey);
        }
        let (idx, existing, steps) = self.probe(&key);
        let mut bucket = match existing {
            Some(bucket) => {
                if bucket.is_deleted() && !delete {
                    self.delete_count -= 1;
                } else if !bucket.is_deleted() && delete {
                    self.delete_count += 1;
                }
                bucket
            }
            None => {
                if self.header.key_count >= self.capacity() {
                    return Err(InsertError::TableFull);
                }
                self.header.key_count += 1;
                self.header.ite_count = self.header.ite_count.max(steps);
                if delete {
                    self.delete_count += 1;
                }
                B::empty()
            }
        };
        if delete {
            bucket.set_delete(key, value);
        } else {
            bucket.set(key, value);
        }
        self.write_bucket(idx, &bucket);
        self.store_header();
        Ok(())
    }

    #[inline]
    fn write_bucket(&mut self, idx: u64, bucket: &B) {
        let pos = Self::bucket_pos(idx);
        bucket.write(&mut self.region.as_mut()[pos..pos + B::SIZE]);
    }

    fn clear_buckets(&mut self, from: u64, to: u64) {
        let empty = B::empty();
        for idx in from..to {
            self.write_bucket(idx, &empty);
        }
    }

    fn store_header(&mut self) {
        self.header.store(&mut self.region.as_mut()[..HEADER_SIZE]);
    }
}

impl<B: HashBucket, S: AsRef<[u8]> + AsMut<[u8]>> ClosedHashTable for DenseHashTableBase<B, S> {
    type Key = B::Key;
    type Value = B::Value;

    fn find(&self, key: &B::Key) -> Lookup<B::Value> {
        Self::find(self, key)
    }

    fn insert(&mut self, key: B::Key, value: B::Value) -> Result<(), InsertError> {
        Self::insert(self, key, value)
    }

    fn delete(&mut self, key: B::Key, value: B::Value) -> Result<(), InsertError> {
        Self::delete(self, key, value)
    }

    fn key_count(&self) -> u64 {
        self.header.key_count
    }

    fn delete_count(&self) -> u64 {
        self.delete_count
    }

    fn bucket_count(&self) -> u64 {
        self.header.bucket_count
    }

    fn capacity(&self) -> u64 {
        Self::capacity(self)
    }

    fn stretch(&mut self) -> Result<(), RehashError> {
        Self::stretch(self)
    }

    fn shrink(&mut self, occupancy_pct: u8) -> Result<(), RehashError> {
        Self::shrink(self, occupancy_pct)
    }

    fn rehash(&mut self, new_bucket_count: u64) -> Result<(), RehashError> {
        Self::rehash(self, new_bucket_count)
    }

    fn entries(&self) -> Vec<TableEntry<B::Key, B::Value>> {
        Self::entries(self)
    }
}

impl<B: HashBucket, S: AsRef<[u8]> + AsMut<[u8]>> BucketRegion for DenseHashTableBase<B, S> {
    type Bucket = B;

    fn slot_bytes(&self, idx: u64) -> &[u8] {
        let pos = Self::bucket_pos(idx);
        &self.region.as_ref()[pos..pos + B::SIZE]
    }

    fn slot_bytes_mut(&mut self, idx: u64) -> &mut [u8] {
        let pos = Self::bucket_pos(idx);
        &mut self.region.as_mut()[pos..pos + B::SIZE]
    }

    fn has_special_slots(&self) -> bool {
        self.header.has_special_key
    }

    fn bucket_bytes(&self) -> &[u8] {
        self.active_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{DenseHashTable, SpecialKeyDenseHashTable};
    use crate::value::{OffsetValue, SentinelValue};

    type Table = DenseHashTable<u32, OffsetValue<u64>>;

    fn new_table(max_keys: u64, config: TableConfig) -> Table {
        let mem = Table::table_memory_for(max_keys, &config);
        Table::mount_for_write(vec![0_u8; mem], &config).unwrap()
    }

    #[test]
    fn test_insert_find_delete() {
        let mut table = new_table(200, TableConfig::new());
        assert!(table.capacity() >= 200);
        for key in 0..200_u32 {
            table.insert(key, OffsetValue::new(key as u64 * 10)).unwrap();
        }
        for key in (0..200_u32).step_by(2) {
            table.delete(key, OffsetValue::new(0)).unwrap();
        }
        assert_eq!(table.key_count(), 200);
        assert_eq!(table.delete_count(), 100);
        assert!(table.find(&4).is_deleted());
        assert_eq!(table.find(&5).found().map(|v| v.value()), Some(50));
        assert!(table.find(&1000).is_not_found());
        assert!(table.header().ite_count() >= 1);
        // Undelete.
        table.insert(4, OffsetValue::new(1)).unwrap();
        assert_eq!(table.delete_count(), 99);
        assert_eq!(table.find(&4).found().map(|v| v.value()), Some(1));
    }

    #[test]
    fn test_full_and_stretch() {
        let mut table = new_table(100, TableConfig::new());
        let capacity = table.capacity();
        for key in 0..capacity as u32 {
            table.insert(key, OffsetValue::new(key as u64)).unwrap();
        }
        assert_eq!(
            table.insert(capacity as u32, OffsetValue::new(0)),
            Err(InsertError::TableFull)
        );
        table.stretch().unwrap();
        assert!(table.capacity() > capacity);
        table.insert(capacity as u32, OffsetValue::new(0)).unwrap();
        for key in 0..capacity as u32 {
            assert_eq!(table.find(&key).found().map(|v| v.value()), Some(key as u64));
        }
        assert_eq!(table.stretch(), Err(RehashError::NoStretchReserved));
    }

    #[test]
    fn test_shrink_keeps_contents() {
        let mut table = new_table(500, TableConfig::new());
        for key in 0..300_u32 {
            table.insert(key, OffsetValue::new(key as u64)).unwrap();
        }
        table.delete(7, OffsetValue::new(0)).unwrap();
        table.shrink(90).unwrap();
        assert_eq!(table.bucket_count(), 334);
        assert_eq!(table.occupancy_pct(), 90);
        assert!(table.find(&7).is_deleted());
        for key in 8..300_u32 {
            assert_eq!(table.find(&key).found().map(|v| v.value()), Some(key as u64));
        }
        assert_eq!(
            table.rehash(300),
            Err(RehashError::TooManyKeys {
                keys: 300,
                buckets: 300
            })
        );
    }

    #[test]
    fn test_read_only_mount() {
        let mut table = new_table(50, TableConfig::new().no_stretch());
        for key in 0..40_u32 {
            table.insert(key, OffsetValue::new(1)).unwrap();
        }
        table.delete(3, OffsetValue::new(0)).unwrap();
        let region = table.into_region();
        let mut huge = region.clone();
        huge[8..16].copy_from_slice(&(1_u64 << 62).to_le_bytes());
        assert!(matches!(
            Table::mount_for_read(huge),
            Err(MountError::Header(LoadHeaderError::InvalidLayout(_)))
        ));
        let mut read = Table::mount_for_read(region).unwrap();
        assert_eq!(read.delete_count(), 1);
        assert_eq!(read.key_count(), 40);
        assert!(read.find(&3).is_deleted());
        assert_eq!(read.insert(100, OffsetValue::new(1)), Err(InsertError::ReadOnly));
    }

    #[test]
    fn test_special_key_buckets() {
        type KeyTable = SpecialKeyDenseHashTable<u16, u32>;
        let config = TableConfig::new().set_occupancy_pct(70);
        let mem = KeyTable::table_memory_for(1000, &config);
        let mut table = KeyTable::mount_for_write(vec![0; mem], &config).unwrap();
        for key in 0..1000_u16 {
            table.insert(key, key as u32).unwrap();
        }
        table.delete(999, 0).unwrap();
        assert!(table.find(&999).is_deleted());
        assert_eq!(table.find(&998), Lookup::Found(998));
        assert!(table.find(&1001).is_not_found());
    }

    #[test]
    fn test_sentinel_keys_rejected() {
        type KeyTable = SpecialKeyDenseHashTable<u32, u32>;
        let config = TableConfig::new();
        let mem = KeyTable::table_memory_for(10, &config);
        let mut table = KeyTable::mount_for_write(vec![0; mem], &config).unwrap();
        assert_eq!(table.insert(u32::MAX, 7), Err(InsertError::SpecialKey));
        assert_eq!(table.delete(u32::MAX - 1, 0), Err(InsertError::SpecialKey));
        assert_eq!(table.key_count(), 0);
        assert!(table.find(&u32::MAX).is_not_found());
        table.insert(1, 2).unwrap();
        assert_eq!(table.find(&1), Lookup::Found(2));

        // Value sentinel buckets store every key.
        let mut table = new_table(10, TableConfig::new());
        table.insert(u32::MAX, OffsetValue::new(3)).unwrap();
        assert_eq!(table.find(&u32::MAX).found().map(|v| v.value()), Some(3));
    }
}
