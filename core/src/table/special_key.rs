//! Support for the two sentinel keys on top of a dense or cuckoo table.
//!
//! The base table must be mounted with TableConfig::special_key() so two bucket slots follow its
//! active buckets.  Slot 0 holds EMPTY_KEY, slot 1 DELETE_KEY.  A slot stores a state tag in its
//! first byte (0 empty, 1 valid, 2 deleted) and the value at the bucket's value offset.  The
//! slots move with bucket_count so resizes save and restore them.

use crate::bucket::HashBucket;
use crate::error::insert::InsertError;
use crate::error::rehash::RehashError;
use crate::error::MountError;
use crate::iter::ClosedHashTableIterator;
use crate::table::{BucketRegion, ClosedHashTable, Lookup, TableEntry};
use crate::table_bytes::FixedBytes;
use crate::table_key::TableKey;

const TAG_EMPTY: u8 = 0;
const TAG_VALID: u8 = 1;
const TAG_DELETED: u8 = 2;

/// Decode special slot which (0 or 1) from its bytes.
pub(crate) fn read_special_slot<B: HashBucket>(
    slot: &[u8],
    which: u64,
) -> Option<TableEntry<B::Key, B::Value>> {
    let deleted = match slot[0] {
        TAG_VALID => false,
        TAG_DELETED => true,
        TAG_EMPTY => return None,
        tag => {
            tracing::warn!(tag, which, "unknown special slot tag, treating as empty");
            return None;
        }
    };
    let key = if which == 0 {
        B::Key::EMPTY_KEY
    } else {
        B::Key::DELETE_KEY
    };
    Some(TableEntry {
        key,
        value: B::Value::read_le(&slot[B::VALUE_OFFSET..]),
        deleted,
    })
}

/// Table accepting every key value, the sentinel keys are routed to the special slots.
pub struct SpecialKeyTable<T> {
    table: T,
}

impl<T, B> SpecialKeyTable<T>
where
    B: HashBucket,
    T: ClosedHashTable<Key = B::Key, Value = B::Value> + BucketRegion<Bucket = B>,
{
    /// Wrap table, which must have been mounted with special key slots.
    pub fn new(table: T) -> Result<Self, MountError> {
        if !table.has_special_slots() {
            return Err(MountError::InvalidConfig(
                "table was not mounted with special key slots",
            ));
        }
        Ok(Self { table })
    }

    /// The base table.
    pub fn inner(&self) -> &T {
        &self.table
    }

    /// Unwrap the base table.
    pub fn into_inner(self) -> T {
        self.table
    }

    fn special_index(key: &B::Key) -> Option<u64> {
        if *key == B::Key::EMPTY_KEY {
            Some(0)
        } else if *key == B::Key::DELETE_KEY {
            Some(1)
        } else {
            None
        }
    }

    fn slot(&self, which: u64) -> Option<TableEntry<B::Key, B::Value>> {
        read_special_slot::<B>(
            self.table.slot_bytes(self.table.bucket_count() + which),
            which,
        )
    }

    fn write_slot(&mut self, which: u64, tag: u8, value: &B::Value) {
        let idx = self.table.bucket_count() + which;
        let slot = self.table.slot_bytes_mut(idx);
        slot.iter_mut().for_each(|b| *b = 0);
        slot[0] = tag;
        value.write_le(&mut slot[B::VALUE_OFFSET..]);
    }

    /// Entries held in the special slots.
    pub fn special_entries(&self) -> Vec<TableEntry<B::Key, B::Value>> {
        (0..2).filter_map(|which| self.slot(which)).collect()
    }

    /// Iterate the base table's entries followed by the special slots.
    pub fn iter(&self) -> ClosedHashTableIterator<'_, B> {
        ClosedHashTableIterator::with_extra(
            self.table.bucket_bytes(),
            self.table.bucket_count(),
            self.special_entries(),
        )
    }

    /// Run a resize on the base table, moving the special slots to the new bucket_count.
    fn resize<F>(&mut self, op: F) -> Result<(), RehashError>
    where
        F: FnOnce(&mut T) -> Result<(), RehashError>,
    {
        let old_idx = self.table.bucket_count();
        let mut saved = Vec::with_capacity(2 * B::SIZE);
        saved.extend_from_slice(self.table.slot_bytes(old_idx));
        saved.extend_from_slice(self.table.slot_bytes(old_idx + 1));
        let result = op(&mut self.table);
        let new_idx = self.table.bucket_count();
        self.table
            .slot_bytes_mut(new_idx)
            .copy_from_slice(&saved[..B::SIZE]);
        self.table
            .slot_bytes_mut(new_idx + 1)
            .copy_from_slice(&saved[B::SIZE..]);
        result
    }
}

impl<T, B> ClosedHashTable for SpecialKeyTable<T>
where
    B: HashBucket,
    T: ClosedHashTable<Key = B::Key, Value = B::Value> + BucketRegion<Bucket = B>,
{
    type Key = B::Key;
    type Value = B::Value;

    fn find(&self, key: &B::Key) -> Lookup<B::Value> {
        match Self::special_index(key) {
            Some(which) => match self.slot(which) {
                Some(entry) if entry.deleted => Lookup::Deleted(entry.value),
                Some(entry) => Lookup::Found(entry.value),
                None => Lookup::NotFound,
            },
            None => self.table.find(key),
        }
    }

    fn insert(&mut self, key: B::Key, value: B::Value) -> Result<(), InsertError> {
        match Self::special_index(&key) {
            Some(which) => {
                self.write_slot(which, TAG_VALID, &value);
                Ok(())
            }
            None => self.table.insert(key, value),
        }
    }

    fn delete(&mut self, key: B::Key, value: B::Value) -> Result<(), InsertError> {
        match Self::special_index(&key) {
            Some(which) => {
                self.write_slot(which, TAG_DELETED, &value);
                Ok(())
            }
            None => self.table.delete(key, value),
        }
    }

    fn key_count(&self) -> u64 {
        self.table.key_count() + self.special_entries().len() as u64
    }

    fn delete_count(&self) -> u64 {
        self.table.delete_count()
            + self
                .special_entries()
                .iter()
                .filter(|e| e.deleted)
                .count() as u64
    }

    fn bucket_count(&self) -> u64 {
        self.table.bucket_count()
    }

    fn capacity(&self) -> u64 {
        self.table.capacity()
    }

    fn is_full(&self) -> bool {
        self.table.is_full()
    }

    fn stretch(&mut self) -> Result<(), RehashError> {
        self.resize(|table| table.stretch())
    }

    fn shrink(&mut self, occupancy_pct: u8) -> Result<(), RehashError> {
        self.resize(|table| table.shrink(occupancy_pct))
    }

    fn rehash(&mut self, new_bucket_count: u64) -> Result<(), RehashError> {
        self.resize(|table| table.rehash(new_bucket_count))
    }

    fn entries(&self) -> Vec<TableEntry<B::Key, B::Value>> {
        let mut entries = self.table.entries();
        entries.extend(self.special_entries());
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{CuckooHashTable, DenseHashTable, SpecialKeyCuckooHashTable};
    use crate::table_config::TableConfig;
    use crate::value::{SentinelValue, SpecialValue};

    type Cuckoo = SpecialKeyCuckooHashTable<u32, u32>;

    fn cuckoo_table(max_keys: u64) -> SpecialKeyTable<Cuckoo> {
        let config = TableConfig::new().special_key();
        let mem = Cuckoo::table_memory_for(max_keys, &config);
        SpecialKeyTable::new(Cuckoo::mount_for_write(vec![0; mem], &config).unwrap()).unwrap()
    }

    #[test]
    fn test_sentinel_keys_round_trip() {
        let mut table = cuckoo_table(100);
        assert!(table.find(&u32::MAX).is_not_found());
        table.insert(u32::MAX, 11).unwrap();
        table.insert(u32::MAX - 1, 12).unwrap();
        table.insert(5, 13).unwrap();
        assert_eq!(table.find(&u32::MAX), Lookup::Found(11));
        assert_eq!(table.find(&(u32::MAX - 1)), Lookup::Found(12));
        assert_eq!(table.find(&5), Lookup::Found(13));
        assert_eq!(table.key_count(), 3);
        table.delete(u32::MAX - 1, 0).unwrap();
        assert!(table.find(&(u32::MAX - 1)).is_deleted());
        assert_eq!(table.delete_count(), 1);
        let mut keys: Vec<u32> = table.entries().iter().map(|e| e.key).collect();
        keys.sort();
        assert_eq!(keys, vec![5, u32::MAX - 1, u32::MAX]);
    }

    #[test]
    fn test_special_slots_survive_resize() {
        let mut table = cuckoo_table(200);
        for key in 0..150_u32 {
            table.insert(key, key + 1).unwrap();
        }
        table.insert(u32::MAX, 1).unwrap();
        table.delete(u32::MAX - 1, 0).unwrap();
        table.stretch().unwrap();
        assert_eq!(table.find(&u32::MAX), Lookup::Found(1));
        assert!(table.find(&(u32::MAX - 1)).is_deleted());
        table.shrink(90).unwrap();
        assert_eq!(table.find(&u32::MAX), Lookup::Found(1));
        assert!(table.find(&(u32::MAX - 1)).is_deleted());
        for key in 0..150_u32 {
            assert_eq!(table.find(&key), Lookup::Found(key + 1));
        }
        // A failed rehash leaves the slots where they were.
        assert!(table.rehash(8).is_err());
        assert_eq!(table.find(&u32::MAX), Lookup::Found(1));
    }

    #[test]
    fn test_dense_special_key() {
        type Dense = DenseHashTable<u64, SpecialValue<u64>>;
        let config = TableConfig::new().special_key();
        let mem = Dense::table_memory_for(50, &config);
        let mut table =
            SpecialKeyTable::new(Dense::mount_for_write(vec![0; mem], &config).unwrap()).unwrap();
        table.insert(u64::MAX, SpecialValue::new(3)).unwrap();
        table.insert(1, SpecialValue::new(4)).unwrap();
        assert_eq!(table.find(&u64::MAX).found().map(|v| v.value()), Some(3));
        table.rehash(104).unwrap();
        assert_eq!(table.find(&u64::MAX).found().map(|v| v.value()), Some(3));
        assert_eq!(table.find(&1).found().map(|v| v.value()), Some(4));
    }

    #[test]
    fn test_requires_special_slots() {
        type Plain = CuckooHashTable<u32, SpecialValue<u32>>;
        let config = TableConfig::new();
        let mem = Plain::table_memory_for(10, &config);
        let table = Plain::mount_for_write(vec![0; mem], &config).unwrap();
        assert!(matches!(
            SpecialKeyTable::new(table),
            Err(MountError::InvalidConfig(_))
        ));
    }
}
