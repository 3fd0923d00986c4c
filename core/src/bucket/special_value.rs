//! Bucket whose value carries the empty/deleted state, every key value is usable.

use crate::bucket::HashBucket;
use crate::table_bytes::{const_max, pack4_offset, pack4_size, FixedBytes};
use crate::table_key::TableKey;
use crate::value::SentinelValue;

/// Value sentinel bucket.  A state change only touches the value, every key is storable.
#[derive(Clone, Copy, Debug)]
pub struct SpecialValueBucket<K: TableKey, V: SentinelValue> {
    key: K,
    value: V,
}

impl<K: TableKey, V: SentinelValue> HashBucket for SpecialValueBucket<K, V> {
    type Key = K;
    type Value = V;

    const SIZE: usize = pack4_size(
        pack4_offset(K::SIZE, V::ALIGN) + V::SIZE,
        const_max(K::ALIGN, V::ALIGN),
    );
    const VALUE_OFFSET: usize = pack4_offset(K::SIZE, V::ALIGN);
    const KEY_SENTINELS: bool = false;

    fn empty() -> Self {
        Self {
            key: K::default(),
            value: V::empty(),
        }
    }

    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    #[inline(always)]
    fn is_deleted(&self) -> bool {
        self.value.is_deleted()
    }

    #[inline(always)]
    fn is_equal(&self, key: &K) -> bool {
        !self.value.is_empty() && self.key == *key
    }

    fn key(&self) -> K {
        self.key
    }

    fn value(&self) -> V {
        self.value
    }

    fn set(&mut self, key: K, value: V) {
        self.key = key;
        self.value.set_value(&value);
    }

    fn set_delete(&mut self, key: K, value: V) {
        self.key = key;
        self.value.set_delete(&value);
    }

    fn set_empty(&mut self) {
        self.value.set_empty();
    }

    fn read(buffer: &[u8]) -> Self {
        Self {
            key: K::read_le(buffer),
            value: V::read_le(&buffer[Self::VALUE_OFFSET..]),
        }
    }

    fn write(&self, buffer: &mut [u8]) {
        self.key.write_le(buffer);
        self.value.write_le(&mut buffer[Self::VALUE_OFFSET..]);
    }
}
