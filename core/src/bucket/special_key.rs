//! Bucket that uses two reserved key values to mark empty and deleted buckets.
//!
//! On disk a deleted bucket stores DELETE_KEY in the key slot and the real key in the first bytes
//! of the value slot, so the value must be at least as wide as the key.  In memory the state is
//! kept explicitly.  Tables refuse the sentinel keys, see SpecialKeyTable for storing them.

use crate::bucket::HashBucket;
use crate::table_bytes::{const_max, pack4_offset, pack4_size, FixedBytes};
use crate::table_key::TableKey;
use crate::value::TableValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotState {
    Empty,
    Deleted,
    Valid,
}

/// Key sentinel bucket.
#[derive(Clone, Copy, Debug)]
pub struct SpecialKeyBucket<K: TableKey, V: TableValue> {
    state: SlotState,
    key: K,
    value: V,
}

impl<K: TableKey, V: TableValue> SpecialKeyBucket<K, V> {
    const VALUE_HOLDS_KEY: () = assert!(
        V::SIZE >= K::SIZE,
        "SpecialKeyBucket value must be at least as wide as the key"
    );
}

impl<K: TableKey, V: TableValue> HashBucket for SpecialKeyBucket<K, V> {
    type Key = K;
    type Value = V;

    const SIZE: usize = pack4_size(
        pack4_offset(K::SIZE, V::ALIGN) + V::SIZE,
        const_max(K::ALIGN, V::ALIGN),
    );
    const VALUE_OFFSET: usize = pack4_offset(K::SIZE, V::ALIGN);
    const KEY_SENTINELS: bool = true;

    fn empty() -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::VALUE_HOLDS_KEY;
        Self {
            state: SlotState::Empty,
            key: K::EMPTY_KEY,
            value: V::default(),
        }
    }

    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.state == SlotState::Empty
    }

    #[inline(always)]
    fn is_deleted(&self) -> bool {
        self.state == SlotState::Deleted
    }

    #[inline(always)]
    fn is_equal(&self, key: &K) -> bool {
        debug_assert!(!key.is_special(), "sentinel key {:?} probed", key);
        self.state != SlotState::Empty && self.key == *key
    }

    fn key(&self) -> K {
        self.key
    }

    fn value(&self) -> V {
        self.value
    }

    fn set(&mut self, key: K, value: V) {
        debug_assert!(!key.is_special());
        self.state = SlotState::Valid;
        self.key = key;
        self.value = value;
    }

    fn set_delete(&mut self, key: K, _value: V) {
        debug_assert!(!key.is_special());
        self.state = SlotState::Deleted;
        self.key = key;
        self.value = V::default();
    }

    fn set_empty(&mut self) {
        self.state = SlotState::Empty;
        self.key = K::EMPTY_KEY;
        self.value = V::default();
    }

    fn read(buffer: &[u8]) -> Self {
        let key = K::read_le(buffer);
        let value_buf = &buffer[Self::VALUE_OFFSET..];
        if key == K::EMPTY_KEY {
            Self::empty()
        } else if key == K::DELETE_KEY {
            Self {
                state: SlotState::Deleted,
                key: K::read_le(value_buf),
                value: V::default(),
            }
        } else {
            Self {
                state: SlotState::Valid,
                key,
                value: V::read_le(value_buf),
            }
        }
    }

    fn write(&self, buffer: &mut [u8]) {
        #[allow(clippy::let_unit_value)]
        let _ = Self::VALUE_HOLDS_KEY;
        let buffer = &mut buffer[..Self::SIZE];
        buffer.iter_mut().for_each(|b| *b = 0);
        match self.state {
            SlotState::Empty => K::EMPTY_KEY.write_le(buffer),
            SlotState::Deleted => {
                K::DELETE_KEY.write_le(buffer);
                self.key.write_le(&mut buffer[Self::VALUE_OFFSET..]);
            }
            SlotState::Valid => {
                self.key.write_le(buffer);
                self.value.write_le(&mut buffer[Self::VALUE_OFFSET..]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Bucket = SpecialKeyBucket<u32, u64>;

    #[test]
    fn test_layout() {
        assert_eq!(Bucket::SIZE, 12);
        assert_eq!(Bucket::VALUE_OFFSET, 4);
        assert_eq!(SpecialKeyBucket::<u8, u32>::SIZE, 8);
        assert_eq!(SpecialKeyBucket::<u64, u64>::SIZE, 16);
        assert_eq!(SpecialKeyBucket::<u16, u16>::SIZE, 4);
    }

    #[test]
    fn test_deleted_key_lives_in_value_slot() {
        let mut b = Bucket::empty();
        b.set(17, 300);
        let mut buf = [0_u8; 12];
        b.write(&mut buf);
        assert_eq!(&buf[..4], &17_u32.to_le_bytes());
        b.set_delete(17, 0);
        b.write(&mut buf);
        assert_eq!(&buf[..4], &(u32::MAX - 1).to_le_bytes());
        assert_eq!(&buf[4..8], &17_u32.to_le_bytes());
        let back = Bucket::read(&buf);
        assert!(back.is_deleted());
        assert_eq!(back.key(), 17);
        assert!(back.is_equal(&17));
        assert!(!back.is_equal(&18));
    }

    #[test]
    fn test_empty_round_trip() {
        let mut buf = [0xaa_u8; 12];
        Bucket::empty().write(&mut buf);
        let back = Bucket::read(&buf);
        assert!(back.is_empty());
        assert!(!back.is_equal(&0));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn test_sentinel_key_rejected() {
        let b = Bucket::empty();
        b.is_equal(&u32::MAX);
    }
}
