//! Value prefixed with a 31 bit timestamp and a delete flag.
//!
//! Layout: a little endian u32 word (bits 0..31 timestamp, bit 31 delete flag) followed by the
//! value at a pack(4) offset.  The all ones word marks an empty value, so a deleted value can
//! not carry the maximum timestamp.

use crate::table_bytes::{const_max, pack4_offset, pack4_size, FixedBytes};
use crate::value::{SentinelValue, TableValue};
use std::cmp::Ordering;

const DELETE_FLAG: u32 = 1 << 31;
const TIMESTAMP_MASK: u32 = DELETE_FLAG - 1;
const EMPTY_WORD: u32 = u32::MAX;

/// A value with a timestamp.  A tombstone keeps the old value bytes and only replaces the word.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimestampValue<V: TableValue> {
    word: u32,
    value: V,
}

impl<V: TableValue> TimestampValue<V> {
    /// Largest timestamp that can be stored.
    pub const MAX_TIMESTAMP: u32 = TIMESTAMP_MASK - 1;

    const VALUE_OFFSET: usize = pack4_offset(4, V::ALIGN);

    /// Valid value with timestamp (clamped to MAX_TIMESTAMP).
    pub fn new(timestamp: u32, value: V) -> Self {
        Self {
            word: timestamp.min(Self::MAX_TIMESTAMP),
            value,
        }
    }

    /// Tombstone with timestamp.
    pub fn deleted(timestamp: u32) -> Self {
        Self {
            word: DELETE_FLAG | timestamp.min(Self::MAX_TIMESTAMP),
            value: V::default(),
        }
    }
}

impl<V: TableValue> Default for TimestampValue<V> {
    fn default() -> Self {
        Self {
            word: EMPTY_WORD,
            value: V::default(),
        }
    }
}

impl<V: TableValue> FixedBytes for TimestampValue<V> {
    const SIZE: usize = pack4_size(Self::VALUE_OFFSET + V::SIZE, const_max(4, V::ALIGN));
    const ALIGN: usize = const_max(4, V::ALIGN);

    fn write_le(&self, buffer: &mut [u8]) {
        self.word.write_le(buffer);
        self.value.write_le(&mut buffer[Self::VALUE_OFFSET..]);
    }

    fn read_le(buffer: &[u8]) -> Self {
        Self {
            word: u32::read_le(buffer),
            value: V::read_le(&buffer[Self::VALUE_OFFSET..]),
        }
    }
}

impl<V: TableValue> TableValue for TimestampValue<V> {
    fn value_cmp(&self, other: &Self) -> Ordering {
        self.value
            .value_cmp(&other.value)
            .then_with(|| self.timestamp().cmp(&other.timestamp()))
    }

    #[inline(always)]
    fn timestamp(&self) -> u32 {
        self.word & TIMESTAMP_MASK
    }
}

impl<V: TableValue> SentinelValue for TimestampValue<V> {
    type Raw = V;

    fn empty() -> Self {
        Self::default()
    }

    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.word == EMPTY_WORD
    }

    #[inline(always)]
    fn is_deleted(&self) -> bool {
        self.word != EMPTY_WORD && self.word & DELETE_FLAG != 0
    }

    fn set_value(&mut self, other: &Self) {
        self.value = other.value;
        self.word = other.word & TIMESTAMP_MASK;
    }

    fn set_delete(&mut self, other: &Self) {
        self.word = DELETE_FLAG | other.timestamp().min(Self::MAX_TIMESTAMP);
    }

    fn set_empty(&mut self) {
        self.word = EMPTY_WORD;
        self.value = V::default();
    }

    #[inline(always)]
    fn value(&self) -> V {
        self.value
    }
}
