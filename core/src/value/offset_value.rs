//! Offset (into some data file) used as a bucket value.

use crate::table_bytes::FixedBytes;
use crate::value::{SentinelValue, TableValue};
use std::cmp::Ordering;

/// Unsigned offset type.  The two largest offsets are reserved for empty and deleted.
pub trait OffsetScalar: TableValue + Ord {
    /// Offset marking an empty bucket.
    const EMPTY_OFFSET: Self;
    /// Offset marking a deleted bucket.
    const DELETE_OFFSET: Self;
}

impl OffsetScalar for u32 {
    const EMPTY_OFFSET: Self = u32::MAX;
    const DELETE_OFFSET: Self = u32::MAX - 1;
}

impl OffsetScalar for u64 {
    const EMPTY_OFFSET: Self = u64::MAX;
    const DELETE_OFFSET: Self = u64::MAX - 1;
}

/// Offset value with folded empty/deleted state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OffsetValue<T: OffsetScalar>(T);

impl<T: OffsetScalar> OffsetValue<T> {
    /// Wrap an offset, must be below DELETE_OFFSET.
    pub fn new(offset: T) -> Self {
        debug_assert!(offset < T::DELETE_OFFSET);
        Self(offset)
    }

    /// Largest usable offset is one below this.
    pub fn offset_limit() -> T {
        T::DELETE_OFFSET
    }
}

impl<T: OffsetScalar> Default for OffsetValue<T> {
    fn default() -> Self {
        Self(T::EMPTY_OFFSET)
    }
}

impl<T: OffsetScalar> FixedBytes for OffsetValue<T> {
    const SIZE: usize = T::SIZE;
    const ALIGN: usize = T::ALIGN;

    fn write_le(&self, buffer: &mut [u8]) {
        self.0.write_le(buffer);
    }

    fn read_le(buffer: &[u8]) -> Self {
        Self(T::read_le(buffer))
    }
}

impl<T: OffsetScalar> TableValue for OffsetValue<T> {
    fn value_cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T: OffsetScalar> SentinelValue for OffsetValue<T> {
    type Raw = T;

    fn empty() -> Self {
        Self(T::EMPTY_OFFSET)
    }

    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.0 == T::EMPTY_OFFSET
    }

    #[inline(always)]
    fn is_deleted(&self) -> bool {
        self.0 == T::DELETE_OFFSET
    }

    fn set_value(&mut self, other: &Self) {
        self.0 = other.0;
    }

    fn set_delete(&mut self, _other: &Self) {
        self.0 = T::DELETE_OFFSET;
    }

    fn set_empty(&mut self) {
        self.0 = T::EMPTY_OFFSET;
    }

    #[inline(always)]
    fn value(&self) -> T {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_value() {
        let mut v = OffsetValue::<u64>::default();
        assert!(v.is_empty());
        v.set_value(&OffsetValue::new(4096));
        assert_eq!(v.value(), 4096);
        v.set_delete(&OffsetValue::new(0));
        assert!(v.is_deleted());
        assert_eq!(OffsetValue::<u32>::offset_limit(), u32::MAX - 1);
        let mut buf = [0_u8; 4];
        OffsetValue::<u32>::new(7).write_le(&mut buf);
        assert_eq!(OffsetValue::<u32>::read_le(&buf).value(), 7);
    }
}
