//! Value types stored in hash table buckets.
//!
//! Plain scalars are used with key sentinel buckets.  The wrappers in this module fold the
//! empty/deleted state into the value itself so the key stays valid in every state.

pub mod offset_value;
pub mod special_value;
pub mod timestamp_value;
pub mod unpacker;

pub use offset_value::{OffsetScalar, OffsetValue};
pub use special_value::{SentinelScalar, SpecialValue};
pub use timestamp_value::TimestampValue;
pub use unpacker::{PlainValueUnpacker, TimestampValueUnpacker, ValueUnpacker};

use crate::table_bytes::FixedBytes;
use std::cmp::Ordering;

/// Anything that can be stored as the value of a bucket.
pub trait TableValue: FixedBytes + PartialEq {
    /// Total order used when sorting valid entries by value.
    fn value_cmp(&self, other: &Self) -> Ordering;

    /// Timestamp carried by the value, 0 if it has none.  Used to order deleted entries.
    #[inline(always)]
    fn timestamp(&self) -> u32 {
        0
    }
}

macro_rules! table_value_int_impl {
    ($($t:ty),*) => {
        $(
            impl TableValue for $t {
                #[inline(always)]
                fn value_cmp(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }
            }
        )*
    };
}

table_value_int_impl!(u8, u16, u32, u64, i8, i16, i32, i64);

impl TableValue for f32 {
    #[inline(always)]
    fn value_cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

impl TableValue for f64 {
    #[inline(always)]
    fn value_cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

/// A value that encodes the empty and deleted bucket states itself.
///
/// State transitions are only done with set_value, set_delete and set_empty.
pub trait SentinelValue: TableValue {
    /// The user visible value.
    type Raw: TableValue;

    /// A value in the empty state.
    fn empty() -> Self;

    /// True if the bucket holding this value is empty.
    fn is_empty(&self) -> bool;

    /// True if the bucket holding this value is a tombstone.
    fn is_deleted(&self) -> bool;

    /// Become a valid copy of other.
    fn set_value(&mut self, other: &Self);

    /// Become a tombstone, keeping any ordering information (timestamp) from other.
    fn set_delete(&mut self, other: &Self);

    /// Become empty.
    fn set_empty(&mut self);

    /// The user visible value.  Meaningless for empty values.
    fn value(&self) -> Self::Raw;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_total_order() {
        assert_eq!(1.0_f32.value_cmp(&2.0), Ordering::Less);
        assert_eq!(f64::NAN.value_cmp(&f64::NAN), Ordering::Equal);
        assert_eq!((-0.0_f64).value_cmp(&0.0), Ordering::Less);
        assert_eq!(5_u32.timestamp(), 0);
    }
}
