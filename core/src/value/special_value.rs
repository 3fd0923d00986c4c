//! Scalar value with two reserved bit patterns marking empty and deleted.

use crate::table_bytes::FixedBytes;
use crate::value::{SentinelValue, TableValue};
use std::cmp::Ordering;

/// A scalar that gives up two bit patterns for the empty and deleted states.
/// Integers reserve MAX and MAX - 1, floats reserve two NaN patterns so every ordinary float
/// (including the canonical NaN) stays usable.
pub trait SentinelScalar: TableValue {
    /// Bit pattern of an empty value.
    fn empty_value() -> Self;
    /// Bit pattern of a deleted value.
    fn delete_value() -> Self;
    /// Bitwise equality (NaN safe).
    fn same_bits(&self, other: &Self) -> bool;
}

macro_rules! sentinel_int_impl {
    ($($t:ty),*) => {
        $(
            impl SentinelScalar for $t {
                #[inline(always)]
                fn empty_value() -> Self {
                    <$t>::MAX
                }

                #[inline(always)]
                fn delete_value() -> Self {
                    <$t>::MAX - 1
                }

                #[inline(always)]
                fn same_bits(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

sentinel_int_impl!(u8, u16, u32, u64, i8, i16, i32, i64);

impl SentinelScalar for f32 {
    fn empty_value() -> Self {
        f32::from_bits(0xffff_ffff)
    }

    fn delete_value() -> Self {
        f32::from_bits(0xffff_fffe)
    }

    fn same_bits(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl SentinelScalar for f64 {
    fn empty_value() -> Self {
        f64::from_bits(0xffff_ffff_ffff_ffff)
    }

    fn delete_value() -> Self {
        f64::from_bits(0xffff_ffff_ffff_fffe)
    }

    fn same_bits(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

/// Value whose empty/deleted state is a reserved scalar.  Same size as T.
#[derive(Clone, Copy, Debug)]
pub struct SpecialValue<T: SentinelScalar>(T);

impl<T: SentinelScalar> SpecialValue<T> {
    /// Wrap a valid value.  Must not be one of the reserved patterns.
    pub fn new(value: T) -> Self {
        debug_assert!(!value.same_bits(&T::empty_value()) && !value.same_bits(&T::delete_value()));
        Self(value)
    }

    /// A tombstone.
    pub fn deleted() -> Self {
        Self(T::delete_value())
    }
}

impl<T: SentinelScalar> Default for SpecialValue<T> {
    fn default() -> Self {
        Self(T::empty_value())
    }
}

impl<T: SentinelScalar> PartialEq for SpecialValue<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.same_bits(&other.0)
    }
}

impl<T: SentinelScalar> FixedBytes for SpecialValue<T> {
    const SIZE: usize = T::SIZE;
    const ALIGN: usize = T::ALIGN;

    fn write_le(&self, buffer: &mut [u8]) {
        self.0.write_le(buffer);
    }

    fn read_le(buffer: &[u8]) -> Self {
        Self(T::read_le(buffer))
    }
}

impl<T: SentinelScalar> TableValue for SpecialValue<T> {
    fn value_cmp(&self, other: &Self) -> Ordering {
        self.0.value_cmp(&other.0)
    }
}

impl<T: SentinelScalar> SentinelValue for SpecialValue<T> {
    type Raw = T;

    fn empty() -> Self {
        Self(T::empty_value())
    }

    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.0.same_bits(&T::empty_value())
    }

    #[inline(always)]
    fn is_deleted(&self) -> bool {
        self.0.same_bits(&T::delete_value())
    }

    fn set_value(&mut self, other: &Self) {
        self.0 = other.0;
    }

    fn set_delete(&mut self, _other: &Self) {
        self.0 = T::delete_value();
    }

    fn set_empty(&mut self) {
        self.0 = T::empty_value();
    }

    #[inline(always)]
    fn value(&self) -> T {
        self.0
    }
}
