//! Contains the trait that must be implemented for anything acting as a table key.

use crate::hash::seeded_hash;
use crate::table_bytes::FixedBytes;
use std::fmt::Debug;
use std::hash::Hash;

/// Required trait for a key.
/// Two key values are reserved as sentinels for key based buckets (SpecialKeyBucket), they can
/// still be stored but only through a table with special key support.
pub trait TableKey: FixedBytes + Eq + Ord + Hash + Debug {
    /// Key value marking an empty bucket.
    const EMPTY_KEY: Self;
    /// Key value marking a deleted bucket.
    const DELETE_KEY: Self;

    /// True if this key is one of the two sentinel values.
    #[inline(always)]
    fn is_special(&self) -> bool {
        *self == Self::EMPTY_KEY || *self == Self::DELETE_KEY
    }

    /// Hash function func_id for this key.
    #[inline]
    fn hash_with(&self, func_id: u8) -> u64 {
        let mut buf = [0_u8; 16];
        self.write_le(&mut buf[..Self::SIZE]);
        seeded_hash(&buf[..Self::SIZE], func_id)
    }
}

macro_rules! table_key_impl {
    ($($t:ty),*) => {
        $(
            impl TableKey for $t {
                const EMPTY_KEY: Self = <$t>::MAX;
                const DELETE_KEY: Self = <$t>::MAX - 1;
            }
        )*
    };
}

table_key_impl!(u8, u16, u32, u64, i8, i16, i32, i64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert_eq!(u64::EMPTY_KEY, u64::MAX);
        assert_eq!(u64::DELETE_KEY, u64::MAX - 1);
        assert!(u32::MAX.is_special());
        assert!((u32::MAX - 1).is_special());
        assert!(!0_u32.is_special());
        assert_eq!(i16::EMPTY_KEY, i16::MAX);
    }

    #[test]
    fn test_hash_depends_on_width() {
        // Same numeric value, different key widths hash differently.
        assert_ne!(7_u32.hash_with(0), 7_u64.hash_with(0));
        assert_eq!(7_u64.hash_with(1), 7_u64.hash_with(1));
    }
}
