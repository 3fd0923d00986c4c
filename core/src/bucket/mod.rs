//! Hash table bucket layouts.
//!
//! A bucket is a key plus a value laid out like a `pack(4)` struct.  The two bucket flavours
//! differ in where the empty/deleted state lives: in the key (SpecialKeyBucket) or in the value
//! (SpecialValueBucket).

pub mod special_key;
pub mod special_value;

pub use special_key::SpecialKeyBucket;
pub use special_value::SpecialValueBucket;

use crate::table_key::TableKey;
use crate::value::TableValue;
use std::fmt::Debug;

/// Bucket stored in table memory.  Buckets are copied out of (and back into) the raw region, the
/// region itself carries no alignment guarantees.
pub trait HashBucket: Copy + Debug {
    /// Key type.
    type Key: TableKey;
    /// Value type as stored.
    type Value: TableValue;

    /// Bytes per bucket in table memory.
    const SIZE: usize;
    /// Byte offset of the value inside a bucket.
    const VALUE_OFFSET: usize;
    /// True if the two sentinel keys mark bucket state, such keys can not be stored in a bucket.
    const KEY_SENTINELS: bool;

    /// An empty bucket.
    fn empty() -> Self;

    /// True if the bucket holds nothing.
    fn is_empty(&self) -> bool;

    /// True if the bucket holds a tombstone.
    fn is_deleted(&self) -> bool;

    /// True if the bucket holds key (valid or deleted).  key must not be a sentinel key when the
    /// bucket keeps its state in the key.
    fn is_equal(&self, key: &Self::Key) -> bool;

    /// Key held by the bucket (also for tombstones).  Meaningless for empty buckets.
    fn key(&self) -> Self::Key;

    /// Value held by the bucket.
    fn value(&self) -> Self::Value;

    /// Store a valid key/value.
    fn set(&mut self, key: Self::Key, value: Self::Value);

    /// Store a tombstone for key.  value carries ordering information (timestamps) for value
    /// sentinel buckets and is ignored otherwise.
    fn set_delete(&mut self, key: Self::Key, value: Self::Value);

    /// Mark the bucket empty.
    fn set_empty(&mut self);

    /// Decode a bucket from the first SIZE bytes of buffer.
    fn read(buffer: &[u8]) -> Self;

    /// Encode into the first SIZE bytes of buffer.
    fn write(&self, buffer: &mut [u8]);
}
