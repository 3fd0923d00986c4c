//! Split packed wire values into timestamp and raw value bytes, and pack them back.

use crate::error::codec::CodecError;
use crate::table_bytes::{pack4_offset, FixedBytes};
use crate::value::{TableValue, TimestampValue};

/// Converts between a packed value (as stored in a bucket) and (timestamp, raw value bytes).
/// pack() serializes into a scratch buffer owned by the unpacker, hence the &mut self.  Give
/// each thread its own unpacker.
pub trait ValueUnpacker {
    /// Size of a packed value.
    fn packed_size(&self) -> usize;

    /// Split a packed value.
    fn unpack<'a>(&self, packed: &'a [u8]) -> Result<(u32, &'a [u8]), CodecError>;

    /// Pack a timestamp and raw value, the result is valid until the next call.
    fn pack(&mut self, timestamp: u32, value: &[u8]) -> Result<&[u8], CodecError>;
}

/// Unpacker for values without a timestamp (scalars, SpecialValue, OffsetValue).
#[derive(Debug, Clone)]
pub struct PlainValueUnpacker {
    value_size: usize,
    buffer: Vec<u8>,
}

impl PlainValueUnpacker {
    /// Unpacker for values of type V.
    pub fn new<V: FixedBytes>() -> Self {
        Self {
            value_size: V::SIZE,
            buffer: Vec::with_capacity(V::SIZE),
        }
    }
}

impl ValueUnpacker for PlainValueUnpacker {
    fn packed_size(&self) -> usize {
        self.value_size
    }

    fn unpack<'a>(&self, packed: &'a [u8]) -> Result<(u32, &'a [u8]), CodecError> {
        check_len(packed, self.value_size)?;
        Ok((0, &packed[..self.value_size]))
    }

    fn pack(&mut self, _timestamp: u32, value: &[u8]) -> Result<&[u8], CodecError> {
        check_len(value, self.value_size)?;
        self.buffer.clear();
        self.buffer.extend_from_slice(&value[..self.value_size]);
        Ok(&self.buffer)
    }
}

/// Unpacker for TimestampValue, the timestamp word precedes the value.
#[derive(Debug, Clone)]
pub struct TimestampValueUnpacker {
    value_offset: usize,
    value_size: usize,
    packed_size: usize,
    buffer: Vec<u8>,
}

impl TimestampValueUnpacker {
    /// Unpacker for TimestampValue<V>.
    pub fn new<V: TableValue>() -> Self {
        let packed_size = TimestampValue::<V>::SIZE;
        Self {
            value_offset: pack4_offset(4, V::ALIGN),
            value_size: V::SIZE,
            packed_size,
            buffer: vec![0; packed_size],
        }
    }
}

impl ValueUnpacker for TimestampValueUnpacker {
    fn packed_size(&self) -> usize {
        self.packed_size
    }

    fn unpack<'a>(&self, packed: &'a [u8]) -> Result<(u32, &'a [u8]), CodecError> {
        check_len(packed, self.packed_size)?;
        let timestamp = u32::read_le(packed) & 0x7fff_ffff;
        Ok((
            timestamp,
            &packed[self.value_offset..self.value_offset + self.value_size],
        ))
    }

    fn pack(&mut self, timestamp: u32, value: &[u8]) -> Result<&[u8], CodecError> {
        check_len(value, self.value_size)?;
        self.buffer.iter_mut().for_each(|b| *b = 0);
        (timestamp & 0x7fff_ffff).write_le(&mut self.buffer);
        self.buffer[self.value_offset..self.value_offset + self.value_size]
            .copy_from_slice(&value[..self.value_size]);
        Ok(&self.buffer)
    }
}

fn check_len(buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.len() < needed {
        Err(CodecError::BufferTooSmall {
            needed,
            actual: buf.len(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SentinelValue;

    #[test]
    fn test_timestamp_unpack() {
        let v = TimestampValue::new(1234, 0x0102_0304_0506_0708_u64);
        let mut packed = vec![0_u8; TimestampValue::<u64>::SIZE];
        v.write_le(&mut packed);
        let mut unpacker = TimestampValueUnpacker::new::<u64>();
        assert_eq!(unpacker.packed_size(), 12);
        let (ts, raw) = unpacker.unpack(&packed).unwrap();
        assert_eq!(ts, 1234);
        assert_eq!(u64::read_le(raw), 0x0102_0304_0506_0708);
        let raw = raw.to_vec();
        let repacked = unpacker.pack(1234, &raw).unwrap();
        assert_eq!(repacked, &packed[..]);
        let back = TimestampValue::<u64>::read_le(repacked);
        assert_eq!(back.value(), 0x0102_0304_0506_0708);
        assert!(unpacker.unpack(&packed[..5]).is_err());
    }

    #[test]
    fn test_plain_unpack() {
        let mut unpacker = PlainValueUnpacker::new::<u32>();
        let (ts, raw) = unpacker.unpack(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(ts, 0);
        assert_eq!(raw, &[1, 2, 3, 4]);
        assert_eq!(unpacker.pack(9, &[4, 3, 2, 1]).unwrap(), &[4, 3, 2, 1]);
    }
}
