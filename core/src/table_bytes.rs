//! Contains the trait used to read/write fixed width keys and values into table memory.

use std::fmt::Debug;

/// Round size up to the alignment a `#pragma pack(4)` struct would use.
/// Members are aligned to min(4, natural alignment) and the struct is padded to that as well.
pub const fn pack4_size(size: usize, align: usize) -> usize {
    let align = if align > 4 { 4 } else { align };
    (size + align - 1) / align * align
}

/// Offset of a member with alignment align placed after offset bytes in a pack(4) struct.
pub const fn pack4_offset(offset: usize, align: usize) -> usize {
    pack4_size(offset, align)
}

/// The larger of two sizes, const friendly.
pub const fn const_max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

/// Trait for anything stored in table memory as a fixed number of little endian bytes.
/// Implementations can make no assumptions about the alignment of the buffers passed in.
pub trait FixedBytes: Copy + Debug + Default {
    /// Number of bytes this type occupies.
    const SIZE: usize;
    /// Natural alignment, used to compute packed bucket layouts.
    const ALIGN: usize;

    /// Serialize into the first SIZE bytes of buffer.
    fn write_le(&self, buffer: &mut [u8]);

    /// Deserialize from the first SIZE bytes of buffer.
    fn read_le(buffer: &[u8]) -> Self;
}

macro_rules! fixed_bytes_impl {
    ($($t:ty),*) => {
        $(
            impl FixedBytes for $t {
                const SIZE: usize = std::mem::size_of::<$t>();
                const ALIGN: usize = std::mem::align_of::<$t>();

                #[inline(always)]
                fn write_le(&self, buffer: &mut [u8]) {
                    buffer[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline(always)]
                fn read_le(buffer: &[u8]) -> Self {
                    let mut buf = [0_u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(&buffer[..Self::SIZE]);
                    Self::from_le_bytes(buf)
                }
            }
        )*
    };
}

fixed_bytes_impl!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// Read a little endian u16 at pos.
#[inline(always)]
pub(crate) fn read_u16(buffer: &[u8], pos: usize) -> u16 {
    u16::read_le(&buffer[pos..])
}

/// Read a little endian u32 at pos.
#[inline(always)]
pub(crate) fn read_u32(buffer: &[u8], pos: usize) -> u32 {
    u32::read_le(&buffer[pos..])
}

/// Read a little endian u64 at pos.
#[inline(always)]
pub(crate) fn read_u64(buffer: &[u8], pos: usize) -> u64 {
    u64::read_le(&buffer[pos..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack4_layout() {
        // u64 key + u32 value packs to 12 bytes, not 16.
        assert_eq!(pack4_size(8 + 4, 8), 12);
        // u8 key + u32 value: value aligned to 4.
        assert_eq!(pack4_offset(1, 4), 4);
        assert_eq!(pack4_size(4 + 4, 4), 8);
        // u16 + u8 pads to the u16 alignment.
        assert_eq!(pack4_size(3, 2), 4);
        assert_eq!(pack4_size(3, 1), 3);
    }

    #[test]
    fn test_round_trip_le() {
        let mut buf = [0_u8; 8];
        0x1122_3344_u32.write_le(&mut buf[1..]);
        assert_eq!(buf[1], 0x44);
        assert_eq!(u32::read_le(&buf[1..]), 0x1122_3344);
        (-2.5_f64).write_le(&mut buf);
        assert_eq!(f64::read_le(&buf), -2.5);
        assert_eq!(read_u16(&[0, 0x34, 0x12], 1), 0x1234);
    }
}
