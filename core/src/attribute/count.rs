//! Variable width value count header.
//!
//! The top two bits of the first byte select the width: 00 one byte, 01 two bytes, 10 four
//! bytes.  The remaining bits hold the count, most significant byte first.

use crate::err_info;
use crate::error::codec::CodecError;

/// Largest count that can be encoded.
pub const MAX_COUNT: u32 = 0x3fff_ffff;

const ONE_BYTE_MAX: u32 = 0x3f;
const TWO_BYTE_MAX: u32 = 0x3fff;
const TAG_TWO: u8 = 0x40;
const TAG_FOUR: u8 = 0x80;

/// Bytes needed to encode count.
pub fn count_header_len(count: u32) -> Result<usize, CodecError> {
    if count <= ONE_BYTE_MAX {
        Ok(1)
    } else if count <= TWO_BYTE_MAX {
        Ok(2)
    } else if count <= MAX_COUNT {
        Ok(4)
    } else {
        Err(CodecError::InvalidCount(count))
    }
}

/// Encode count at the start of out, returns the bytes written.
pub fn encode_count(count: u32, out: &mut [u8]) -> Result<usize, CodecError> {
    let len = count_header_len(count)?;
    if out.len() < len {
        return Err(CodecError::BufferTooSmall {
            needed: len,
            actual: out.len(),
        });
    }
    match len {
        1 => out[0] = count as u8,
        2 => {
            out[0] = TAG_TWO | (count >> 8) as u8;
            out[1] = count as u8;
        }
        _ => {
            out[..4].copy_from_slice(&count.to_be_bytes());
            out[0] |= TAG_FOUR;
        }
    }
    Ok(len)
}

/// Decode a count from the start of buf, returns the count and the header length.
pub fn decode_count(buf: &[u8]) -> Result<(u32, usize), CodecError> {
    let first = match buf.first() {
        Some(first) => *first,
        None => {
            return Err(CodecError::BufferTooSmall {
                needed: 1,
                actual: 0,
            })
        }
    };
    let len = match first >> 6 {
        0 => return Ok((first as u32, 1)),
        1 => 2,
        2 => 4,
        _ => {
            return Err(CodecError::Corruption {
                info: err_info!(),
                reason: "invalid count header tag",
            })
        }
    };
    if buf.len() < len {
        return Err(CodecError::BufferTooSmall {
            needed: len,
            actual: buf.len(),
        });
    }
    let count = buf[1..len]
        .iter()
        .fold((first & 0x3f) as u32, |acc, b| (acc << 8) | *b as u32);
    Ok((count, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths() {
        let mut buf = [0_u8; 4];
        for (count, len) in [
            (0, 1),
            (0x3f, 1),
            (0x40, 2),
            (0x3fff, 2),
            (0x4000, 4),
            (MAX_COUNT, 4),
        ] {
            assert_eq!(encode_count(count, &mut buf).unwrap(), len);
            assert_eq!(decode_count(&buf).unwrap(), (count, len));
        }
        assert_eq!(buf[0] >> 6, 2);
    }

    #[test]
    fn test_errors() {
        let mut buf = [0_u8; 4];
        assert!(matches!(
            encode_count(MAX_COUNT + 1, &mut buf),
            Err(CodecError::InvalidCount(_))
        ));
        assert!(matches!(
            encode_count(0x100, &mut buf[..1]),
            Err(CodecError::BufferTooSmall { needed: 2, .. })
        ));
        assert!(matches!(
            decode_count(&[0xc0, 0, 0, 0]),
            Err(CodecError::Corruption { .. })
        ));
        assert!(matches!(
            decode_count(&[0x80, 1]),
            Err(CodecError::BufferTooSmall { needed: 4, .. })
        ));
        assert!(decode_count(&[]).is_err());
    }
}
