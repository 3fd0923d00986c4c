//! Element encodings for compressed float fields.

use crate::attribute::{AttributeScalar, CompressType, FieldType};
use crate::error::codec::CodecError;
use crate::table_bytes::FixedBytes;
use half::f16;

const BLOCK_MANTISSA_BITS: i32 = 15;

/// Check that compress can be used for elements of type T.
pub(crate) fn check_compress<T: AttributeScalar>(
    compress: CompressType,
    fixed_multi: bool,
) -> Result<(), CodecError> {
    match compress {
        CompressType::None => Ok(()),
        _ if T::FIELD_TYPE != FieldType::Float => {
            Err(CodecError::Unsupported("compression requires a float field"))
        }
        CompressType::BlockFp if !fixed_multi => Err(CodecError::Unsupported(
            "block floating point requires a fixed count multi value",
        )),
        CompressType::Int8 { scale } if !(scale.is_finite() && scale > 0.0) => {
            Err(CodecError::Unsupported("int8 scale must be positive"))
        }
        _ => Ok(()),
    }
}

/// Stored bytes per element.
pub(crate) fn stored_element_size(raw_size: usize, compress: CompressType) -> usize {
    match compress {
        CompressType::None => raw_size,
        CompressType::BlockFp | CompressType::Fp16 => 2,
        CompressType::Int8 { .. } => 1,
    }
}

/// Bytes in front of the elements (the shared block exponent).
pub(crate) fn block_header_len(compress: CompressType) -> usize {
    match compress {
        CompressType::BlockFp => 1,
        _ => 0,
    }
}

/// Shared exponent so that every value's magnitude is below 2^exponent.
pub(crate) fn block_exponent<T: AttributeScalar>(values: impl Iterator<Item = T>) -> i8 {
    let max_abs = values.map(|v| v.to_f32().abs()).fold(0.0_f32, f32::max);
    if max_abs == 0.0 || !max_abs.is_finite() {
        return 0;
    }
    (max_abs.log2().floor() as i32 + 1).clamp(i8::MIN as i32, i8::MAX as i32) as i8
}

/// Encode one element into out.
pub(crate) fn encode_element<T: AttributeScalar>(
    value: T,
    compress: CompressType,
    exponent: i8,
    out: &mut [u8],
) {
    match compress {
        CompressType::None => value.write_le(out),
        CompressType::Fp16 => f16::from_f32(value.to_f32()).to_bits().write_le(out),
        CompressType::Int8 { scale } => {
            let scaled = (value.to_f32() / scale * 127.0).round().clamp(-127.0, 127.0);
            out[0] = scaled as i8 as u8;
        }
        CompressType::BlockFp => {
            let factor = 2_f32.powi(BLOCK_MANTISSA_BITS - exponent as i32);
            let mantissa = (value.to_f32() * factor)
                .round()
                .clamp(-(i16::MAX as f32), i16::MAX as f32);
            (mantissa as i16).write_le(out);
        }
    }
}

/// Decode one element from stored.
pub(crate) fn decode_element<T: AttributeScalar>(
    stored: &[u8],
    compress: CompressType,
    exponent: i8,
) -> T {
    match compress {
        CompressType::None => T::read_le(stored),
        CompressType::Fp16 => T::from_f32(f16::from_bits(u16::read_le(stored)).to_f32()),
        CompressType::Int8 { scale } => T::from_f32(stored[0] as i8 as f32 * scale / 127.0),
        CompressType::BlockFp => {
            let factor = 2_f32.powi(exponent as i32 - BLOCK_MANTISSA_BITS);
            T::from_f32(i16::read_le(stored) as f32 * factor)
        }
    }
}
