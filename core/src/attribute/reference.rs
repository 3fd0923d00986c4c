//! Single value field reference.

use crate::attribute::compress::{
    check_compress, decode_element, encode_element, stored_element_size,
};
use crate::attribute::{AttributeReference, AttributeScalar, CompressType, FieldType};
use crate::err_info;
use crate::error::codec::CodecError;
use crate::pack::PackOffset;
use std::marker::PhantomData;

/// Reads and writes a fixed width scalar at a normal format offset.
pub struct AttributeReferenceTyped<T: AttributeScalar> {
    name: String,
    offset: PackOffset,
    compress: CompressType,
    _value: PhantomData<T>,
}

impl<T: AttributeScalar> AttributeReferenceTyped<T> {
    /// Reference for field name at offset.  Scalars never use the impact format and only
    /// float fields may be compressed (fp16 or int8).
    pub fn new<S: Into<String>>(
        name: S,
        offset: PackOffset,
        compress: CompressType,
    ) -> Result<Self, CodecError> {
        if offset.is_impact_format() {
            return Err(CodecError::FormatMismatch {
                expected_impact: false,
            });
        }
        check_compress::<T>(compress, false)?;
        Ok(Self {
            name: name.into(),
            offset,
            compress,
            _value: PhantomData,
        })
    }

    /// Bytes the value occupies in a record.
    pub fn stored_len(&self) -> usize {
        stored_element_size(T::SIZE, self.compress)
    }

    fn range(&self, len: usize) -> Result<std::ops::Range<usize>, CodecError> {
        let start = self.offset.offset();
        let end = start + self.stored_len();
        if end > len {
            return Err(CodecError::BufferTooSmall {
                needed: end,
                actual: len,
            });
        }
        Ok(start..end)
    }

    /// Read the value from base.
    pub fn get_value(&self, base: &[u8]) -> Result<T, CodecError> {
        let range = self.range(base.len())?;
        Ok(decode_element(&base[range], self.compress, 0))
    }

    /// Write value into base.
    pub fn set_data_value(&self, base: &mut [u8], value: T) -> Result<(), CodecError> {
        let range = self.range(base.len())?;
        encode_element(value, self.compress, 0, &mut base[range]);
        Ok(())
    }

    fn decode_wire(wire: &[u8]) -> Result<T, CodecError> {
        if wire.len() != T::SIZE {
            return Err(CodecError::Corruption {
                info: err_info!(),
                reason: "single value wire length",
            });
        }
        Ok(T::read_le(wire))
    }
}

impl<T: AttributeScalar> AttributeReference for AttributeReferenceTyped<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn offset(&self) -> PackOffset {
        self.offset
    }

    fn field_type(&self) -> FieldType {
        T::FIELD_TYPE
    }

    fn is_multi_value(&self) -> bool {
        false
    }

    fn fixed_count(&self) -> Option<u32> {
        None
    }

    fn compress_type(&self) -> CompressType {
        self.compress
    }

    fn encoded_len(&self, wire: &[u8]) -> Result<usize, CodecError> {
        Self::decode_wire(wire)?;
        Ok(self.stored_len())
    }

    fn set_value(&self, base: &mut [u8], cursor: usize, wire: &[u8]) -> Result<usize, CodecError> {
        self.set_data_value(base, Self::decode_wire(wire)?)?;
        Ok(cursor)
    }

    fn data_value(&self, base: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut wire = vec![0_u8; T::SIZE];
        self.get_value(base)?.write_le(&mut wire);
        Ok(wire)
    }

    fn calculate_data_length(&self, _base: &[u8]) -> Result<usize, CodecError> {
        Ok(self.stored_len())
    }

    fn less_than(&self, lhs: &[u8], rhs: &[u8]) -> Result<bool, CodecError> {
        Ok(self.get_value(lhs)? < self.get_value(rhs)?)
    }

    fn equal(&self, lhs: &[u8], rhs: &[u8]) -> Result<bool, CodecError> {
        Ok(self.get_value(lhs)? == self.get_value(rhs)?)
    }

    fn data_to_string(&self, base: &[u8]) -> Result<String, CodecError> {
        Ok(self.get_value(base)?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set() {
        let offset = PackOffset::normal_offset(3, true).unwrap();
        let reference =
            AttributeReferenceTyped::<i32>::new("a", offset, CompressType::None).unwrap();
        let mut base = vec![0_u8; 8];
        reference.set_data_value(&mut base, -42).unwrap();
        assert_eq!(reference.get_value(&base).unwrap(), -42);
        assert_eq!(reference.data_to_string(&base).unwrap(), "-42");
        assert_eq!(reference.data_value(&base).unwrap(), (-42_i32).to_le_bytes().to_vec());
        let mut other = vec![0_u8; 8];
        reference.set_value(&mut other, 0, &7_i32.to_le_bytes()).unwrap();
        assert!(reference.less_than(&base, &other).unwrap());
        assert!(!reference.equal(&base, &other).unwrap());
        assert!(reference.equal(&other, &other).unwrap());
        // 3 + 4 does not fit in 6 bytes.
        assert!(matches!(
            reference.get_value(&base[..6]),
            Err(CodecError::BufferTooSmall { needed: 7, actual: 6 })
        ));
        assert!(reference.set_value(&mut base, 0, &[1, 2]).is_err());
    }

    #[test]
    fn test_rejects_impact_offset() {
        let impact = PackOffset::impact_offset(0, 0, 2, false).unwrap();
        assert!(matches!(
            AttributeReferenceTyped::<u8>::new("a", impact, CompressType::None),
            Err(CodecError::FormatMismatch { expected_impact: false })
        ));
    }

    #[test]
    fn test_compressed_float() {
        let offset = PackOffset::normal_offset(0, true).unwrap();
        let fp16 = AttributeReferenceTyped::<f32>::new("f", offset, CompressType::Fp16).unwrap();
        assert_eq!(fp16.stored_len(), 2);
        let mut base = vec![0_u8; 2];
        fp16.set_data_value(&mut base, 0.75).unwrap();
        assert_eq!(fp16.get_value(&base).unwrap(), 0.75);
        assert_eq!(fp16.encoded_len(&0.75_f32.to_le_bytes()).unwrap(), 2);

        let int8 =
            AttributeReferenceTyped::<f32>::new("f", offset, CompressType::Int8 { scale: 1.0 })
                .unwrap();
        let mut base = vec![0_u8; 1];
        int8.set_data_value(&mut base, -1.0).unwrap();
        assert_eq!(int8.get_value(&base).unwrap(), -1.0);
        assert!(matches!(
            AttributeReferenceTyped::<f32>::new("f", offset, CompressType::BlockFp),
            Err(CodecError::Unsupported(_))
        ));
    }
}
