//! Typed access to the fields of packed records.
//!
//! A reference never owns data, it holds the field's PackOffset and reads or writes through
//! the record buffer it is handed.  Values cross the reference boundary in a wire format:
//! single values as their little endian bytes, multi values as a count header (see
//! [`count`]) followed by the little endian elements.  Strings are multi values of bytes.
//!
//! Variable length fields of a record must be written in ascending var_index order, each
//! write registers the field start that the following fields are located from.

pub mod count;
pub mod layout;
pub mod multi_value;
pub mod reference;

mod compress;

pub use layout::PackLayout;
pub use multi_value::{MultiValueReference, MultiValueView};
pub use reference::AttributeReferenceTyped;

use crate::error::codec::CodecError;
use crate::pack::PackOffset;
use crate::table_bytes::FixedBytes;
use std::fmt;

/// Separator used when rendering multi values as a string.
pub const MULTI_VALUE_SEPARATOR: char = '\u{1D}';

/// Scalar types a field can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// i8
    Int8,
    /// i16
    Int16,
    /// i32
    Int32,
    /// i64
    Int64,
    /// u8
    UInt8,
    /// u16
    UInt16,
    /// u32
    UInt32,
    /// u64
    UInt64,
    /// f32
    Float,
    /// f64
    Double,
    /// UTF-8 text, stored as a multi value of bytes.
    String,
}

impl FieldType {
    /// Bytes of one uncompressed element.
    pub fn element_size(&self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 | Self::String => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float => 4,
            Self::Int64 | Self::UInt64 | Self::Double => 8,
        }
    }
}

/// Lossy compression for float fields.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum CompressType {
    /// Stored as is.
    #[default]
    None,
    /// One shared exponent byte plus a 16 bit mantissa per element (fixed count multi values).
    BlockFp,
    /// IEEE half precision.
    Fp16,
    /// Signed byte scaled so that +/-scale maps to +/-127.
    Int8 {
        /// Largest magnitude expected.
        scale: f32,
    },
}

/// Scalar element of a field.
pub trait AttributeScalar: FixedBytes + PartialOrd + fmt::Display + Send + Sync + 'static {
    /// Field type for this scalar.
    const FIELD_TYPE: FieldType;

    /// Convert to f32 (compression input).
    fn to_f32(self) -> f32;

    /// Convert from f32 (compression output).
    fn from_f32(value: f32) -> Self;
}

macro_rules! attribute_scalar_impl {
    ($($t:ty => $field:ident),*) => {
        $(
            impl AttributeScalar for $t {
                const FIELD_TYPE: FieldType = FieldType::$field;

                #[inline(always)]
                fn to_f32(self) -> f32 {
                    self as f32
                }

                #[inline(always)]
                fn from_f32(value: f32) -> Self {
                    value as $t
                }
            }
        )*
    };
}

attribute_scalar_impl!(
    i8 => Int8, i16 => Int16, i32 => Int32, i64 => Int64,
    u8 => UInt8, u16 => UInt16, u32 => UInt32, u64 => UInt64,
    f32 => Float, f64 => Double
);

/// Field description used to build references and layouts.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    /// Field name, unique in a layout.
    pub name: String,
    /// Element type.
    pub field_type: FieldType,
    /// True for arrays (always true for strings).
    pub multi_value: bool,
    /// Element count for fixed count multi values.
    pub fixed_count: Option<u32>,
    /// Compression (float fields only).
    pub compress: CompressType,
}

impl FieldSpec {
    /// A single value field.
    pub fn single<S: Into<String>>(name: S, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            multi_value: field_type == FieldType::String,
            fixed_count: None,
            compress: CompressType::None,
        }
    }

    /// A multi value field with a variable count.
    pub fn multi<S: Into<String>>(name: S, field_type: FieldType) -> Self {
        Self {
            multi_value: true,
            ..Self::single(name, field_type)
        }
    }

    /// A multi value field with exactly count elements.
    pub fn fixed_multi<S: Into<String>>(name: S, field_type: FieldType, count: u32) -> Self {
        Self {
            fixed_count: Some(count),
            ..Self::multi(name, field_type)
        }
    }

    /// Set the compression.
    pub fn compress(mut self, compress: CompressType) -> Self {
        self.compress = compress;
        self
    }

    /// True if the field lives in the variable area of a record.
    pub fn is_variable(&self) -> bool {
        self.multi_value && self.fixed_count.is_none()
    }

    /// Bytes the field occupies in the fixed area, None for variable fields.
    pub fn fixed_len(&self) -> Option<usize> {
        let elem = compress::stored_element_size(self.field_type.element_size(), self.compress);
        match (self.multi_value, self.fixed_count) {
            (false, _) => Some(elem),
            (true, Some(count)) => {
                Some(compress::block_header_len(self.compress) + elem * count as usize)
            }
            (true, None) => None,
        }
    }
}

/// Type erased access to one field of a packed record.
pub trait AttributeReference: Send + Sync {
    /// Field name.
    fn name(&self) -> &str;

    /// Where the field lives.
    fn offset(&self) -> PackOffset;

    /// Element type.
    fn field_type(&self) -> FieldType;

    /// True for arrays and strings.
    fn is_multi_value(&self) -> bool;

    /// Element count of a fixed count multi value.
    fn fixed_count(&self) -> Option<u32>;

    /// Compression of the stored elements.
    fn compress_type(&self) -> CompressType;

    /// True if the field lives in the variable area.
    fn is_variable(&self) -> bool {
        self.is_multi_value() && self.fixed_count().is_none()
    }

    /// Bytes the wire value will occupy in the record.
    fn encoded_len(&self, wire: &[u8]) -> Result<usize, CodecError>;

    /// Store a wire value.  Variable fields are written at cursor, fixed fields at their
    /// offset.  Returns the cursor after the written data (unchanged for fixed fields).
    fn set_value(&self, base: &mut [u8], cursor: usize, wire: &[u8]) -> Result<usize, CodecError>;

    /// Read the field back in wire format.
    fn data_value(&self, base: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Bytes the field occupies in the record base.
    fn calculate_data_length(&self, base: &[u8]) -> Result<usize, CodecError>;

    /// True if the field in lhs orders before the field in rhs.
    fn less_than(&self, lhs: &[u8], rhs: &[u8]) -> Result<bool, CodecError>;

    /// True if the field holds the same value in lhs and rhs.
    fn equal(&self, lhs: &[u8], rhs: &[u8]) -> Result<bool, CodecError>;

    /// Render the field, multi values are joined with MULTI_VALUE_SEPARATOR.
    fn data_to_string(&self, base: &[u8]) -> Result<String, CodecError>;
}

/// Build the reference for spec located at offset.
pub fn create_reference(
    spec: &FieldSpec,
    offset: PackOffset,
) -> Result<Box<dyn AttributeReference>, CodecError> {
    match spec.field_type {
        FieldType::Int8 => typed_reference::<i8>(spec, offset),
        FieldType::Int16 => typed_reference::<i16>(spec, offset),
        FieldType::Int32 => typed_reference::<i32>(spec, offset),
        FieldType::Int64 => typed_reference::<i64>(spec, offset),
        FieldType::UInt8 => typed_reference::<u8>(spec, offset),
        FieldType::UInt16 => typed_reference::<u16>(spec, offset),
        FieldType::UInt32 => typed_reference::<u32>(spec, offset),
        FieldType::UInt64 => typed_reference::<u64>(spec, offset),
        FieldType::Float => typed_reference::<f32>(spec, offset),
        FieldType::Double => typed_reference::<f64>(spec, offset),
        FieldType::String => Ok(Box::new(MultiValueReference::new_string(
            spec.name.clone(),
            offset,
            spec.fixed_count,
        )?)),
    }
}

fn typed_reference<T: AttributeScalar>(
    spec: &FieldSpec,
    offset: PackOffset,
) -> Result<Box<dyn AttributeReference>, CodecError> {
    let name = spec.name.clone();
    Ok(match (spec.multi_value, spec.fixed_count) {
        (false, _) => Box::new(AttributeReferenceTyped::<T>::new(
            name,
            offset,
            spec.compress,
        )?),
        (true, Some(count)) => Box::new(MultiValueReference::<T>::new_fixed(
            name,
            offset,
            count,
            spec.compress,
        )?),
        (true, None) => {
            if spec.compress != CompressType::None {
                return Err(CodecError::Unsupported(
                    "compression on a variable count field",
                ));
            }
            Box::new(MultiValueReference::<T>::new_var(name, offset)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::count::encode_count;

    fn wire_i64s(values: &[i64]) -> Vec<u8> {
        let mut wire = vec![0_u8; 4];
        let len = encode_count(values.len() as u32, &mut wire).unwrap();
        wire.truncate(len);
        for v in values {
            wire.extend_from_slice(&v.to_le_bytes());
        }
        wire
    }

    #[test]
    fn test_fixed_len() {
        assert_eq!(FieldSpec::single("a", FieldType::Int16).fixed_len(), Some(2));
        assert_eq!(
            FieldSpec::single("a", FieldType::Float)
                .compress(CompressType::Fp16)
                .fixed_len(),
            Some(2)
        );
        assert_eq!(
            FieldSpec::fixed_multi("a", FieldType::Float, 4)
                .compress(CompressType::BlockFp)
                .fixed_len(),
            Some(9)
        );
        assert_eq!(FieldSpec::multi("a", FieldType::Int32).fixed_len(), None);
        assert!(FieldSpec::single("s", FieldType::String).is_variable());
    }

    #[test]
    fn test_create_reference_dispatch() {
        let normal = PackOffset::normal_offset(0, true).unwrap();
        let reference =
            create_reference(&FieldSpec::single("d", FieldType::Double), normal).unwrap();
        assert_eq!(reference.field_type(), FieldType::Double);
        assert!(!reference.is_multi_value());

        let reference =
            create_reference(&FieldSpec::multi("m", FieldType::Int64), normal).unwrap();
        assert!(reference.is_variable());
        let mut base = vec![0_u8; 64];
        let wire = wire_i64s(&[-1, 2, 3]);
        let end = reference.set_value(&mut base, 8, &wire).unwrap();
        assert_eq!(end, 8 + reference.encoded_len(&wire).unwrap());
        assert_eq!(reference.data_value(&base).unwrap(), wire);
        assert_eq!(
            reference.data_to_string(&base).unwrap(),
            format!("-1{0}2{0}3", MULTI_VALUE_SEPARATOR)
        );

        // Compression is only for floats.
        assert!(matches!(
            create_reference(
                &FieldSpec::single("i", FieldType::Int32).compress(CompressType::Fp16),
                normal
            ),
            Err(CodecError::Unsupported(_))
        ));
        assert!(matches!(
            create_reference(
                &FieldSpec::multi("f", FieldType::Float).compress(CompressType::Fp16),
                normal
            ),
            Err(CodecError::Unsupported(_))
        ));
    }
}
