//! Multi value (array and string) field reference.
//!
//! Fixed count fields live in the fixed area at their offset with no count header.  Variable
//! count fields live in the variable area; they carry a count header unless their PackOffset
//! says the length comes from the impact offset table.

use crate::attribute::compress::{
    block_exponent, block_header_len, check_compress, decode_element, encode_element,
    stored_element_size,
};
use crate::attribute::count::{count_header_len, decode_count, encode_count};
use crate::attribute::{
    AttributeReference, AttributeScalar, CompressType, FieldType, MULTI_VALUE_SEPARATOR,
};
use crate::err_info;
use crate::error::codec::CodecError;
use crate::pack::{PackDataFormatter, PackOffset};
use std::cmp::Ordering;
use std::marker::PhantomData;

/// Borrowed view of the elements of a multi value.
#[derive(Clone, Copy, Debug)]
pub struct MultiValueView<'a, T: AttributeScalar> {
    data: &'a [u8],
    count: usize,
    compress: CompressType,
    exponent: i8,
    _value: PhantomData<T>,
}

impl<'a, T: AttributeScalar> MultiValueView<'a, T> {
    /// Number of elements.
    pub fn len(&self) -> usize {
        self.count
    }

    /// True if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Element idx.
    pub fn get(&self, idx: usize) -> Option<T> {
        if idx >= self.count {
            return None;
        }
        let size = stored_element_size(T::SIZE, self.compress);
        Some(decode_element(
            &self.data[idx * size..],
            self.compress,
            self.exponent,
        ))
    }

    /// Iterate the elements.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.count).filter_map(move |idx| self.get(idx))
    }

    /// Copy the elements out.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Stored element bytes (compressed form for compressed fields).
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    fn compare(&self, other: &Self) -> Ordering {
        for (a, b) in self.iter().zip(other.iter()) {
            match a.partial_cmp(&b) {
                Some(Ordering::Equal) => {}
                Some(ord) => return ord,
                None => return Ordering::Equal,
            }
        }
        self.count.cmp(&other.count)
    }
}

/// Where a multi value sits in a record.
struct Located {
    start: usize,
    count: usize,
    header_len: usize,
}

/// Reference to an array field.
pub struct MultiValueReference<T: AttributeScalar> {
    name: String,
    offset: PackOffset,
    fixed_count: Option<u32>,
    compress: CompressType,
    string: bool,
    _value: PhantomData<T>,
}

impl<T: AttributeScalar> MultiValueReference<T> {
    /// Field with exactly count elements stored at a normal format offset.
    pub fn new_fixed<S: Into<String>>(
        name: S,
        offset: PackOffset,
        count: u32,
        compress: CompressType,
    ) -> Result<Self, CodecError> {
        if offset.is_impact_format() {
            return Err(CodecError::FormatMismatch {
                expected_impact: false,
            });
        }
        check_compress::<T>(compress, true)?;
        Ok(Self {
            name: name.into(),
            offset,
            fixed_count: Some(count),
            compress,
            string: false,
            _value: PhantomData,
        })
    }

    /// Field with a variable number of elements (normal or impact format).
    pub fn new_var<S: Into<String>>(name: S, offset: PackOffset) -> Result<Self, CodecError> {
        Ok(Self {
            name: name.into(),
            offset,
            fixed_count: None,
            compress: CompressType::None,
            string: false,
            _value: PhantomData,
        })
    }

    fn element_size(&self) -> usize {
        stored_element_size(T::SIZE, self.compress)
    }

    fn has_count_header(&self) -> bool {
        self.fixed_count.is_none() && self.offset.need_var_len_header()
    }

    fn locate(&self, base: &[u8]) -> Result<Located, CodecError> {
        if let Some(count) = self.fixed_count {
            let start = self.offset.offset();
            check_len(
                base,
                start + block_header_len(self.compress) + count as usize * self.element_size(),
            )?;
            return Ok(Located {
                start,
                count: count as usize,
                header_len: 0,
            });
        }
        let start = PackDataFormatter::get_var_len_data_cursor(&self.offset, base)?;
        let (count, header_len) = if self.has_count_header() {
            let (count, header_len) = decode_count(&base[start..])?;
            (count as usize, header_len)
        } else {
            let len = PackDataFormatter::get_impact_var_len_data_len(&self.offset, base)?;
            if len % T::SIZE != 0 {
                return Err(CodecError::Corruption {
                    info: err_info!(),
                    reason: "var len data not a multiple of the element size",
                });
            }
            (len / T::SIZE, 0)
        };
        check_len(base, start + header_len + count * T::SIZE)?;
        Ok(Located {
            start,
            count,
            header_len,
        })
    }

    /// View of the elements stored in base.
    pub fn get_value<'a>(&self, base: &'a [u8]) -> Result<MultiValueView<'a, T>, CodecError> {
        let located = self.locate(base)?;
        let mut data_start = located.start + located.header_len;
        let exponent = if self.compress == CompressType::BlockFp {
            data_start += 1;
            base[located.start] as i8
        } else {
            0
        };
        let data_end = data_start + located.count * self.element_size();
        Ok(MultiValueView {
            data: &base[data_start..data_end],
            count: located.count,
            compress: self.compress,
            exponent,
            _value: PhantomData,
        })
    }

    /// Number of elements stored in base.
    pub fn count(&self, base: &[u8]) -> Result<u32, CodecError> {
        Ok(self.locate(base)?.count as u32)
    }

    /// Store values.  Variable fields are written at cursor, returns the cursor after the data.
    pub fn set_data_value(
        &self,
        base: &mut [u8],
        cursor: usize,
        values: &[T],
    ) -> Result<usize, CodecError> {
        self.write_elements(base, cursor, values.len(), |idx| values[idx])
    }

    fn write_elements<F>(
        &self,
        base: &mut [u8],
        cursor: usize,
        count: usize,
        element: F,
    ) -> Result<usize, CodecError>
    where
        F: Fn(usize) -> T,
    {
        if count > u32::MAX as usize {
            return Err(CodecError::InvalidCount(u32::MAX));
        }
        if let Some(fixed) = self.fixed_count {
            if fixed as usize != count {
                return Err(CodecError::InvalidCount(count as u32));
            }
            let mut pos = self.offset.offset();
            let size = self.element_size();
            check_len(base, pos + block_header_len(self.compress) + count * size)?;
            let exponent = if self.compress == CompressType::BlockFp {
                let exponent = block_exponent((0..count).map(&element));
                base[pos] = exponent as u8;
                pos += 1;
                exponent
            } else {
                0
            };
            for idx in 0..count {
                encode_element(element(idx), self.compress, exponent, &mut base[pos..]);
                pos += size;
            }
            return Ok(cursor);
        }
        let header_len = if self.has_count_header() {
            count_header_len(count as u32)?
        } else {
            0
        };
        let end = cursor + header_len + count * T::SIZE;
        check_len(base, end)?;
        if header_len > 0 {
            encode_count(count as u32, &mut base[cursor..])?;
        }
        let mut pos = cursor + header_len;
        for idx in 0..count {
            element(idx).write_le(&mut base[pos..]);
            pos += T::SIZE;
        }
        PackDataFormatter::set_var_len_offset(&self.offset, base, cursor)?;
        Ok(end)
    }

    /// Split a wire value into its count and element bytes.
    fn split_wire<'w>(&self, wire: &'w [u8]) -> Result<(usize, &'w [u8]), CodecError> {
        let (count, header_len) = decode_count(wire)?;
        let payload = &wire[header_len..];
        if payload.len() != count as usize * T::SIZE {
            return Err(CodecError::InvalidCount(count));
        }
        if let Some(fixed) = self.fixed_count {
            if fixed != count {
                return Err(CodecError::InvalidCount(count));
            }
        }
        Ok((count as usize, payload))
    }
}

impl MultiValueReference<u8> {
    /// UTF-8 string field, fixed_count makes it a fixed length byte array.
    pub fn new_string<S: Into<String>>(
        name: S,
        offset: PackOffset,
        fixed_count: Option<u32>,
    ) -> Result<Self, CodecError> {
        let mut reference = match fixed_count {
            Some(count) => Self::new_fixed(name, offset, count, CompressType::None)?,
            None => Self::new_var(name, offset)?,
        };
        reference.string = true;
        Ok(reference)
    }
}

impl<T: AttributeScalar> AttributeReference for MultiValueReference<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn offset(&self) -> PackOffset {
        self.offset
    }

    fn field_type(&self) -> FieldType {
        if self.string {
            FieldType::String
        } else {
            T::FIELD_TYPE
        }
    }

    fn is_multi_value(&self) -> bool {
        true
    }

    fn fixed_count(&self) -> Option<u32> {
        self.fixed_count
    }

    fn compress_type(&self) -> CompressType {
        self.compress
    }

    fn encoded_len(&self, wire: &[u8]) -> Result<usize, CodecError> {
        let (count, _) = self.split_wire(wire)?;
        if self.fixed_count.is_some() {
            return Ok(block_header_len(self.compress) + count * self.element_size());
        }
        let header_len = if self.has_count_header() {
            count_header_len(count as u32)?
        } else {
            0
        };
        Ok(header_len + count * T::SIZE)
    }

    fn set_value(&self, base: &mut [u8], cursor: usize, wire: &[u8]) -> Result<usize, CodecError> {
        let (count, payload) = self.split_wire(wire)?;
        self.write_elements(base, cursor, count, |idx| {
            T::read_le(&payload[idx * T::SIZE..])
        })
    }

    fn data_value(&self, base: &[u8]) -> Result<Vec<u8>, CodecError> {
        let view = self.get_value(base)?;
        let header_len = count_header_len(view.len() as u32)?;
        let mut wire = vec![0_u8; header_len + view.len() * T::SIZE];
        encode_count(view.len() as u32, &mut wire)?;
        for (idx, value) in view.iter().enumerate() {
            value.write_le(&mut wire[header_len + idx * T::SIZE..]);
        }
        Ok(wire)
    }

    fn calculate_data_length(&self, base: &[u8]) -> Result<usize, CodecError> {
        let located = self.locate(base)?;
        Ok(located.header_len
            + block_header_len(self.compress)
            + located.count * self.element_size())
    }

    fn less_than(&self, lhs: &[u8], rhs: &[u8]) -> Result<bool, CodecError> {
        let lhs = self.get_value(lhs)?;
        let rhs = self.get_value(rhs)?;
        Ok(lhs.compare(&rhs) == Ordering::Less)
    }

    fn equal(&self, lhs: &[u8], rhs: &[u8]) -> Result<bool, CodecError> {
        let lhs = self.get_value(lhs)?;
        let rhs = self.get_value(rhs)?;
        Ok(lhs.len() == rhs.len() && lhs.iter().zip(rhs.iter()).all(|(a, b)| a == b))
    }

    fn data_to_string(&self, base: &[u8]) -> Result<String, CodecError> {
        let view = self.get_value(base)?;
        if self.string {
            return Ok(String::from_utf8_lossy(view.as_bytes()).into_owned());
        }
        let parts: Vec<String> = view.iter().map(|v| v.to_string()).collect();
        Ok(parts.join(&MULTI_VALUE_SEPARATOR.to_string()))
    }
}

fn check_len(base: &[u8], needed: usize) -> Result<(), CodecError> {
    if base.len() < needed {
        Err(CodecError::BufferTooSmall {
            needed,
            actual: base.len(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn wire_for<T: AttributeScalar>(values: &[T]) -> Vec<u8> {
        let header_len = count_header_len(values.len() as u32).unwrap();
        let mut wire = vec![0_u8; header_len + values.len() * T::SIZE];
        encode_count(values.len() as u32, &mut wire).unwrap();
        for (idx, v) in values.iter().enumerate() {
            v.write_le(&mut wire[header_len + idx * T::SIZE..]);
        }
        wire
    }

    #[test]
    fn test_fixed_count_round_trip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let values: Vec<i32> = (0..6).map(|_| rng.gen()).collect();
        let reference = MultiValueReference::<i32>::new_fixed(
            "fixed",
            PackOffset::normal_offset(2, true).unwrap(),
            6,
            CompressType::None,
        )
        .unwrap();
        let mut base = vec![0_u8; 2 + 24];
        let cursor = reference.set_value(&mut base, 99, &wire_for(&values)).unwrap();
        assert_eq!(cursor, 99);
        assert_eq!(reference.get_value(&base).unwrap().to_vec(), values);
        assert_eq!(reference.calculate_data_length(&base).unwrap(), 24);
        assert!(matches!(
            reference.set_data_value(&mut base, 0, &values[..5]),
            Err(CodecError::InvalidCount(5))
        ));
    }

    #[test]
    fn test_var_normal_round_trip() {
        let values: Vec<i32> = vec![5, -6, 7];
        let reference =
            MultiValueReference::<i32>::new_var("var", PackOffset::normal_offset(0, true).unwrap())
                .unwrap();
        let mut base = vec![0_u8; 8 + 1 + 12];
        let end = reference.set_value(&mut base, 8, &wire_for(&values)).unwrap();
        assert_eq!(end, base.len());
        let view = reference.get_value(&base).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.get(1), Some(-6));
        assert_eq!(view.get(3), None);
        assert_eq!(reference.count(&base).unwrap(), 3);
        assert_eq!(reference.data_value(&base).unwrap(), wire_for(&values));
        assert_eq!(reference.calculate_data_length(&base).unwrap(), 13);
    }

    #[test]
    fn test_var_impact_round_trip() {
        // Two impact fields: the first has no count header, the second (last) has one.
        let first = MultiValueReference::<i32>::new_var(
            "a",
            PackOffset::impact_offset(0, 0, 2, false).unwrap(),
        )
        .unwrap();
        let second = MultiValueReference::<i32>::new_var(
            "b",
            PackOffset::impact_offset(0, 1, 2, false).unwrap(),
        )
        .unwrap();
        let a = vec![1, 2, 3, 4];
        let b = vec![9];
        let table_len = PackDataFormatter::impact_table_len(2, 1);
        let mut base = vec![0_u8; table_len + 16 + 1 + 4];
        PackDataFormatter::write_offset_len(&first.offset(), &mut base, 1).unwrap();
        let cursor = first.set_value(&mut base, table_len, &wire_for(&a)).unwrap();
        assert_eq!(cursor, table_len + 16);
        let end = second.set_data_value(&mut base, cursor, &b).unwrap();
        assert_eq!(end, base.len());
        assert_eq!(first.get_value(&base).unwrap().to_vec(), a);
        assert_eq!(second.get_value(&base).unwrap().to_vec(), b);
        assert_eq!(first.calculate_data_length(&base).unwrap(), 16);
        assert_eq!(first.encoded_len(&wire_for(&a)).unwrap(), 16);
        assert_eq!(second.encoded_len(&wire_for(&b)).unwrap(), 5);
    }

    #[test]
    fn test_compressed_fixed_floats() {
        let values = [1.0_f32, -0.5, 0.25, 8.0];
        let offset = PackOffset::normal_offset(0, true).unwrap();
        for compress in [
            CompressType::BlockFp,
            CompressType::Fp16,
            CompressType::Int8 { scale: 8.0 },
        ] {
            let reference =
                MultiValueReference::<f32>::new_fixed("f", offset, 4, compress).unwrap();
            let mut base = vec![0_u8; 16];
            reference.set_data_value(&mut base, 0, &values).unwrap();
            let back = reference.get_value(&base).unwrap().to_vec();
            for (v, b) in values.iter().zip(back.iter()) {
                assert!((v - b).abs() < 0.07, "{:?} {} {}", compress, v, b);
            }
        }
    }

    #[test]
    fn test_string_and_compare() {
        let offset = PackOffset::normal_offset(0, true).unwrap();
        let reference = MultiValueReference::new_string("s", offset, None).unwrap();
        assert_eq!(reference.field_type(), FieldType::String);
        let mut lhs = vec![0_u8; 32];
        let mut rhs = vec![0_u8; 32];
        reference.set_data_value(&mut lhs, 8, b"apple").unwrap();
        reference.set_data_value(&mut rhs, 8, b"apricot").unwrap();
        assert_eq!(reference.data_to_string(&lhs).unwrap(), "apple");
        assert!(reference.less_than(&lhs, &rhs).unwrap());
        assert!(!reference.less_than(&rhs, &lhs).unwrap());
        assert!(!reference.equal(&lhs, &rhs).unwrap());
        assert!(reference.equal(&lhs, &lhs).unwrap());
    }

    #[test]
    fn test_bad_wire() {
        let reference =
            MultiValueReference::<u16>::new_var("v", PackOffset::normal_offset(0, true).unwrap())
                .unwrap();
        let mut base = vec![0_u8; 32];
        // Count says 3, payload holds 2.
        assert!(matches!(
            reference.set_value(&mut base, 8, &[3, 1, 0, 2, 0]),
            Err(CodecError::InvalidCount(3))
        ));
        // Record too short for the data.
        assert!(matches!(
            reference.set_data_value(&mut base[..10], 8, &[1, 2]),
            Err(CodecError::BufferTooSmall { .. })
        ));
    }
}
