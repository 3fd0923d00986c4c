//! Record layout for a set of fields.
//!
//! Fixed width fields (single values and fixed count multi values) come first in schema order.
//! The variable area follows: in normal format one 8 byte cursor slot per variable field then
//! the data, in impact format the shared offset table then the data.  The impact offset width
//! is picked per record from the data it has to address.

use crate::attribute::{create_reference, AttributeReference, FieldSpec};
use crate::error::codec::CodecError;
use crate::pack::{PackDataFormatter, PackOffset, NORMAL_OFFSET_SLOT_SIZE};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Offsets and references for every field of a record schema.
pub struct PackLayout {
    references: Vec<Box<dyn AttributeReference>>,
    names: FxHashMap<String, usize>,
    /// Schema indexes of the variable fields in var_index order.
    var_fields: Vec<usize>,
    fixed_len: usize,
    impact: bool,
}

impl PackLayout {
    /// Lay out fields, variable fields use the impact format if impact is set.
    pub fn new(fields: &[FieldSpec], impact: bool) -> Result<Self, CodecError> {
        let mut names = FxHashMap::default();
        let mut offsets = vec![PackOffset::default(); fields.len()];
        let mut var_fields = Vec::new();
        let mut fixed_len = 0;
        for (idx, field) in fields.iter().enumerate() {
            if names.insert(field.name.clone(), idx).is_some() {
                return Err(CodecError::Unsupported("duplicate field name"));
            }
            match field.fixed_len() {
                Some(len) => {
                    offsets[idx] = PackOffset::normal_offset(fixed_len, true)?;
                    fixed_len += len;
                }
                None => var_fields.push(idx),
            }
        }
        let var_num = var_fields.len();
        for (var_index, idx) in var_fields.iter().enumerate() {
            offsets[*idx] = if impact {
                PackOffset::impact_offset(fixed_len, var_index, var_num, false)?
            } else {
                PackOffset::normal_offset(fixed_len + var_index * NORMAL_OFFSET_SLOT_SIZE, true)?
            };
        }
        let references = fields
            .iter()
            .zip(offsets)
            .map(|(field, offset)| create_reference(field, offset))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(fields = fields.len(), var_num, fixed_len, impact, "pack layout");
        Ok(Self {
            references,
            names,
            var_fields,
            fixed_len,
            impact,
        })
    }

    /// Bytes of the fixed area.
    pub fn fixed_len(&self) -> usize {
        self.fixed_len
    }

    /// Number of variable fields.
    pub fn var_num(&self) -> usize {
        self.var_fields.len()
    }

    /// True if variable fields use the impact format.
    pub fn is_impact(&self) -> bool {
        self.impact
    }

    /// Reference for the field called name.
    pub fn reference(&self, name: &str) -> Option<&dyn AttributeReference> {
        self.names
            .get(name)
            .map(|idx| self.references[*idx].as_ref())
    }

    /// References in schema order.
    pub fn references(&self) -> impl Iterator<Item = &dyn AttributeReference> {
        self.references.iter().map(|r| r.as_ref())
    }

    /// Build a record from wire values given in schema order.
    pub fn format_record(&self, values: &[&[u8]]) -> Result<Vec<u8>, CodecError> {
        if values.len() != self.references.len() {
            return Err(CodecError::InvalidCount(values.len() as u32));
        }
        let var_lens = self
            .var_fields
            .iter()
            .map(|idx| self.references[*idx].encoded_len(values[*idx]))
            .collect::<Result<Vec<_>, _>>()?;
        let var_num = self.var_fields.len();
        let (offset_len, table_len) = if !self.impact {
            (0, var_num * NORMAL_OFFSET_SLOT_SIZE)
        } else if var_num > 1 {
            let addressed: usize = var_lens[..var_num - 1].iter().sum();
            let offset_len = PackDataFormatter::offset_len_for(addressed)?;
            (
                offset_len,
                PackDataFormatter::impact_table_len(var_num, offset_len),
            )
        } else {
            (0, 0)
        };
        let data_start = self.fixed_len + table_len;
        let mut record = vec![0_u8; data_start + var_lens.iter().sum::<usize>()];
        for (reference, value) in self.references.iter().zip(values) {
            if !reference.is_variable() {
                reference.set_value(&mut record, 0, value)?;
            }
        }
        if offset_len > 0 {
            let first = self.references[self.var_fields[0]].offset();
            PackDataFormatter::write_offset_len(&first, &mut record, offset_len)?;
        }
        let mut cursor = data_start;
        for idx in &self.var_fields {
            cursor = self.references[*idx].set_value(&mut record, cursor, values[*idx])?;
        }
        Ok(record)
    }

    /// Read every field of record back as wire values in schema order.
    pub fn read_record(&self, record: &[u8]) -> Result<Vec<Vec<u8>>, CodecError> {
        self.references
            .iter()
            .map(|reference| reference.data_value(record))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::count::{count_header_len, encode_count};
    use crate::attribute::{CompressType, FieldType};
    use crate::table_bytes::FixedBytes;
    use rand::{Rng, SeedableRng};

    fn wire_for<T: FixedBytes>(values: &[T]) -> Vec<u8> {
        let header_len = count_header_len(values.len() as u32).unwrap();
        let mut wire = vec![0_u8; header_len + values.len() * T::SIZE];
        encode_count(values.len() as u32, &mut wire).unwrap();
        for (idx, v) in values.iter().enumerate() {
            v.write_le(&mut wire[header_len + idx * T::SIZE..]);
        }
        wire
    }

    fn schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::single("id", FieldType::UInt64),
            FieldSpec::multi("tags", FieldType::Int32),
            FieldSpec::fixed_multi("vec", FieldType::Int32, 3),
            FieldSpec::single("title", FieldType::String),
            FieldSpec::multi("scores", FieldType::Int32),
        ]
    }

    fn check_round_trip(impact: bool, seed: u64) {
        let layout = PackLayout::new(&schema(), impact).unwrap();
        assert_eq!(layout.fixed_len(), 8 + 12);
        assert_eq!(layout.var_num(), 3);
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        for _ in 0..20 {
            let tags: Vec<i32> = (0..rng.gen_range(0..80)).map(|_| rng.gen()).collect();
            let vec: Vec<i32> = (0..3).map(|_| rng.gen()).collect();
            let title: Vec<u8> = (0..rng.gen_range(0..20))
                .map(|_| rng.gen_range(b'a'..=b'z'))
                .collect();
            let scores: Vec<i32> = (0..rng.gen_range(0..5)).map(|_| rng.gen()).collect();
            let id: u64 = rng.gen();
            let wires = vec![
                id.to_le_bytes().to_vec(),
                wire_for(&tags),
                wire_for(&vec),
                wire_for(&title),
                wire_for(&scores),
            ];
            let refs: Vec<&[u8]> = wires.iter().map(|w| w.as_slice()).collect();
            let record = layout.format_record(&refs).unwrap();
            assert_eq!(layout.read_record(&record).unwrap(), wires);
            let title_ref = layout.reference("title").unwrap();
            assert_eq!(
                title_ref.data_to_string(&record).unwrap(),
                String::from_utf8(title.clone()).unwrap()
            );
        }
    }

    #[test]
    fn test_normal_layout_round_trip() {
        check_round_trip(false, 1);
    }

    #[test]
    fn test_impact_layout_round_trip() {
        check_round_trip(true, 2);
    }

    #[test]
    fn test_impact_width_follows_data() {
        let fields = vec![
            FieldSpec::multi("a", FieldType::UInt8),
            FieldSpec::multi("b", FieldType::UInt8),
        ];
        let layout = PackLayout::new(&fields, true).unwrap();
        let small = wire_for(&[1_u8; 10]);
        let large = wire_for(&[2_u8; 300]);
        let record = layout.format_record(&[small.as_slice(), large.as_slice()]).unwrap();
        assert_eq!(record[0], 1);
        let record = layout.format_record(&[large.as_slice(), small.as_slice()]).unwrap();
        assert_eq!(record[0], 2);
        assert_eq!(layout.read_record(&record).unwrap(), vec![large, small]);
    }

    #[test]
    fn test_single_var_field_impact() {
        let fields = vec![
            FieldSpec::single("x", FieldType::Float).compress(CompressType::Fp16),
            FieldSpec::multi("only", FieldType::Int64),
        ];
        let layout = PackLayout::new(&fields, true).unwrap();
        let only = wire_for(&[10_i64, 20]);
        let x = 2.5_f32.to_le_bytes();
        let record = layout.format_record(&[&x[..], only.as_slice()]).unwrap();
        // fp16 value, then count header and data with no offset table.
        assert_eq!(record.len(), 2 + 1 + 16);
        assert_eq!(layout.read_record(&record).unwrap(), vec![x.to_vec(), only]);
    }

    #[test]
    fn test_layout_errors() {
        let fields = vec![
            FieldSpec::single("a", FieldType::Int8),
            FieldSpec::single("a", FieldType::Int16),
        ];
        assert!(PackLayout::new(&fields, false).is_err());
        let layout = PackLayout::new(&schema(), false).unwrap();
        assert!(matches!(
            layout.format_record(&[]),
            Err(CodecError::InvalidCount(0))
        ));
        assert!(layout.reference("missing").is_none());
    }
}
