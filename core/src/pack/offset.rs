//! The 64 bit PackOffset descriptor.
//!
//! Bit layout (least significant bit first), identical on every platform:
//!
//! | bits   | field      | meaning                                                   |
//! |--------|------------|-----------------------------------------------------------|
//! | 0..30  | offset     | byte offset of the field (or of the impact offset table)  |
//! | 30..46 | var_index  | index of this variable length field in the record         |
//! | 46..62 | var_num    | number of variable length fields in the record            |
//! | 62     | var_header | inverted: 0 means the field has a count header            |
//! | 63     | is_impact  | 1 for the compact impact offset table format              |

use crate::error::codec::CodecError;
use std::fmt;

const OFFSET_BITS: u32 = 30;
const VAR_INDEX_SHIFT: u32 = 30;
const VAR_NUM_SHIFT: u32 = 46;
const VAR_HEADER_SHIFT: u32 = 62;
const IMPACT_SHIFT: u32 = 63;
const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;
const U16_MASK: u64 = 0xffff;

/// Locates one field inside a packed record buffer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackOffset(u64);

impl PackOffset {
    /// Largest offset that fits in the 30 bit field.
    pub const MAX_OFFSET: usize = OFFSET_MASK as usize;

    /// Offset for a fixed field, or a variable field in normal format (8 byte cursor slot at
    /// offset).
    pub fn normal_offset(offset: usize, need_header: bool) -> Result<Self, CodecError> {
        if offset > Self::MAX_OFFSET {
            return Err(CodecError::OffsetOutOfRange("offset"));
        }
        let mut raw = offset as u64;
        if !need_header {
            raw |= 1 << VAR_HEADER_SHIFT;
        }
        Ok(Self(raw))
    }

    /// Offset for variable field var_index of var_num in impact format.  offset is the position
    /// of the shared offset table (the width byte).  The last variable field always gets a count
    /// header since its length is not stored in the offset table.
    pub fn impact_offset(
        offset: usize,
        var_index: usize,
        var_num: usize,
        need_header: bool,
    ) -> Result<Self, CodecError> {
        if offset > Self::MAX_OFFSET {
            return Err(CodecError::OffsetOutOfRange("offset"));
        }
        if var_num == 0 || var_num > u16::MAX as usize {
            return Err(CodecError::OffsetOutOfRange("var_num"));
        }
        if var_index >= var_num {
            return Err(CodecError::OffsetOutOfRange("var_index"));
        }
        let is_last_var_field = var_index + 1 == var_num;
        let need_header = is_last_var_field || need_header;
        let mut raw = offset as u64
            | (var_index as u64) << VAR_INDEX_SHIFT
            | (var_num as u64) << VAR_NUM_SHIFT
            | 1 << IMPACT_SHIFT;
        if !need_header {
            raw |= 1 << VAR_HEADER_SHIFT;
        }
        Ok(Self(raw))
    }

    /// True for the impact (shared offset table) format.
    #[inline(always)]
    pub fn is_impact_format(&self) -> bool {
        (self.0 >> IMPACT_SHIFT) & 1 == 1
    }

    /// Byte offset of the field (or of the impact offset table).
    #[inline(always)]
    pub fn offset(&self) -> usize {
        (self.0 & OFFSET_MASK) as usize
    }

    /// Index of the variable field this describes.
    #[inline(always)]
    pub fn var_index(&self) -> usize {
        ((self.0 >> VAR_INDEX_SHIFT) & U16_MASK) as usize
    }

    /// Number of variable fields in the record.
    #[inline(always)]
    pub fn var_num(&self) -> usize {
        ((self.0 >> VAR_NUM_SHIFT) & U16_MASK) as usize
    }

    /// True if the variable data starts with an encoded count.
    #[inline(always)]
    pub fn need_var_len_header(&self) -> bool {
        (self.0 >> VAR_HEADER_SHIFT) & 1 == 0
    }

    /// True if this is the last variable field of an impact record.
    #[inline(always)]
    pub fn is_last_var_field(&self) -> bool {
        self.var_index() + 1 == self.var_num()
    }

    /// Raw 64 bit representation.
    #[inline(always)]
    pub fn to_u64(&self) -> u64 {
        self.0
    }

    /// Rebuild from the raw 64 bit representation.
    #[inline(always)]
    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for PackOffset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PackOffset")
            .field("offset", &self.offset())
            .field("var_index", &self.var_index())
            .field("var_num", &self.var_num())
            .field("need_header", &self.need_var_len_header())
            .field("impact", &self.is_impact_format())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normal_offset() {
        let p = PackOffset::normal_offset(100, true).unwrap();
        assert!(!p.is_impact_format());
        assert_eq!(p.offset(), 100);
        assert!(p.need_var_len_header());
        let p = PackOffset::normal_offset(7, false).unwrap();
        assert!(!p.need_var_len_header());
        assert_eq!(p.to_u64(), 7 | 1 << 62);
        assert!(PackOffset::normal_offset(PackOffset::MAX_OFFSET + 1, true).is_err());
        // The zero value is a normal offset at 0 with a header.
        let p = PackOffset::default();
        assert_eq!(p.offset(), 0);
        assert!(p.need_var_len_header());
    }

    #[test]
    fn test_impact_last_field_forces_header() {
        let p = PackOffset::impact_offset(16, 2, 3, false).unwrap();
        assert!(p.is_impact_format());
        assert!(p.is_last_var_field());
        assert!(p.need_var_len_header());
        let p = PackOffset::impact_offset(16, 1, 3, false).unwrap();
        assert!(!p.need_var_len_header());
        assert!(PackOffset::impact_offset(16, 3, 3, true).is_err());
        assert!(PackOffset::impact_offset(16, 0, 0, true).is_err());
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            offset in 0..=PackOffset::MAX_OFFSET,
            var_num in 1_usize..=u16::MAX as usize,
            idx_seed in any::<u16>(),
            need_header in any::<bool>(),
            impact in any::<bool>(),
        ) {
            let p = if impact {
                PackOffset::impact_offset(offset, idx_seed as usize % var_num, var_num, need_header)
                    .unwrap()
            } else {
                PackOffset::normal_offset(offset, need_header).unwrap()
            };
            let q = PackOffset::from_u64(p.to_u64());
            prop_assert_eq!(p, q);
            prop_assert_eq!(q.offset(), offset);
            prop_assert_eq!(q.is_impact_format(), impact);
            prop_assert_eq!(q.need_var_len_header(), p.need_var_len_header());
            prop_assert_eq!(q.var_index(), p.var_index());
            prop_assert_eq!(q.var_num(), p.var_num());
            if impact {
                prop_assert_eq!(q.var_num(), var_num);
                prop_assert_eq!(q.var_index(), idx_seed as usize % var_num);
            }
        }
    }
}
