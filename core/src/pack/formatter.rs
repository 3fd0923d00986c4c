//! Locate variable length data inside a packed record.
//!
//! Normal format: every variable field owns an 8 byte slot at its PackOffset holding the
//! distance (i64) from the slot to the field data.
//!
//! Impact format: the variable area starts with a one byte offset width (1, 2 or 4) followed by
//! var_num - 1 offsets of that width.  Offset i - 1 is the start of field i relative to the end
//! of the table, field 0 starts right at the end of the table.  With a single variable field
//! there is no table at all and the field starts at the PackOffset.

use crate::err_info;
use crate::error::codec::CodecError;
use crate::pack::offset::PackOffset;
use crate::table_bytes::{read_u16, read_u32, FixedBytes};

/// Size of the cursor slot used by normal format variable fields.
pub const NORMAL_OFFSET_SLOT_SIZE: usize = std::mem::size_of::<i64>();

/// Codec for the offsets of variable length fields.
pub struct PackDataFormatter;

impl PackDataFormatter {
    /// Smallest offset width (1, 2 or 4 bytes) that can hold max_offset.
    pub fn offset_len_for(max_offset: usize) -> Result<u8, CodecError> {
        if max_offset <= u8::MAX as usize {
            Ok(1)
        } else if max_offset <= u16::MAX as usize {
            Ok(2)
        } else if max_offset <= u32::MAX as usize {
            Ok(4)
        } else {
            Err(CodecError::WidthOverflow {
                width: 4,
                value: max_offset as u64,
            })
        }
    }

    /// Bytes used by the impact offset table (width byte plus offsets) for var_num fields.
    pub fn impact_table_len(var_num: usize, offset_len: u8) -> usize {
        if var_num <= 1 {
            0
        } else {
            1 + offset_len as usize * (var_num - 1)
        }
    }

    /// Write the offset width tag for an impact record.  Any PackOffset of the record can be
    /// used since they share the table position.  No-op for single variable field records.
    pub fn write_offset_len(
        p_offset: &PackOffset,
        base: &mut [u8],
        offset_len: u8,
    ) -> Result<(), CodecError> {
        Self::check_impact(p_offset, true)?;
        if p_offset.var_num() <= 1 {
            return Ok(());
        }
        check_width(offset_len)?;
        let pos = p_offset.offset();
        check_len(base, pos + Self::impact_table_len(p_offset.var_num(), offset_len))?;
        base[pos] = offset_len;
        Ok(())
    }

    /// Record that the field described by p_offset starts at data_cursor (absolute position in
    /// base).  For impact records field 0 has an implicit start so this is a no-op.
    pub fn set_var_len_offset(
        p_offset: &PackOffset,
        base: &mut [u8],
        data_cursor: usize,
    ) -> Result<(), CodecError> {
        if p_offset.is_impact_format() {
            let var_index = p_offset.var_index();
            if var_index == 0 {
                return Ok(());
            }
            let pos = p_offset.offset();
            check_len(base, pos + 1)?;
            let offset_len = base[pos];
            check_width(offset_len)?;
            let table_end = pos + Self::impact_table_len(p_offset.var_num(), offset_len);
            if data_cursor < table_end {
                return Err(CodecError::Corruption {
                    info: err_info!(),
                    reason: "data cursor before end of offset table",
                });
            }
            let value = (data_cursor - table_end) as u64;
            let slot = pos + 1 + offset_len as usize * (var_index - 1);
            check_len(base, slot + offset_len as usize)?;
            match offset_len {
                1 => {
                    if value > u8::MAX as u64 {
                        return Err(CodecError::WidthOverflow { width: 1, value });
                    }
                    base[slot] = value as u8;
                }
                2 => {
                    if value > u16::MAX as u64 {
                        return Err(CodecError::WidthOverflow { width: 2, value });
                    }
                    (value as u16).write_le(&mut base[slot..]);
                }
                _ => {
                    if value > u32::MAX as u64 {
                        return Err(CodecError::WidthOverflow { width: 4, value });
                    }
                    (value as u32).write_le(&mut base[slot..]);
                }
            }
            return Ok(());
        }
        let pos = p_offset.offset();
        if data_cursor < pos {
            return Err(CodecError::Corruption {
                info: err_info!(),
                reason: "data cursor before offset slot",
            });
        }
        check_len(base, pos + NORMAL_OFFSET_SLOT_SIZE)?;
        ((data_cursor - pos) as i64).write_le(&mut base[pos..]);
        Ok(())
    }

    /// Absolute position in base where the field described by p_offset starts.
    pub fn get_var_len_data_cursor(
        p_offset: &PackOffset,
        base: &[u8],
    ) -> Result<usize, CodecError> {
        let pos = p_offset.offset();
        if p_offset.is_impact_format() {
            let var_num = p_offset.var_num();
            if var_num == 1 {
                return Ok(pos);
            }
            check_len(base, pos + 1)?;
            let offset_len = base[pos];
            check_width(offset_len)?;
            let table_end = pos + Self::impact_table_len(var_num, offset_len);
            let var_index = p_offset.var_index();
            if var_index == 0 {
                return Ok(table_end);
            }
            let value = read_table_entry(base, pos, offset_len, var_index - 1)?;
            return checked_cursor(base, table_end + value);
        }
        check_len(base, pos + NORMAL_OFFSET_SLOT_SIZE)?;
        let value = i64::read_le(&base[pos..]);
        if value < 0 {
            return Err(CodecError::Corruption {
                info: err_info!(),
                reason: "negative var len offset",
            });
        }
        checked_cursor(base, pos + value as usize)
    }

    /// Length of a (non last) impact variable field: next start minus this start.
    pub fn get_impact_var_len_data_len(
        p_offset: &PackOffset,
        base: &[u8],
    ) -> Result<usize, CodecError> {
        Self::check_impact(p_offset, true)?;
        if p_offset.is_last_var_field() {
            return Err(CodecError::LastVarField);
        }
        let pos = p_offset.offset();
        check_len(base, pos + 1)?;
        let offset_len = base[pos];
        check_width(offset_len)?;
        let var_index = p_offset.var_index();
        let current = read_table_entry(base, pos, offset_len, var_index)?;
        let prev = if var_index == 0 {
            0
        } else {
            read_table_entry(base, pos, offset_len, var_index - 1)?
        };
        if current < prev {
            return Err(CodecError::Corruption {
                info: err_info!(),
                reason: "impact offsets not ascending",
            });
        }
        Ok(current - prev)
    }

    fn check_impact(p_offset: &PackOffset, expected_impact: bool) -> Result<(), CodecError> {
        if p_offset.is_impact_format() != expected_impact {
            Err(CodecError::FormatMismatch { expected_impact })
        } else {
            Ok(())
        }
    }
}

/// Read offset table entry idx (0 based, entry idx is the start of field idx + 1).
fn read_table_entry(
    base: &[u8],
    table_pos: usize,
    offset_len: u8,
    idx: usize,
) -> Result<usize, CodecError> {
    let slot = table_pos + 1 + offset_len as usize * idx;
    check_len(base, slot + offset_len as usize)?;
    Ok(match offset_len {
        1 => base[slot] as usize,
        2 => read_u16(base, slot) as usize,
        _ => read_u32(base, slot) as usize,
    })
}

fn check_width(offset_len: u8) -> Result<(), CodecError> {
    match offset_len {
        1 | 2 | 4 => Ok(()),
        _ => Err(CodecError::InvalidOffsetWidth(offset_len)),
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

fn checked_cursor(base: &[u8], cursor: usize) -> Result<usize, CodecError> {
    if cursor > base.len() {
        Err(CodecError::Corruption {
            info: err_info!(),
            reason: "var len cursor past end of record",
        })
    } else {
        Ok(cursor)
    }
}
