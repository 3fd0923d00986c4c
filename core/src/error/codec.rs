//! Contains the error for the pack offset codec and the attribute references.

use crate::error::ErrorInfo;
use std::error::Error;
use std::fmt;

/// Errors produced while encoding or decoding packed records.
#[derive(Debug)]
pub enum CodecError {
    /// The packed data contradicts itself (negative offset delta, offset past the record, etc).
    Corruption {
        /// Where the corruption was detected.
        info: ErrorInfo,
        /// What was wrong.
        reason: &'static str,
    },
    /// A value does not fit the selected offset width.
    WidthOverflow {
        /// Offset width in bytes (1, 2 or 4).
        width: u8,
        /// Offending value.
        value: u64,
    },
    /// The offset width tag is not 1, 2 or 4.
    InvalidOffsetWidth(u8),
    /// A PackOffset field is out of range for its bit width.
    OffsetOutOfRange(&'static str),
    /// Impact operation on a normal offset or vice versa.
    FormatMismatch {
        /// True if the operation required the impact format.
        expected_impact: bool,
    },
    /// The record buffer is too small for the operation.
    BufferTooSmall {
        /// Bytes needed.
        needed: usize,
        /// Bytes available.
        actual: usize,
    },
    /// Length of the last variable field is not stored, it must be derived by the caller.
    LastVarField,
    /// A multi value count does not match the field (fixed count mismatch or count too large).
    InvalidCount(u32),
    /// The field type does not support the requested encoding (compression on an integer field,
    /// block floating point on a single value).
    Unsupported(&'static str),
}

impl Error for CodecError {}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::Corruption { info, reason } => write!(f, "corruption {}: {}", info, reason),
            Self::WidthOverflow { width, value } => {
                write!(f, "value {} overflows {} byte offset", value, width)
            }
            Self::InvalidOffsetWidth(w) => write!(f, "invalid offset width {}", w),
            Self::OffsetOutOfRange(field) => write!(f, "{} out of range", field),
            Self::FormatMismatch { expected_impact } => {
                if *expected_impact {
                    write!(f, "expected impact format offset")
                } else {
                    write!(f, "expected normal format offset")
                }
            }
            Self::BufferTooSmall { needed, actual } => {
                write!(f, "buffer too small: need {} got {}", needed, actual)
            }
            Self::LastVarField => write!(f, "length of last var field is not stored"),
            Self::InvalidCount(c) => write!(f, "invalid value count {}", c),
            Self::Unsupported(msg) => write!(f, "unsupported: {}", msg),
        }
    }
}
