//! Packed record offsets.
//!
//! A packed record holds its fixed width fields first and its variable length fields after
//! them.  Each field is located through a PackOffset; variable fields are either addressed
//! through one 8 byte cursor slot each (normal format) or through one shared table of small
//! offsets (impact format).

pub mod formatter;
pub mod offset;

pub use formatter::{PackDataFormatter, NORMAL_OFFSET_SLOT_SIZE};
pub use offset::PackOffset;
