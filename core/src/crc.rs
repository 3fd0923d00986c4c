//! Header sealing.  A persisted header ends in a little endian crc32 of the header fields in
//! front of it, the bucket data that follows the header is not covered.

use crate::error::LoadHeaderError;
use crate::table::TableHeader;
use crate::table_bytes::read_u32;

/// Bytes of the crc32 slot at the end of a header.
pub(crate) const CRC_LEN: usize = 4;

/// crc32 of the fields of the H header at the start of buffer.
fn fields_crc<H: TableHeader>(buffer: &[u8]) -> u32 {
    crc32fast::hash(&buffer[..H::SIZE - CRC_LEN])
}

/// Write the crc32 of the H header fields into its crc slot.  Buffer must hold H::SIZE bytes.
pub(crate) fn seal_header<H: TableHeader>(buffer: &mut [u8]) {
    let crc = fields_crc::<H>(buffer);
    buffer[H::SIZE - CRC_LEN..H::SIZE].copy_from_slice(&crc.to_le_bytes());
}

/// Verify the crc slot of the H header at the start of buffer.
pub(crate) fn check_header_crc<H: TableHeader>(buffer: &[u8]) -> Result<(), LoadHeaderError> {
    if buffer.len() < H::SIZE {
        return Err(LoadHeaderError::Truncated);
    }
    if fields_crc::<H>(buffer) != read_u32(buffer, H::SIZE - CRC_LEN) {
        return Err(LoadHeaderError::CrcFailed);
    }
    Ok(())
}
