//! Table headers, stored at the start of the table region.
//!
//! Cuckoo header (64 bytes, one cache line):
//!
//! | bytes  | field            |
//! |--------|------------------|
//! | 0      | version          |
//! | 1      | nu_hash_func     |
//! | 2      | max_nu_hash_func |
//! | 3      | occupancy_pct    |
//! | 4      | flags            |
//! | 8..16  | bucket_count     |
//! | 16..24 | key_count        |
//! | 24..32 | stretch_size     |
//! | 32..40 | delete_count     |
//! | 60..64 | crc32            |
//!
//! Dense header (32 bytes): ite_count, bucket_count and key_count as u64 followed by a u32 of
//! flags (bit 0 special key, bits 8..16 occupancy) and the crc32.
//!
//! The crc32 is only written when a table image is dumped and only checked by the file readers.

use crate::crc::{check_header_crc, seal_header};
use crate::error::LoadHeaderError;
use crate::table_bytes::{read_u32, read_u64};
use crate::table_config::MAX_HASH_FUNCTIONS;

/// Cuckoo header version understood by this code.
pub const CUCKOO_VERSION: u8 = 1;
/// Buckets per cuckoo block.
pub const BLOCK_SIZE: u64 = 4;
/// Largest bucket count a loaded header may claim.
pub const MAX_BUCKET_COUNT: u64 = 1 << 48;

const FLAG_SPECIAL_KEY: u8 = 0x01;

/// Common access to a table header.
pub trait TableHeader: Sized + Clone {
    /// Bytes the header occupies in front of the buckets.
    const SIZE: usize;

    /// Active buckets (not counting the stretch reserve or special buckets).
    fn bucket_count(&self) -> u64;

    /// Non empty buckets (valid plus deleted).
    fn key_count(&self) -> u64;

    /// True if two special key buckets follow the active buckets.
    fn has_special_key(&self) -> bool;

    /// Decode and sanity check a header, does not check the crc.
    fn load(buffer: &[u8]) -> Result<Self, LoadHeaderError>;

    /// Encode into the first SIZE bytes of buffer (crc bytes are zeroed).
    fn store(&self, buffer: &mut [u8]);

    /// Decode a header and verify its crc32.
    fn load_checked(buffer: &[u8]) -> Result<Self, LoadHeaderError> {
        check_header_crc::<Self>(buffer)?;
        Self::load(buffer)
    }

    /// Encode with a crc32 in the last four bytes.
    fn store_with_crc(&self, buffer: &mut [u8]) {
        self.store(buffer);
        seal_header::<Self>(buffer);
    }

    /// Number of bucket slots stored after the header (active plus special).
    fn stored_buckets(&self) -> u64 {
        self.bucket_count() + if self.has_special_key() { 2 } else { 0 }
    }

    /// Bytes of the header plus the stored buckets, None if that does not fit a usize.
    fn image_len(&self, bucket_size: usize) -> Option<usize> {
        let buckets = self.stored_buckets().checked_mul(bucket_size as u64)?;
        usize::try_from(buckets.checked_add(Self::SIZE as u64)?).ok()
    }
}

/// Header of a cuckoo table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CuckooHeader {
    pub(crate) version: u8,
    pub(crate) nu_hash_func: u8,
    pub(crate) max_nu_hash_func: u8,
    pub(crate) occupancy_pct: u8,
    pub(crate) has_special_key: bool,
    pub(crate) bucket_count: u64,
    pub(crate) key_count: u64,
    pub(crate) stretch_size: u64,
    pub(crate) delete_count: u64,
}

impl CuckooHeader {
    /// Hash functions in use.
    pub fn nu_hash_func(&self) -> u8 {
        self.nu_hash_func
    }

    /// Hash functions the table may grow to.
    pub fn max_nu_hash_func(&self) -> u8 {
        self.max_nu_hash_func
    }

    /// Buckets reserved for stretch(), 0 once used.
    pub fn stretch_size(&self) -> u64 {
        self.stretch_size
    }

    /// Tombstones in the table.
    pub fn delete_count(&self) -> u64 {
        self.delete_count
    }
}

impl TableHeader for CuckooHeader {
    const SIZE: usize = 64;

    fn bucket_count(&self) -> u64 {
        self.bucket_count
    }

    fn key_count(&self) -> u64 {
        self.key_count
    }

    fn has_special_key(&self) -> bool {
        self.has_special_key
    }

    fn load(buffer: &[u8]) -> Result<Self, LoadHeaderError> {
        if buffer.len() < Self::SIZE {
            return Err(LoadHeaderError::Truncated);
        }
        let version = buffer[0];
        if version != CUCKOO_VERSION {
            return Err(LoadHeaderError::InvalidVersion(version));
        }
        let header = Self {
            version,
            nu_hash_func: buffer[1],
            max_nu_hash_func: buffer[2],
            occupancy_pct: buffer[3],
            has_special_key: buffer[4] & FLAG_SPECIAL_KEY != 0,
            bucket_count: read_u64(buffer, 8),
            key_count: read_u64(buffer, 16),
            stretch_size: read_u64(buffer, 24),
            delete_count: read_u64(buffer, 32),
        };
        if header.bucket_count == 0 || header.bucket_count % BLOCK_SIZE != 0 {
            return Err(LoadHeaderError::InvalidLayout(
                "bucket count not a positive multiple of block size",
            ));
        }
        if header.bucket_count > MAX_BUCKET_COUNT || header.stretch_size > MAX_BUCKET_COUNT {
            return Err(LoadHeaderError::InvalidLayout("bucket count too large"));
        }
        if header.nu_hash_func == 0
            || header.nu_hash_func > header.max_nu_hash_func
            || header.max_nu_hash_func > MAX_HASH_FUNCTIONS
        {
            return Err(LoadHeaderError::InvalidLayout("hash function counts"));
        }
        if header.occupancy_pct == 0 || header.occupancy_pct > 100 {
            return Err(LoadHeaderError::InvalidLayout("occupancy"));
        }
        if header.key_count > header.bucket_count || header.delete_count > header.key_count {
            return Err(LoadHeaderError::InvalidLayout("key count"));
        }
        Ok(header)
    }

    fn store(&self, buffer: &mut [u8]) {
        let buffer = &mut buffer[..Self::SIZE];
        buffer.iter_mut().for_each(|b| *b = 0);
        buffer[0] = self.version;
        buffer[1] = self.nu_hash_func;
        buffer[2] = self.max_nu_hash_func;
        buffer[3] = self.occupancy_pct;
        buffer[4] = if self.has_special_key {
            FLAG_SPECIAL_KEY
        } else {
            0
        };
        buffer[8..16].copy_from_slice(&self.bucket_count.to_le_bytes());
        buffer[16..24].copy_from_slice(&self.key_count.to_le_bytes());
        buffer[24..32].copy_from_slice(&self.stretch_size.to_le_bytes());
        buffer[32..40].copy_from_slice(&self.delete_count.to_le_bytes());
    }
}

/// Header of a dense (linear probing) table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DenseHeader {
    pub(crate) ite_count: u64,
    pub(crate) bucket_count: u64,
    pub(crate) key_count: u64,
    pub(crate) has_special_key: bool,
    pub(crate) occupancy_pct: u8,
}

impl DenseHeader {
    /// Longest probe sequence any insert has needed.
    pub fn ite_count(&self) -> u64 {
        self.ite_count
    }
}

impl TableHeader for DenseHeader {
    const SIZE: usize = 32;

    fn bucket_count(&self) -> u64 {
        self.bucket_count
    }

    fn key_count(&self) -> u64 {
        self.key_count
    }

    fn has_special_key(&self) -> bool {
        self.has_special_key
    }

    fn load(buffer: &[u8]) -> Result<Self, LoadHeaderError> {
        if buffer.len() < Self::SIZE {
            return Err(LoadHeaderError::Truncated);
        }
        let flags = read_u32(buffer, 24);
        let header = Self {
            ite_count: read_u64(buffer, 0),
            bucket_count: read_u64(buffer, 8),
            key_count: read_u64(buffer, 16),
            has_special_key: flags & FLAG_SPECIAL_KEY as u32 != 0,
            occupancy_pct: ((flags >> 8) & 0xff) as u8,
        };
        if header.bucket_count == 0 {
            return Err(LoadHeaderError::InvalidLayout("zero bucket count"));
        }
        if header.bucket_count > MAX_BUCKET_COUNT {
            return Err(LoadHeaderError::InvalidLayout("bucket count too large"));
        }
        if header.occupancy_pct == 0 || header.occupancy_pct > 100 {
            return Err(LoadHeaderError::InvalidLayout("occupancy"));
        }
        if header.key_count > header.bucket_count || header.ite_count > header.bucket_count {
            return Err(LoadHeaderError::InvalidLayout("key count"));
        }
        Ok(header)
    }

    fn store(&self, buffer: &mut [u8]) {
        let buffer = &mut buffer[..Self::SIZE];
        let mut flags = (self.occupancy_pct as u32) << 8;
        if self.has_special_key {
            flags |= FLAG_SPECIAL_KEY as u32;
        }
        buffer[0..8].copy_from_slice(&self.ite_count.to_le_bytes());
        buffer[8..16].copy_from_slice(&self.bucket_count.to_le_bytes());
        buffer[16..24].copy_from_slice(&self.key_count.to_le_bytes());
        buffer[24..28].copy_from_slice(&flags.to_le_bytes());
        buffer[28..32].copy_from_slice(&[0; 4]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cuckoo_header() -> CuckooHeader {
        CuckooHeader {
            version: CUCKOO_VERSION,
            nu_hash_func: 2,
            max_nu_hash_func: 8,
            occupancy_pct: 80,
            has_special_key: true,
            bucket_count: 1000,
            key_count: 800,
            stretch_size: 16,
            delete_count: 100,
        }
    }

    #[test]
    fn test_cuckoo_header() {
        let header = cuckoo_header();
        let mut buf = [0_u8; 64];
        header.store(&mut buf);
        assert_eq!(buf[0], CUCKOO_VERSION);
        assert_eq!(&buf[8..16], &1000_u64.to_le_bytes());
        assert_eq!(CuckooHeader::load(&buf).unwrap(), header);
        // Plain store leaves no crc.
        assert!(matches!(
            CuckooHeader::load_checked(&buf),
            Err(LoadHeaderError::CrcFailed)
        ));
        header.store_with_crc(&mut buf);
        assert_eq!(CuckooHeader::load_checked(&buf).unwrap(), header);
        assert_eq!(header.stored_buckets(), 1002);
        buf[17] ^= 1;
        assert!(matches!(
            CuckooHeader::load_checked(&buf),
            Err(LoadHeaderError::CrcFailed)
        ));
    }

    #[test]
    fn test_cuckoo_header_invalid() {
        let mut buf = [0_u8; 64];
        let mut header = cuckoo_header();
        header.bucket_count = 1001;
        header.store(&mut buf);
        assert!(matches!(
            CuckooHeader::load(&buf),
            Err(LoadHeaderError::InvalidLayout(_))
        ));
        cuckoo_header().store(&mut buf);
        buf[0] = 9;
        assert!(matches!(
            CuckooHeader::load(&buf),
            Err(LoadHeaderError::InvalidVersion(9))
        ));
        assert!(matches!(
            CuckooHeader::load(&buf[..10]),
            Err(LoadHeaderError::Truncated)
        ));
    }

    #[test]
    fn test_huge_bucket_count_rejected() {
        let mut buf = [0_u8; 64];
        let mut header = cuckoo_header();
        header.bucket_count = 1 << 62;
        header.store_with_crc(&mut buf);
        assert!(matches!(
            CuckooHeader::load_checked(&buf),
            Err(LoadHeaderError::InvalidLayout(_))
        ));
        header.bucket_count = MAX_BUCKET_COUNT;
        assert_eq!(header.image_len(usize::MAX), None);
        assert_eq!(cuckoo_header().image_len(16), Some(64 + 1002 * 16));
        let dense = DenseHeader {
            ite_count: 0,
            bucket_count: MAX_BUCKET_COUNT + 1,
            key_count: 0,
            has_special_key: false,
            occupancy_pct: 50,
        };
        dense.store(&mut buf);
        assert!(matches!(
            DenseHeader::load(&buf),
            Err(LoadHeaderError::InvalidLayout(_))
        ));
    }

    #[test]
    fn test_dense_header() {
        let header = DenseHeader {
            ite_count: 3,
            bucket_count: 100,
            key_count: 40,
            has_special_key: false,
            occupancy_pct: 50,
        };
        let mut buf = [0_u8; 32];
        header.store_with_crc(&mut buf);
        assert_eq!(&buf[8..16], &100_u64.to_le_bytes());
        assert_eq!(buf[25], 50);
        assert_eq!(DenseHeader::load_checked(&buf).unwrap(), header);
        assert_eq!(header.stored_buckets(), 100);
    }
}
