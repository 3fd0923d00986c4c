//! Table image files: naming, dumping a mounted table and mapping a dumped image back.
//!
//! An image is the table header (crc32 in its last four bytes) followed by the active buckets
//! and, for special key tables, the two special buckets.  The stretch reserve is not written so
//! a mounted image reports no stretch memory.

use crate::bucket::HashBucket;
use crate::table::{
    BucketRegion, CuckooHashTableBase, CuckooHeader, DenseHashTableBase, DenseHeader,
    SpecialKeyTable, TableHeader,
};
use crate::table::ClosedHashTable;
use memmap2::Mmap;
use std::error::Error;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::fmt;
use tracing::debug;

/// Name and location of a table image file.
///
/// Either a directory plus name (the file is dir/name.tbl) or an explicit path, in which case
/// name is only informational and rename is not supported.
#[derive(Clone, Debug)]
pub struct TableFiles {
    dir: Option<PathBuf>,
    name: String,
    table_file: Option<PathBuf>,
}

impl TableFiles {
    /// Image stored in dir as name.tbl.
    pub fn with_dir<S, P>(dir: P, name: S) -> Self
    where
        S: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            dir: Some(dir.into()),
            name: name.into(),
            table_file: None,
        }
    }

    /// Image stored at an explicit path.
    pub fn with_path<S, P>(name: S, path: P) -> Self
    where
        S: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            dir: None,
            name: name.into(),
            table_file: Some(path.into()),
        }
    }

    /// Name of the table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the image if not using an explicit path.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Path of the image file.
    pub fn table_path(&self) -> PathBuf {
        match (&self.table_file, &self.dir) {
            (Some(path), _) => path.clone(),
            (None, Some(dir)) => dir.join(&self.name).with_extension("tbl"),
            (None, None) => PathBuf::from(&self.name).with_extension("tbl"),
        }
    }

    /// Rename the image file to name.
    pub fn rename<Q: Into<String>>(&mut self, name: Q) -> Result<(), RenameError> {
        let name: String = name.into();
        if self.name == name {
            return Ok(());
        }
        let dir = match &self.dir {
            Some(dir) => dir.clone(),
            None => return Err(RenameError::CanNotRename),
        };
        let new_path = dir.join(&name).with_extension("tbl");
        if new_path.exists() {
            return Err(RenameError::FileExists);
        }
        fs::rename(self.table_path(), &new_path).map_err(RenameError::RenameIO)?;
        self.name = name;
        Ok(())
    }

    /// Remove the image file, ignoring errors.
    pub fn delete(self) {
        let _ = fs::remove_file(self.table_path());
    }
}

/// Error renaming a table image.
#[derive(Debug)]
pub enum RenameError {
    /// The target file already exists.
    FileExists,
    /// Error renaming the file.
    RenameIO(io::Error),
    /// Rename is not supported for an explicit path.
    CanNotRename,
}

impl Error for RenameError {}

impl fmt::Display for RenameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::FileExists => write!(f, "target file for rename already exists"),
            Self::RenameIO(e) => write!(f, "rename failed: {e}"),
            Self::CanNotRename => write!(f, "rename not supported for an explicit path"),
        }
    }
}

/// A table that can be written as an image.
pub trait TableImage {
    /// Header type written at the front of the image.
    type Header: TableHeader;

    /// Header describing the image.
    fn image_header(&self) -> Self::Header;

    /// Active buckets followed by the special buckets (if any).
    fn image_buckets(&self) -> &[u8];
}

impl<B: HashBucket, S: AsRef<[u8]>> TableImage for CuckooHashTableBase<B, S> {
    type Header = CuckooHeader;

    fn image_header(&self) -> CuckooHeader {
        let mut header = self.header().clone();
        header.stretch_size = 0;
        header
    }

    fn image_buckets(&self) -> &[u8] {
        let start = CuckooHeader::SIZE;
        let end = start + self.header().stored_buckets() as usize * B::SIZE;
        &self.region().as_ref()[start..end]
    }
}

impl<B: HashBucket, S: AsRef<[u8]>> TableImage for DenseHashTableBase<B, S> {
    type Header = DenseHeader;

    fn image_header(&self) -> DenseHeader {
        self.header().clone()
    }

    fn image_buckets(&self) -> &[u8] {
        let start = DenseHeader::SIZE;
        let end = start + self.header().stored_buckets() as usize * B::SIZE;
        &self.region().as_ref()[start..end]
    }
}

impl<T, B> TableImage for SpecialKeyTable<T>
where
    B: HashBucket,
    T: ClosedHashTable<Key = B::Key, Value = B::Value> + BucketRegion<Bucket = B> + TableImage,
{
    type Header = T::Header;

    fn image_header(&self) -> T::Header {
        self.inner().image_header()
    }

    fn image_buckets(&self) -> &[u8] {
        self.inner().image_buckets()
    }
}

/// Write the image of table to writer, returns the bytes written.
pub fn dump_table<T: TableImage, W: Write>(table: &T, writer: &mut W) -> io::Result<usize> {
    let mut header_buf = vec![0_u8; T::Header::SIZE];
    let header = table.image_header();
    header.store_with_crc(&mut header_buf);
    writer.write_all(&header_buf)?;
    let buckets = table.image_buckets();
    writer.write_all(buckets)?;
    debug!(
        bucket_count = header.bucket_count(),
        key_count = header.key_count(),
        bytes = header_buf.len() + buckets.len(),
        "dumped table image"
    );
    Ok(header_buf.len() + buckets.len())
}

/// Dump table to the file named by files (created or truncated).
pub fn write_table_file<T: TableImage>(table: &T, files: &TableFiles) -> io::Result<usize> {
    let path = files.table_path();
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    let mut writer = BufWriter::new(file);
    let written = dump_table(table, &mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(written)
}

/// Memory map a table image read only, suitable for mount_for_read.
pub fn map_table_file<P: AsRef<Path>>(path: P) -> io::Result<Mmap> {
    let file = File::open(path)?;
    // The image is never modified while mapped, writers create a new file.
    let map = unsafe { Mmap::map(&file)? };
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{SpecialKeyBucket, SpecialValueBucket};
    use crate::table::{CuckooHashTable, DenseHashTable, Lookup, SpecialKeyCuckooHashTable};
    use crate::table_config::TableConfig;
    use crate::value::{SentinelValue, SpecialValue};

    #[test]
    fn test_table_path() {
        let files = TableFiles::with_dir("/some/dir", "keys");
        assert_eq!(files.table_path(), PathBuf::from("/some/dir/keys.tbl"));
        let files = TableFiles::with_path("keys", "/other/k.img");
        assert_eq!(files.table_path(), PathBuf::from("/other/k.img"));
        let mut files = files;
        assert!(matches!(files.rename("x"), Err(RenameError::CanNotRename)));
    }

    #[test]
    fn test_dump_and_map_cuckoo() {
        type Table = CuckooHashTable<u64, SpecialValue<u32>>;
        let config = TableConfig::new();
        let mem = Table::table_memory_for(500, &config);
        let mut table = Table::mount_for_write(vec![0; mem], &config).unwrap();
        for key in 0..400_u64 {
            table.insert(key, SpecialValue::new(key as u32 * 3)).unwrap();
        }
        table.delete(7, SpecialValue::deleted()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut files = TableFiles::with_dir(dir.path(), "cuckoo");
        let written = write_table_file(&table, &files).unwrap();
        let bucket_size = SpecialValueBucket::<u64, SpecialValue<u32>>::SIZE;
        assert_eq!(written, CuckooHeader::SIZE + table.bucket_count() as usize * bucket_size);
        files.rename("renamed").unwrap();
        assert!(files.table_path().ends_with("renamed.tbl"));

        let map = map_table_file(files.table_path()).unwrap();
        assert!(CuckooHeader::load_checked(&map).is_ok());
        let mounted =
            CuckooHashTable::<u64, SpecialValue<u32>, Mmap>::mount_for_read(map).unwrap();
        assert!(mounted.is_read_only());
        assert_eq!(mounted.key_count(), 400);
        assert_eq!(mounted.header().stretch_size(), 0);
        assert_eq!(mounted.find(&9).found().map(|v| v.value()), Some(27));
        assert!(mounted.find(&7).is_deleted());
        assert!(mounted.find(&1000).is_not_found());
        files.delete();
    }

    #[test]
    fn test_dump_dense_to_vec() {
        type Table = DenseHashTable<u32, SpecialValue<u64>>;
        let config = TableConfig::new();
        let mem = Table::table_memory_for(30, &config);
        let mut table = Table::mount_for_write(vec![0; mem], &config).unwrap();
        for key in 0..30_u32 {
            table.insert(key, SpecialValue::new(key as u64)).unwrap();
        }
        let mut image = Vec::new();
        dump_table(&table, &mut image).unwrap();
        assert!(DenseHeader::load_checked(&image).is_ok());
        let mounted = Table::mount_for_read(image).unwrap();
        assert_eq!(mounted.key_count(), 30);
        assert_eq!(mounted.find(&29).found().map(|v| v.value()), Some(29));
    }

    #[test]
    fn test_dump_special_key_table() {
        type Table = SpecialKeyCuckooHashTable<u32, u32>;
        let config = TableConfig::new().special_key();
        let mem = Table::table_memory_for(40, &config);
        let mut table =
            SpecialKeyTable::new(Table::mount_for_write(vec![0; mem], &config).unwrap()).unwrap();
        table.insert(u32::MAX, 5).unwrap();
        table.insert(3, 6).unwrap();
        let mut image = Vec::new();
        dump_table(&table, &mut image).unwrap();
        let header = CuckooHeader::load_checked(&image).unwrap();
        assert!(header.has_special_key());
        let bucket_size = SpecialKeyBucket::<u32, u32>::SIZE;
        assert_eq!(
            image.len(),
            CuckooHeader::SIZE + (header.bucket_count() as usize + 2) * bucket_size
        );
        let mounted = Table::mount_for_read(image).unwrap();
        assert_eq!(mounted.find(&3), Lookup::Found(6));
    }
}
