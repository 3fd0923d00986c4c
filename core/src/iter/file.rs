//! Iterator over a dumped table image, loaded fully into memory.

use crate::bucket::HashBucket;
use crate::error::{FetchError, LoadHeaderError};
use crate::iter::{scan_entries, sort_entries, SortOrder};
use crate::table::special_key::read_special_slot;
use crate::table::{TableEntry, TableHeader};
use std::fs::File;
use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;

/// Reads the header (crc checked) and every bucket of an image, then iterates the non empty
/// buckets followed by the special buckets.  Supports sorting like the in memory iterator.
pub struct ClosedHashTableFileIterator<B: HashBucket, H: TableHeader> {
    header: H,
    entries: Vec<TableEntry<B::Key, B::Value>>,
    pos: usize,
    _bucket: PhantomData<B>,
}

impl<B: HashBucket, H: TableHeader> ClosedHashTableFileIterator<B, H> {
    /// Open the image at path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FetchError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Read an image from reader.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, FetchError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let header = H::load_checked(&data)?;
        let needed = header
            .image_len(B::SIZE)
            .ok_or(LoadHeaderError::InvalidLayout("image too large"))?;
        if data.len() < needed {
            return Err(FetchError::Truncated);
        }
        let buckets = &data[H::SIZE..needed];
        let mut entries = scan_entries::<B>(buckets, header.bucket_count());
        if header.has_special_key() {
            for which in 0..2 {
                let start = (header.bucket_count() + which) as usize * B::SIZE;
                if let Some(entry) =
                    read_special_slot::<B>(&buckets[start..start + B::SIZE], which)
                {
                    entries.push(entry);
                }
            }
        }
        Ok(Self {
            header,
            entries,
            pos: 0,
            _bucket: PhantomData,
        })
    }

    /// Header of the image.
    pub fn header(&self) -> &H {
        &self.header
    }

    /// Key count recorded in the header (special buckets not included).
    pub fn key_count(&self) -> u64 {
        self.header.key_count()
    }

    /// Bucket count recorded in the header.
    pub fn bucket_count(&self) -> u64 {
        self.header.bucket_count()
    }

    /// Restart from the first entry.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Sort by key and restart.
    pub fn sort_by_key(&mut self) {
        sort_entries::<B>(&mut self.entries, SortOrder::Key);
        self.reset();
    }

    /// Sort by value and restart.
    pub fn sort_by_value(&mut self) {
        sort_entries::<B>(&mut self.entries, SortOrder::Value);
        self.reset();
    }
}

impl<B: HashBucket, H: TableHeader> Iterator for ClosedHashTableFileIterator<B, H> {
    type Item = TableEntry<B::Key, B::Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.pos).copied();
        if entry.is_some() {
            self.pos += 1;
        }
        entry
    }
}
