//! Forward only iterator over a dumped table image that reads buckets in chunks.

use crate::bucket::HashBucket;
use crate::error::{FetchError, LoadHeaderError};
use crate::iter::bucket_entry;
use crate::table::special_key::read_special_slot;
use crate::table::{TableEntry, TableHeader};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::Path;

/// Buckets read from the file per chunk.
const CHUNK_BUCKETS: usize = 1024;

/// Iterates the non empty buckets then the special buckets of an image without loading the
/// whole image.  Items are results, an IO error or a short file ends the iteration after the
/// error is returned.  Sorting is not supported.
pub struct ClosedHashTableBufferedFileIterator<B, H, R = BufReader<File>>
where
    B: HashBucket,
    H: TableHeader,
    R: Read + Seek,
{
    reader: R,
    header: H,
    /// Index of the next bucket slot to examine.
    offset: u64,
    chunk: Vec<u8>,
    chunk_start: u64,
    chunk_len: u64,
    failed: bool,
    _bucket: PhantomData<B>,
}

impl<B: HashBucket, H: TableHeader> ClosedHashTableBufferedFileIterator<B, H> {
    /// Open the image at path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FetchError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<B, H, R> ClosedHashTableBufferedFileIterator<B, H, R>
where
    B: HashBucket,
    H: TableHeader,
    R: Read + Seek,
{
    /// Read the header (crc checked) from the start of reader.
    pub fn from_reader(mut reader: R) -> Result<Self, FetchError> {
        reader.seek(SeekFrom::Start(0))?;
        let mut header_buf = vec![0_u8; H::SIZE];
        reader.read_exact(&mut header_buf)?;
        let header = H::load_checked(&header_buf)?;
        header
            .image_len(B::SIZE)
            .ok_or(LoadHeaderError::InvalidLayout("image too large"))?;
        Ok(Self {
            reader,
            header,
            offset: 0,
            chunk: Vec::with_capacity(CHUNK_BUCKETS * B::SIZE),
            chunk_start: 0,
            chunk_len: 0,
            failed: false,
            _bucket: PhantomData,
        })
    }

    /// Header of the image.
    pub fn header(&self) -> &H {
        &self.header
    }

    /// Bucket slot the next call to next() starts from.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Continue from bucket slot offset (special buckets follow bucket_count).
    pub fn seek(&mut self, offset: u64) -> Result<(), FetchError> {
        let offset = offset.min(self.header.stored_buckets());
        self.reader
            .seek(SeekFrom::Start(H::SIZE as u64 + offset * B::SIZE as u64))?;
        self.offset = offset;
        self.chunk_start = offset;
        self.chunk_len = 0;
        self.failed = false;
        Ok(())
    }

    /// Restart from the first bucket.
    pub fn reset(&mut self) -> Result<(), FetchError> {
        self.seek(0)
    }

    /// Not supported, the buckets are never all in memory.
    pub fn sort_by_key(&mut self) -> Result<(), FetchError> {
        Err(FetchError::Unsupported("sort on a buffered file iterator"))
    }

    /// Not supported, the buckets are never all in memory.
    pub fn sort_by_value(&mut self) -> Result<(), FetchError> {
        Err(FetchError::Unsupported("sort on a buffered file iterator"))
    }

    /// Make sure the bucket at self.offset is in the chunk.
    fn fill(&mut self) -> Result<(), FetchError> {
        if self.offset >= self.chunk_start && self.offset < self.chunk_start + self.chunk_len {
            return Ok(());
        }
        // The reader is always positioned right after the current chunk.
        let remaining = self.header.stored_buckets() - self.offset;
        let count = remaining.min(CHUNK_BUCKETS as u64);
        self.chunk.resize(count as usize * B::SIZE, 0);
        self.reader.read_exact(&mut self.chunk)?;
        self.chunk_start = self.offset;
        self.chunk_len = count;
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<TableEntry<B::Key, B::Value>>, FetchError> {
        let bucket_count = self.header.bucket_count();
        while self.offset < self.header.stored_buckets() {
            self.fill()?;
            let idx = self.offset;
            let start = (idx - self.chunk_start) as usize * B::SIZE;
            let slot = &self.chunk[start..start + B::SIZE];
            self.offset += 1;
            if idx >= bucket_count {
                if let Some(entry) = read_special_slot::<B>(slot, idx - bucket_count) {
                    return Ok(Some(entry));
                }
            } else {
                let bucket = B::read(slot);
                if !bucket.is_empty() {
                    return Ok(Some(bucket_entry(&bucket)));
                }
            }
        }
        Ok(None)
    }
}

impl<B, H, R> Iterator for ClosedHashTableBufferedFileIterator<B, H, R>
where
    B: HashBucket,
    H: TableHeader,
    R: Read + Seek,
{
    type Item = Result<TableEntry<B::Key, B::Value>, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_entry() {
            Ok(entry) => entry.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
