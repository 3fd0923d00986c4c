//! Blocked cuckoo hash table.
//!
//! Buckets are grouped into blocks of BLOCK_SIZE.  A key lives in one of the blocks picked by its
//! first nu_hash_func hash functions.  Two rules are kept by every write:
//!
//! - a block fills front to back, no empty bucket precedes an occupied one,
//! - a key never sits in a candidate block while an earlier candidate block (in hash function
//!   order) has an empty bucket.
//!
//! Together they let a reader stop probing at the first empty bucket.  When every candidate
//! block of a new key is full a breadth first search over the occupants' alternative blocks
//! finds a chain of moves that frees a bucket.  If the search fails the table starts using one
//! more hash function (persisted in the header) until max_nu_hash_func is reached.

use crate::bucket::HashBucket;
use crate::error::insert::InsertError;
use crate::error::rehash::RehashError;
use crate::error::{LoadHeaderError, MountError};
use crate::iter::memory::ClosedHashTableIterator;
use crate::table::header::{CuckooHeader, TableHeader, BLOCK_SIZE, CUCKOO_VERSION};
use crate::table::{
    buckets_for, fit_bucket_count, stretch_reserve, BucketRegion, ClosedHashTable, Lookup,
    TableEntry,
};
use crate::table_config::{TableConfig, DEFAULT_CUCKOO_OCCUPANCY_PCT};
use crate::table_key::TableKey;
use std::marker::PhantomData;
use tracing::{debug, error, info, warn};

const HEADER_SIZE: usize = CuckooHeader::SIZE;
/// Upper bound on nodes in one eviction search.
pub const MAX_BFS_TREE_NODES: usize = 1 << 20;
const ROOT: usize = usize::MAX;

#[derive(Clone, Copy, Debug)]
struct BfsNode {
    block: u64,
    parent: usize,
    parent_slot: u64,
    depth: u32,
}

enum Probe<B> {
    Existing(u64, B),
    Vacant(u64),
    Occupied,
}

/// Cuckoo table over bucket type B stored in region S.
pub struct CuckooHashTableBase<B: HashBucket, S> {
    region: S,
    header: CuckooHeader,
    read_only: bool,
    bfs_depth: u32,
    call_ids: Vec<u64>,
    cur_call_id: u64,
    bfs_tree: Vec<BfsNode>,
    _bucket: PhantomData<B>,
}

impl<B: HashBucket, S> CuckooHashTableBase<B, S> {
    /// Bytes of region needed to hold max_keys at the configured occupancy (including the
    /// stretch reserve and special buckets the config asks for).
    pub fn table_memory_for(max_keys: u64, config: &TableConfig) -> usize {
        let occupancy_pct = config.occupancy_or(DEFAULT_CUCKOO_OCCUPANCY_PCT);
        let bucket_count = buckets_for(max_keys, occupancy_pct, BLOCK_SIZE);
        let mut total = bucket_count;
        if config.stretch {
            total += stretch_reserve(bucket_count, BLOCK_SIZE);
        }
        if config.special_key {
            total += 2;
        }
        HEADER_SIZE + total as usize * B::SIZE
    }

    #[inline(always)]
    fn bucket_pos(idx: u64) -> usize {
        HEADER_SIZE + idx as usize * B::SIZE
    }

    fn special_slots(&self) -> u64 {
        if self.header.has_special_key {
            2
        } else {
            0
        }
    }
}

impl<B: HashBucket, S: AsRef<[u8]>> CuckooHashTableBase<B, S> {
    /// Attach to a formatted region.  The table will refuse writes.
    pub fn mount_for_read(region: S) -> Result<Self, MountError> {
        let header = CuckooHeader::load(region.as_ref())?;
        let needed = header
            .image_len(B::SIZE)
            .ok_or(LoadHeaderError::InvalidLayout("image too large"))?;
        let actual = region.as_ref().len();
        if actual < needed {
            return Err(MountError::RegionTooSmall { needed, actual });
        }
        Ok(Self::with_header(region, header, true, 0))
    }

    fn with_header(region: S, header: CuckooHeader, read_only: bool, bfs_depth: u32) -> Self {
        let block_count = (header.bucket_count / BLOCK_SIZE) as usize;
        Self {
            region,
            header,
            read_only,
            bfs_depth,
            call_ids: vec![0; if read_only { 0 } else { block_count }],
            cur_call_id: 0,
            bfs_tree: Vec::new(),
            _bucket: PhantomData,
        }
    }

    /// The table header.
    pub fn header(&self) -> &CuckooHeader {
        &self.header
    }

    /// Hash functions in use.
    pub fn nu_hash_func(&self) -> u8 {
        self.header.nu_hash_func
    }

    /// Occupancy in percent used for capacity().
    pub fn occupancy_pct(&self) -> u8 {
        self.header.occupancy_pct
    }

    /// True if mounted with mount_for_read().
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The underlying region.
    pub fn region(&self) -> &S {
        &self.region
    }

    /// Give back the region.
    pub fn into_region(self) -> S {
        self.region
    }

    /// Non empty buckets (valid plus deleted).
    pub fn key_count(&self) -> u64 {
        self.header.key_count
    }

    /// Tombstones.
    pub fn delete_count(&self) -> u64 {
        self.header.delete_count
    }

    /// Active buckets.
    pub fn bucket_count(&self) -> u64 {
        self.header.bucket_count
    }

    /// Most keys the table accepts.
    pub fn capacity(&self) -> u64 {
        self.header.bucket_count * self.header.occupancy_pct as u64 / 100
    }

    /// Look up key.
    pub fn find(&self, key: &B::Key) -> Lookup<B::Value> {
        match self.find_bucket_for_read(key) {
            Some((_, bucket)) if bucket.is_deleted() => Lookup::Deleted(bucket.value()),
            Some((_, bucket)) => Lookup::Found(bucket.value()),
            None => Lookup::NotFound,
        }
    }

    /// Probe for key stopping at the first empty bucket.
    pub fn find_bucket_for_read(&self, key: &B::Key) -> Option<(u64, B)> {
        if B::KEY_SENTINELS && key.is_special() {
            return None;
        }
        for func_id in 0..self.header.nu_hash_func {
            let start = self.block_start(key, func_id);
            for idx in start..start + BLOCK_SIZE {
                let bucket = self.read_bucket(idx);
                if bucket.is_empty() {
                    return None;
                }
                if bucket.is_equal(key) {
                    return Some((idx, bucket));
                }
            }
        }
        None
    }

    /// Every non empty entry in bucket order.
    pub fn entries(&self) -> Vec<TableEntry<B::Key, B::Value>> {
        self.iter().collect()
    }

    /// Iterate the non empty buckets.
    pub fn iter(&self) -> ClosedHashTableIterator<'_, B> {
        ClosedHashTableIterator::new(self.active_bytes(), self.header.bucket_count)
    }

    /// Buckets breaking the probe rules (see module docs), empty if the table is sound.
    pub fn verify_probe_invariant(&self) -> Vec<u64> {
        let mut bad = Vec::new();
        let mut block = 0;
        while block < self.header.bucket_count {
            let mut seen_empty = false;
            for idx in block..block + BLOCK_SIZE {
                let bucket = self.read_bucket(idx);
                if bucket.is_empty() {
                    seen_empty = true;
                    continue;
                }
                if seen_empty {
                    bad.push(idx);
                    continue;
                }
                let key = bucket.key();
                let mut reachable = false;
                for func_id in 0..self.header.nu_hash_func {
                    let candidate = self.block_start(&key, func_id);
                    if candidate == block {
                        reachable = true;
                        break;
                    }
                    if self.first_empty(candidate).is_some() {
                        break;
                    }
                }
                if !reachable {
                    bad.push(idx);
                }
            }
            block += BLOCK_SIZE;
        }
        bad
    }

    /// First bucket of the block hash function func_id picks for key.
    #[inline]
    fn block_start(&self, key: &B::Key, func_id: u8) -> u64 {
        let hash = key.hash_with(func_id);
        let block_count = self.header.bucket_count / BLOCK_SIZE;
        let block = if block_count <= u32::MAX as u64 {
            (hash as u32 % block_count as u32) as u64
        } else {
            hash % block_count
        };
        block * BLOCK_SIZE
    }

    #[inline]
    fn read_bucket(&self, idx: u64) -> B {
        B::read(&self.region.as_ref()[Self::bucket_pos(idx)..])
    }

    fn first_empty(&self, block: u64) -> Option<u64> {
        (block..block + BLOCK_SIZE).find(|idx| self.read_bucket(*idx).is_empty())
    }

    fn active_bytes(&self) -> &[u8] {
        &self.region.as_ref()[HEADER_SIZE..Self::bucket_pos(self.header.bucket_count)]
    }

    /// Bucket slots the region can hold past the header, special buckets excluded.
    fn region_buckets(&self) -> u64 {
        ((self.region.as_ref().len() - HEADER_SIZE) / B::SIZE) as u64 - self.special_slots()
    }

    fn probe(&self, key: &B::Key) -> Probe<B> {
        let mut vacant = None;
        for func_id in 0..self.header.nu_hash_func {
            let start = self.block_start(key, func_id);
            for idx in start..start + BLOCK_SIZE {
                let bucket = self.read_bucket(idx);
                if bucket.is_empty() {
                    if vacant.is_none() {
                        vacant = Some(idx);
                    }
                    break;
                }
                if bucket.is_equal(key) {
                    return Probe::Existing(idx, bucket);
                }
            }
        }
        match vacant {
            Some(idx) => Probe::Vacant(idx),
            None => Probe::Occupied,
        }
    }
}

impl<B: HashBucket, S: AsRef<[u8]> + AsMut<[u8]>> CuckooHashTableBase<B, S> {
    /// Format region as an empty table.  Bucket count is the largest multiple of BLOCK_SIZE that
    /// fits (after the stretch reserve and special buckets if the config asks for them).
    pub fn mount_for_write(region: S, config: &TableConfig) -> Result<Self, MountError> {
        config.validate(DEFAULT_CUCKOO_OCCUPANCY_PCT)?;
        let special = if config.special_key { 2 } else { 0 };
        let actual = region.as_ref().len();
        let total = if actual > HEADER_SIZE {
            ((actual - HEADER_SIZE) / B::SIZE) as u64
        } else {
            0
        };
        let (bucket_count, stretch_size) =
            fit_bucket_count(total.saturating_sub(special), config.stretch, BLOCK_SIZE);
        if bucket_count == 0 {
            let min_buckets = if config.stretch {
                BLOCK_SIZE + stretch_reserve(BLOCK_SIZE, BLOCK_SIZE)
            } else {
                BLOCK_SIZE
            };
            return Err(MountError::RegionTooSmall {
                needed: Self::bucket_pos(min_buckets + special),
                actual,
            });
        }
        let header = CuckooHeader {
            version: CUCKOO_VERSION,
            nu_hash_func: config.init_nu_hash_func,
            max_nu_hash_func: config.max_nu_hash_func,
            occupancy_pct: config.occupancy_or(DEFAULT_CUCKOO_OCCUPANCY_PCT),
            has_special_key: config.special_key,
            bucket_count,
            key_count: 0,
            stretch_size,
            delete_count: 0,
        };
        let mut table = Self::with_header(region, header, false, config.bfs_depth);
        table.clear_buckets(0, bucket_count);
        if config.special_key {
            table.zero_slots(bucket_count, 2);
        }
        table.store_header();
        debug!(
            bucket_count,
            stretch_size,
            bucket_size = B::SIZE,
            "mounted cuckoo table for write"
        );
        Ok(table)
    }

    /// Insert or update key.
    pub fn insert(&mut self, key: B::Key, value: B::Value) -> Result<(), InsertError> {
        self.write_key(key, value, false)
    }

    /// Mark key deleted, inserting a tombstone if it is not in the table.
    pub fn delete(&mut self, key: B::Key, value: B::Value) -> Result<(), InsertError> {
        self.write_key(key, value, true)
    }

    /// Grow into the stretch reserve.  Single use.
    pub fn stretch(&mut self) -> Result<(), RehashError> {
        if self.read_only {
            return Err(RehashError::ReadOnly);
        }
        if self.header.stretch_size == 0 {
            return Err(RehashError::NoStretchReserved);
        }
        let new_count = self.header.bucket_count + self.header.stretch_size;
        self.rehash(new_count)?;
        self.header.stretch_size = 0;
        self.store_header();
        info!(bucket_count = new_count, "stretched cuckoo table");
        Ok(())
    }

    /// Rebuild at the smallest bucket count holding the keys at occupancy_pct, which becomes the
    /// table occupancy.
    pub fn shrink(&mut self, occupancy_pct: u8) -> Result<(), RehashError> {
        if occupancy_pct == 0 || occupancy_pct > 100 {
            return Err(RehashError::InvalidBucketCount(0));
        }
        let new_count = buckets_for(self.header.key_count, occupancy_pct, BLOCK_SIZE);
        self.rehash(new_count)?;
        self.header.occupancy_pct = occupancy_pct;
        self.store_header();
        Ok(())
    }

    /// Rebuild with new_bucket_count buckets.  Entries that keep their index range are placed
    /// first, then the ones from the cut off tail.  If any entry can not be placed the table is
    /// restored and PlacementFailed returned.
    pub fn rehash(&mut self, new_bucket_count: u64) -> Result<(), RehashError> {
        if self.read_only {
            return Err(RehashError::ReadOnly);
        }
        if new_bucket_count == 0 || new_bucket_count % BLOCK_SIZE != 0 {
            return Err(RehashError::InvalidBucketCount(new_bucket_count));
        }
        let available = self.region_buckets();
        if new_bucket_count > available {
            return Err(RehashError::InsufficientMemory {
                buckets: new_bucket_count,
                available,
            });
        }
        if self.header.key_count > new_bucket_count {
            return Err(RehashError::TooManyKeys {
                keys: self.header.key_count,
                buckets: new_bucket_count,
            });
        }
        let old_header = self.header.clone();
        let old_count = old_header.bucket_count;
        debug!(
            from = old_count,
            to = new_bucket_count,
            keys = old_header.key_count,
            "rehash cuckoo table"
        );
        let backup = self.active_bytes().to_vec();

        self.header.bucket_count = new_bucket_count;
        self.header.key_count = 0;
        self.header.delete_count = 0;
        self.call_ids = vec![0; (new_bucket_count / BLOCK_SIZE) as usize];
        self.clear_buckets(0, new_bucket_count);

        let split = old_count.min(new_bucket_count);
        let placed = self
            .replace_range(&backup, 0, split)
            .and_then(|_| self.replace_range(&backup, split, old_count));
        if let Err(err) = placed {
            error!(
                from = old_count,
                to = new_bucket_count,
                %err,
                "rehash failed, restoring table"
            );
            self.header = old_header;
            self.call_ids = vec![0; (old_count / BLOCK_SIZE) as usize];
            self.region.as_mut()[HEADER_SIZE..Self::bucket_pos(old_count)]
                .copy_from_slice(&backup);
            self.store_header();
            return Err(RehashError::PlacementFailed);
        }
        self.store_header();
        Ok(())
    }

    fn replace_range(&mut self, backup: &[u8], from: u64, to: u64) -> Result<(), InsertError> {
        for idx in from..to {
            let bucket = B::read(&backup[idx as usize * B::SIZE..]);
            if bucket.is_empty() {
                continue;
            }
            let slot = self.find_slot_for_new(&bucket.key())?;
            self.write_bucket(slot, &bucket);
            self.header.key_count += 1;
            if bucket.is_deleted() {
                self.header.delete_count += 1;
            }
        }
        Ok(())
    }

    fn write_key(&mut self, key: B::Key, value: B::Value, delete: bool) -> Result<(), InsertError> {
        if self.read_only {
            return Err(InsertError::ReadOnly);
        }
        if B::KEY_SENTINELS && key.is_special() {
            return Err(InsertError::SpecialKey);
        }
        let slot = match self.probe(&key) {
            Probe::Existing(idx, mut bucket) => {
                let was_deleted = bucket.is_deleted();
                if delete {
                    bucket.set_delete(key, value);
                    if !was_deleted {
                        self.header.delete_count += 1;
                    }
                } else {
                    bucket.set(key, value);
                    if was_deleted {
                        self.header.delete_count -= 1;
                    }
                }
                self.write_bucket(idx, &bucket);
                self.store_header();
                return Ok(());
            }
            Probe::Vacant(idx) => {
                if self.header.key_count >= self.capacity() {
                    return Err(InsertError::TableFull);
                }
                idx
            }
            Probe::Occupied => {
                if self.header.key_count >= self.capacity() {
                    return Err(InsertError::TableFull);
                }
                self.find_slot_for_new(&key)?
            }
        };
        let mut bucket = B::empty();
        if delete {
            bucket.set_delete(key, value);
            self.header.delete_count += 1;
        } else {
            bucket.set(key, value);
        }
        self.write_bucket(slot, &bucket);
        self.header.key_count += 1;
        self.store_header();
        Ok(())
    }

    /// Empty bucket for a key known not to be in the table, kicking occupants and adding hash
    /// functions as needed.
    fn find_slot_for_new(&mut self, key: &B::Key) -> Result<u64, InsertError> {
        loop {
            match self.probe(key) {
                Probe::Vacant(idx) => return Ok(idx),
                Probe::Existing(idx, _) => return Ok(idx),
                Probe::Occupied => {}
            }
            if let Some(idx) = self.bfs_find_bucket(key) {
                return Ok(idx);
            }
            if self.header.nu_hash_func < self.header.max_nu_hash_func {
                self.header.nu_hash_func += 1;
                self.store_header();
                warn!(
                    nu_hash_func = self.header.nu_hash_func,
                    key_count = self.header.key_count,
                    bucket_count = self.header.bucket_count,
                    "eviction search failed, adding a hash function"
                );
            } else {
                warn!(
                    nu_hash_func = self.header.nu_hash_func,
                    key_count = self.header.key_count,
                    "eviction search exhausted every hash function"
                );
                return Err(InsertError::NoPlacement {
                    nu_hash_func: self.header.nu_hash_func,
                });
            }
        }
    }

    fn next_call_id(&mut self) -> u64 {
        if self.cur_call_id == u64::MAX {
            self.call_ids.iter_mut().for_each(|id| *id = 0);
            self.cur_call_id = 0;
        }
        self.cur_call_id += 1;
        self.cur_call_id
    }

    /// Mark block visited for this search, false if it already was.
    fn visit(&mut self, block: u64, call_id: u64) -> bool {
        let slot = &mut self.call_ids[(block / BLOCK_SIZE) as usize];
        if *slot == call_id {
            false
        } else {
            *slot = call_id;
            true
        }
    }

    /// Breadth first search for a chain of moves ending in an empty bucket.  Every candidate
    /// block of key must be full.  Returns the freed bucket (in one of key's blocks).
    fn bfs_find_bucket(&mut self, key: &B::Key) -> Option<u64> {
        let call_id = self.next_call_id();
        let mut tree = std::mem::take(&mut self.bfs_tree);
        tree.clear();
        for func_id in 0..self.header.nu_hash_func {
            let block = self.block_start(key, func_id);
            if self.visit(block, call_id) {
                tree.push(BfsNode {
                    block,
                    parent: ROOT,
                    parent_slot: 0,
                    depth: 0,
                });
            }
        }
        let mut found = None;
        let mut head = 0;
        'search: while head < tree.len() {
            let node = tree[head];
            if node.depth < self.bfs_depth {
                for slot in 0..BLOCK_SIZE {
                    let occupant = self.read_bucket(node.block + slot).key();
                    for func_id in 0..self.header.nu_hash_func {
                        let candidate = self.block_start(&occupant, func_id);
                        if candidate == node.block {
                            continue;
                        }
                        if let Some(empty) = self.first_empty(candidate) {
                            found = Some(self.cuckoo_kick(&tree, head, slot, empty));
                            break 'search;
                        }
                        if tree.len() < MAX_BFS_TREE_NODES && self.visit(candidate, call_id) {
                            tree.push(BfsNode {
                                block: candidate,
                                parent: head,
                                parent_slot: slot,
                                depth: node.depth + 1,
                            });
                        }
                    }
                }
            }
            head += 1;
        }
        if found.is_none() {
            debug!(tree_nodes = tree.len(), "eviction search found no empty bucket");
        }
        self.bfs_tree = tree;
        found
    }

    /// Shift occupants along the tree path ending at (tree[node], slot) one step towards
    /// empty.  Returns the bucket freed in the root block.
    fn cuckoo_kick(&mut self, tree: &[BfsNode], node: usize, slot: u64, empty: u64) -> u64 {
        let mut dst = empty;
        let mut cur = node;
        let mut cur_slot = slot;
        loop {
            let src = tree[cur].block + cur_slot;
            let bucket = self.read_bucket(src);
            self.write_bucket(dst, &bucket);
            dst = src;
            if tree[cur].parent == ROOT {
                return dst;
            }
            cur_slot = tree[cur].parent_slot;
            cur = tree[cur].parent;
        }
    }

    #[inline]
    fn write_bucket(&mut self, idx: u64, bucket: &B) {
        let pos = Self::bucket_pos(idx);
        bucket.write(&mut self.region.as_mut()[pos..pos + B::SIZE]);
    }

    fn clear_buckets(&mut self, from: u64, to: u64) {
        let empty = B::empty();
        for idx in from..to {
            self.write_bucket(idx, &empty);
        }
    }

    fn zero_slots(&mut self, from: u64, count: u64) {
        let start = Self::bucket_pos(from);
        let end = Self::bucket_pos(from + count);
        self.region.as_mut()[start..end]
            .iter_mut()
            .for_each(|b| *b = 0);
    }

    fn store_header(&mut self) {
        self.header.store(&mut self.region.as_mut()[..HEADER_SIZE]);
    }
}

impl<B: HashBucket, S: AsRef<[u8]> + AsMut<[u8]>> ClosedHashTable for CuckooHashTableBase<B, S> {
    type Key = B::Key;
    type Value = B::Value;

    fn find(&self, key: &B::Key) -> Lookup<B::Value> {
        Self::find(self, key)
    }

    fn insert(&mut self, key: B::Key, value: B::Value) -> Result<(), InsertError> {
        Self::insert(self, key, value)
    }

    fn delete(&mut self, key: B::Key, value: B::Value) -> Result<(), InsertError> {
        Self::delete(self, key, value)
    }

    fn key_count(&self) -> u64 {
        self.header.key_count
    }

    fn delete_count(&self) -> u64 {
        self.header.delete_count
    }

    fn bucket_count(&self) -> u64 {
        self.header.bucket_count
    }

    fn capacity(&self) -> u64 {
        Self::capacity(self)
    }

    fn stretch(&mut self) -> Result<(), RehashError> {
        Self::stretch(self)
    }

    fn shrink(&mut self, occupancy_pct: u8) -> Result<(), RehashError> {
        Self::shrink(self, occupancy_pct)
    }

    fn rehash(&mut self, new_bucket_count: u64) -> Result<(), RehashError> {
        Self::rehash(self, new_bucket_count)
    }

    fn entries(&self) -> Vec<TableEntry<B::Key, B::Value>> {
        Self::entries(self)
    }
}

impl<B: HashBucket, S: AsRef<[u8]> + AsMut<[u8]>> BucketRegion for CuckooHashTableBase<B, S> {
    type Bucket = B;

    fn slot_bytes(&self, idx: u64) -> &[u8] {
        let pos = Self::bucket_pos(idx);
        &self.region.as_ref()[pos..pos + B::SIZE]
    }

    fn slot_bytes_mut(&mut self, idx: u64) -> &mut [u8] {
        let pos = Self::bucket_pos(idx);
        &mut self.region.as_mut()[pos..pos + B::SIZE]
    }

    fn has_special_slots(&self) -> bool {
        self.header.has_special_key
    }

    fn bucket_bytes(&self) -> &[u8] {
        self.active_bytes()
    }
}
