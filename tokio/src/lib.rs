#![deny(missing_docs)]

//! Provide a tokio async front end over the core cuckoo tables.  This is tokio specific but
//! should be easily adaptable to other runtimes.

pub mod config;
pub mod error;
mod write_thread;

pub use config::ShardedConfig;
pub use error::{DumpError, GetError, SyncError};

use crate::write_thread::{write_thread, WriteCommand};
use dashmap::DashMap;
use kvtable_core::error::MountError;
use kvtable_core::table::{CuckooHashTable, Lookup, TableEntry};
use kvtable_core::table_config::TableConfig;
use kvtable_core::table_files::{write_table_file, TableFiles};
use kvtable_core::table_key::TableKey;
use kvtable_core::value::SentinelValue;
use rustc_hash::FxHasher;
use std::hash::{BuildHasher, BuildHasherDefault, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::Instant;
use tracing::debug;

/// A write waiting in the write cache.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Pending<V> {
    Insert(V),
    Delete(V),
}

impl<V> Pending<V> {
    fn lookup(self) -> Lookup<V> {
        match self {
            Self::Insert(v) => Lookup::Found(v),
            Self::Delete(v) => Lookup::Deleted(v),
        }
    }
}

/// Limits for a single get.
#[derive(Clone, Debug, Default)]
pub struct GetOptions {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

impl GetOptions {
    /// No deadline and no cancel signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up timeout from now.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    /// Give up at deadline.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Give up once cancel holds true.
    pub fn cancel_on(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn check(&self) -> Result<(), GetError> {
        if let Some(cancel) = &self.cancel {
            if *cancel.borrow() {
                return Err(GetError::Cancelled);
            }
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(GetError::Timeout),
            _ => Ok(()),
        }
    }
}

/// Thread safe table sharded into several cuckoo tables.
/// Writes go to a shared write cache and are queued for the shard's write thread, so they return
/// as soon as the command is queued and are visible to gets right away.  The write thread owns
/// the resize policy: a full shard is stretched if it still has its reserve and otherwise
/// regrown into a region with twice the capacity.  Gets check the write cache and then make a
/// synchronous find under the shard's read lock.
pub struct ShardedTable<K, V, S = BuildHasherDefault<FxHasher>>
where
    K: TableKey + Send + Sync + 'static,
    V: SentinelValue + Send + Sync + 'static,
    S: Send + Sync + Clone + BuildHasher + Default + 'static,
{
    shards: Vec<Arc<RwLock<CuckooHashTable<K, V>>>>,
    write_cache: Arc<DashMap<K, Pending<V>, S>>,
    write_txs: Vec<mpsc::Sender<WriteCommand<K>>>,
    write_threads: Option<Vec<std::thread::JoinHandle<()>>>,
    // Shared with the write threads, little to no contention and usable outside the runtime.
    grow_config: Arc<parking_lot::Mutex<TableConfig>>,
    shard_bits: u8,
    hasher: S,
}

impl<K, V, S> Drop for ShardedTable<K, V, S>
where
    K: TableKey + Send + Sync + 'static,
    V: SentinelValue + Send + Sync + 'static,
    S: Send + Sync + Clone + BuildHasher + Default + 'static,
{
    fn drop(&mut self) {
        for write_tx in &self.write_txs {
            let _ = write_tx.try_send(WriteCommand::Done);
        }
        // Closing the channels ends any thread that could not take Done (full channel).
        self.write_txs.clear();
        if let Some(mut threads) = self.write_threads.take() {
            for thread in threads.drain(..) {
                let _ = thread.join();
            }
        }
    }
}

impl<K, V, S> ShardedTable<K, V, S>
where
    K: TableKey + Send + Sync + 'static,
    V: SentinelValue + Send + Sync + 'static,
    S: Send + Sync + Clone + BuildHasher + Default + 'static,
{
    /// Create an empty table, every shard is sized for config's initial capacity.
    pub fn new(config: ShardedConfig) -> Result<Self, MountError> {
        let shard_count = config.shards();
        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            let region = vec![
                0_u8;
                CuckooHashTable::<K, V>::table_memory_for(
                    config.initial_capacity,
                    &config.table_config
                )
            ];
            let table = CuckooHashTable::<K, V>::mount_for_write(region, &config.table_config)?;
            shards.push(Arc::new(RwLock::new(table)));
        }
        let write_cache: Arc<DashMap<K, Pending<V>, S>> =
            Arc::new(DashMap::with_hasher(S::default()));
        let grow_config = Arc::new(parking_lot::Mutex::new(config.table_config.clone()));
        let mut write_txs = Vec::with_capacity(shard_count);
        let mut write_threads = Vec::with_capacity(shard_count);
        for shard in &shards {
            let (write_tx, write_rx) = mpsc::channel(config.channel_depth);
            let shard_clone = shard.clone();
            let write_cache_clone = write_cache.clone();
            let grow_config_clone = grow_config.clone();
            let thread = std::thread::spawn(move || {
                write_thread(shard_clone, write_cache_clone, grow_config_clone, write_rx)
            });
            write_threads.push(thread);
            write_txs.push(write_tx);
        }
        debug!(
            shards = shard_count,
            initial_capacity = config.initial_capacity,
            "created sharded table"
        );
        Ok(Self {
            shards,
            write_cache,
            write_txs,
            write_threads: Some(write_threads),
            grow_config,
            shard_bits: config.shard_bits,
            hasher: S::default(),
        })
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Replace the table config used when a shard regrows.
    pub fn set_table_config(&self, table_config: TableConfig) {
        *self.grow_config.lock() = table_config;
    }

    /// Look up key.
    pub async fn get(&self, key: K) -> Lookup<V> {
        if let Some(pending) = self.cached(&key) {
            return pending.lookup();
        }
        let shard = &self.shards[self.shard(&key)];
        let table = shard.read().await;
        table.find(&key)
    }

    /// Look up key giving up at the deadline or on the cancel signal of options.  Both are
    /// checked before and after the find, the deadline also bounds the wait for the shard.
    pub async fn get_with(&self, key: K, options: &GetOptions) -> Result<Lookup<V>, GetError> {
        options.check()?;
        if let Some(pending) = self.cached(&key) {
            return Ok(pending.lookup());
        }
        let shard = &self.shards[self.shard(&key)];
        let table = match options.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, shard.read())
                .await
                .map_err(|_| GetError::Timeout)?,
            None => shard.read().await,
        };
        options.check()?;
        let res = table.find(&key);
        drop(table);
        options.check()?;
        Ok(res)
    }

    /// True if key is in the table and not deleted.
    pub async fn contains_key(&self, key: K) -> bool {
        matches!(self.get(key).await, Lookup::Found(_))
    }

    /// Insert or update key.  Returns once the write is queued for the shard.
    pub async fn insert(&self, key: K, value: V) -> Result<(), SyncError> {
        self.queue(key, Pending::Insert(value)).await
    }

    /// Delete key, value is the tombstone to store (it carries the timestamp if any).
    pub async fn delete(&self, key: K, value: V) -> Result<(), SyncError> {
        self.queue(key, Pending::Delete(value)).await
    }

    /// Entries in the shard tables, valid plus deleted.  Lags writes still in flight.
    pub async fn len(&self) -> u64 {
        let mut length = 0;
        for shard in &self.shards {
            length += shard.read().await.key_count();
        }
        length
    }

    /// Are the shard tables empty?
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait until every queued write is applied to its shard and dropped from the write cache.
    /// Reports the first write that failed since the last commit.
    pub async fn commit(&self) -> Result<(), SyncError> {
        let mut result = Ok(());
        let mut rxs = Vec::with_capacity(self.write_txs.len());
        for write_tx in &self.write_txs {
            let (tx, rx) = tokio::sync::oneshot::channel();
            if write_tx.send(WriteCommand::Commit(tx)).await.is_ok() {
                rxs.push(rx);
            } else {
                // The receiver in the write thread was dropped.
                result = Err(SyncError::SendChannelClosed);
            }
        }
        for rx in rxs.drain(..) {
            match rx.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => result = Err(err),
                Err(_err) => result = Err(SyncError::ReceiveFailed),
            }
        }
        result
    }

    /// Schedule a commit but don't wait for it to complete.
    pub async fn commit_bg(&self) {
        for write_tx in &self.write_txs {
            // An error here indicates the receiver in the write thread was closed/dropped.
            let _ = write_tx.send(WriteCommand::CommitBG).await;
        }
    }

    /// Committed entries of every shard in shard order.
    pub async fn entries(&self) -> Vec<TableEntry<K, V>> {
        let mut entries = Vec::new();
        for shard in &self.shards {
            entries.extend(shard.read().await.entries());
        }
        entries
    }

    /// Commit, then write each shard's image to dir/{name}_shard_{i}.tbl.
    pub async fn dump<P: AsRef<Path>>(
        &self,
        dir: P,
        name: &str,
    ) -> Result<Vec<PathBuf>, DumpError> {
        self.commit().await?;
        let mut paths = Vec::with_capacity(self.shards.len());
        for (i, shard) in self.shards.iter().enumerate() {
            let files = TableFiles::with_dir(dir.as_ref(), format!("{name}_shard_{i}"));
            let table = shard.read().await;
            write_table_file(&*table, &files)?;
            paths.push(files.table_path());
        }
        Ok(paths)
    }

    async fn queue(&self, key: K, pending: Pending<V>) -> Result<(), SyncError> {
        self.write_cache.insert(key, pending);
        let shard = self.shard(&key);
        self.write_txs[shard]
            .send(WriteCommand::Write(key))
            .await
            .map_err(|_| SyncError::SendChannelClosed)
    }

    fn cached(&self, key: &K) -> Option<Pending<V>> {
        self.write_cache.get(key).map(|pending| *pending)
    }

    /// Return the shard for a key.
    fn shard(&self, key: &K) -> usize {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        // Use the top bits for shard, the tables place keys with their own hash functions.
        hasher.finish().checked_shr(64 - self.shard_bits as u32).unwrap_or(0) as usize
    }
}
