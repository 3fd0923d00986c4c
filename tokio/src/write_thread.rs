//! Per shard write thread.  Writes land in the shared write cache first, the thread applies
//! them to its shard table and drops them from the cache on commit.

use crate::error::SyncError;
use crate::Pending;
use dashmap::DashMap;
use kvtable_core::error::insert::InsertError;
use kvtable_core::table::CuckooHashTable;
use kvtable_core::table_config::TableConfig;
use kvtable_core::table_key::TableKey;
use kvtable_core::value::SentinelValue;
use std::hash::BuildHasher;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{info, warn};

/// Regrow attempts (each doubling the capacity) before a write gives up.
const MAX_REGROW_ATTEMPTS: usize = 4;

/// Commands that can be sent to a write thread.
pub(crate) enum WriteCommand<K> {
    /// Apply the pending write cached for the key.
    Write(K),
    Commit(oneshot::Sender<Result<(), SyncError>>),
    CommitBG,
    Done,
}

/// Make room in table, stretch if the reserve is still there otherwise move everything into a
/// new region with at least twice the capacity.
pub(crate) fn grow_table<K, V>(
    table: &mut CuckooHashTable<K, V>,
    config: &TableConfig,
) -> Result<(), InsertError>
where
    K: TableKey,
    V: SentinelValue,
{
    if table.header().stretch_size() > 0 {
        match table.stretch() {
            Ok(()) => return Ok(()),
            Err(err) => warn!(%err, "stretch failed, regrowing shard"),
        }
    }
    let entries = table.entries();
    let mut max_keys = (table.capacity().max(1) * 2).max(entries.len() as u64 * 2);
    for _ in 0..MAX_REGROW_ATTEMPTS {
        let region = vec![0_u8; CuckooHashTable::<K, V>::table_memory_for(max_keys, config)];
        let mut grown = CuckooHashTable::<K, V>::mount_for_write(region, config)
            .map_err(|_| InsertError::TableFull)?;
        let placed = entries.iter().all(|entry| {
            if entry.deleted {
                grown.delete(entry.key, entry.value).is_ok()
            } else {
                grown.insert(entry.key, entry.value).is_ok()
            }
        });
        if placed {
            info!(
                old_buckets = table.bucket_count(),
                bucket_count = grown.bucket_count(),
                key_count = grown.key_count(),
                "regrew shard table"
            );
            *table = grown;
            return Ok(());
        }
        max_keys *= 2;
    }
    Err(InsertError::TableFull)
}

/// Apply one write, growing the table once if it is full.
fn apply<K, V>(
    table: &mut CuckooHashTable<K, V>,
    key: K,
    pending: Pending<V>,
    config: &TableConfig,
) -> Result<(), InsertError>
where
    K: TableKey,
    V: SentinelValue,
{
    let write = |table: &mut CuckooHashTable<K, V>| match pending {
        Pending::Insert(value) => table.insert(key, value),
        Pending::Delete(value) => table.delete(key, value),
    };
    match write(table) {
        Err(InsertError::TableFull) | Err(InsertError::NoPlacement { .. }) => {
            grow_table(table, config)?;
            write(table)
        }
        res => res,
    }
}

/// Drop applied writes from the cache unless a newer write replaced them.
fn commit_applied<K, V, S>(
    write_cache: &DashMap<K, Pending<V>, S>,
    applied: &mut Vec<(K, Pending<V>)>,
    result_tx: Option<oneshot::Sender<Result<(), SyncError>>>,
) where
    K: TableKey,
    V: SentinelValue,
    S: BuildHasher + Clone,
{
    for (key, pending) in applied.drain(..) {
        write_cache.remove_if(&key, |_, cached| *cached == pending);
    }
    if let Some(tx) = result_tx {
        let _ = tx.send(Ok(()));
    }
}

/// Run a background thread to manage the writes for a single shard.
pub(crate) fn write_thread<K, V, S>(
    shard: Arc<RwLock<CuckooHashTable<K, V>>>,
    write_cache: Arc<DashMap<K, Pending<V>, S>>,
    grow_config: Arc<parking_lot::Mutex<TableConfig>>,
    mut write_rx: mpsc::Receiver<WriteCommand<K>>,
) where
    K: TableKey,
    V: SentinelValue,
    S: BuildHasher + Clone,
{
    let mut applied = Vec::new();
    let mut last_insert_error: Option<InsertError> = None;
    loop {
        match write_rx.blocking_recv() {
            Some(WriteCommand::Write(key)) => {
                let pending = write_cache.get(&key).map(|cached| *cached);
                if let Some(pending) = pending {
                    let config = grow_config.lock().clone();
                    let res = apply(&mut shard.blocking_write(), key, pending, &config);
                    match res {
                        Ok(()) => applied.push((key, pending)),
                        Err(err) => {
                            warn!(?key, %err, "shard write failed");
                            // Leave the write cached so reads still see it.
                            last_insert_error.get_or_insert(err);
                        }
                    }
                }
            }
            Some(WriteCommand::Commit(tx)) => {
                if let Some(err) = last_insert_error.take() {
                    let _ = tx.send(Err(SyncError::PreviousInsertFailed(err)));
                } else {
                    commit_applied(&write_cache, &mut applied, Some(tx));
                }
            }
            Some(WriteCommand::CommitBG) => {
                commit_applied(&write_cache, &mut applied, None);
            }
            // Done or the sender has been dropped so nothing left to do.
            Some(WriteCommand::Done) | None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvtable_core::table::Lookup;
    use kvtable_core::value::SpecialValue;

    type Table = CuckooHashTable<u64, SpecialValue<u64>>;

    fn small_table(config: &TableConfig) -> Table {
        Table::mount_for_write(vec![0_u8; Table::table_memory_for(64, config)], config).unwrap()
    }

    #[test]
    fn test_grow_stretches_then_regrows() {
        let config = TableConfig::new();
        let mut table = small_table(&config);
        let buckets = table.bucket_count();
        grow_table(&mut table, &config).unwrap();
        assert!(table.bucket_count() > buckets);
        assert_eq!(table.header().stretch_size(), 0);
        let stretched = table.capacity();
        grow_table(&mut table, &config).unwrap();
        assert!(table.capacity() >= stretched * 2);
    }

    #[test]
    fn test_apply_grows_when_full() {
        let config = TableConfig::new().no_stretch();
        let mut table = small_table(&config);
        for key in 0..1_000_u64 {
            apply(&mut table, key, Pending::Insert(SpecialValue::new(key + 1)), &config).unwrap();
        }
        apply(&mut table, 7, Pending::Delete(SpecialValue::deleted()), &config).unwrap();
        assert_eq!(table.key_count(), 1_000);
        assert_eq!(table.find(&999), Lookup::Found(SpecialValue::new(1_000)));
        assert!(table.find(&7).is_deleted());
        assert!(table.verify_probe_invariant().is_empty());
    }
}
