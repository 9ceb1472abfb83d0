//! [`LSMTree`] — the top-level storage engine coordinator.
//!
//! Routes writes through a write-ahead log and the active memtable
//! (the C0 layer), seals the memtable into a new SSTable when it fills
//! up, and merges the memtable with the stack of on-disk SSTables (the
//! C1 layer) on every read. See the crate-level documentation for the
//! overall architecture.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::key::TimeSeriesKey;
use crate::memtable::{self, MemTable};
use crate::sstable::SSTable;
use crate::value::TsValue;
use crate::wal::{WalRecordType, WriteAheadLog};

/// Maximum number of SSTables the C1 layer may hold.
pub const C1_LAYER_SIZE: usize = 100;

/// Tunable parameters for an [`LSMTree`].
#[derive(Debug, Clone)]
pub struct LSMTreeConfig {
    /// Maximum number of SSTables the C1 layer may hold before a flush
    /// fails with [`Error::C1Full`].
    pub c1_layer_size: usize,
    /// Number of entries the active memtable may hold before the next
    /// write triggers a flush.
    pub memtable_max_entries: usize,
}

impl Default for LSMTreeConfig {
    fn default() -> Self {
        LSMTreeConfig {
            c1_layer_size: C1_LAYER_SIZE,
            memtable_max_entries: memtable::MAX_ENTRIES,
        }
    }
}

struct Inner<V: TsValue> {
    path: PathBuf,
    memtable: MemTable<V>,
    wal: WriteAheadLog<V>,
    /// The C1 layer, oldest to newest.
    sstables: Vec<SSTable<V>>,
    next_id: u64,
    config: LSMTreeConfig,
}

impl<V: TsValue> Inner<V> {
    /// Applies one logical mutation to the memtable and flushes if it
    /// is now full. Shared by `put`/`remove` (after the WAL append)
    /// and `replay_wal` (which never re-appends).
    fn apply(&mut self, key: TimeSeriesKey, value: Option<V>) -> Result<()> {
        self.memtable.put(key, value);
        if self.memtable.size() >= self.config.memtable_max_entries {
            self.flush()?;
        }
        Ok(())
    }

    /// Seals the current memtable into a new SSTable, appends it to
    /// C1, clears the memtable, and truncates the WAL.
    fn flush(&mut self) -> Result<()> {
        if self.sstables.len() >= self.config.c1_layer_size {
            return Err(Error::C1Full(self.sstables.len()));
        }

        let id = self.next_id;
        self.next_id += 1;
        let data_path = self.path.join(format!("sstable_{id}.sst"));

        let memtable = std::mem::replace(&mut self.memtable, MemTable::new());
        let entries = memtable.size();
        let sstable = SSTable::seal(data_path, memtable)?;
        self.sstables.push(sstable);
        self.wal.clear()?;

        info!(id, entries, sstables = self.sstables.len(), "memtable flushed");
        Ok(())
    }
}

/// The storage engine: one active memtable, a write-ahead log, and a
/// stack of immutable on-disk SSTables.
///
/// Cheaply `Clone`-able; every clone shares the same underlying state
/// behind a [`RwLock`]. Writes must be serialised by the caller
/// (single-writer discipline); reads may run concurrently with each
/// other.
pub struct LSMTree<V: TsValue> {
    inner: Arc<RwLock<Inner<V>>>,
}

impl<V: TsValue> Clone for LSMTree<V> {
    fn clone(&self) -> Self {
        LSMTree {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: TsValue> LSMTree<V> {
    /// Opens (creating if missing) the engine directory at `path`.
    ///
    /// Collects existing `sstable_*.sst` files as the C1 layer, sorted
    /// ascending by filename, and opens (without replaying) the WAL.
    /// Callers decide when to call [`LSMTree::replay_wal`].
    pub fn open(path: impl Into<PathBuf>, config: LSMTreeConfig) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;

        let mut sst_paths: Vec<PathBuf> = fs::read_dir(&path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().map(|ext| ext == "sst").unwrap_or(false))
            .collect();
        sst_paths.sort();

        let mut next_id = 0u64;
        let mut sstables = Vec::with_capacity(sst_paths.len());
        for p in &sst_paths {
            if let Some(id) = parse_sstable_id(p) {
                next_id = next_id.max(id + 1);
            }
            sstables.push(SSTable::open(p.clone())?);
        }

        info!(
            path = %path.display(),
            sstables = sstables.len(),
            "LSM tree opened"
        );

        Ok(LSMTree {
            inner: Arc::new(RwLock::new(Inner {
                wal: WriteAheadLog::new(&path),
                path,
                memtable: MemTable::new(),
                sstables,
                next_id,
                config,
            })),
        })
    }

    /// Inserts or overwrites `key`.
    ///
    /// If `log` is `true`, the WAL record is appended before the
    /// memtable is updated, so a crash between the two leaves the
    /// write recoverable by [`LSMTree::replay_wal`] rather than lost.
    pub fn put(&self, key: TimeSeriesKey, value: V, log: bool) -> Result<()> {
        let mut inner = self.inner.write().expect("LSMTree lock poisoned");
        if log {
            inner.wal.append(WalRecordType::Put, &key, Some(value))?;
        }
        inner.apply(key, Some(value))
    }

    /// Inserts a tombstone for `key`. Same post-conditions as [`LSMTree::put`].
    pub fn remove(&self, key: TimeSeriesKey, log: bool) -> Result<()> {
        let mut inner = self.inner.write().expect("LSMTree lock poisoned");
        if log {
            inner.wal.append(WalRecordType::Remove, &key, None)?;
        }
        inner.apply(key, None)
    }

    /// Looks up `key`: the memtable first, then the C1 layer
    /// newest-first. Returns `None` both when the key was never
    /// written and when its most recent write was a tombstone.
    pub fn get(&self, key: &TimeSeriesKey) -> Result<Option<V>> {
        let inner = self.inner.read().expect("LSMTree lock poisoned");
        if let Some(value) = inner.memtable.get(key) {
            return Ok(value);
        }
        for sstable in inner.sstables.iter().rev() {
            if let Some(value) = sstable.get(key)? {
                return Ok(value);
            }
        }
        Ok(None)
    }

    /// Merges all entries with key in `[lo, hi)` that satisfy `filter`.
    ///
    /// SSTables are folded oldest-to-newest with in-place overwrite on
    /// a newer value and erase on a tombstone, then the memtable (the
    /// newest data) is folded on top the same way.
    pub fn get_range(
        &self,
        lo: &TimeSeriesKey,
        hi: &TimeSeriesKey,
        filter: impl Fn(&TimeSeriesKey) -> bool,
    ) -> Result<Vec<(TimeSeriesKey, V)>> {
        let inner = self.inner.read().expect("LSMTree lock poisoned");
        let mut merged: BTreeMap<TimeSeriesKey, V> = BTreeMap::new();

        for sstable in inner.sstables.iter() {
            for (key, value) in sstable.get_range(lo, hi)? {
                if !filter(&key) {
                    continue;
                }
                match value {
                    Some(v) => {
                        merged.insert(key, v);
                    }
                    None => {
                        merged.remove(&key);
                    }
                }
            }
        }

        for (key, value) in inner.memtable.get_range(lo, hi) {
            if !filter(&key) {
                continue;
            }
            match value {
                Some(v) => {
                    merged.insert(key, v);
                }
                None => {
                    merged.remove(&key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    /// Same output as [`LSMTree::get_range`], computed by scanning
    /// every SSTable and the memtable in parallel.
    ///
    /// Each source returns the subset of its entries matching `filter`
    /// (tombstones included); the results are then folded newest-first
    /// — the memtable, then SSTables from newest to oldest — keeping
    /// only the first occurrence of each key, and tombstones are
    /// dropped at the end.
    pub fn get_range_parallel(
        &self,
        lo: &TimeSeriesKey,
        hi: &TimeSeriesKey,
        filter: impl Fn(&TimeSeriesKey) -> bool + Sync,
    ) -> Result<Vec<(TimeSeriesKey, V)>> {
        let inner = self.inner.read().expect("LSMTree lock poisoned");
        let filter = &filter;
        let sstables = &inner.sstables;
        let memtable = &inner.memtable;

        let scan_results: std::result::Result<
            Vec<Result<Vec<(TimeSeriesKey, Option<V>)>>>,
            _,
        > = crossbeam::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(sstables.len() + 1);
            for sstable in sstables.iter() {
                handles.push(scope.spawn(move |_| {
                    sstable
                        .get_range(lo, hi)
                        .map(|entries| entries.into_iter().filter(|(k, _)| filter(k)).collect())
                }));
            }
            handles.push(scope.spawn(move |_| {
                Ok(memtable
                    .get_range(lo, hi)
                    .into_iter()
                    .filter(|(k, _)| filter(k))
                    .collect())
            }));
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let scan_results = scan_results.map_err(|_| {
            Error::Io(std::io::Error::other("parallel range scan task panicked"))
        })?;

        let mut per_source = Vec::with_capacity(scan_results.len());
        for result in scan_results {
            per_source.push(result?);
        }
        // `per_source` is [sstable_0 (oldest), ..., sstable_n (newest), memtable].
        // Newest-first fold order: memtable, then sstables from newest to oldest.
        let memtable_entries = per_source.pop().expect("memtable source always present");
        per_source.reverse();

        let mut first_seen: BTreeMap<TimeSeriesKey, Option<V>> = BTreeMap::new();
        for (key, value) in memtable_entries {
            first_seen.entry(key).or_insert(value);
        }
        for entries in per_source {
            for (key, value) in entries {
                first_seen.entry(key).or_insert(value);
            }
        }

        Ok(first_seen
            .into_iter()
            .filter_map(|(k, v)| v.map(|value| (k, value)))
            .collect())
    }

    /// Applies every record in the write-ahead log to the memtable, in
    /// append order, without re-appending them.
    pub fn replay_wal(&self) -> Result<()> {
        let mut inner = self.inner.write().expect("LSMTree lock poisoned");
        let records = inner.wal.replay()?;
        debug!(count = records.len(), "replaying records into memtable");
        for record in records {
            let value = match record.record_type {
                WalRecordType::Put => record.value,
                WalRecordType::Remove => None,
            };
            inner.apply(record.key, value)?;
        }
        Ok(())
    }

    /// Removes every SSTable file and its metadata sidecar, and the
    /// WAL file. Does not touch the in-memory memtable.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().expect("LSMTree lock poisoned");
        for sstable in inner.sstables.drain(..) {
            remove_if_exists(sstable.path())?;
            remove_if_exists(sstable.metadata_path())?;
        }
        remove_if_exists(inner.wal.path())?;
        warn!(path = %inner.path.display(), "LSM tree cleared");
        Ok(())
    }

    /// `true` if the memtable is empty and the C1 layer holds no SSTables.
    pub fn empty(&self) -> bool {
        let inner = self.inner.read().expect("LSMTree lock poisoned");
        inner.memtable.empty() && inner.sstables.is_empty()
    }

    /// Number of SSTables currently in the C1 layer.
    pub fn sstable_count(&self) -> usize {
        self.inner.read().expect("LSMTree lock poisoned").sstables.len()
    }
}

impl<V: TsValue> std::fmt::Display for LSMTree<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().map_err(|_| std::fmt::Error)?;
        write!(
            f,
            "LSMTree(memtable={}, sstables={})",
            inner.memtable.size(),
            inner.sstables.len()
        )
    }
}

fn parse_sstable_id(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix("sstable_")?.parse().ok()
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
