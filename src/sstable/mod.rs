//! [`SSTable`] — an immutable, sorted on-disk table with a Bloom
//! filter and a sparse index, read via a memory-mapped data file.
//!
//! Two files make up one SSTable: a data file (`sstable_<id>.sst`)
//! holding entries back-to-back in ascending key order, and a metadata
//! sidecar (`sstable_<id>.metadata`) holding the time range, key
//! range, Bloom filter, and index. Both are written once, at seal
//! time, and never modified again.


use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, info};

use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::key::TimeSeriesKey;
use crate::memtable::{MemTable, MAX_ENTRIES};
use crate::range::DataRange;
use crate::value::TsValue;

/// False-positive rate used when sizing each SSTable's Bloom filter.
pub const BLOOM_FILTER_FALSE_POSITIVE_RATE: f64 = 0.01;

/// An immutable, memory-mapped, sorted table plus its metadata.
pub struct SSTable<V: TsValue> {
    data_path: PathBuf,
    metadata_path: PathBuf,
    mmap: Option<Mmap>,
    bloom: BloomFilter,
    time_range: DataRange<u64>,
    key_range: DataRange<TimeSeriesKey>,
    index: BTreeMap<TimeSeriesKey, u64>,
    _marker: PhantomData<V>,
}

impl<V: TsValue> SSTable<V> {
    /// The metadata sidecar path for a given data file path.
    pub fn metadata_path_for(data_path: &Path) -> PathBuf {
        data_path.with_extension("metadata")
    }

    /// Opens an existing SSTable at `data_path`.
    ///
    /// If the file does not exist, returns an idle handle: every
    /// operation on it behaves as if the table were empty.
    pub fn open(data_path: impl Into<PathBuf>) -> Result<Self> {
        let data_path = data_path.into();
        let metadata_path = Self::metadata_path_for(&data_path);

        if !data_path.exists() {
            debug!(path = %data_path.display(), "sstable handle idle, no data file");
            return Ok(SSTable {
                data_path,
                metadata_path,
                mmap: None,
                bloom: BloomFilter::new(MAX_ENTRIES as u64, BLOOM_FILTER_FALSE_POSITIVE_RATE)?,
                time_range: DataRange::new(),
                key_range: DataRange::new(),
                index: BTreeMap::new(),
                _marker: PhantomData,
            });
        }

        let file = File::open(&data_path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let (time_range, key_range, bloom, index) = load_metadata(&metadata_path)?;

        info!(path = %data_path.display(), entries = index.len(), "sstable opened");
        Ok(SSTable {
            data_path,
            metadata_path,
            mmap: Some(mmap),
            bloom,
            time_range,
            key_range,
            index,
            _marker: PhantomData,
        })
    }

    /// Seals `memtable` into a new SSTable at `data_path`: writes the
    /// data file and metadata sidecar from a single traversal, then
    /// memory-maps the data file. The memtable is consumed.
    pub fn seal(data_path: impl Into<PathBuf>, memtable: MemTable<V>) -> Result<Self> {
        let data_path = data_path.into();
        let metadata_path = Self::metadata_path_for(&data_path);

        let mut bloom = BloomFilter::new(MAX_ENTRIES as u64, BLOOM_FILTER_FALSE_POSITIVE_RATE)?;
        let mut time_range = DataRange::new();
        let mut key_range = DataRange::new();
        let mut index = BTreeMap::new();

        let entries = memtable.into_entries();
        {
            let mut file = File::create(&data_path)?;
            let count_str = entries.len().to_string();
            file.write_all(count_str.as_bytes())?;
            let mut pos = count_str.len() as u64;

            for (key, value) in &entries {
                if let Some(ts) = key.timestamp() {
                    time_range.update(ts);
                }
                key_range.update(key.clone());
                bloom.insert(key);
                index.insert(key.clone(), pos);

                let entry_str = format_entry(key, *value);
                pos += entry_str.len() as u64;
                file.write_all(entry_str.as_bytes())?;
            }
            file.flush()?;
        }

        save_metadata(&metadata_path, &time_range, &key_range, &bloom, &index)?;

        let file = File::open(&data_path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        info!(path = %data_path.display(), entries = index.len(), "sstable sealed");
        Ok(SSTable {
            data_path,
            metadata_path,
            mmap: Some(mmap),
            bloom,
            time_range,
            key_range,
            index,
            _marker: PhantomData,
        })
    }

    /// Data file path.
    pub fn path(&self) -> &Path {
        &self.data_path
    }

    /// Metadata sidecar path.
    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    /// Number of entries in the index.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// `true` if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// `mayContain_Bloom(k) ∧ k ∈ key_range ∧ k ∈ index` — a cheap
    /// probe that never touches the mapped file.
    pub fn contains(&self, key: &TimeSeriesKey) -> bool {
        if key.is_sentinel() {
            return false;
        }
        self.bloom.may_contain(key) && self.in_range(key) && self.index.contains_key(key)
    }

    /// Looks up `key`.
    ///
    /// `Ok(None)` if `key` is absent. `Ok(Some(None))` if present as a
    /// tombstone. Fails with [`Error::CorruptSSTable`] if the index
    /// offset does not yield the expected key.
    pub fn get(&self, key: &TimeSeriesKey) -> Result<Option<Option<V>>> {
        if !self.contains(key) {
            return Ok(None);
        }
        let pos = *self
            .index
            .get(key)
            .expect("contains() already confirmed this key is indexed");
        let mmap = self
            .mmap
            .as_ref()
            .expect("contains() already confirmed the data file is mapped");

        let data = std::str::from_utf8(mmap)
            .map_err(|_| Error::CorruptSSTable("data file is not valid UTF-8".to_string()))?;
        let pos = pos as usize;
        if pos >= data.len() || data.as_bytes()[pos] != b'[' {
            return Err(Error::CorruptSSTable(format!(
                "invalid offset {pos} for key {key}"
            )));
        }

        let rest = &data[pos + 1..];
        let end = rest
            .find(']')
            .ok_or_else(|| Error::CorruptSSTable(format!("unterminated entry at offset {pos}")))?;
        let entry = &rest[..end];
        let sep = entry
            .find('|')
            .ok_or_else(|| Error::CorruptSSTable(format!("malformed entry at offset {pos}")))?;
        let key_str = &entry[..sep];
        let value_str = &entry[sep + 1..];

        let entry_key = TimeSeriesKey::from_canonical_str(key_str)
            .map_err(|_| Error::CorruptSSTable(format!("malformed entry key at offset {pos}")))?;
        if &entry_key != key {
            return Err(Error::CorruptSSTable(format!(
                "key mismatch at offset {pos}: expected {key}, found {entry_key}"
            )));
        }

        let value = if value_str == "null" {
            None
        } else {
            Some(
                value_str
                    .parse::<V>()
                    .map_err(|_| Error::CorruptSSTable(format!("malformed value at offset {pos}")))?,
            )
        };
        Ok(Some(value))
    }

    /// Entries with key in `[lo, hi)`.
    ///
    /// Empty if neither the time range nor the key range overlap
    /// `[lo, hi]`.
    pub fn get_range(
        &self,
        lo: &TimeSeriesKey,
        hi: &TimeSeriesKey,
    ) -> Result<Vec<(TimeSeriesKey, Option<V>)>> {
        if !self.overlaps(lo, hi) || lo >= hi {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for key in self.index.range(lo.clone()..hi.clone()).map(|(k, _)| k) {
            if let Some(value) = self.get(key)? {
                out.push((key.clone(), value));
            }
        }
        Ok(out)
    }

    fn in_range(&self, key: &TimeSeriesKey) -> bool {
        match key.timestamp() {
            Some(ts) => self.time_range.contains(&ts) && self.key_range.contains(key),
            None => false,
        }
    }

    fn overlaps(&self, lo: &TimeSeriesKey, hi: &TimeSeriesKey) -> bool {
        match (lo.timestamp(), hi.timestamp()) {
            (Some(a), Some(b)) => {
                self.time_range.overlaps(&a, &b) || self.key_range.overlaps(lo, hi)
            }
            _ => self.key_range.overlaps(lo, hi),
        }
    }
}

fn format_entry<V: TsValue>(key: &TimeSeriesKey, value: Option<V>) -> String {
    match value {
        Some(v) => format!("[{}|{}]", key.to_canonical_string(), v),
        None => format!("[{}|null]", key.to_canonical_string()),
    }
}

fn save_metadata(
    path: &Path,
    time_range: &DataRange<u64>,
    key_range: &DataRange<TimeSeriesKey>,
    bloom: &BloomFilter,
    index: &BTreeMap<TimeSeriesKey, u64>,
) -> Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{time_range}")?;
    writeln!(file, "{key_range}")?;
    writeln!(file, "{bloom}")?;
    writeln!(file, "{}", index.len())?;
    for (key, pos) in index {
        writeln!(file, "{}^{}", key.to_canonical_string(), pos)?;
    }
    Ok(())
}

type LoadedMetadata = (
    DataRange<u64>,
    DataRange<TimeSeriesKey>,
    BloomFilter,
    BTreeMap<TimeSeriesKey, u64>,
);

fn load_metadata(path: &Path) -> Result<LoadedMetadata> {
    let corrupt = |msg: String| Error::CorruptSSTable(msg);
    let text = std::fs::read_to_string(path)?;
    let mut lines = text.lines();

    let time_range_line = lines
        .next()
        .ok_or_else(|| corrupt("metadata file missing time range line".to_string()))?;
    let time_range: DataRange<u64> = time_range_line
        .parse()
        .map_err(|e| corrupt(format!("malformed time range: {e}")))?;

    let key_range_line = lines
        .next()
        .ok_or_else(|| corrupt("metadata file missing key range line".to_string()))?;
    let key_range = if key_range_line == "null" {
        DataRange::new()
    } else {
        let (lo_str, hi_str) = TimeSeriesKey::split_canonical_pair(key_range_line)
            .map_err(|e| corrupt(format!("malformed key range: {e}")))?;
        let lo = TimeSeriesKey::from_canonical_str(lo_str)
            .map_err(|e| corrupt(format!("malformed key range bound: {e}")))?;
        let hi = TimeSeriesKey::from_canonical_str(hi_str)
            .map_err(|e| corrupt(format!("malformed key range bound: {e}")))?;
        DataRange::from_bounds(lo, hi)
    };

    let bloom_line = lines
        .next()
        .ok_or_else(|| corrupt("metadata file missing bloom filter line".to_string()))?;
    let bloom: BloomFilter = bloom_line
        .parse()
        .map_err(|e| corrupt(format!("malformed bloom filter: {e}")))?;

    let count_line = lines
        .next()
        .ok_or_else(|| corrupt("metadata file missing index count line".to_string()))?;
    let count: usize = count_line
        .parse()
        .map_err(|_| corrupt(format!("malformed index count: {count_line:?}")))?;

    let mut index = BTreeMap::new();
    for _ in 0..count {
        let line = lines
            .next()
            .ok_or_else(|| corrupt("metadata file truncated before all index lines".to_string()))?;
        let caret = line
            .find('^')
            .ok_or_else(|| corrupt(format!("malformed index line: {line:?}")))?;
        let key = TimeSeriesKey::from_canonical_str(&line[..caret])
            .map_err(|e| corrupt(format!("malformed index key: {e}")))?;
        let offset: u64 = line[caret + 1..]
            .parse()
            .map_err(|_| corrupt(format!("malformed index offset: {line:?}")))?;
        index.insert(key, offset);
    }

    Ok((time_range, key_range, bloom, index))
}
