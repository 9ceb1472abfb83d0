//! [`MemTable`] — the in-memory C0 layer.
//!
//! An ordered map from [`TimeSeriesKey`] to an optional value (an
//! absent value is a tombstone), plus a pair of [`DataRange`]s tracking
//! the span of timestamps and keys currently held. The ranges let
//! [`MemTable::get`]/[`MemTable::contains`]/[`MemTable::get_range`]
//! reject a query in O(1) without touching the underlying map when it
//! provably cannot match.


use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::key::TimeSeriesKey;
use crate::range::DataRange;
use crate::value::TsValue;

/// Maximum number of entries a memtable may hold before the owning
/// engine must flush it.
pub const MAX_ENTRIES: usize = 1000;

/// The in-memory, ordered write buffer of the storage engine.
#[derive(Debug, Clone)]
pub struct MemTable<V: TsValue> {
    table: BTreeMap<TimeSeriesKey, Option<V>>,
    time_range: DataRange<u64>,
    key_range: DataRange<TimeSeriesKey>,
}

impl<V: TsValue> MemTable<V> {
    /// An empty memtable.
    pub fn new() -> Self {
        MemTable {
            table: BTreeMap::new(),
            time_range: DataRange::new(),
            key_range: DataRange::new(),
        }
    }

    /// Inserts or overwrites `key`. `value = None` records a tombstone.
    ///
    /// Widening the ranges on a tombstone insert is deliberate: a later
    /// read for `key` must still see the tombstone, which requires the
    /// range gate to stay consistent with the map.
    pub fn put(&mut self, key: TimeSeriesKey, value: Option<V>) {
        if let Some(ts) = key.timestamp() {
            self.time_range.update(ts);
        }
        self.key_range.update(key.clone());
        self.table.insert(key, value);
    }

    /// `Some(value)` if `key` is present and inside both ranges, else
    /// `None`. The range gate is a pure optimisation and must always
    /// agree with a direct map lookup.
    pub fn get(&self, key: &TimeSeriesKey) -> Option<Option<V>> {
        if !self.in_range(key) {
            return None;
        }
        self.table.get(key).copied()
    }

    /// Same gating as [`MemTable::get`], without returning the value.
    pub fn contains(&self, key: &TimeSeriesKey) -> bool {
        self.in_range(key) && self.table.contains_key(key)
    }

    /// Entries with key in `[lo, hi)`, in key order.
    ///
    /// Empty if the memtable's ranges do not overlap `[lo, hi)`.
    pub fn get_range(
        &self,
        lo: &TimeSeriesKey,
        hi: &TimeSeriesKey,
    ) -> Vec<(TimeSeriesKey, Option<V>)> {
        if !self.key_range.overlaps(lo, hi) {
            return Vec::new();
        }
        self.table
            .range(lo.clone()..hi.clone())
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Empties the map and both ranges.
    pub fn clear(&mut self) {
        self.table.clear();
        self.time_range.clear();
        self.key_range.clear();
    }

    /// Number of entries (including tombstones).
    pub fn size(&self) -> usize {
        self.table.len()
    }

    /// `true` if no entries are held.
    pub fn empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Consumes the memtable, returning its entries in ascending key
    /// order. Used when sealing a memtable into an SSTable — after
    /// this call the memtable no longer exists.
    pub fn into_entries(self) -> Vec<(TimeSeriesKey, Option<V>)> {
        self.table.into_iter().collect()
    }

    fn in_range(&self, key: &TimeSeriesKey) -> bool {
        match key.timestamp() {
            Some(ts) => self.time_range.contains(&ts) && self.key_range.contains(key),
            None => self.key_range.contains(key),
        }
    }
}

impl<V: TsValue> Default for MemTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: TsValue> fmt::Display for MemTable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.table.len())?;
        for (k, v) in &self.table {
            f.write_str("[")?;
            f.write_str(&k.to_canonical_string())?;
            f.write_str("|")?;
            match v {
                Some(value) => write!(f, "{value}")?,
                None => f.write_str("null")?,
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

impl<V: TsValue> FromStr for MemTable<V> {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        let bad = || {
            crate::error::Error::BadKeyFormat(format!("malformed memtable string: {s:?}"))
        };

        let count_end = s.find(']').ok_or_else(bad)?;
        let count: usize = s[1..count_end].parse().map_err(|_| bad())?;
        let mut rest = &s[count_end + 1..];

        let mut mt = MemTable::new();
        for _ in 0..count {
            if !rest.starts_with('[') {
                return Err(bad());
            }
            let end = rest.find(']').ok_or_else(bad)?;
            let entry = &rest[1..end];
            let sep = entry.find('|').ok_or_else(bad)?;
            let key_str = &entry[..sep];
            let value_str = &entry[sep + 1..];

            let key = TimeSeriesKey::from_canonical_str(key_str)?;
            let value = if value_str == "null" {
                None
            } else {
                Some(value_str.parse::<V>().map_err(|_| bad())?)
            };
            mt.put(key, value);
            rest = &rest[end + 1..];
        }
        Ok(mt)
    }
}
