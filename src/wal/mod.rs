//! [`WriteAheadLog`] — a single append-only text file recording every
//! mutation before it is applied to the memtable.
//!
//! One line per record: `<type_code> <entry_string>`, where
//! `type_code` is `0` for a put and `1` for a remove, and
//! `entry_string` has the same `[key|value]` framing as an SSTable
//! entry. Replay is idempotent: applying the same sequence of records
//! twice produces the same visible state, since every record is itself
//! an upsert or a tombstone insert.

#[cfg(test)]
mod tests;

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::key::TimeSeriesKey;
use crate::value::TsValue;

/// Filename of the write-ahead log inside an engine's data directory.
pub const WAL_FILENAME: &str = "wal.log";

/// The kind of operation a [`WalRecord`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalRecordType {
    /// An upsert (`put`).
    Put = 0,
    /// A tombstone insert (`remove`).
    Remove = 1,
}

/// A single logical operation read back from the log.
#[derive(Debug, Clone, PartialEq)]
pub struct WalRecord<V> {
    /// Which operation this record represents.
    pub record_type: WalRecordType,
    /// The key the operation applies to.
    pub key: TimeSeriesKey,
    /// The value to write, for a [`WalRecordType::Put`]. Always `None`
    /// for a [`WalRecordType::Remove`].
    pub value: Option<V>,
}

/// An append-only, line-oriented write-ahead log.
pub struct WriteAheadLog<V> {
    path: PathBuf,
    _marker: PhantomData<V>,
}

impl<V: TsValue> WriteAheadLog<V> {
    /// Opens (without creating) the log at `dir`/[`WAL_FILENAME`].
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let path = dir.as_ref().join(WAL_FILENAME);
        debug!(path = %path.display(), "write-ahead log handle created");
        WriteAheadLog {
            path,
            _marker: PhantomData,
        }
    }

    /// Appends one record and flushes it to disk.
    pub fn append(
        &self,
        record_type: WalRecordType,
        key: &TimeSeriesKey,
        value: Option<V>,
    ) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let value_str = match value {
            Some(v) => v.to_string(),
            None => "null".to_string(),
        };
        writeln!(
            file,
            "{} [{}|{}]",
            record_type as u8,
            key.to_canonical_string(),
            value_str
        )?;
        file.flush()?;
        trace!(path = %self.path.display(), ?record_type, "WAL record appended");
        Ok(())
    }

    /// Reads every record in append order.
    ///
    /// If the file does not exist, returns an empty list (first-run
    /// case). Fails with [`Error::CorruptWAL`] if any line does not
    /// parse, aborting at that line.
    pub fn replay(&self) -> Result<Vec<WalRecord<V>>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no WAL file to replay");
            return Ok(Vec::new());
        }

        info!(path = %self.path.display(), "replaying write-ahead log");
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            records.push(parse_line(&line).map_err(|e| {
                warn!(path = %self.path.display(), lineno, "corrupt WAL line");
                e
            })?);
        }
        debug!(count = records.len(), "WAL replay complete");
        Ok(records)
    }

    /// Truncates the log file to empty. Creates it if missing.
    pub fn clear(&self) -> Result<()> {
        File::create(&self.path)?;
        info!(path = %self.path.display(), "WAL truncated");
        Ok(())
    }

    /// Filesystem path of the log.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_line<V: TsValue>(line: &str) -> Result<WalRecord<V>> {
    let bad = || Error::CorruptWAL(format!("malformed WAL line: {line:?}"));

    let (type_str, entry_str) = line.split_once(' ').ok_or_else(bad)?;
    let record_type = match type_str {
        "0" => WalRecordType::Put,
        "1" => WalRecordType::Remove,
        _ => return Err(bad()),
    };

    if !entry_str.starts_with('[') || !entry_str.ends_with(']') {
        return Err(bad());
    }
    let inner = &entry_str[1..entry_str.len() - 1];
    let sep = inner.find('|').ok_or_else(bad)?;
    let key_str = &inner[..sep];
    let value_str = &inner[sep + 1..];

    let key = TimeSeriesKey::from_canonical_str(key_str).map_err(|_| bad())?;
    let value = if value_str == "null" {
        None
    } else {
        Some(value_str.parse::<V>().map_err(|_| bad())?)
    };

    Ok(WalRecord {
        record_type,
        key,
        value,
    })
}
