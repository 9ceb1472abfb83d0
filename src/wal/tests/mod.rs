use std::collections::BTreeMap;

use tempfile::tempdir;

use crate::key::TimeSeriesKey;
use crate::wal::{WalRecordType, WriteAheadLog};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn key(ts: u64) -> TimeSeriesKey {
    TimeSeriesKey::new(ts, "m", BTreeMap::new()).unwrap()
}

#[test]
fn replay_on_missing_file_is_a_noop() {
    init_tracing();
    let dir = tempdir().unwrap();
    let wal: WriteAheadLog<f64> = WriteAheadLog::new(dir.path());
    assert!(wal.replay().unwrap().is_empty());
}

#[test]
fn append_then_replay_round_trips_in_order() {
    init_tracing();
    let dir = tempdir().unwrap();
    let wal: WriteAheadLog<f64> = WriteAheadLog::new(dir.path());

    wal.append(WalRecordType::Put, &key(1), Some(1.0)).unwrap();
    wal.append(WalRecordType::Put, &key(2), Some(2.0)).unwrap();
    wal.append(WalRecordType::Remove, &key(1), None).unwrap();

    let records = wal.replay().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].record_type, WalRecordType::Put);
    assert_eq!(records[0].value, Some(1.0));
    assert_eq!(records[2].record_type, WalRecordType::Remove);
    assert_eq!(records[2].value, None);
}

#[test]
fn clear_truncates_the_log() {
    init_tracing();
    let dir = tempdir().unwrap();
    let wal: WriteAheadLog<f64> = WriteAheadLog::new(dir.path());
    wal.append(WalRecordType::Put, &key(1), Some(1.0)).unwrap();
    wal.clear().unwrap();
    assert!(wal.replay().unwrap().is_empty());
}

#[test]
fn corrupt_line_aborts_replay() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");
    std::fs::write(&path, "garbage line without fields\n").unwrap();

    let wal: WriteAheadLog<f64> = WriteAheadLog::new(dir.path());
    assert!(wal.replay().is_err());
}

#[test]
fn path_points_inside_the_directory() {
    init_tracing();
    let dir = tempdir().unwrap();
    let wal: WriteAheadLog<f64> = WriteAheadLog::new(dir.path());
    assert_eq!(wal.path(), dir.path().join("wal.log"));
}
