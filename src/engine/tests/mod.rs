use std::collections::BTreeMap;

use tempfile::tempdir;

use crate::engine::{LSMTree, LSMTreeConfig};
use crate::error::Error;
use crate::key::TimeSeriesKey;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn key(ts: u64, metric: &str) -> TimeSeriesKey {
    TimeSeriesKey::new(ts, metric, BTreeMap::new()).unwrap()
}

fn tiny_config() -> LSMTreeConfig {
    LSMTreeConfig {
        c1_layer_size: 100,
        memtable_max_entries: 4,
    }
}

#[test]
fn put_then_get_returns_the_value() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), LSMTreeConfig::default()).unwrap();
    tree.put(key(1, "m"), 2.0, true).unwrap();
    assert_eq!(tree.get(&key(1, "m")).unwrap(), Some(2.0));
}

#[test]
fn get_on_absent_key_is_none() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), LSMTreeConfig::default()).unwrap();
    assert_eq!(tree.get(&key(1, "m")).unwrap(), None);
}

#[test]
fn remove_makes_get_return_none() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), LSMTreeConfig::default()).unwrap();
    tree.put(key(1, "m"), 1.0, true).unwrap();
    tree.remove(key(1, "m"), true).unwrap();
    assert_eq!(tree.get(&key(1, "m")).unwrap(), None);
}

#[test]
fn overwrite_in_memtable_wins() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), LSMTreeConfig::default()).unwrap();
    tree.put(key(1, "m"), 1.0, true).unwrap();
    tree.put(key(1, "m"), 2.0, true).unwrap();
    assert_eq!(tree.get(&key(1, "m")).unwrap(), Some(2.0));
}

#[test]
fn full_memtable_triggers_flush_into_c1() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), tiny_config()).unwrap();
    for i in 0..4 {
        tree.put(key(i, "m"), i as f64, true).unwrap();
    }
    assert_eq!(tree.sstable_count(), 1);
    // still readable after the flush
    for i in 0..4 {
        assert_eq!(tree.get(&key(i, "m")).unwrap(), Some(i as f64));
    }
}

#[test]
fn overwrite_wins_across_a_flush_boundary() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), tiny_config()).unwrap();
    tree.put(key(1, "m"), 1.0, true).unwrap();
    // three more distinct keys fill the 4-entry memtable and flush it,
    // sealing the first write for key(1, "m") into an SSTable
    tree.put(key(2, "m"), 2.0, true).unwrap();
    tree.put(key(3, "m"), 3.0, true).unwrap();
    tree.put(key(4, "m"), 4.0, true).unwrap();
    assert_eq!(tree.sstable_count(), 1);

    // newer write for the same key now lives only in the memtable
    tree.put(key(1, "m"), 100.0, true).unwrap();
    assert_eq!(tree.get(&key(1, "m")).unwrap(), Some(100.0));
}

#[test]
fn tombstone_survives_a_flush() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), tiny_config()).unwrap();
    tree.put(key(1, "m"), 1.0, true).unwrap();
    tree.remove(key(1, "m"), true).unwrap();
    tree.put(key(2, "m"), 2.0, true).unwrap();
    tree.put(key(3, "m"), 3.0, true).unwrap();
    tree.put(key(4, "m"), 4.0, true).unwrap();
    assert_eq!(tree.sstable_count(), 1);
    assert_eq!(tree.get(&key(1, "m")).unwrap(), None);
}

#[test]
fn get_range_merges_memtable_over_sstables_newest_wins() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), tiny_config()).unwrap();
    for i in 0..4 {
        tree.put(key(i, "m"), i as f64, true).unwrap();
    }
    assert_eq!(tree.sstable_count(), 1);
    // overwrite one flushed key from the (now fresh) memtable
    tree.put(key(1, "m"), 999.0, true).unwrap();

    let results = tree
        .get_range(&key(0, "m"), &key(4, "m"), |_| true)
        .unwrap();
    assert_eq!(
        results,
        vec![
            (key(0, "m"), 0.0),
            (key(1, "m"), 999.0),
            (key(2, "m"), 2.0),
            (key(3, "m"), 3.0),
        ]
    );
}

#[test]
fn get_range_is_half_open_on_the_upper_bound() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), LSMTreeConfig::default()).unwrap();
    for i in 0..5 {
        tree.put(key(i, "m"), i as f64, true).unwrap();
    }
    let results = tree
        .get_range(&key(0, "m"), &key(3, "m"), |_| true)
        .unwrap();
    assert_eq!(results.len(), 3);
    assert!(!results.iter().any(|(k, _)| *k == key(3, "m")));
}

#[test]
fn get_range_excludes_tombstoned_keys() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), tiny_config()).unwrap();
    for i in 0..4 {
        tree.put(key(i, "m"), i as f64, true).unwrap();
    }
    tree.remove(key(2, "m"), true).unwrap();

    let results = tree
        .get_range(&key(0, "m"), &key(4, "m"), |_| true)
        .unwrap();
    assert!(!results.iter().any(|(k, _)| *k == key(2, "m")));
}

#[test]
fn get_range_applies_the_filter_predicate() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), LSMTreeConfig::default()).unwrap();
    for i in 0..10 {
        tree.put(key(i, "m"), i as f64, true).unwrap();
    }
    let results = tree
        .get_range(&key(0, "m"), &key(10, "m"), |k| {
            k.timestamp().unwrap() % 2 == 0
        })
        .unwrap();
    assert_eq!(results.len(), 5);
}

#[test]
fn get_range_parallel_matches_sequential_output() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), tiny_config()).unwrap();
    for i in 0..20 {
        tree.put(key(i, "m"), i as f64, true).unwrap();
    }
    tree.remove(key(5, "m"), true).unwrap();
    tree.put(key(10, "m"), 1000.0, true).unwrap();
    assert!(tree.sstable_count() >= 2);

    let seq = tree
        .get_range(&key(0, "m"), &key(20, "m"), |_| true)
        .unwrap();
    let par = tree
        .get_range_parallel(&key(0, "m"), &key(20, "m"), |_| true)
        .unwrap();
    assert_eq!(seq, par);
}

#[test]
fn wal_replay_recovers_unflushed_writes_after_reopen() {
    init_tracing();
    let dir = tempdir().unwrap();
    {
        let tree: LSMTree<f64> = LSMTree::open(dir.path(), LSMTreeConfig::default()).unwrap();
        for i in 0..5 {
            tree.put(key(i, "m"), i as f64, true).unwrap();
        }
        // dropped without an explicit flush; the WAL carries the writes
    }
    let reopened: LSMTree<f64> = LSMTree::open(dir.path(), LSMTreeConfig::default()).unwrap();
    assert_eq!(reopened.sstable_count(), 0);
    assert!(reopened.get(&key(0, "m")).unwrap().is_none());

    reopened.replay_wal().unwrap();
    for i in 0..5 {
        assert_eq!(reopened.get(&key(i, "m")).unwrap(), Some(i as f64));
    }
}

#[test]
fn replay_wal_does_not_reappend_records() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), LSMTreeConfig::default()).unwrap();
    tree.put(key(1, "m"), 1.0, true).unwrap();
    tree.replay_wal().unwrap();
    tree.replay_wal().unwrap();
    assert_eq!(tree.get(&key(1, "m")).unwrap(), Some(1.0));
}

#[test]
fn reopen_without_replay_sees_only_flushed_sstables() {
    init_tracing();
    let dir = tempdir().unwrap();
    {
        let tree: LSMTree<f64> = LSMTree::open(dir.path(), tiny_config()).unwrap();
        for i in 0..4 {
            tree.put(key(i, "m"), i as f64, true).unwrap();
        }
        assert_eq!(tree.sstable_count(), 1);
        // one more unflushed write, recorded only in the WAL
        tree.put(key(4, "m"), 4.0, true).unwrap();
    }
    let reopened: LSMTree<f64> = LSMTree::open(dir.path(), tiny_config()).unwrap();
    assert_eq!(reopened.sstable_count(), 1);
    assert_eq!(reopened.get(&key(0, "m")).unwrap(), Some(0.0));
    assert_eq!(reopened.get(&key(4, "m")).unwrap(), None);
}

#[test]
fn clear_removes_sstables_and_wal_but_not_in_memory_state() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), tiny_config()).unwrap();
    for i in 0..4 {
        tree.put(key(i, "m"), i as f64, true).unwrap();
    }
    tree.put(key(10, "m"), 10.0, true).unwrap();
    assert_eq!(tree.sstable_count(), 1);

    tree.clear().unwrap();
    assert_eq!(tree.sstable_count(), 0);
    // the active memtable is untouched by clear()
    assert_eq!(tree.get(&key(10, "m")).unwrap(), Some(10.0));
    assert!(!dir.path().join("wal.log").exists());
}

#[test]
fn flush_fails_with_c1_full_once_the_layer_is_at_capacity() {
    init_tracing();
    let dir = tempdir().unwrap();
    let config = LSMTreeConfig {
        c1_layer_size: 1,
        memtable_max_entries: 1,
    };
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), config).unwrap();
    tree.put(key(1, "m"), 1.0, true).unwrap();
    assert_eq!(tree.sstable_count(), 1);

    let err = tree.put(key(2, "m"), 2.0, true).unwrap_err();
    assert!(matches!(err, Error::C1Full(1)));
}

#[test]
fn open_collects_existing_sstables_sorted_and_continues_the_id_sequence() {
    init_tracing();
    let dir = tempdir().unwrap();
    {
        let tree: LSMTree<f64> = LSMTree::open(dir.path(), tiny_config()).unwrap();
        for i in 0..8 {
            tree.put(key(i, "m"), i as f64, true).unwrap();
        }
        assert_eq!(tree.sstable_count(), 2);
    }
    let reopened: LSMTree<f64> = LSMTree::open(dir.path(), tiny_config()).unwrap();
    assert_eq!(reopened.sstable_count(), 2);
    for i in 0..8 {
        assert_eq!(reopened.get(&key(i, "m")).unwrap(), Some(i as f64));
    }
    // a further flush must not collide with either existing sstable id
    for i in 8..12 {
        reopened.put(key(i, "m"), i as f64, true).unwrap();
    }
    assert_eq!(reopened.sstable_count(), 3);
}

#[test]
fn empty_reports_true_only_with_no_memtable_entries_and_no_sstables() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), LSMTreeConfig::default()).unwrap();
    assert!(tree.empty());
    tree.put(key(1, "m"), 1.0, true).unwrap();
    assert!(!tree.empty());
}

#[test]
fn display_reports_memtable_and_sstable_sizes() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), LSMTreeConfig::default()).unwrap();
    tree.put(key(1, "m"), 1.0, true).unwrap();
    let s = tree.to_string();
    assert!(s.contains("memtable=1"));
    assert!(s.contains("sstables=0"));
}

#[test]
fn cloned_handles_share_the_same_underlying_state() {
    init_tracing();
    let dir = tempdir().unwrap();
    let tree: LSMTree<f64> = LSMTree::open(dir.path(), LSMTreeConfig::default()).unwrap();
    let handle = tree.clone();
    tree.put(key(1, "m"), 1.0, true).unwrap();
    assert_eq!(handle.get(&key(1, "m")).unwrap(), Some(1.0));
}
