//! # ChronoDB
//!
//! An embeddable, persistent **time-series** storage engine built on a
//! **Log-Structured Merge Tree (LSM-tree)** architecture. Designed for
//! fast, append-heavy writes and crash-safe operation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    LSMTree                            │
//! │  ┌────────────┐                 ┌─────────────────┐  │
//! │  │  MemTable   │                 │    SSTables      │  │
//! │  │   (C0)      │   flush         │      (C1)        │  │
//! │  │   + WAL     │ ───────────►    │  bloom + index   │  │
//! │  └─────┬───────┘                 └────────┬─────────┘ │
//! │        │ get/get_range merges C0 over C1, newest-first │
//! └────────┴──────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | The `LSMTree` coordinator — open, put, remove, get, range scan, WAL replay |
//! | [`memtable`] | In-memory, ordered C0 layer with time and key range tracking |
//! | [`wal`] | Line-oriented write-ahead log for crash recovery |
//! | [`sstable`] | Immutable, sorted, on-disk tables with a bloom filter and sparse index |
//! | [`key`] | The composite, totally ordered [`key::TimeSeriesKey`] |
//! | [`range`] | [`range::DataRange`], the inclusive min/max tracker used throughout |
//! | [`bloom`] | The crate's Bloom filter implementation |
//! | [`value`] | [`value::TsValue`], the bound satisfied by every storable value type |
//! | [`error`] | The crate's flat error type |
//!
//! ## Key Features
//!
//! - **Write-ahead logging** — every mutation can be persisted to a WAL
//!   before being applied to the memtable, so a crash never loses an
//!   acknowledged write.
//! - **Composite time-series keys** — `(timestamp, metric, tags)`,
//!   totally ordered, with open-ended range queries via reserved
//!   minimum/maximum sentinels.
//! - **Bloom filter lookups** — each SSTable carries a Bloom filter for
//!   fast negative point-lookup responses.
//! - **Sequential and parallel range scans** — `get_range` merges the
//!   C1 layer oldest-to-newest with overwrite-on-newer semantics;
//!   `get_range_parallel` scans every source concurrently and resolves
//!   newest-first.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use chronodb::engine::{LSMTree, LSMTreeConfig};
//! use chronodb::key::TimeSeriesKey;
//!
//! let tree: LSMTree<f64> = LSMTree::open("/tmp/my_db", LSMTreeConfig::default()).unwrap();
//! tree.replay_wal().unwrap();
//!
//! let key = TimeSeriesKey::new(1_700_000_000, "cpu.load", BTreeMap::new()).unwrap();
//!
//! // Write
//! tree.put(key.clone(), 0.42, true).unwrap();
//!
//! // Read
//! assert_eq!(tree.get(&key).unwrap(), Some(0.42));
//!
//! // Delete
//! tree.remove(key.clone(), true).unwrap();
//! assert_eq!(tree.get(&key).unwrap(), None);
//!
//! // Range scan
//! let results = tree
//!     .get_range(&TimeSeriesKey::min(), &TimeSeriesKey::max(), |_| true)
//!     .unwrap();
//! ```

#![allow(dead_code)]

pub mod bloom;
pub mod engine;
pub mod error;
pub mod key;
pub mod memtable;
pub mod range;
pub mod sstable;
pub mod value;
pub mod wal;
