//! The numeric value bound shared by [`crate::memtable`], [`crate::sstable`],
//! and [`crate::engine`].
//!
//! The original storage engine this crate follows constrains its value
//! type with a C++ arithmetic concept so that `MemTable`, `SSTable`,
//! and `LSMTree` can all be written once and instantiated over `f64`,
//! `i64`, and so on. [`TsValue`] plays the same role here: a value type
//! must be `Copy` (entries are small and cheaply duplicated across
//! layers), round-trip through its default textual representation (the
//! on-disk formats are ASCII), and be safely shared across the threads
//! spawned by a parallel range scan.
use std::fmt::Display;
use std::str::FromStr;

/// Bound satisfied by every value type this engine can store.
pub trait TsValue: Copy + PartialEq + Display + FromStr + Send + Sync + 'static {}

impl TsValue for f64 {}
impl TsValue for f32 {}
impl TsValue for i64 {}
impl TsValue for i32 {}
