//! [`DataRange`] — the observed min/max of a totally ordered scalar.
//!
//! Used by [`crate::memtable::MemTable`] and [`crate::sstable::SSTable`]
//! to track the span of timestamps and keys they hold, so that a range
//! query can be rejected in O(1) without walking the underlying
//! structure when it provably cannot overlap.

use std::fmt;
use std::str::FromStr;

/// The observed min/max of values of type `T`, or unset if nothing has
/// been observed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRange<T> {
    range: Option<(T, T)>,
}

impl<T: Ord + Clone> DataRange<T> {
    /// An unset range.
    pub fn new() -> Self {
        DataRange { range: None }
    }

    /// Builds a range directly from its bounds, bypassing [`DataRange::update`].
    pub fn from_bounds(low: T, high: T) -> Self {
        DataRange {
            range: Some((low, high)),
        }
    }

    /// Widens the range to cover `x`.
    pub fn update(&mut self, x: T) {
        self.range = Some(match self.range.take() {
            None => (x.clone(), x),
            Some((lo, hi)) => {
                let lo = if x < lo { x.clone() } else { lo };
                let hi = if x > hi { x } else { hi };
                (lo, hi)
            }
        });
    }

    /// `true` if the range is set and `low <= x <= high`.
    pub fn contains(&self, x: &T) -> bool {
        match &self.range {
            None => false,
            Some((lo, hi)) => lo <= x && x <= hi,
        }
    }

    /// `true` if the range is set and overlaps `[a, b]`.
    ///
    /// Returns `false` when the range is unset.
    pub fn overlaps(&self, a: &T, b: &T) -> bool {
        match &self.range {
            None => false,
            Some((lo, hi)) => lo <= b && hi >= a,
        }
    }

    /// Returns to the unset state.
    pub fn clear(&mut self) {
        self.range = None;
    }

    /// The lower bound, if set.
    pub fn lower(&self) -> Option<&T> {
        self.range.as_ref().map(|(lo, _)| lo)
    }

    /// The upper bound, if set.
    pub fn upper(&self) -> Option<&T> {
        self.range.as_ref().map(|(_, hi)| hi)
    }

    /// `true` if nothing has been observed yet.
    pub fn is_unset(&self) -> bool {
        self.range.is_none()
    }
}

impl<T: Ord + Clone> Default for DataRange<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Display> fmt::Display for DataRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            None => f.write_str("null"),
            Some((lo, hi)) => write!(f, "{lo}:{hi}"),
        }
    }
}

impl<T: FromStr + Ord + Clone> FromStr for DataRange<T> {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "null" {
            return Ok(DataRange::new());
        }
        let (lo_str, hi_str) = s
            .split_once(':')
            .ok_or_else(|| format!("malformed data range: {s:?}"))?;
        let lo = lo_str
            .parse::<T>()
            .map_err(|_| format!("malformed data range bound: {lo_str:?}"))?;
        let hi = hi_str
            .parse::<T>()
            .map_err(|_| format!("malformed data range bound: {hi_str:?}"))?;
        Ok(DataRange {
            range: Some((lo, hi)),
        })
    }
}
