//! [`TimeSeriesKey`] — the composite, totally-ordered key every other
//! component in this crate is built around.
//!
//! A key is either a normal key — a `(timestamp, metric, tags)` triple
//! — or one of two sentinels, [`TimeSeriesKey::Min`] and
//! [`TimeSeriesKey::Max`], which order below and above every normal key
//! regardless of field values. Callers use the sentinels to build
//! open-ended range queries (`get_range(TimeSeriesKey::Min, k)`, …)
//! without needing an `Option`-wrapped bound everywhere.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Maximum byte length of a metric name.
pub const MAX_METRIC_LENGTH: usize = 15;

/// Width, in decimal digits, of a canonical key string's timestamp field.
pub const TIMESTAMP_WIDTH: usize = 20;

/// Reserved hash value for [`TimeSeriesKey::Min`].
const MIN_KEY_HASH: u64 = u64::MAX;

/// Reserved hash value for [`TimeSeriesKey::Max`].
const MAX_KEY_HASH: u64 = u64::MAX - 1;

/// The non-sentinel payload of a [`TimeSeriesKey`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NormalKey {
    timestamp: u64,
    metric: String,
    tags: BTreeMap<String, String>,
}

/// A totally ordered composite time-series key.
///
/// Comparison order: [`TimeSeriesKey::Min`] orders below every other
/// key, [`TimeSeriesKey::Max`] orders above every other key, and two
/// [`TimeSeriesKey::Normal`] keys compare by `(timestamp, metric, tags)`
/// in that order — tags compare lexicographically as ordered
/// `(name, value)` pairs, which `BTreeMap`'s own `Ord` impl already
/// gives us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeSeriesKey {
    /// Sentinel ordering below every normal key.
    Min,
    /// Sentinel ordering above every normal key.
    Max,
    /// A concrete `(timestamp, metric, tags)` key.
    Normal(NormalKey),
}

impl TimeSeriesKey {
    /// Builds a normal key from its fields.
    ///
    /// Fails with [`Error::InvalidParameter`] if `metric` exceeds
    /// [`MAX_METRIC_LENGTH`] bytes.
    pub fn new(
        timestamp: u64,
        metric: impl Into<String>,
        tags: BTreeMap<String, String>,
    ) -> Result<Self> {
        let metric = metric.into();
        if metric.len() > MAX_METRIC_LENGTH {
            return Err(Error::InvalidParameter(format!(
                "metric {:?} exceeds MAX_METRIC_LENGTH ({} > {})",
                metric,
                metric.len(),
                MAX_METRIC_LENGTH
            )));
        }
        Ok(TimeSeriesKey::Normal(NormalKey {
            timestamp,
            metric,
            tags,
        }))
    }

    /// The minimum sentinel key.
    pub fn min() -> Self {
        TimeSeriesKey::Min
    }

    /// The maximum sentinel key.
    pub fn max() -> Self {
        TimeSeriesKey::Max
    }

    /// `true` if this is `Min` or `Max`.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, TimeSeriesKey::Min | TimeSeriesKey::Max)
    }

    /// The timestamp field, if this is a normal key.
    pub fn timestamp(&self) -> Option<u64> {
        match self {
            TimeSeriesKey::Normal(k) => Some(k.timestamp),
            _ => None,
        }
    }

    /// The metric field, if this is a normal key.
    pub fn metric(&self) -> Option<&str> {
        match self {
            TimeSeriesKey::Normal(k) => Some(&k.metric),
            _ => None,
        }
    }

    /// The tag map, if this is a normal key.
    pub fn tags(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            TimeSeriesKey::Normal(k) => Some(&k.tags),
            _ => None,
        }
    }

    /// The canonical string form: `{timestamp}{metric}{tags}`.
    ///
    /// Sentinels have no canonical string; round-tripping through
    /// [`TimeSeriesKey::from_canonical_str`] is only meaningful for
    /// [`TimeSeriesKey::Normal`] keys.
    pub fn to_canonical_string(&self) -> String {
        match self {
            TimeSeriesKey::Normal(k) => {
                let mut tags_str = String::new();
                for (i, (name, value)) in k.tags.iter().enumerate() {
                    if i > 0 {
                        tags_str.push(',');
                    }
                    tags_str.push_str(name);
                    tags_str.push(':');
                    tags_str.push_str(value);
                }
                format!(
                    "{{{:0width$}}}{{{}}}{{{}}}",
                    k.timestamp,
                    k.metric,
                    tags_str,
                    width = TIMESTAMP_WIDTH
                )
            }
            TimeSeriesKey::Min => "{MIN}".to_string(),
            TimeSeriesKey::Max => "{MAX}".to_string(),
        }
    }

    /// Parses a canonical string produced by [`TimeSeriesKey::to_canonical_string`].
    ///
    /// Fails with [`Error::BadKeyFormat`] when braces are mismatched,
    /// a tag pair is not `k:v`, or the timestamp is not exactly
    /// [`TIMESTAMP_WIDTH`] decimal digits.
    pub fn from_canonical_str(s: &str) -> Result<Self> {
        let bad = |msg: &str| Error::BadKeyFormat(format!("{msg}: {s:?}"));

        let mut blocks = Vec::with_capacity(3);
        let bytes = s.as_bytes();
        let mut i = 0usize;
        while i < bytes.len() {
            if bytes[i] != b'{' {
                return Err(bad("expected '{'"));
            }
            let start = i + 1;
            let end = s[start..]
                .find('}')
                .map(|p| start + p)
                .ok_or_else(|| bad("mismatched braces"))?;
            blocks.push(&s[start..end]);
            i = end + 1;
        }
        if blocks.len() != 3 {
            return Err(bad("expected exactly three {...} blocks"));
        }

        let timestamp_str = blocks[0];
        if timestamp_str.len() != TIMESTAMP_WIDTH || !timestamp_str.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(bad("timestamp must be a 20-digit numeral"));
        }
        let timestamp: u64 = timestamp_str
            .parse()
            .map_err(|_| bad("timestamp is not a valid u64"))?;

        let metric = blocks[1].to_string();
        if metric.len() > MAX_METRIC_LENGTH {
            return Err(bad("metric exceeds MAX_METRIC_LENGTH"));
        }

        let mut tags = BTreeMap::new();
        if !blocks[2].is_empty() {
            for pair in blocks[2].split(',') {
                let mut parts = pair.splitn(2, ':');
                let name = parts.next().ok_or_else(|| bad("malformed tag pair"))?;
                let value = parts.next().ok_or_else(|| bad("malformed tag pair"))?;
                if name.is_empty() {
                    return Err(bad("malformed tag pair"));
                }
                tags.insert(name.to_string(), value.to_string());
            }
        }

        Ok(TimeSeriesKey::Normal(NormalKey {
            timestamp,
            metric,
            tags,
        }))
    }

    /// Splits a `"{lo-canonical}:{hi-canonical}"` pair — the serialized
    /// form of a `DataRange<TimeSeriesKey>` — back into its two
    /// canonical strings.
    ///
    /// A naive split on the first `:` (as the original source does)
    /// breaks as soon as either key carries tags, since a tag value
    /// may itself contain `:`. This instead walks exactly three
    /// balanced `{...}` blocks to find the true end of the low key,
    /// then requires the separating `:` there.
    pub fn split_canonical_pair(s: &str) -> Result<(&str, &str)> {
        let bad = || Error::BadKeyFormat(format!("malformed key range string: {s:?}"));

        let bytes = s.as_bytes();
        let mut i = 0usize;
        for _ in 0..3 {
            if i >= bytes.len() || bytes[i] != b'{' {
                return Err(bad());
            }
            let start = i + 1;
            let end = s[start..].find('}').map(|p| start + p).ok_or_else(bad)?;
            i = end + 1;
        }
        if i >= bytes.len() || bytes[i] != b':' {
            return Err(bad());
        }
        Ok((&s[..i], &s[i + 1..]))
    }

    /// The stable hash used by [`crate::bloom::BloomFilter`] and by this
    /// type's own [`Hash`] impl.
    ///
    /// For normal keys this hashes the canonical string; for sentinels
    /// it returns one of two fixed reserved constants, so that sentinel
    /// hashes never collide with a real key's hash.
    pub fn std_hash(&self) -> u64 {
        match self {
            TimeSeriesKey::Min => MIN_KEY_HASH,
            TimeSeriesKey::Max => MAX_KEY_HASH,
            TimeSeriesKey::Normal(_) => {
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                self.to_canonical_string().hash(&mut hasher);
                hasher.finish()
            }
        }
    }
}

impl PartialOrd for TimeSeriesKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeSeriesKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering::*;
        use TimeSeriesKey::*;
        match (self, other) {
            (Min, Min) | (Max, Max) => Equal,
            (Min, _) => Less,
            (_, Min) => Greater,
            (Max, _) => Greater,
            (_, Max) => Less,
            (Normal(a), Normal(b)) => a.cmp(b),
        }
    }
}

impl Hash for TimeSeriesKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.std_hash());
    }
}

impl fmt::Display for TimeSeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl FromStr for TimeSeriesKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TimeSeriesKey::from_canonical_str(s)
    }
}
