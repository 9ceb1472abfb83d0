//! [`BloomFilter`] — a probabilistic membership test over [`TimeSeriesKey`]s.
//!
//! Sized from an expected element count and a target false-positive
//! rate, then serialisable to a single text line so it can live inside
//! an SSTable's metadata sidecar.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::key::TimeSeriesKey;

/// A fixed-size bit array with `k` independent hash functions.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<bool>,
    seeds: Vec<u32>,
}

impl BloomFilter {
    /// Builds a new, empty filter sized for `expected_n` elements at a
    /// target false-positive rate of `fp_rate`.
    ///
    /// Fails with [`Error::InvalidParameter`] unless `expected_n > 0`
    /// and `fp_rate` lies strictly inside `(0, 1)`.
    pub fn new(expected_n: u64, fp_rate: f64) -> Result<Self> {
        if expected_n == 0 {
            return Err(Error::InvalidParameter(
                "expected_n must be greater than 0".to_string(),
            ));
        }
        if !(fp_rate > 0.0 && fp_rate < 1.0) {
            return Err(Error::InvalidParameter(
                "false positive rate must be in the range (0, 1)".to_string(),
            ));
        }

        let ln2 = std::f64::consts::LN_2;
        let m = (-(expected_n as f64) * fp_rate.ln() / (ln2 * ln2)).ceil() as usize;
        let m = m.max(1);
        let k = ((m as f64 / expected_n as f64) * ln2).floor() as usize;
        let k = k.max(1);

        let seeds = (0..k).map(|_| rand::random::<u32>()).collect();
        Ok(BloomFilter {
            bits: vec![false; m],
            seeds,
        })
    }

    /// Number of bits in the underlying array.
    pub fn num_bits(&self) -> usize {
        self.bits.len()
    }

    /// Number of hash functions.
    pub fn num_hashes(&self) -> usize {
        self.seeds.len()
    }

    /// Sets the `k` bits derived from `key`.
    pub fn insert(&mut self, key: &TimeSeriesKey) {
        let h = key.std_hash();
        let m = self.bits.len();
        for seed in &self.seeds {
            let idx = (mix(*seed, h) as usize) % m;
            self.bits[idx] = true;
        }
    }

    /// `true` only if every one of the `k` bits derived from `key` is
    /// set. Never false-negative; may false-positive.
    pub fn may_contain(&self, key: &TimeSeriesKey) -> bool {
        let h = key.std_hash();
        let m = self.bits.len();
        self.seeds
            .iter()
            .all(|seed| self.bits[(mix(*seed, h) as usize) % m])
    }
}

/// A MurmurHash3-style 32-bit mixing function, keyed by `seed`.
///
/// Hand-rolled in the style of MurmurHash3's `fmix32` finalizer: the
/// seed is folded in before the avalanche so the result is both
/// deterministic and seed-sensitive.
fn mix(seed: u32, value: u64) -> u32 {
    let mut h = (value as u32) ^ (value >> 32) as u32 ^ seed;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

impl fmt::Display for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.bits.len(), self.seeds.len())?;
        for seed in &self.seeds {
            write!(f, " {seed}")?;
        }
        for bit in &self.bits {
            f.write_str(if *bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for BloomFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::InvalidParameter(format!("malformed bloom filter line: {s:?}"));

        let mut tokens = s.split_whitespace();
        let m: usize = tokens.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let k: usize = tokens.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;

        if k == 0 {
            return Err(bad());
        }

        let mut seeds = Vec::with_capacity(k);
        for _ in 0..(k - 1) {
            let tok = tokens.next().ok_or_else(bad)?;
            seeds.push(tok.parse::<u32>().map_err(|_| bad())?);
        }

        // The last seed token is immediately followed, with no
        // separating space, by the bits string. Since `m` bits follow
        // and bit characters ('0'/'1') are themselves digits, the
        // split can't be inferred from digit-ness alone — but `m` is
        // already known, so the last `m` characters are the bits and
        // everything before them is the last seed.
        let tail = tokens.next().ok_or_else(bad)?;
        if tail.len() <= m {
            return Err(bad());
        }
        let split_at = tail.len() - m;
        let last_seed: u32 = tail[..split_at].parse().map_err(|_| bad())?;
        let bits_tail = &tail[split_at..];
        seeds.push(last_seed);

        if !bits_tail.bytes().all(|b| b == b'0' || b == b'1') {
            return Err(bad());
        }
        let bits = bits_tail.bytes().map(|b| b == b'1').collect();

        Ok(BloomFilter { bits, seeds })
    }
}
