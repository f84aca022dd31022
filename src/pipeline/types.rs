//! Core data types shared by the window, accumulator and registry layers

use serde::{Serialize, Serializer};
use std::fmt;
use std::net::SocketAddr;

/// Statistics for one rotation period
///
/// `count == 0` means no samples arrived during the period. In that case
/// `sum`, `min` and `max` hold their sentinel values (`0`, `u64::MAX`, `0`)
/// and must not be reported; always gate on `count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub sum: u64,
    pub count: u64,
    pub min: u64,
    pub max: u64,
}

impl Bucket {
    /// An empty bucket: `{sum: 0, count: 0, min: u64::MAX, max: 0}`
    pub const EMPTY: Bucket = Bucket {
        sum: 0,
        count: 0,
        min: u64::MAX,
        max: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Fold one sample into the bucket
    ///
    /// The sum saturates at `u64::MAX`. With 32-bit wire readings this takes
    /// at least 2^32 samples in a single period.
    pub fn record(&mut self, value: u64) {
        self.sum = self.sum.saturating_add(value);
        self.count += 1;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    /// Integer average of the bucket, `None` when empty
    pub fn average(&self) -> Option<u64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count)
        }
    }
}

impl Default for Bucket {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// How per-bucket values are reported in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueKind {
    /// `sum / (divider * count)`
    Average,
    /// `sum / divider`
    Sum,
}

/// Identity of a reporting source
///
/// Derived from the transport peer address (IP + port). Two datagrams from the
/// same address and port map to the same registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(SocketAddr);

impl SourceId {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for SourceId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for SourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// Point-in-time copy of one accumulator's window
///
/// Rows are ordered oldest to newest; the last row is the currently open
/// bucket. Empty buckets appear as zero rows (with `count == 0`) so the row
/// count always equals the number of valid periods, `min(N, ticks + 1)`.
///
/// Window aggregates only consider non-empty buckets. `window_average` is the
/// arithmetic mean of the per-bucket values, not a mean over raw samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowResult {
    pub kind: ValueKind,
    pub nonzero: bool,
    pub window_max: u64,
    pub window_min: u64,
    pub window_average: u64,
    /// Largest raw bucket sum in the window (before the divider is applied)
    pub max_sum: u64,
    pub values: Vec<u64>,
    pub min: Vec<u64>,
    pub max: Vec<u64>,
    pub count: Vec<u64>,
}

impl WindowResult {
    /// Number of valid periods in the window
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Total samples across every bucket in the window
    pub fn total_count(&self) -> u64 {
        self.count.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bucket_sentinels() {
        let bucket = Bucket::default();
        assert_eq!(bucket, Bucket::EMPTY);
        assert!(bucket.is_empty());
        assert_eq!(bucket.min, u64::MAX);
        assert_eq!(bucket.max, 0);
        assert_eq!(bucket.average(), None);
    }

    #[test]
    fn test_bucket_record_saturates() {
        let mut bucket = Bucket::EMPTY;
        bucket.record(u64::MAX - 1);
        bucket.record(10);

        assert_eq!(bucket.sum, u64::MAX);
        assert_eq!(bucket.count, 2);
        assert_eq!(bucket.min, 10);
        assert_eq!(bucket.max, u64::MAX - 1);
    }

    #[test]
    fn test_source_id_display_and_order() {
        let a = SourceId::new("10.0.0.1:4000".parse().unwrap());
        let b = SourceId::new("10.0.0.1:4001".parse().unwrap());

        assert_eq!(a.to_string(), "10.0.0.1:4000");
        assert!(a < b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"10.0.0.1:4000\"");
    }
}
