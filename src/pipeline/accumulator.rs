//! Per-source accumulator with a selectable synchronization policy
//!
//! The ingestion path calls `add`, the rotation task calls `tick`, and the
//! reporting surface calls `snapshot`, all concurrently. `SyncMode` decides how
//! those calls are coordinated:
//!
//! - `Locked` (default): one mutex per accumulator serializes every operation.
//!   Snapshots never observe a torn bucket and every `add` that completes
//!   before a `tick` starts is counted in the bucket that `tick` closes.
//! - `BestEffort`: no lock. Bucket fields are independent relaxed atomics, so
//!   an `add` racing a `tick` may be counted in either bucket and a snapshot
//!   may see a sum that already includes a sample whose count increment has not
//!   landed yet (off by at most one in-flight sample per writer). Sums wrap on
//!   overflow. Only worth it for a hot ingestion path with a long rotation
//!   interval.

use super::types::{Bucket, ValueKind, WindowResult};
use super::windows::{next_index, oldest_index, prev_index, summarize, valid_len, WindowCounter};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Synchronization policy for an `Accumulator`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    #[default]
    Locked,
    BestEffort,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Locked => "locked",
            SyncMode::BestEffort => "best-effort",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "locked" | "safe" => Some(SyncMode::Locked),
            "best-effort" | "best_effort" | "besteffort" => Some(SyncMode::BestEffort),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct AtomicBucket {
    sum: AtomicU64,
    count: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl AtomicBucket {
    fn empty() -> Self {
        Self {
            sum: AtomicU64::new(Bucket::EMPTY.sum),
            count: AtomicU64::new(Bucket::EMPTY.count),
            min: AtomicU64::new(Bucket::EMPTY.min),
            max: AtomicU64::new(Bucket::EMPTY.max),
        }
    }

    fn record(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.min.fetch_min(value, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
    }

    fn clear(&self) {
        self.sum.store(Bucket::EMPTY.sum, Ordering::Relaxed);
        self.count.store(Bucket::EMPTY.count, Ordering::Relaxed);
        self.min.store(Bucket::EMPTY.min, Ordering::Relaxed);
        self.max.store(Bucket::EMPTY.max, Ordering::Relaxed);
    }

    fn load(&self) -> Bucket {
        Bucket {
            sum: self.sum.load(Ordering::Relaxed),
            count: self.count.load(Ordering::Relaxed),
            min: self.min.load(Ordering::Relaxed),
            max: self.max.load(Ordering::Relaxed),
        }
    }
}

/// Lock-free ring used by `SyncMode::BestEffort`
#[derive(Debug)]
struct AtomicWindow {
    buckets: Box<[AtomicBucket]>,
    cursor: AtomicUsize,
    ticks: AtomicU64,
}

impl AtomicWindow {
    fn new(size: usize) -> Self {
        Self {
            buckets: (0..size.max(1)).map(|_| AtomicBucket::empty()).collect(),
            cursor: AtomicUsize::new(0),
            ticks: AtomicU64::new(0),
        }
    }

    fn size(&self) -> usize {
        self.buckets.len()
    }

    fn add(&self, value: u64) {
        let cursor = self.cursor.load(Ordering::Acquire);
        self.buckets[cursor].record(value);
    }

    fn tick(&self) -> Bucket {
        let current = self.cursor.load(Ordering::Acquire);
        let next = next_index(current, self.size());
        // Clear before publishing so writers never land in a stale bucket
        self.buckets[next].clear();
        self.cursor.store(next, Ordering::Release);
        self.ticks.fetch_add(1, Ordering::AcqRel);
        self.buckets[current].load()
    }

    fn peek_closed(&self) -> Option<Bucket> {
        if self.ticks.load(Ordering::Acquire) == 0 || self.size() == 1 {
            return None;
        }
        let cursor = self.cursor.load(Ordering::Acquire);
        Some(self.buckets[prev_index(cursor, self.size())].load())
    }

    fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn snapshot(&self, divider: u64, kind: ValueKind) -> WindowResult {
        let size = self.size();
        let ticks = self.ticks.load(Ordering::Acquire);
        let cursor = self.cursor.load(Ordering::Acquire);
        let valid = valid_len(size, ticks);
        let oldest = oldest_index(cursor, size, valid);
        summarize(
            (0..valid).map(|i| self.buckets[(oldest + i) % size].load()),
            divider,
            kind,
        )
    }

    fn reset(&self) {
        self.buckets.iter().for_each(AtomicBucket::clear);
        self.cursor.store(0, Ordering::Release);
        self.ticks.store(0, Ordering::Release);
    }
}

#[derive(Debug)]
enum Storage {
    Locked(Mutex<WindowCounter>),
    BestEffort(AtomicWindow),
}

/// Rolling window of statistics for one source
///
/// Shared between ingestion (`add`), rotation (`tick`) and reporting
/// (`snapshot`). All methods take `&self`.
#[derive(Debug)]
pub struct Accumulator {
    label: String,
    size: usize,
    storage: Storage,
}

impl Accumulator {
    /// Create a locked accumulator with `size` buckets
    pub fn new(label: impl Into<String>, size: usize) -> Self {
        Self::with_mode(label, size, SyncMode::Locked)
    }

    /// Create an unsynchronized accumulator (see module docs for the trade-off)
    pub fn best_effort(label: impl Into<String>, size: usize) -> Self {
        Self::with_mode(label, size, SyncMode::BestEffort)
    }

    pub fn with_mode(label: impl Into<String>, size: usize, mode: SyncMode) -> Self {
        let size = size.max(1);
        let storage = match mode {
            SyncMode::Locked => Storage::Locked(Mutex::new(WindowCounter::new(size))),
            SyncMode::BestEffort => Storage::BestEffort(AtomicWindow::new(size)),
        };
        Self {
            label: label.into(),
            size,
            storage,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn window_size(&self) -> usize {
        self.size
    }

    pub fn sync_mode(&self) -> SyncMode {
        match self.storage {
            Storage::Locked(_) => SyncMode::Locked,
            Storage::BestEffort(_) => SyncMode::BestEffort,
        }
    }

    // Bucket state is valid after any panic mid-operation, so a poisoned lock
    // is still safe to use.
    fn locked(window: &Mutex<WindowCounter>) -> MutexGuard<'_, WindowCounter> {
        window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add one sample to the open bucket
    pub fn add(&self, value: u64) {
        match &self.storage {
            Storage::Locked(window) => Self::locked(window).add(value),
            Storage::BestEffort(window) => window.add(value),
        }
    }

    /// Close the open bucket and open the next one
    ///
    /// Returns the final values of the closed period.
    pub fn tick(&self) -> Bucket {
        match &self.storage {
            Storage::Locked(window) => Self::locked(window).tick(),
            Storage::BestEffort(window) => window.tick(),
        }
    }

    /// Snapshot the window; `divider` of 0 is treated as 1
    pub fn snapshot(&self, divider: u64, kind: ValueKind) -> WindowResult {
        match &self.storage {
            Storage::Locked(window) => Self::locked(window).snapshot(divider, kind),
            Storage::BestEffort(window) => window.snapshot(divider, kind),
        }
    }

    pub fn snapshot_average(&self, divider: u64) -> WindowResult {
        self.snapshot(divider, ValueKind::Average)
    }

    pub fn snapshot_sum(&self, divider: u64) -> WindowResult {
        self.snapshot(divider, ValueKind::Sum)
    }

    /// Most recently closed bucket, `None` before the first tick
    pub fn peek_closed(&self) -> Option<Bucket> {
        match &self.storage {
            Storage::Locked(window) => Self::locked(window).peek_closed(),
            Storage::BestEffort(window) => window.peek_closed(),
        }
    }

    /// Rotations performed so far
    pub fn ticks(&self) -> u64 {
        match &self.storage {
            Storage::Locked(window) => Self::locked(window).ticks(),
            Storage::BestEffort(window) => window.ticks(),
        }
    }

    /// Discard every bucket
    pub fn reset(&self) {
        match &self.storage {
            Storage::Locked(window) => Self::locked(window).reset(),
            Storage::BestEffort(window) => window.reset(),
        }
    }
}
