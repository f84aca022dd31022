//! Circular bucket window
//!
//! A `WindowCounter` keeps the statistics of the last N rotation periods in a
//! fixed slice of buckets. One cursor names the open bucket; `tick` moves the
//! cursor forward (wrapping) and clears the bucket it lands on, silently
//! discarding the oldest period once the window is full.

use super::types::{Bucket, ValueKind, WindowResult};

/// Fixed-size ring of per-period buckets
///
/// Not synchronized. `Accumulator` wraps it with a locking policy.
#[derive(Debug, Clone)]
pub struct WindowCounter {
    buckets: Box<[Bucket]>,
    cursor: usize,
    ticks: u64,
}

impl WindowCounter {
    /// Create a window of `size` buckets. A size of 0 is treated as 1.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            buckets: vec![Bucket::EMPTY; size].into_boxed_slice(),
            cursor: 0,
            ticks: 0,
        }
    }

    /// Number of buckets (N)
    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    /// Rotations performed since creation or the last reset
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Index of the open bucket
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of buckets holding valid periods: `min(N, ticks + 1)`
    pub fn valid_len(&self) -> usize {
        valid_len(self.size(), self.ticks)
    }

    /// Add one sample to the open bucket
    pub fn add(&mut self, value: u64) {
        self.buckets[self.cursor].record(value);
    }

    /// Close the open bucket and open the next one
    ///
    /// Returns the final values of the closed bucket. The newly opened bucket
    /// is reset to `Bucket::EMPTY` before it accepts samples.
    pub fn tick(&mut self) -> Bucket {
        let closed = self.buckets[self.cursor];
        self.cursor = next_index(self.cursor, self.size());
        self.buckets[self.cursor] = Bucket::EMPTY;
        self.ticks += 1;
        closed
    }

    /// The most recently closed bucket
    ///
    /// `None` before the first tick, and for a single-bucket window (where the
    /// closed bucket is the one that was just reopened).
    pub fn peek_closed(&self) -> Option<Bucket> {
        if self.ticks == 0 || self.size() == 1 {
            return None;
        }
        Some(self.buckets[prev_index(self.cursor, self.size())])
    }

    /// The open bucket as it stands
    pub fn current(&self) -> Bucket {
        self.buckets[self.cursor]
    }

    /// Clear every bucket and rewind the cursor
    pub fn reset(&mut self) {
        self.buckets.iter_mut().for_each(|b| *b = Bucket::EMPTY);
        self.cursor = 0;
        self.ticks = 0;
    }

    /// Valid buckets ordered oldest to newest (open bucket last)
    pub fn ordered(&self) -> impl Iterator<Item = Bucket> + '_ {
        let size = self.size();
        let valid = self.valid_len();
        let oldest = oldest_index(self.cursor, size, valid);
        (0..valid).map(move |i| self.buckets[(oldest + i) % size])
    }

    /// Snapshot the window
    ///
    /// `divider` normalises the output in the same pass (0 is treated as 1).
    pub fn snapshot(&self, divider: u64, kind: ValueKind) -> WindowResult {
        summarize(self.ordered(), divider, kind)
    }
}

pub(crate) fn next_index(index: usize, size: usize) -> usize {
    if index + 1 >= size {
        0
    } else {
        index + 1
    }
}

pub(crate) fn prev_index(index: usize, size: usize) -> usize {
    if index == 0 {
        size - 1
    } else {
        index - 1
    }
}

pub(crate) fn valid_len(size: usize, ticks: u64) -> usize {
    ticks.saturating_add(1).min(size as u64) as usize
}

/// Index of the oldest valid bucket given the open cursor
pub(crate) fn oldest_index(cursor: usize, size: usize, valid: usize) -> usize {
    (cursor + size - (valid - 1)) % size
}

/// Build a `WindowResult` from buckets ordered oldest to newest
///
/// Shared by the locked and best-effort accumulators so both report with the
/// same arithmetic. Division only happens for buckets with `count > 0`.
pub fn summarize<I>(rows: I, divider: u64, kind: ValueKind) -> WindowResult
where
    I: IntoIterator<Item = Bucket>,
{
    let divider = if divider == 0 { 1 } else { divider };
    let rows = rows.into_iter();
    let capacity = rows.size_hint().0;

    let mut result = WindowResult {
        kind,
        nonzero: false,
        window_max: 0,
        window_min: u64::MAX,
        window_average: 0,
        max_sum: 0,
        values: Vec::with_capacity(capacity),
        min: Vec::with_capacity(capacity),
        max: Vec::with_capacity(capacity),
        count: Vec::with_capacity(capacity),
    };

    let mut value_total: u128 = 0;
    let mut populated: u128 = 0;

    for bucket in rows {
        if bucket.count == 0 {
            result.values.push(0);
            result.min.push(0);
            result.max.push(0);
            result.count.push(0);
            continue;
        }

        let value = match kind {
            ValueKind::Average => bucket.sum / divider.saturating_mul(bucket.count),
            ValueKind::Sum => bucket.sum / divider,
        };
        let min = bucket.min / divider;
        let max = bucket.max / divider;

        result.nonzero = true;
        result.max_sum = result.max_sum.max(bucket.sum);
        result.window_max = result.window_max.max(max);
        result.window_min = result.window_min.min(min);

        value_total += u128::from(value);
        populated += 1;

        result.values.push(value);
        result.min.push(min);
        result.max.push(max);
        result.count.push(bucket.count);
    }

    if populated == 0 {
        result.window_min = 0;
    } else {
        result.window_average = (value_total / populated) as u64;
    }

    result
}
