//! Outcome counters and the processing-latency histogram.
//!
//! Every counter lives in per-thread shards aligned to a cache line so
//! concurrent workers never write the same line. Reads merge the shards.

use std::array;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub const HISTOGRAM_BUCKETS: usize = 64;
pub const DEFAULT_SHARDS: usize = 16;

/// Outcome counters, numbered as they are exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Outcome {
    Received = 0,
    Transmitted = 1,
    Passed = 2,
    Errored = 3,
}

const OUTCOMES: usize = 4;

static NEXT_SHARD: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD_HINT: usize = NEXT_SHARD.fetch_add(1, Ordering::Relaxed);
}

#[repr(align(64))]
struct Shard {
    outcomes: [AtomicU64; OUTCOMES],
    time_min: AtomicU64,
    time_max: AtomicU64,
    time_sum: AtomicU64,
    time_count: AtomicU64,
    histogram: [AtomicU64; HISTOGRAM_BUCKETS],
}

impl Shard {
    fn new() -> Self {
        Self {
            outcomes: array::from_fn(|_| AtomicU64::new(0)),
            time_min: AtomicU64::new(u64::MAX),
            time_max: AtomicU64::new(0),
            time_sum: AtomicU64::new(0),
            time_count: AtomicU64::new(0),
            histogram: array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    fn reset(&self) {
        for counter in self.outcomes.iter().chain(self.histogram.iter()) {
            counter.store(0, Ordering::Relaxed);
        }
        self.time_min.store(u64::MAX, Ordering::Relaxed);
        self.time_max.store(0, Ordering::Relaxed);
        self.time_sum.store(0, Ordering::Relaxed);
        self.time_count.store(0, Ordering::Relaxed);
    }
}

pub struct Metrics {
    shards: Box<[Shard]>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1)).map(|_| Shard::new()).collect();
        Self { shards }
    }

    fn shard(&self) -> &Shard {
        let hint = SHARD_HINT.with(|hint| *hint);
        &self.shards[hint % self.shards.len()]
    }

    pub fn increment(&self, outcome: Outcome) {
        self.shard().outcomes[outcome as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_latency(&self, elapsed_ns: u64) {
        let shard = self.shard();
        shard.histogram[log2_bucket(elapsed_ns)].fetch_add(1, Ordering::Relaxed);
        shard.time_min.fetch_min(elapsed_ns, Ordering::Relaxed);
        shard.time_max.fetch_max(elapsed_ns, Ordering::Relaxed);
        shard.time_sum.fetch_add(elapsed_ns, Ordering::Relaxed);
        shard.time_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Sums every shard. Concurrent updates may or may not be included.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut out = MetricsSnapshot::default();
        let mut time_min = u64::MAX;
        for shard in self.shards.iter() {
            let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
            out.received += load(&shard.outcomes[Outcome::Received as usize]);
            out.transmitted += load(&shard.outcomes[Outcome::Transmitted as usize]);
            out.passed += load(&shard.outcomes[Outcome::Passed as usize]);
            out.errored += load(&shard.outcomes[Outcome::Errored as usize]);
            time_min = time_min.min(load(&shard.time_min));
            out.time_max = out.time_max.max(load(&shard.time_max));
            out.time_sum = out.time_sum.wrapping_add(load(&shard.time_sum));
            out.time_count += load(&shard.time_count);
            for (total, bucket) in out.histogram.iter_mut().zip(shard.histogram.iter()) {
                *total += load(bucket);
            }
        }
        out.time_min = if out.time_count == 0 { 0 } else { time_min };
        out
    }

    /// Administrative reset of every counter.
    pub fn reset(&self) {
        for shard in self.shards.iter() {
            shard.reset();
        }
    }
}

/// floor(log2(ns)), with 0 and 1 both in bucket 0.
pub fn log2_bucket(elapsed_ns: u64) -> usize {
    if elapsed_ns < 2 {
        return 0;
    }
    (u64::BITS - 1 - elapsed_ns.leading_zeros()) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub transmitted: u64,
    pub passed: u64,
    pub errored: u64,
    /// Zero until the first observation.
    pub time_min: u64,
    pub time_max: u64,
    pub time_sum: u64,
    pub time_count: u64,
    pub histogram: [u64; HISTOGRAM_BUCKETS],
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            received: 0,
            transmitted: 0,
            passed: 0,
            errored: 0,
            time_min: 0,
            time_max: 0,
            time_sum: 0,
            time_count: 0,
            histogram: [0; HISTOGRAM_BUCKETS],
        }
    }
}

impl MetricsSnapshot {
    pub fn outcome(&self, outcome: Outcome) -> u64 {
        match outcome {
            Outcome::Received => self.received,
            Outcome::Transmitted => self.transmitted,
            Outcome::Passed => self.passed,
            Outcome::Errored => self.errored,
        }
    }

    pub fn mean_ns(&self) -> Option<u64> {
        self.time_sum.checked_div(self.time_count)
    }
}

#[cfg(test)]
mod tests;
