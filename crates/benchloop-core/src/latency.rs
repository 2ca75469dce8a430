//! Bounded, lock-free latency sampling.
//!
//! A [`LatencySampler`] is created fresh for every timed run with room for at
//! most [`MAX_SAMPLES`] observations. Workloads receive a [`LatencyRecorder`]
//! (write-only) and call [`LatencyRecorder::observe`] once per operation,
//! from as many threads as they like. Each observation reserves a slot with a
//! single `fetch_add`; once the buffer is full further observations are
//! dropped, so memory stays bounded no matter how many operations run.
//!
//! After the workload returns, the owner calls [`LatencySampler::percentiles`]
//! to sort the filled prefix and read p50/p95/p99.

use quanta::Instant;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Upper bound on samples held for a single run.
pub const MAX_SAMPLES: usize = 1_000_000;

/// Percentile ranks reported for every run with samples.
pub const PERCENTILES: [u64; 3] = [50, 95, 99];

/// Fixed-capacity sample buffer for one timed run.
#[derive(Debug)]
pub struct LatencySampler {
    slots: Box<[AtomicU64]>,
    next: AtomicUsize,
}

impl LatencySampler {
    /// Create a sampler sized for `iterations`, capped at [`MAX_SAMPLES`].
    pub fn for_iterations(iterations: u64) -> Self {
        let capacity = usize::try_from(iterations).map_or(MAX_SAMPLES, |n| n.min(MAX_SAMPLES));
        Self::with_capacity(capacity)
    }

    /// Create a sampler holding at most `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Maximum number of samples this sampler keeps.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of samples actually stored.
    pub fn len(&self) -> usize {
        self.next.load(Ordering::Acquire).min(self.slots.len())
    }

    /// Whether no sample has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write handle to hand to the workload.
    pub fn recorder(&self) -> LatencyRecorder<'_> {
        LatencyRecorder { sampler: self }
    }

    /// Store one sample in nanoseconds, or drop it if the buffer is full.
    #[inline]
    fn record_nanos(&self, nanos: u64) {
        let slot = self.next.fetch_add(1, Ordering::AcqRel);
        if let Some(cell) = self.slots.get(slot) {
            cell.store(nanos, Ordering::Relaxed);
        }
    }

    /// Sort the stored samples and read the [`PERCENTILES`].
    ///
    /// Returns `None` when nothing was recorded. Takes `&mut self` so every
    /// writer is known to be finished.
    pub fn percentiles(&mut self) -> Option<LatencyPercentiles> {
        let count = self.len();
        if count == 0 {
            return None;
        }

        let mut sorted: Vec<u64> = self.slots[..count]
            .iter_mut()
            .map(|cell| *cell.get_mut())
            .collect();
        sorted.sort_unstable();

        let at = |p: u64| sorted[rank_index(count, p)];
        Some(LatencyPercentiles {
            count,
            p50: at(50),
            p95: at(95),
            p99: at(99),
        })
    }
}

/// Index of percentile `p` in a sorted buffer of `count` samples.
///
/// `count * p / 100`, truncated; always `< count` for `p < 100`.
pub fn rank_index(count: usize, p: u64) -> usize {
    let count = count as u64;
    let idx = count.saturating_mul(p) / 100;
    usize::try_from(idx.min(count.saturating_sub(1))).unwrap_or(0)
}

/// Percentile summary of one run's samples, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyPercentiles {
    /// Number of samples the percentiles were computed from.
    pub count: usize,
    /// 50th percentile.
    pub p50: u64,
    /// 95th percentile.
    pub p95: u64,
    /// 99th percentile.
    pub p99: u64,
}

impl LatencyPercentiles {
    /// Metric entries (`latency-50`, `latency-95`, `latency-99`).
    pub fn metrics(&self) -> [(String, u64); 3] {
        [
            (format!("latency-{}", PERCENTILES[0]), self.p50),
            (format!("latency-{}", PERCENTILES[1]), self.p95),
            (format!("latency-{}", PERCENTILES[2]), self.p99),
        ]
    }
}

/// Write-only handle workloads use to report per-operation latency.
///
/// Cheap to copy and safe to share across worker threads.
#[derive(Debug, Clone, Copy)]
pub struct LatencyRecorder<'a> {
    sampler: &'a LatencySampler,
}

impl LatencyRecorder<'_> {
    /// Record the time elapsed since `start`.
    ///
    /// Dropped silently once the run's sample capacity is used up.
    #[inline]
    pub fn observe(&self, start: Instant) {
        let nanos = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.sampler.record_nanos(nanos);
    }

    /// Record an already measured latency in nanoseconds.
    #[inline]
    pub fn observe_nanos(&self, nanos: u64) {
        self.sampler.record_nanos(nanos);
    }
}
