//! Measurement records produced by timed runs.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Metric key for time per operation in nanoseconds.
pub const METRIC_TIME: &str = "time";
/// Metric key for bytes allocated per operation.
pub const METRIC_ALLOCATED: &str = "allocated";
/// Metric key for allocation count per operation.
pub const METRIC_ALLOCS: &str = "allocs";
/// Metric key for the live-heap high-water mark in bytes.
pub const METRIC_SYS_HEAP: &str = "sys-heap";
/// Metric key for peak resident set size in bytes.
pub const METRIC_RSS: &str = "rss";
/// Metric key for CPU time per operation in nanoseconds.
pub const METRIC_CPUTIME: &str = "cputime";

/// Metrics that only grow over the life of a process and converge to a ceiling.
///
/// Best-of-N selection always reports these from the last trial.
pub const STEADY_STATE_METRICS: &[&str] = &[METRIC_RSS, METRIC_SYS_HEAP];

/// Artifact key for the CPU profile.
pub const ARTIFACT_CPU_PROFILE: &str = "cpuprof";
/// Artifact key for the heap profile taken before the measured section.
pub const ARTIFACT_MEM_PROFILE_BASE: &str = "memprof0";
/// Artifact key for the heap profile taken after the measured section.
pub const ARTIFACT_MEM_PROFILE: &str = "memprof";

/// Result of one timed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Measurement {
    /// Number of workload repetitions executed.
    pub iterations: u64,
    /// Total wall-clock time of the run.
    pub duration: Duration,
    /// `duration / iterations` in nanoseconds.
    pub time_per_op: u64,
    /// Collected metrics keyed by name.
    pub metrics: BTreeMap<String, u64>,
    /// Profiling artifacts keyed by name.
    pub artifacts: BTreeMap<String, PathBuf>,
}

impl Measurement {
    /// The zero-iteration record the controller starts from.
    ///
    /// Never reported.
    pub fn seed() -> Self {
        Self::default()
    }

    /// Build a record from an iteration count and the elapsed wall time.
    ///
    /// Sets `time_per_op` and the `time` metric.
    pub fn new(iterations: u64, duration: Duration) -> Self {
        let time_per_op = per_op(duration_nanos(duration), iterations);
        let mut metrics = BTreeMap::new();
        metrics.insert(METRIC_TIME.to_string(), time_per_op);
        Self {
            iterations,
            duration,
            time_per_op,
            metrics,
            artifacts: BTreeMap::new(),
        }
    }

    /// Whether this is the zero-iteration seed.
    pub fn is_seed(&self) -> bool {
        self.iterations == 0
    }

    /// Get a metric value by name.
    pub fn metric(&self, name: &str) -> Option<u64> {
        self.metrics.get(name).copied()
    }

    /// Set a metric value, replacing any previous value.
    pub fn set_metric(&mut self, name: impl Into<String>, value: u64) {
        self.metrics.insert(name.into(), value);
    }

    /// Set an artifact path, replacing any previous entry.
    pub fn set_artifact(&mut self, name: impl Into<String>, path: PathBuf) {
        self.artifacts.insert(name.into(), path);
    }

    /// Remove every artifact file this record owns from disk.
    ///
    /// Used for records discarded by best-of-N selection. Failures are logged.
    pub fn discard_artifacts(&mut self) {
        for (name, path) in std::mem::take(&mut self.artifacts) {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!("Failed to remove {} artifact {}: {}", name, path.display(), e);
            }
        }
    }
}

/// Divide a total by an iteration count, treating zero iterations as one.
pub(crate) fn per_op(total: u64, iterations: u64) -> u64 {
    total / iterations.max(1)
}

/// Duration as whole nanoseconds, saturating at `u64::MAX`.
pub(crate) fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
