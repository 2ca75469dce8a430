//! One measured execution of a workload.
//!
//! [`TimedRunner::run`] wraps a single call of [`Workload::run`] with every
//! collector that applies: latency sampling, allocation counters, resource
//! snapshots, and optional CPU and heap profiles. The result is one
//! [`Measurement`].

use crate::alloc::AllocSnapshot;
use crate::error::Result;
use crate::latency::LatencySampler;
use crate::measurement::{
    self, ARTIFACT_CPU_PROFILE, ARTIFACT_MEM_PROFILE, ARTIFACT_MEM_PROFILE_BASE,
    METRIC_ALLOCATED, METRIC_ALLOCS, METRIC_CPUTIME, METRIC_RSS, METRIC_SYS_HEAP, Measurement,
};
use crate::profile::{self, CpuProfile, HeapProfiler};
use crate::resource::ResourceProvider;
use crate::workload::Workload;
use quanta::Instant;
use std::path::PathBuf;
use std::sync::Arc;

/// Executes timed runs with a fixed set of collectors.
#[derive(Clone)]
pub struct TimedRunner {
    provider: Arc<dyn ResourceProvider>,
    heap_profiler: Option<Arc<dyn HeapProfiler>>,
    artifact_dir: PathBuf,
    cpu_profile_frequency: Option<i32>,
}

impl std::fmt::Debug for TimedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedRunner")
            .field("provider", &self.provider.name())
            .field("heap_profiler", &self.heap_profiler.is_some())
            .field("artifact_dir", &self.artifact_dir)
            .field("cpu_profile_frequency", &self.cpu_profile_frequency)
            .finish()
    }
}

impl TimedRunner {
    /// Runner reading counters from `provider` and writing artifacts to `artifact_dir`.
    pub fn new(provider: Arc<dyn ResourceProvider>, artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            heap_profiler: None,
            artifact_dir: artifact_dir.into(),
            cpu_profile_frequency: None,
        }
    }

    /// Replace the resource provider.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Capture `memprof0`/`memprof` around every run.
    #[must_use]
    pub fn with_heap_profiler(mut self, profiler: Option<Arc<dyn HeapProfiler>>) -> Self {
        self.heap_profiler = profiler;
        self
    }

    /// Sample a CPU profile at `frequency` Hz during every run.
    #[must_use]
    pub fn with_cpu_profile(mut self, frequency: Option<i32>) -> Self {
        self.cpu_profile_frequency = frequency;
        self
    }

    /// Run `workload` once with `iterations` repetitions.
    pub fn run<W>(&self, workload: &mut W, iterations: u64) -> Result<Measurement>
    where
        W: Workload + ?Sized,
    {
        let mut sampler = LatencySampler::for_iterations(iterations);

        // Holds this run's artifacts until the record exists, so a failed
        // capture can remove the ones already on disk.
        let mut captured = Measurement::seed();

        if let Some(path) = self.capture_heap(ARTIFACT_MEM_PROFILE_BASE)? {
            captured.set_artifact(ARTIFACT_MEM_PROFILE_BASE, path);
        }
        let cpu = match self.start_cpu_profile() {
            Ok(cpu) => cpu,
            Err(e) => {
                captured.discard_artifacts();
                return Err(e);
            }
        };

        // Counters bracket the workload alone; profiler start-up and report
        // encoding stay outside.
        let resources_before = self.provider.snapshot();
        let alloc_before = AllocSnapshot::take();
        let start = Instant::now();
        workload.run(iterations, &sampler.recorder());
        let elapsed = start.elapsed();
        let alloc_after = AllocSnapshot::take();
        let resources_after = self.provider.snapshot();

        if let Some(path) = cpu.and_then(CpuProfile::finish) {
            captured.set_artifact(ARTIFACT_CPU_PROFILE, path);
        }
        match self.capture_heap(ARTIFACT_MEM_PROFILE) {
            Ok(Some(path)) => captured.set_artifact(ARTIFACT_MEM_PROFILE, path),
            Ok(None) => {}
            Err(e) => {
                captured.discard_artifacts();
                return Err(e);
            }
        }

        let mut record = Measurement::new(iterations, elapsed);
        record.artifacts = captured.artifacts;

        if let Some(latency) = sampler.percentiles() {
            for (name, value) in latency.metrics() {
                record.set_metric(name, value);
            }
        }

        let usage = resources_before.delta(&resources_after);
        if let Some(cpu_time) = usage.cpu_time {
            record.set_metric(
                METRIC_CPUTIME,
                measurement::per_op(measurement::duration_nanos(cpu_time), iterations),
            );
        }
        if let Some(rss) = usage.peak_memory {
            record.set_metric(METRIC_RSS, rss);
        }

        if let (Some(before), Some(after)) = (alloc_before, alloc_after) {
            let (bytes, count) = after.since(&before);
            record.set_metric(METRIC_ALLOCATED, measurement::per_op(bytes, iterations));
            record.set_metric(METRIC_ALLOCS, measurement::per_op(count, iterations));
            record.set_metric(METRIC_SYS_HEAP, after.peak_live_bytes);
        }

        tracing::debug!(
            "{} iterations in {:?} ({} ns/op)",
            record.iterations,
            record.duration,
            record.time_per_op
        );
        Ok(record)
    }

    fn capture_heap(&self, name: &str) -> Result<Option<PathBuf>> {
        match &self.heap_profiler {
            Some(profiler) => profile::capture_heap(profiler.as_ref(), &self.artifact_dir, name),
            None => Ok(None),
        }
    }

    fn start_cpu_profile(&self) -> Result<Option<CpuProfile>> {
        match self.cpu_profile_frequency {
            Some(frequency) => CpuProfile::start(&self.artifact_dir, frequency),
            None => Ok(None),
        }
    }
}
