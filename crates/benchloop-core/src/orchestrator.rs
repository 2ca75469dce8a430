//! Auto-tuning and best-of-N selection.
//!
//! The orchestrator alternates between the [`IterationController`] and the
//! [`TimedRunner`] until the controller reports convergence, then repeats
//! that whole search `trials` times and keeps the fastest result. Runs are
//! strictly sequential.

use crate::config::Config;
use crate::controller::IterationController;
use crate::error::Result;
use crate::measurement::{
    ARTIFACT_CPU_PROFILE, ARTIFACT_MEM_PROFILE, ARTIFACT_MEM_PROFILE_BASE, Measurement,
    STEADY_STATE_METRICS,
};
use crate::profile::HeapProfiler;
use crate::render::ProfileRenderer;
use crate::resource::{self, ResourceProvider};
use crate::timed::TimedRunner;
use crate::workload::Workload;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Drives a workload to a stable measurement.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: Config,
    controller: IterationController,
    runner: TimedRunner,
    renderer: ProfileRenderer,
}

impl Orchestrator {
    /// Orchestrator using the platform's in-process resource provider.
    pub fn new(config: Config) -> Self {
        let controller = IterationController::new(config.target_duration);
        let runner = TimedRunner::new(resource::platform_provider(), config.tmp_dir.clone())
            .with_cpu_profile(config.cpu_profile.then_some(config.profile_frequency));
        let renderer = ProfileRenderer::new(config.renderer.clone(), config.render_format());
        Self {
            config,
            controller,
            runner,
            renderer,
        }
    }

    /// Read counters from `provider` instead of the platform default.
    ///
    /// Subprocess workloads pass a `ChildUsage` here.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.runner = self.runner.with_provider(provider);
        self
    }

    /// Capture heap profiles around every run.
    #[must_use]
    pub fn with_heap_profiler(mut self, profiler: Arc<dyn HeapProfiler>) -> Self {
        self.runner = self.runner.with_heap_profiler(Some(profiler));
        self
    }

    /// Use a specific renderer for [`Orchestrator::finalize`].
    #[must_use]
    pub fn with_renderer(mut self, renderer: ProfileRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `workload` once with exactly `iterations` repetitions.
    pub fn run_once<W>(&self, workload: &mut W, iterations: u64) -> Result<Measurement>
    where
        W: Workload + ?Sized,
    {
        self.runner.run(workload, iterations)
    }

    /// Grow the iteration count until a run reaches the target duration.
    ///
    /// Artifacts of the intermediate runs are removed.
    pub fn auto_tune<W>(&self, workload: &mut W) -> Result<Measurement>
    where
        W: Workload + ?Sized,
    {
        let mut last = Measurement::seed();
        while let Some(iterations) = self.controller.next(Some(&last)) {
            let record = self.runner.run(workload, iterations)?;
            tracing::debug!(
                "Tuning: {} iterations took {:?} (target {:?})",
                record.iterations,
                record.duration,
                self.controller.target()
            );
            last.discard_artifacts();
            last = record;
        }
        Ok(last)
    }

    /// Auto-tune `trials` times and keep the fastest result.
    ///
    /// See [`merge_trial`] for how the records are combined.
    pub fn best_of<W>(&self, workload: &mut W) -> Result<Measurement>
    where
        W: Workload + ?Sized,
    {
        let trials = self.config.trials.max(1);
        let mut best = None;
        for trial in 1..=trials {
            let span = tracing::info_span!("trial", n = trial, of = trials);
            let _enter = span.enter();

            let record = self.auto_tune(workload)?;
            tracing::info!(
                "Trial {}/{}: {} ns/op over {} iterations",
                trial,
                trials,
                record.time_per_op,
                record.iterations
            );
            best = Some(merge_trial(best, record));
        }
        Ok(best.unwrap_or_default())
    }

    /// Hand captured profiles to the external renderer.
    ///
    /// `cpuprof` is rendered on its own; `memprof` is rendered as a diff
    /// against `memprof0`. Rendered files replace the raw artifact entries and
    /// `memprof0` is dropped. A failed render drops the entry and logs a
    /// warning.
    pub fn finalize(&self, record: &mut Measurement) {
        let base = record.artifacts.remove(ARTIFACT_MEM_PROFILE_BASE);

        if let Some(profile) = record.artifacts.remove(ARTIFACT_CPU_PROFILE)
            && let Some(rendered) = self.render(&profile, None)
        {
            record.set_artifact(ARTIFACT_CPU_PROFILE, rendered);
        }

        if let Some(profile) = record.artifacts.remove(ARTIFACT_MEM_PROFILE)
            && let Some(rendered) = self.render(&profile, base.as_deref())
        {
            record.set_artifact(ARTIFACT_MEM_PROFILE, rendered);
        }

        if let Some(base) = base {
            remove_raw(&base);
        }
    }

    fn render(&self, profile: &Path, base: Option<&Path>) -> Option<PathBuf> {
        match self.renderer.render(profile, base) {
            Ok(rendered) => {
                remove_raw(profile);
                Some(rendered)
            }
            Err(e) => {
                tracing::warn!("{} (raw profile kept at {})", e, profile.display());
                None
            }
        }
    }
}

fn remove_raw(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::debug!("Failed to remove {}: {}", path.display(), e);
    }
}

/// Fold one more trial into the best record so far.
///
/// The record with the smaller `time_per_op` wins; on a tie the earlier one
/// stays. Whatever the winner, steady-state metrics (`rss`, `sys-heap`) are
/// taken from `trial`, the latest run, because they only settle once the
/// process has warmed up. Artifacts of the losing record are deleted.
pub fn merge_trial(best: Option<Measurement>, trial: Measurement) -> Measurement {
    let Some(best) = best else {
        return trial;
    };

    let steady: Vec<(&str, u64)> = STEADY_STATE_METRICS
        .iter()
        .filter_map(|&name| trial.metric(name).map(|value| (name, value)))
        .collect();

    let (mut winner, mut loser) = if trial.time_per_op < best.time_per_op {
        (trial, best)
    } else {
        (best, trial)
    };
    loser.discard_artifacts();

    for (name, value) in steady {
        winner.set_metric(name, value);
    }
    winner
}
