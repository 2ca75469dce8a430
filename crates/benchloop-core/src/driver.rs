//! Top-level entry point for one named benchmark.
//!
//! [`Driver::run`] applies process-wide settings (CPU affinity), arms the
//! watchdog, then either measures the benchmark once or runs the flakiness
//! harness, and writes the report.

use crate::affinity;
use crate::error::Result;
use crate::flake;
use crate::measurement::Measurement;
use crate::orchestrator::Orchestrator;
use crate::report;
use crate::watchdog::{self, ExpiryAction, Watchdog};
use crate::workload::Workload;
use std::io::{self, Write};

/// What a driver invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A single finalized measurement.
    Measured(Measurement),
    /// Every run of a flakiness check, warm-up included.
    Flaky(Vec<Measurement>),
}

impl Outcome {
    /// The reported record, if this was a normal run.
    pub fn measurement(&self) -> Option<&Measurement> {
        match self {
            Self::Measured(record) => Some(record),
            Self::Flaky(_) => None,
        }
    }
}

/// Runs named benchmarks and writes their reports to `out`.
pub struct Driver<W = io::Stdout> {
    orchestrator: Orchestrator,
    out: W,
    expiry: Option<fn(std::time::Duration)>,
}

impl Driver<io::Stdout> {
    /// Driver reporting to stdout.
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            out: io::stdout(),
            expiry: None,
        }
    }
}

impl<W: Write> Driver<W> {
    /// Report to `out` instead.
    pub fn with_output<O: Write>(self, out: O) -> Driver<O> {
        Driver {
            orchestrator: self.orchestrator,
            out,
            expiry: self.expiry,
        }
    }

    /// Run `action` instead of aborting when the watchdog expires.
    #[must_use]
    pub fn with_expiry_action(mut self, action: fn(std::time::Duration)) -> Self {
        self.expiry = Some(action);
        self
    }

    /// The orchestrator used for workload benchmarks.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Report sink.
    pub fn output(&mut self) -> &mut W {
        &mut self.out
    }

    /// Consume the driver, returning the report sink.
    pub fn into_output(self) -> W {
        self.out
    }

    /// Measure `workload` with best-of-N auto-tuning.
    pub fn run_workload<L>(&mut self, name: &str, workload: &mut L) -> Result<Outcome>
    where
        L: Workload + ?Sized,
    {
        let orchestrator = self.orchestrator.clone();
        self.run(name, || orchestrator.best_of(workload))
    }

    /// Run a benchmark that produces its own records.
    ///
    /// `bench` is called once, or `flake + 2` times in flakiness mode.
    pub fn run<F>(&mut self, name: &str, mut bench: F) -> Result<Outcome>
    where
        F: FnMut() -> Result<Measurement>,
    {
        let config = self.orchestrator.config().clone();
        config.validate()?;

        if let Some(mask) = config.affinity
            && let Err(e) = affinity::pin_process(mask)
        {
            tracing::warn!("Failed to set CPU affinity {:#x}: {}", mask, e);
        }

        let deadline = watchdog::deadline_for(&config);
        let action: ExpiryAction = match self.expiry {
            Some(action) => Box::new(action),
            None => Box::new(watchdog::abort_on_expiry),
        };
        let guard = Watchdog::arm_with(deadline, action)?;

        let span = tracing::info_span!("benchmark", name);
        let _enter = span.enter();

        if config.flake_mode() {
            let mut runs = flake::run_flaky(config.flake, &mut bench)?;
            guard.disarm();
            for run in &mut runs {
                run.discard_artifacts();
            }
            flake::write_flake_report(&mut self.out, &runs)?;
            self.out.flush()?;
            return Ok(Outcome::Flaky(runs));
        }

        let mut record = bench()?;
        guard.disarm();
        self.orchestrator.finalize(&mut record);
        report::write_report(&mut self.out, name, &record)?;
        self.out.flush()?;
        tracing::info!("{}: {} ns/op", name, record.time_per_op);
        Ok(Outcome::Measured(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::latency::LatencyRecorder;
    use crate::resource::UnsupportedUsage;
    use std::sync::Arc;
    use std::time::Duration;

    fn driver(dir: &std::path::Path, flake: u32) -> Driver<Vec<u8>> {
        let config = Config {
            target_duration: Duration::from_millis(10),
            trials: 1,
            flake,
            tmp_dir: dir.to_path_buf(),
            ..Config::default()
        };
        Driver::new(Orchestrator::new(config).with_provider(Arc::new(UnsupportedUsage)))
            .with_output(Vec::new())
    }

    #[test]
    fn test_custom_record_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut driver = driver(dir.path(), 0);

        let outcome = driver
            .run("Custom", || Ok(Measurement::new(10, Duration::from_nanos(5000))))
            .unwrap();

        assert_eq!(outcome.measurement().unwrap().time_per_op, 500);
        let out = String::from_utf8(driver.into_output()).unwrap();
        assert_eq!(out, "BenchmarkCustom\t10\t500 ns/op\n");
    }

    #[test]
    fn test_workload_error_propagates() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut driver = driver(dir.path(), 0);
        let result = driver.run("Broken", || {
            Err(crate::error::BenchError::Workload("no backend".into()))
        });
        assert!(result.is_err());
        assert!(driver.output().is_empty());
    }

    #[test]
    fn test_flake_mode_writes_deviations() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut driver = driver(dir.path(), 2);
        let mut calls = 0;

        let outcome = driver
            .run("Flaky", || {
                calls += 1;
                Ok(Measurement::new(1, Duration::from_nanos(100)))
            })
            .unwrap();

        assert_eq!(calls, 4);
        assert!(matches!(outcome, Outcome::Flaky(ref runs) if runs.len() == 4));
        let out = String::from_utf8(driver.into_output()).unwrap();
        assert_eq!(out, "time: +0.00%\n");
    }

    #[test]
    fn test_run_workload_auto_tunes() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut driver = driver(dir.path(), 0);
        let mut workload = |n: u64, _: &LatencyRecorder<'_>| {
            std::thread::sleep(Duration::from_micros(20).saturating_mul(u32::try_from(n).unwrap()));
        };

        let outcome = driver.run_workload("Sleep", &mut workload).unwrap();
        let record = outcome.measurement().unwrap();
        assert!(record.duration >= Duration::from_millis(10));
        let out = String::from_utf8(driver.into_output()).unwrap();
        assert!(out.starts_with("BenchmarkSleep\t"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            trials: 0,
            tmp_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let mut driver = Driver::new(Orchestrator::new(config)).with_output(Vec::new());
        assert!(driver.run("X", || Ok(Measurement::new(1, Duration::from_nanos(1)))).is_err());
    }
}
