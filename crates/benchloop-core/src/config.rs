//! Benchmark configuration.

use crate::error::{BenchError, Result};
use crate::render::RenderFormat;
use std::path::PathBuf;
use std::time::Duration;

/// Default target duration of one auto-tuned run.
pub const DEFAULT_TARGET: Duration = Duration::from_secs(5);
/// Default number of best-of trials.
pub const DEFAULT_TRIALS: u32 = 5;
/// Default memory budget handed to workloads, in megabytes.
pub const DEFAULT_MEMORY_MB: u64 = 64;
/// Default CPU profiler sampling frequency in Hz.
///
/// Prime, so samples do not alias with periodic system activity.
pub const DEFAULT_PROFILE_FREQUENCY: i32 = 997;
/// Default external profile renderer.
pub const DEFAULT_RENDERER: &str = "pprof";

/// Settings for one benchmark invocation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Wall time each auto-tuned run aims for.
    pub target_duration: Duration,
    /// Number of auto-tuned trials; the best one is reported.
    pub trials: u32,
    /// Approximate memory budget for workloads, in megabytes. Not enforced.
    pub memory_mb: u64,
    /// CPU mask to pin the process to.
    pub affinity: Option<u64>,
    /// Directory for profile artifacts.
    pub tmp_dir: PathBuf,
    /// Flakiness mode: compare this many runs against a reference run.
    pub flake: u32,
    /// Render profiles as SVG instead of text.
    pub svg: bool,
    /// Capture a CPU profile of every timed run.
    pub cpu_profile: bool,
    /// CPU profiler sampling frequency in Hz.
    pub profile_frequency: i32,
    /// Capture heap profiles around every timed run.
    ///
    /// The host supplies the profiler through
    /// [`Orchestrator::with_heap_profiler`](crate::Orchestrator::with_heap_profiler).
    pub mem_profile: bool,
    /// External profile renderer command.
    pub renderer: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_duration: DEFAULT_TARGET,
            trials: DEFAULT_TRIALS,
            memory_mb: DEFAULT_MEMORY_MB,
            affinity: None,
            tmp_dir: std::env::temp_dir(),
            flake: 0,
            svg: false,
            cpu_profile: false,
            profile_frequency: DEFAULT_PROFILE_FREQUENCY,
            mem_profile: false,
            renderer: DEFAULT_RENDERER.to_string(),
        }
    }
}

impl Config {
    /// Check that the settings can be run.
    pub fn validate(&self) -> Result<()> {
        if self.target_duration.is_zero() {
            return Err(BenchError::InvalidConfig(
                "target duration must be greater than zero".into(),
            ));
        }
        if self.trials == 0 {
            return Err(BenchError::InvalidConfig("trials must be at least 1".into()));
        }
        if self.affinity == Some(0) {
            return Err(BenchError::InvalidConfig(
                "affinity mask must select at least one CPU".into(),
            ));
        }
        if self.cpu_profile && self.profile_frequency <= 0 {
            return Err(BenchError::InvalidConfig(format!(
                "profile frequency must be positive, got {}",
                self.profile_frequency
            )));
        }
        if !self.tmp_dir.is_dir() {
            return Err(BenchError::InvalidConfig(format!(
                "temporary directory does not exist: {}",
                self.tmp_dir.display()
            )));
        }
        if self.renderer.trim().is_empty() {
            return Err(BenchError::InvalidConfig("renderer command is empty".into()));
        }
        Ok(())
    }

    /// Memory budget in bytes.
    pub fn memory_budget_bytes(&self) -> u64 {
        self.memory_mb.saturating_mul(1 << 20)
    }

    /// Whether flakiness mode is active.
    pub fn flake_mode(&self) -> bool {
        self.flake > 0
    }

    /// Format requested from the profile renderer.
    pub fn render_format(&self) -> RenderFormat {
        if self.svg { RenderFormat::Svg } else { RenderFormat::Text }
    }
}
