//! Command-line interface for the benchmark runner.

// Allow CLI-specific patterns
#![allow(clippy::struct_excessive_bools)]

use crate::workloads::WorkloadKind;
use anyhow::{Context, Result, bail};
use benchloop_core::Config;
use benchloop_core::config::{DEFAULT_MEMORY_MB, DEFAULT_PROFILE_FREQUENCY, DEFAULT_RENDERER, DEFAULT_TRIALS};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Adaptive benchmark runner.
///
/// Picks an iteration count for each workload so that one run takes about
/// `--benchtime`, repeats the search `--benchnum` times, and reports the
/// fastest result with its memory, CPU and latency metrics.
#[derive(Parser, Debug)]
#[command(name = "benchloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Workloads to run.
    #[arg(value_name = "WORKLOAD", value_enum, required = true)]
    pub workloads: Vec<WorkloadKind>,

    /// Target wall time of one auto-tuned run (e.g. 5s, 500ms).
    #[arg(long, env = "BENCHLOOP_BENCHTIME", default_value = "5s", value_parser = parse_duration)]
    pub benchtime: Duration,

    /// Number of auto-tuned trials; the fastest is reported.
    #[arg(long, env = "BENCHLOOP_BENCHNUM", default_value_t = DEFAULT_TRIALS)]
    pub benchnum: u32,

    /// Approximate memory budget for workloads, in megabytes.
    #[arg(long, env = "BENCHLOOP_BENCHMEM", default_value_t = DEFAULT_MEMORY_MB)]
    pub benchmem: u64,

    /// Pin the process to the CPUs in this mask (decimal or 0x-prefixed hex).
    #[arg(long, env = "BENCHLOOP_AFFINITY", value_parser = parse_mask)]
    pub affinity: Option<u64>,

    /// Directory for profile artifacts.
    ///
    /// Defaults to the system temporary directory.
    #[arg(long, env = "BENCHLOOP_TMPDIR", value_name = "DIR")]
    pub tmpdir: Option<PathBuf>,

    /// Flakiness check: compare this many runs against a reference run.
    #[arg(long, env = "BENCHLOOP_FLAKE", default_value_t = 0)]
    pub flake: u32,

    /// Capture a CPU profile of each timed run.
    #[arg(long, env = "BENCHLOOP_CPUPROF")]
    pub cpuprof: bool,

    /// Capture heap profiles around each timed run, rendered as a diff.
    ///
    /// Needs a Linux build with the `jemalloc` feature (the default).
    #[arg(long, env = "BENCHLOOP_MEMPROF")]
    pub memprof: bool,

    /// Render profiles as SVG instead of text.
    #[arg(long, env = "BENCHLOOP_SVG")]
    pub svg: bool,

    /// Profiler sampling frequency in Hz.
    ///
    /// Use prime numbers (997, 1009, 4999) to avoid aliasing with periodic system events.
    #[arg(long, env = "BENCHLOOP_PROFILE_FREQUENCY", default_value_t = DEFAULT_PROFILE_FREQUENCY)]
    pub profile_frequency: i32,

    /// External profile renderer command.
    #[arg(long, env = "BENCHLOOP_RENDERER", default_value = DEFAULT_RENDERER)]
    pub renderer: String,

    /// Export results to JSON file.
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long, conflicts_with = "color")]
    pub no_color: bool,

    /// Force colored output (even when not a TTY).
    #[arg(long, conflicts_with = "no_color")]
    pub color: bool,

    /// Verbose output.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    /// Build the engine configuration.
    pub fn into_config(self) -> Result<Config> {
        let tmp_dir = self.tmpdir.unwrap_or_else(std::env::temp_dir);
        if !tmp_dir.is_dir() {
            bail!("Temporary directory does not exist: {}", tmp_dir.display());
        }

        let config = Config {
            target_duration: self.benchtime,
            trials: self.benchnum,
            memory_mb: self.benchmem,
            affinity: self.affinity,
            tmp_dir,
            flake: self.flake,
            svg: self.svg,
            cpu_profile: self.cpuprof,
            profile_frequency: self.profile_frequency,
            mem_profile: self.memprof,
            renderer: self.renderer,
        };
        config.validate().context("Invalid benchmark settings")?;
        Ok(config)
    }

    /// Whether output should be colored.
    pub fn use_color(&self) -> bool {
        self.color || (!self.no_color && supports_color())
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s).map_err(|e| format!("invalid duration '{s}': {e}"))
}

fn parse_mask(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid CPU mask '{s}': {e}"))
}

/// Check if the terminal supports colors.
fn supports_color() -> bool {
    use std::io::IsTerminal;

    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stdout().is_terminal()
}
