//! Error types for the benchmark engine.

use std::path::PathBuf;

/// Errors produced while running or post-processing a benchmark.
///
/// Only [`BenchError::Artifact`] and [`BenchError::Workload`] ever escape a
/// measured run. Counter reads and profile rendering failures are logged and
/// swallowed where they happen; their variants exist so the lower-level
/// helpers can report what went wrong before the caller decides to drop the
/// metric.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// A temporary artifact file could not be created.
    ///
    /// This means the execution environment is broken (full disk, missing
    /// temp directory) and the run cannot continue.
    #[error("Failed to create artifact file in {}: {source}", dir.display())]
    Artifact {
        /// Directory the artifact was supposed to live in
        dir: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The in-process sampling profiler failed.
    #[error("Profiler error: {0}")]
    Profile(String),

    /// The external profile renderer failed.
    #[error("Failed to render {}: {reason}", profile.display())]
    Render {
        /// Profile that was being rendered
        profile: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A resource counter could not be read.
    #[error("Failed to read {counter}: {reason}")]
    Resource {
        /// Counter name (e.g. "getrusage(RUSAGE_SELF)")
        counter: &'static str,
        /// What went wrong
        reason: String,
    },

    /// A custom workload reported a fatal failure.
    #[error("Workload failed: {0}")]
    Workload(String),

    /// The configuration cannot be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic I/O failure outside of artifact creation.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BenchError>;
