//! Adaptive benchmark execution engine.
//!
//! Given a [`Workload`], this crate decides how many times to repeat it for a
//! stable timing, runs it, and produces a [`Measurement`] carrying time per
//! operation plus whatever memory, CPU and latency metrics the platform can
//! provide. Optional CPU and heap profiles are captured as artifact files and
//! handed to an external renderer.
//!
//! # Components
//!
//! - [`controller`]: picks the next iteration count from the previous run
//! - [`timed`]: one measured run with all collectors attached
//! - [`latency`]: bounded lock-free per-operation latency samples
//! - [`resource`]: CPU time and peak RSS for the process or its children
//! - [`orchestrator`]: auto-tuning loop, best-of-N selection, profile rendering
//! - [`watchdog`]: aborts a run that exceeds its deadline
//! - [`flake`]: run-to-run deviation report
//! - [`concurrent`]: shared-countdown worker pool for parallel workloads
//! - [`driver`]: ties the above together for one named benchmark
//!
//! # Example
//!
//! ```no_run
//! use benchloop_core::{Config, Driver, LatencyRecorder, Orchestrator};
//!
//! let mut workload = |iterations: u64, _: &LatencyRecorder<'_>| {
//!     for i in 0..iterations {
//!         std::hint::black_box(i.wrapping_mul(31));
//!     }
//! };
//!
//! let mut driver = Driver::new(Orchestrator::new(Config::default()));
//! driver.run_workload("Multiply", &mut workload)?;
//! # Ok::<(), benchloop_core::BenchError>(())
//! ```

pub mod affinity;
pub mod alloc;
pub mod concurrent;
pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod flake;
pub mod latency;
pub mod measurement;
pub mod orchestrator;
pub mod profile;
pub mod render;
pub mod report;
pub mod resource;
pub mod timed;
pub mod watchdog;
pub mod workload;

pub use crate::alloc::TrackingAllocator;
pub use config::Config;
pub use controller::{IterationController, round_up};
pub use driver::{Driver, Outcome};
pub use error::{BenchError, Result};
pub use latency::{LatencyRecorder, LatencySampler};
pub use measurement::Measurement;
pub use orchestrator::{Orchestrator, merge_trial};
pub use profile::HeapProfiler;
pub use render::{ProfileRenderer, RenderFormat};
pub use resource::{ResourceProvider, ResourceSnapshot};
pub use watchdog::Watchdog;
pub use workload::Workload;
