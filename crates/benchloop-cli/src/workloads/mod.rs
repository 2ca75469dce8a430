//! Demonstration workloads.
//!
//! Each one exercises a different collector of the engine: `spin` is pure
//! CPU, `hash` streams through a buffer sized from the memory budget, `json`
//! allocates heavily, `echo` reports per-request latency from many tasks, and
//! `spawn` is measured through child-process accounting.

// Allow numeric casts in workload sizing
#![allow(clippy::cast_possible_truncation)]

mod echo;
mod hash;
mod json;
mod spawn;
mod spin;

pub use echo::EchoWorkload;
pub use hash::HashWorkload;
pub use json::JsonWorkload;
pub use spin::SpinWorkload;

use anyhow::{Context, Result};
use benchloop_core::{Config, Driver, Orchestrator, Outcome};
use clap::ValueEnum;

/// Seed for every randomised workload, so runs are comparable.
pub const WORKLOAD_SEED: u64 = 0x5EED_B3C4;

/// Workloads selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkloadKind {
    /// Fixed busy loop
    Spin,
    /// SHA-256 over a buffer sized from the memory budget
    Hash,
    /// Parse seeded random JSON documents
    Json,
    /// TCP request/response round trips over loopback
    Echo,
    /// Spawn and reap a trivial child process
    Spawn,
}

impl WorkloadKind {
    /// Benchmark name used in the report line.
    pub fn name(self) -> &'static str {
        match self {
            Self::Spin => "Spin",
            Self::Hash => "Hash",
            Self::Json => "Json",
            Self::Echo => "Echo",
            Self::Spawn => "Spawn",
        }
    }

    /// Run this workload under `config`, reporting to stdout.
    pub fn run(self, config: &Config) -> Result<Outcome> {
        let mut orchestrator = Orchestrator::new(config.clone());
        if config.mem_profile {
            let profiler = crate::heap::profiler().context("Heap profiling unavailable")?;
            orchestrator = orchestrator.with_heap_profiler(profiler);
        }
        let name = self.name();
        let outcome = match self {
            Self::Spin => Driver::new(orchestrator).run_workload(name, &mut SpinWorkload::default()),
            Self::Hash => {
                let mut workload = HashWorkload::new(config.memory_budget_bytes());
                Driver::new(orchestrator).run_workload(name, &mut workload)
            }
            Self::Json => {
                let mut workload = JsonWorkload::new(config.memory_budget_bytes());
                Driver::new(orchestrator).run_workload(name, &mut workload)
            }
            Self::Echo => {
                let mut workload = EchoWorkload::start().context("Failed to start echo server")?;
                Driver::new(orchestrator).run_workload(name, &mut workload)
            }
            Self::Spawn => return spawn::run(orchestrator),
        };
        outcome.with_context(|| format!("{name} benchmark failed"))
    }
}
