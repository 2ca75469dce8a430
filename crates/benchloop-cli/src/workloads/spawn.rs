//! Process spawn cost, measured through child-process accounting.

use anyhow::Result;
use benchloop_core::{Orchestrator, Outcome};

/// Spawn and reap `true` once per operation.
///
/// CPU and RSS metrics come from the reaped children, not this process.
#[cfg(unix)]
pub fn run(orchestrator: Orchestrator) -> Result<Outcome> {
    use anyhow::Context;
    use benchloop_core::resource::{ChildUsage, ChildWatcher, TrackedChild};
    use benchloop_core::{Driver, LatencyRecorder};
    use std::process::{Command, Stdio};
    use std::sync::Arc;

    let usage = Arc::new(ChildUsage::new());
    let orchestrator = orchestrator.with_provider(usage.clone());
    let mut failures = 0u64;

    let mut workload = |iterations: u64, recorder: &LatencyRecorder<'_>| {
        for _ in 0..iterations {
            let start = quanta::Instant::now();
            let status = ChildWatcher::global()
                .spawn(
                    Command::new("true")
                        .stdin(Stdio::null())
                        .stdout(Stdio::null())
                        .stderr(Stdio::null()),
                )
                .and_then(TrackedChild::wait);
            match status {
                Ok(status) if status.success() => recorder.observe(start),
                Ok(_) | Err(_) => failures += 1,
            }
        }
    };

    let outcome = Driver::new(orchestrator)
        .run_workload("Spawn", &mut workload)
        .context("Spawn benchmark failed")?;
    if failures > 0 {
        tracing::warn!("{} child processes failed to run", failures);
    }
    tracing::debug!("Accounted for {} child processes", usage.reaped());
    Ok(outcome)
}

/// Child-process accounting needs Unix.
#[cfg(not(unix))]
pub fn run(_orchestrator: Orchestrator) -> Result<Outcome> {
    anyhow::bail!("the spawn workload requires Unix child-process accounting")
}
