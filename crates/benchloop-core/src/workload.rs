//! The unit of work being measured.

use crate::latency::LatencyRecorder;

/// A benchmark body.
///
/// `run` must execute the operation `iterations` times. Workloads that care
/// about per-operation latency report each operation through `recorder`.
pub trait Workload {
    /// Execute the operation `iterations` times.
    fn run(&mut self, iterations: u64, recorder: &LatencyRecorder<'_>);
}

impl<F> Workload for F
where
    F: FnMut(u64, &LatencyRecorder<'_>),
{
    fn run(&mut self, iterations: u64, recorder: &LatencyRecorder<'_>) {
        self(iterations, recorder);
    }
}
