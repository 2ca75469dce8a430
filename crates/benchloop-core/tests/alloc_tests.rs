//! Allocation metrics with the tracking allocator installed.
//!
//! The counters are process-wide, so this binary holds a single test and
//! nothing else allocates while it runs.

use benchloop_core::measurement::{METRIC_ALLOCATED, METRIC_ALLOCS, METRIC_SYS_HEAP};
use benchloop_core::resource::UnsupportedUsage;
use benchloop_core::timed::TimedRunner;
use benchloop_core::{LatencyRecorder, TrackingAllocator};
use std::alloc::System;
use std::sync::Arc;
use tempfile::TempDir;

#[global_allocator]
static GLOBAL: TrackingAllocator<System> = TrackingAllocator::new(System);

fn spin(iterations: u64, _: &LatencyRecorder<'_>) {
    let mut acc = 0u64;
    for i in 0..iterations * 10_000 {
        acc = std::hint::black_box(acc.wrapping_mul(31).wrapping_add(i));
    }
}

#[test]
fn test_collectors_do_not_count_as_workload_allocations() {
    let dir = TempDir::new().expect("temp dir");
    let runner = TimedRunner::new(Arc::new(UnsupportedUsage), dir.path());

    let plain = runner.run(&mut spin, 1).expect("plain run");
    assert_eq!(plain.metric(METRIC_ALLOCS), Some(0));
    assert_eq!(plain.metric(METRIC_ALLOCATED), Some(0));
    assert!(plain.metric(METRIC_SYS_HEAP).is_some());

    // Profiler set-up and report encoding allocate heavily; none of it may
    // land in the workload's counters.
    let profiled = runner
        .with_cpu_profile(Some(997))
        .run(&mut spin, 1)
        .expect("profiled run");
    assert_eq!(profiled.metric(METRIC_ALLOCS), Some(0));
    assert_eq!(profiled.metric(METRIC_ALLOCATED), Some(0));
}
