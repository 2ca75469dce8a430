//! End-to-end tests for the benchmark engine.
//!
//! These drive the public API the way a benchmark binary does:
//! - Auto-tuning converges on the target duration
//! - Best-of-N keeps the fastest trial with the latest steady-state metrics
//! - Flakiness mode reports zero deviation for a stable benchmark
//! - Parallel workloads feed the latency sampler from many threads

use benchloop_core::concurrent::run_parallel;
use benchloop_core::measurement::{METRIC_RSS, METRIC_TIME};
use benchloop_core::resource::UnsupportedUsage;
use benchloop_core::{
    Config, Driver, LatencyRecorder, Measurement, Orchestrator, Outcome, merge_trial,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Busy-wait for `nanos` nanoseconds.
fn spin_for(nanos: u64) {
    let start = quanta::Instant::now();
    let wait = Duration::from_nanos(nanos);
    while start.elapsed() < wait {
        std::hint::spin_loop();
    }
}

fn config(dir: &TempDir, target: Duration) -> Config {
    Config {
        target_duration: target,
        trials: 1,
        tmp_dir: dir.path().to_path_buf(),
        ..Config::default()
    }
}

/// A 1µs operation with a 1s target converges to a ~1s run at ~1000 ns/op.
#[test]
fn test_spin_converges_to_target() {
    let dir = TempDir::new().expect("temp dir");
    let orchestrator = Orchestrator::new(config(&dir, Duration::from_secs(1)));
    let mut workload = |iterations: u64, _: &LatencyRecorder<'_>| {
        for _ in 0..iterations {
            spin_for(1000);
        }
    };

    let record = orchestrator.auto_tune(&mut workload).expect("auto-tune");

    assert!(record.duration >= Duration::from_secs(1), "{:?}", record.duration);
    assert!(
        (1000..2000).contains(&record.time_per_op),
        "time_per_op = {}",
        record.time_per_op
    );
    assert_eq!(record.metric(METRIC_TIME), Some(record.time_per_op));
    assert_eq!(record.iterations, 1_000_000);
}

#[test]
fn test_best_of_three_keeps_fastest_and_last_rss() {
    let trials = [(120u64, 50u64), (95, 60), (130, 70)];
    let mut best = None;
    for (time_per_op, rss) in trials {
        let mut record = Measurement::new(1000, Duration::from_nanos(time_per_op * 1000));
        record.set_metric(METRIC_RSS, rss);
        best = Some(merge_trial(best, record));
    }

    let best = best.expect("three trials");
    assert_eq!(best.time_per_op, 95);
    assert_eq!(best.metric(METRIC_RSS), Some(70));
}

#[test]
fn test_flake_mode_stable_benchmark() {
    let dir = TempDir::new().expect("temp dir");
    let config = Config {
        flake: 3,
        ..config(&dir, Duration::from_millis(10))
    };
    let orchestrator = Orchestrator::new(config).with_provider(Arc::new(UnsupportedUsage));
    let mut driver = Driver::new(orchestrator).with_output(Vec::new());

    let outcome = driver
        .run("Stable", || {
            let mut record = Measurement::new(100, Duration::from_micros(100));
            record.set_metric("allocs", 2);
            record.set_metric(METRIC_RSS, 8192);
            Ok(record)
        })
        .expect("flake run");

    assert!(matches!(outcome, Outcome::Flaky(ref runs) if runs.len() == 5));
    let report = String::from_utf8(driver.into_output()).expect("utf8");
    let lines: Vec<_> = report.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in lines {
        let (_, deviations) = line.split_once(':').expect("name: prefix");
        let values: Vec<_> = deviations.split_whitespace().collect();
        assert_eq!(values, ["+0.00%", "+0.00%"], "line {line}");
    }
}

#[test]
fn test_parallel_workload_reports_latency() {
    let dir = TempDir::new().expect("temp dir");
    let orchestrator = Orchestrator::new(config(&dir, Duration::from_millis(50)))
        .with_provider(Arc::new(UnsupportedUsage));
    let mut workload = |iterations: u64, recorder: &LatencyRecorder<'_>| {
        run_parallel(iterations, 2, || {
            let start = quanta::Instant::now();
            spin_for(2000);
            recorder.observe(start);
        });
    };

    let record = orchestrator.run_once(&mut workload, 5000).expect("run");

    let p50 = record.metric("latency-50").expect("p50");
    let p99 = record.metric("latency-99").expect("p99");
    assert!(p50 >= 2000);
    assert!(p99 >= p50);
}

#[test]
fn test_driver_renders_report_line() {
    let dir = TempDir::new().expect("temp dir");
    let orchestrator = Orchestrator::new(config(&dir, Duration::from_millis(20)));
    let mut driver = Driver::new(orchestrator).with_output(Vec::new());
    let mut workload = |iterations: u64, _: &LatencyRecorder<'_>| {
        for _ in 0..iterations {
            spin_for(500);
        }
    };

    driver.run_workload("Spin", &mut workload).expect("run");

    let report = String::from_utf8(driver.into_output()).expect("utf8");
    let fields: Vec<_> = report.trim_end().split('\t').collect();
    assert_eq!(fields[0], "BenchmarkSpin");
    assert!(fields[1].parse::<u64>().is_ok());
    assert!(fields[2].ends_with(" ns/op"));
}
