//! Run-to-run stability check.
//!
//! The benchmark runs `count + 2` times. The first two runs are warm-up and
//! ignored, the third becomes the reference, and every later run is reported
//! as a signed percentage deviation from it, metric by metric.

use crate::error::Result;
use crate::measurement::Measurement;
use std::io::{self, Write};

/// Warm-up runs discarded before the reference run.
pub const WARMUP_RUNS: usize = 2;

/// Run `bench` `count + 2` times, returning every record in order.
pub fn run_flaky<F>(count: u32, mut bench: F) -> Result<Vec<Measurement>>
where
    F: FnMut() -> Result<Measurement>,
{
    let total = count as usize + WARMUP_RUNS;
    let mut runs = Vec::with_capacity(total);
    for run in 1..=total {
        let span = tracing::info_span!("flake", run, of = total);
        let _enter = span.enter();
        runs.push(bench()?);
    }
    Ok(runs)
}

/// Write one `name: <dev> <dev> ...` line per metric of the reference run.
///
/// `runs` is the full output of [`run_flaky`], warm-up included. Writes
/// nothing if there is no reference run.
pub fn write_flake_report<W: Write>(out: &mut W, runs: &[Measurement]) -> io::Result<()> {
    let Some((reference, rest)) = runs.get(WARMUP_RUNS..).and_then(<[_]>::split_first) else {
        return Ok(());
    };
    for (name, &base) in &reference.metrics {
        write!(out, "{name}:")?;
        for run in rest {
            write!(out, " {}", deviation(base, run.metric(name)))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Signed percentage deviation of `value` from `base`, two decimals.
///
/// A zero base yields `+0.00%` when the value is also zero and `n/a`
/// otherwise. A missing value yields `n/a`.
pub fn deviation(base: u64, value: Option<u64>) -> String {
    match value {
        None => "n/a".to_string(),
        Some(0) if base == 0 => format!("{:+.2}%", 0.0),
        Some(_) if base == 0 => "n/a".to_string(),
        Some(value) => {
            let pct = (value as f64 - base as f64) / base as f64 * 100.0;
            format!("{pct:+.2}%")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(time: u64, extra: Option<u64>) -> Measurement {
        let mut m = Measurement::new(1, Duration::from_nanos(time));
        if let Some(v) = extra {
            m.set_metric("rss", v);
        }
        m
    }

    #[test]
    fn test_runs_count_plus_warmup() {
        let mut calls = 0;
        let runs = run_flaky(3, || {
            calls += 1;
            Ok(record(100, None))
        })
        .unwrap();
        assert_eq!(runs.len(), 5);
        assert_eq!(calls, 5);
    }

    #[test]
    fn test_constant_metrics_report_zero() {
        let runs = run_flaky(3, || Ok(record(100, Some(4096)))).unwrap();
        let mut out = Vec::new();
        write_flake_report(&mut out, &runs).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "rss: +0.00% +0.00%\ntime: +0.00% +0.00%\n"
        );
    }

    #[test]
    fn test_deviation_signs() {
        assert_eq!(deviation(100, Some(110)), "+10.00%");
        assert_eq!(deviation(200, Some(150)), "-25.00%");
        assert_eq!(deviation(3, Some(4)), "+33.33%");
    }

    #[test]
    fn test_deviation_zero_base() {
        assert_eq!(deviation(0, Some(0)), "+0.00%");
        assert_eq!(deviation(0, Some(5)), "n/a");
    }

    #[test]
    fn test_missing_metric_is_na() {
        let runs = vec![
            record(1, None),
            record(1, None),
            record(100, Some(10)),
            record(120, None),
        ];
        let mut out = Vec::new();
        write_flake_report(&mut out, &runs).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "rss: n/a\ntime: +20.00%\n");
    }

    #[test]
    fn test_error_stops_runs() {
        let mut calls = 0;
        let result = run_flaky(3, || {
            calls += 1;
            if calls == 2 {
                Err(crate::error::BenchError::Workload("boom".into()))
            } else {
                Ok(record(1, None))
            }
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }
}
