//! JSON export of benchmark results.

use anyhow::{Context, Result};
use benchloop_core::{Config, Measurement, Outcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Full JSON report.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    /// How and where the benchmarks were run.
    pub metadata: ReportMetadata,
    /// One entry per benchmark, in run order.
    pub results: Vec<ResultEntry<'a>>,
}

/// Run metadata.
#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    pub timestamp: DateTime<Utc>,
    pub platform: String,
    pub benchloop_version: String,
    pub target_duration_ms: u64,
    pub trials: u32,
    pub memory_mb: u64,
    pub flake: u32,
    pub cpu_profile: bool,
    pub mem_profile: bool,
    pub affinity: Option<String>,
}

impl ReportMetadata {
    fn new(config: &Config) -> Self {
        Self {
            timestamp: Utc::now(),
            platform: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            benchloop_version: env!("CARGO_PKG_VERSION").to_string(),
            target_duration_ms: u64::try_from(config.target_duration.as_millis()).unwrap_or(u64::MAX),
            trials: config.trials,
            memory_mb: config.memory_mb,
            flake: config.flake,
            cpu_profile: config.cpu_profile,
            mem_profile: config.mem_profile,
            affinity: config.affinity.map(|mask| format!("{mask:#x}")),
        }
    }
}

/// Results of one named benchmark.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultEntry<'a> {
    /// A normal best-of-N run.
    Measured {
        name: &'a str,
        result: &'a Measurement,
    },
    /// Every run of a flakiness check.
    Flaky {
        name: &'a str,
        runs: &'a [Measurement],
    },
}

impl<'a> ResultEntry<'a> {
    fn new(name: &'a str, outcome: &'a Outcome) -> Self {
        match outcome {
            Outcome::Measured(result) => Self::Measured { name, result },
            Outcome::Flaky(runs) => Self::Flaky { name, runs },
        }
    }
}

/// Build the JSON report for `results`.
pub fn build_report<'a>(results: &'a [(String, Outcome)], config: &Config) -> RunReport<'a> {
    RunReport {
        metadata: ReportMetadata::new(config),
        results: results
            .iter()
            .map(|(name, outcome)| ResultEntry::new(name, outcome))
            .collect(),
    }
}

/// Export results to JSON file.
pub fn export_json(results: &[(String, Outcome)], config: &Config, path: &Path) -> Result<()> {
    let report = build_report(results, config);
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_export_shape() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        let mut record = Measurement::new(100, Duration::from_micros(50));
        record.set_metric("rss", 4096);
        let results = vec![
            ("Spin".to_string(), Outcome::Measured(record.clone())),
            ("Hash".to_string(), Outcome::Flaky(vec![record; 3])),
        ];
        let config = Config {
            affinity: Some(3),
            ..Config::default()
        };

        export_json(&results, &config, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["metadata"]["trials"], 5);
        assert_eq!(value["metadata"]["affinity"], "0x3");
        assert_eq!(value["metadata"]["mem_profile"], false);
        assert_eq!(value["results"][0]["kind"], "measured");
        assert_eq!(value["results"][0]["name"], "Spin");
        assert_eq!(value["results"][0]["result"]["time_per_op"], 500);
        assert_eq!(value["results"][0]["result"]["metrics"]["rss"], 4096);
        assert_eq!(value["results"][1]["kind"], "flaky");
        assert_eq!(value["results"][1]["runs"].as_array().unwrap().len(), 3);
    }
}
