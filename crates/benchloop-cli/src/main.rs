//! benchloop - adaptive benchmark runner.

use anyhow::{Context, Result};
use benchloop_core::{Config, Outcome, TrackingAllocator};
use benchloop_cli::{cli::Cli, export::export_json};
use clap::Parser;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// Allocation counters wrap jemalloc on Linux (heap profiling) and mimalloc
// elsewhere. Disable with `--no-default-features` if debugging allocator issues.
#[cfg(all(target_os = "linux", feature = "jemalloc"))]
#[global_allocator]
static GLOBAL: TrackingAllocator<tikv_jemallocator::Jemalloc> =
    TrackingAllocator::new(tikv_jemallocator::Jemalloc);

// Profiling is compiled in but stays inactive until --memprof turns it on.
#[cfg(all(target_os = "linux", feature = "jemalloc"))]
#[allow(non_upper_case_globals)]
#[unsafe(export_name = "malloc_conf")]
pub static malloc_conf: &[u8] = b"prof:true,prof_active:false,lg_prof_sample:19\0";

#[cfg(all(not(all(target_os = "linux", feature = "jemalloc")), feature = "mimalloc"))]
#[global_allocator]
static GLOBAL: TrackingAllocator<mimalloc::MiMalloc> = TrackingAllocator::new(mimalloc::MiMalloc);

#[cfg(not(any(all(target_os = "linux", feature = "jemalloc"), feature = "mimalloc")))]
#[global_allocator]
static GLOBAL: TrackingAllocator<std::alloc::System> = TrackingAllocator::new(std::alloc::System);

fn main() -> Result<()> {
    // Interrupted benchmarks have nothing worth reporting.
    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!("\nBenchmark interrupted.");
        std::process::exit(130); // 128 + SIGINT
    }) {
        tracing::warn!("Failed to install signal handler: {}", e);
    }

    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise use default based on verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("info")
        } else {
            EnvFilter::new("warn")
        }
    });

    // Log messages appear above progress spinners without clobbering them
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(indicatif_layer.get_stderr_writer()),
        )
        .with(indicatif_layer)
        .with(filter)
        .init();

    let color = cli.use_color();
    let workloads = cli.workloads.clone();
    let json_output = cli.json.clone();

    let config = cli.into_config().context("Failed to create benchmark config")?;
    print_banner(&config, workloads.len(), color);

    let mut results: Vec<(String, Outcome)> = Vec::with_capacity(workloads.len());
    for kind in workloads {
        tracing::info!("Running {}", kind.name());
        let outcome = kind.run(&config)?;
        results.push((kind.name().to_string(), outcome));
    }

    if let Some(path) = json_output {
        export_json(&results, &config, &path).context("Failed to export JSON")?;
        eprintln!("Results exported to: {}", path.display());
    }

    Ok(())
}

/// Print a compact one-line banner with configuration summary to stderr.
///
/// Stdout carries only report lines.
fn print_banner(config: &Config, workloads: usize, color: bool) {
    use owo_colors::OwoColorize;

    let mode = if config.flake_mode() {
        format!("flake x{}", config.flake)
    } else {
        format!("best of {}", config.trials)
    };
    let summary = format!(
        "{} workload(s), {:?} per run, {}",
        workloads, config.target_duration, mode
    );

    if color {
        eprintln!("{}: {}", "benchloop".cyan().bold(), summary);
    } else {
        eprintln!("benchloop: {summary}");
    }
}
