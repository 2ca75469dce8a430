//! Text report of a measurement.
//!
//! ```text
//! Benchmark<name>\t<iterations>\t<time> ns/op\t<value> <metric>...
//! <artifact>=<path>
//! ```

use crate::measurement::{METRIC_TIME, Measurement};
use std::io::{self, Write};

/// Write the result line and one line per artifact.
pub fn write_report<W: Write>(out: &mut W, name: &str, record: &Measurement) -> io::Result<()> {
    write!(
        out,
        "Benchmark{name}\t{}\t{} ns/op",
        record.iterations, record.time_per_op
    )?;
    for (metric, value) in record.metrics.iter().filter(|(k, _)| k.as_str() != METRIC_TIME) {
        write!(out, "\t{value} {metric}")?;
    }
    writeln!(out)?;

    for (artifact, path) in &record.artifacts {
        writeln!(out, "{artifact}={}", path.display())?;
    }
    Ok(())
}
