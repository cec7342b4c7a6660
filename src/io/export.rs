//! CSV export of the annual record and JSON export of the cost summary.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::cost::CostSummary;
use crate::sim::types::StepResult;

/// Column header for the per-step CSV.
pub const HEADER: &str = "timestamp,demand_kw,pv_available_kw,pv_used_kw,pv_curtailed_kw,\
                          purchase_kw,sale_kw,soc_kwh,charge_kw,discharge_kw,\
                          price_per_kwh,purchase_cap_kw,status";

/// Exports step results to a CSV file at the given path.
///
/// Produces deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(results: &[StepResult], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_csv(results, io::BufWriter::new(file))
}

/// Writes step results as CSV to any writer.
///
/// The cap column is empty for fallback steps.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(results: &[StepResult], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in results {
        wtr.write_record(&[
            r.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
            format!("{:.4}", r.demand_kw),
            format!("{:.4}", r.pv_available_kw),
            format!("{:.4}", r.pv_used_kw),
            format!("{:.4}", r.pv_curtailed_kw),
            format!("{:.4}", r.purchase_kw),
            format!("{:.4}", r.sale_kw),
            format!("{:.4}", r.soc_kwh),
            format!("{:.4}", r.charge_kw),
            format!("{:.4}", r.discharge_kw),
            format!("{:.4}", r.price_per_kwh),
            r.purchase_cap_kw
                .map(|c| format!("{c:.4}"))
                .unwrap_or_default(),
            r.status.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes the cost summary as pretty-printed JSON to a file.
///
/// # Errors
///
/// Returns an `io::Error` if file creation, serialization or writing fails.
pub fn export_summary_json(summary: &CostSummary, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_summary_json(summary, io::BufWriter::new(file))
}

pub fn write_summary_json(summary: &CostSummary, mut writer: impl Write) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writeln!(writer)?;
    writer.flush()
}
