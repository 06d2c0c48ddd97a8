//! CSV export of per-tick simulation telemetry.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::engine::{SimEngine, TickReport};

/// Schema v1 column header for CSV telemetry export.
const HEADER: &str = "tick,time_hr,irradiance,solar_possible_w,solar_w,\
                      load_w,battery_flow_w,derated_w,battery_soc,\
                      tripped,rules_fired";

/// One exported row, sampled after a tick completes.
#[derive(Debug, Clone)]
pub struct TelemetryRow {
    pub tick: usize,
    pub time_hr: f32,
    pub irradiance: f32,
    pub solar_possible_w: f32,
    pub solar_w: f32,
    pub load_w: f32,
    pub battery_flow_w: f32,
    pub derated_w: f32,
    pub battery_soc: f32,
    pub tripped: usize,
    pub rules_fired: usize,
}

impl TelemetryRow {
    pub fn sample(tick: usize, engine: &SimEngine, report: &TickReport) -> Self {
        let r = &report.readings;
        Self {
            tick,
            time_hr: engine.clock().minutes() / 60.0,
            irradiance: r.irradiance,
            solar_possible_w: r.solar_possible_w,
            solar_w: r.solar_w,
            load_w: r.load_w,
            battery_flow_w: r.battery_flow_w,
            derated_w: r.derated_w,
            battery_soc: engine.battery_soc().unwrap_or(0.0),
            tripped: report.tripped.len(),
            rules_fired: report.fired_rules.len(),
        }
    }
}

/// Exports telemetry rows to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(rows: &[TelemetryRow], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(rows, buf)
}

/// Writes telemetry rows as CSV to any writer. Output is deterministic
/// for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(rows: &[TelemetryRow], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in rows {
        wtr.write_record(&[
            r.tick.to_string(),
            format!("{:.2}", r.time_hr),
            format!("{:.4}", r.irradiance),
            format!("{:.4}", r.solar_possible_w),
            format!("{:.4}", r.solar_w),
            format!("{:.4}", r.load_w),
            format!("{:.4}", r.battery_flow_w),
            format!("{:.4}", r.derated_w),
            format!("{:.4}", r.battery_soc),
            r.tripped.to_string(),
            r.rules_fired.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
