// Renderer module - text, HTML and JSON views of the registry
// All functions take a read-only RegistryView and never touch accumulators directly

use super::units::CelsiusResult;
use crate::pipeline::{IngestionCounters, RegistryView, SourceId, WindowResult};
use serde::Serialize;
use std::fmt::Write;

/// Route names linked from the help page
pub const REPORT_LINKS: [&str; 5] = ["sensorsweekly", "sensorsdaily", "sensors.json", "metrics", "exit"];

const RAW_COLUMNS: usize = 4;

/// Format values `columns` per line, space separated (0 columns means 4)
pub fn format_columns(values: &[u64], columns: usize) -> String {
    let columns = if columns == 0 { 4 } else { columns };
    let mut out = String::new();
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            out.push(if idx % columns == 0 { '\n' } else { ' ' });
        }
        let _ = write!(out, "{}", value);
    }
    out
}

/// Format Celsius values as `[21.0 - 22.5]`, `-` marking a bucket without samples
pub fn format_celsius_row(values: &[Option<f64>]) -> String {
    let cells: Vec<String> = values
        .iter()
        .map(|v| match v {
            Some(celsius) => format!("{:.1}", celsius),
            None => "-".to_string(),
        })
        .collect();
    format!("[{}]", cells.join(" "))
}

/// Window summary per sensor, plus the mean of the sensors' window averages
///
/// Sensors without any samples in the window print "not enough data" and are
/// left out of the trailing average.
pub fn render_weekly(view: &RegistryView) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>20} {:>5} {:>20} {:>20} {:>20} (Celsius)",
        "sensor", "days", "weekly max", "weekly min", "weekly average"
    );

    let mut averages_total = 0.0;
    let mut with_data = 0usize;

    for (source, result) in view.sorted_snapshots() {
        let celsius = CelsiusResult::from(&result);
        let (Some(max), Some(min), Some(average)) =
            (celsius.window_max, celsius.window_min, celsius.window_average)
        else {
            let _ = writeln!(out, "{:>20} {:>20}", source.to_string(), "not enough data");
            continue;
        };
        averages_total += average;
        with_data += 1;
        let _ = writeln!(
            out,
            "{:>20} {:>5} {:>20.1} {:>20.1} {:>20.1}",
            source.to_string(),
            result.len(),
            max,
            min,
            average
        );
    }

    if with_data > 0 {
        let _ = writeln!(out, "weekly average {:.1}", averages_total / with_data as f64);
    }
    out
}

/// Per-bucket max / min / average per sensor, oldest bucket first
pub fn render_daily(view: &RegistryView) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>20} {:>5} {:>20} {:>20} {:>20} (Celsius)",
        "sensor", "days", "daily max", "daily min", "daily average"
    );

    for (source, result) in view.sorted_snapshots() {
        let celsius = CelsiusResult::from(&result);
        if !celsius.nonzero {
            let _ = writeln!(out, "{:>20} {:>20}", source.to_string(), "not enough data");
            continue;
        }
        let _ = writeln!(
            out,
            "{:>20} {:>5} {} {} {}",
            source.to_string(),
            result.len(),
            format_celsius_row(&celsius.max),
            format_celsius_row(&celsius.min),
            format_celsius_row(&celsius.average)
        );
    }
    out
}

/// Raw per-bucket averages (millikelvin) and sample counts, oldest bucket first
pub fn render_daily_raw(view: &RegistryView) -> String {
    let mut out = String::new();
    for (source, result) in view.sorted_snapshots() {
        let _ = writeln!(out, "{} average (mK)", source);
        let _ = writeln!(out, "{}", format_columns(&result.values, RAW_COLUMNS));
        let _ = writeln!(out, "{} samples", source);
        let _ = writeln!(out, "{}", format_columns(&result.count, RAW_COLUMNS));
    }
    out
}

/// HTML index of the available reports
pub fn render_help() -> String {
    let mut out = String::new();
    for link in REPORT_LINKS {
        let _ = write!(out, "<br><a href=\"{0}\">{0}</a>", link);
    }
    out
}

#[derive(Serialize)]
struct SourceReport {
    source: SourceId,
    raw: WindowResult,
    celsius: CelsiusResult,
}

#[derive(Serialize)]
struct JsonReport {
    generated_at: String,
    window_size: usize,
    ingestion: IngestionCounters,
    sources: Vec<SourceReport>,
}

/// Every sensor's raw and Celsius snapshot as JSON
pub fn render_json(view: &RegistryView, counters: IngestionCounters) -> serde_json::Result<String> {
    let sources = view
        .sorted_snapshots()
        .into_iter()
        .map(|(source, raw)| SourceReport {
            source,
            celsius: CelsiusResult::from(&raw),
            raw,
        })
        .collect();

    let report = JsonReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        window_size: view.window_size(),
        ingestion: counters,
        sources,
    };
    serde_json::to_string_pretty(&report)
}
