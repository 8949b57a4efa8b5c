//! CSV export of the grouped report.
//!
//! One row per group with every field quoted. The file starts with a UTF-8
//! byte-order mark so spreadsheet tools pick the right encoding.

use std::path::Path;

use crate::core::grouping::EntryGroup;
use crate::export::{write_file, ReportAnalysis};
use crate::util::error::{HostCareError, Result};
use crate::util::text::flatten_newlines;
use crate::util::time::format_optional;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const CSV_HEADER: [&str; 10] = [
    "Log",
    "Level",
    "Provider",
    "EventId",
    "Count",
    "FirstLocal",
    "LastLocal",
    "Actionable",
    "Reason",
    "SampleMessage",
];

/// The CSV document as bytes, BOM included.
///
/// # Errors
/// [`HostCareError::Export`] if a record cannot be serialised.
pub fn render_csv(analysis: &ReportAnalysis) -> Result<Vec<u8>> {
    let mut buffer = UTF8_BOM.to_vec();
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(&mut buffer);

    writer
        .write_record(CSV_HEADER)
        .map_err(|e| HostCareError::Export(format!("Failed to write CSV header: {e}")))?;

    for group in &analysis.groups {
        writer
            .write_record(row(group))
            .map_err(|e| HostCareError::Export(format!("Failed to write CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| HostCareError::Export(format!("Failed to flush CSV: {e}")))?;
    drop(writer);
    Ok(buffer)
}

/// Render and write to `path`.
///
/// # Errors
/// [`HostCareError::Export`] if rendering or writing fails.
pub fn write_csv(analysis: &ReportAnalysis, path: &Path) -> Result<()> {
    let bytes = render_csv(analysis)?;
    write_file(path, &bytes, "CSV")
}

fn row(g: &EntryGroup) -> [String; 10] {
    [
        flatten_newlines(&g.log_name),
        g.level.map(|l| l.name().to_string()).unwrap_or_default(),
        flatten_newlines(&g.provider),
        g.event_id.map(|id| id.to_string()).unwrap_or_default(),
        g.count.to_string(),
        format_optional(g.first_seen.as_ref(), ""),
        format_optional(g.last_seen.as_ref(), ""),
        if g.actionable { "YES" } else { "NO" }.to_string(),
        g.reason.as_deref().map(flatten_newlines).unwrap_or_default(),
        g.sample_message
            .as_deref()
            .map(flatten_newlines)
            .unwrap_or_default(),
    ]
}
