//! JSON export of the report analysis.
//!
//! Serialises summary, temporal insights, groups and warnings as one
//! pretty-printed object using Serde.

use std::path::Path;

use crate::export::{write_file, ReportAnalysis};
use crate::util::error::{HostCareError, Result};

/// # Errors
/// [`HostCareError::Export`] if serialisation fails.
pub fn render_json(analysis: &ReportAnalysis) -> Result<String> {
    serde_json::to_string_pretty(analysis)
        .map_err(|e| HostCareError::Export(format!("Failed to write JSON: {e}")))
}

/// Render and write to `path`.
///
/// # Errors
/// [`HostCareError::Export`] if rendering or writing fails.
pub fn write_json(analysis: &ReportAnalysis, path: &Path) -> Result<()> {
    let json = render_json(analysis)?;
    write_file(path, json.as_bytes(), "JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_query::ReportResult;
    use crate::core::log_entry::{Level, LogEntry};

    #[test]
    fn test_json_shape() {
        let analysis = ReportAnalysis::from_result(&ReportResult {
            entries: vec![LogEntry::new("System", "disk").with_level(Level::Error).with_event_id(7)],
            warnings: vec!["[Setup] Error al consultar: x".into()],
        });
        let value: serde_json::Value = serde_json::from_str(&render_json(&analysis).unwrap()).unwrap();
        assert_eq!(value["summary"]["error"], 1);
        assert_eq!(value["total_entries"], 1);
        assert_eq!(value["groups"][0]["provider"], "disk");
        assert_eq!(value["groups"][0]["level"], "Error");
        assert_eq!(value["groups"][0]["actionable"], true);
        assert_eq!(value["warnings"][0], "[Setup] Error al consultar: x");
    }
}
