//! Report rendering: narrative text, CSV and JSON, all from one
//! [`ReportAnalysis`] of a [`ReportResult`].

pub mod csv_export;
pub mod json_export;
pub mod text_report;

use std::path::Path;

use serde::Serialize;

use crate::core::event_query::ReportResult;
use crate::core::grouping::{group, EntryGroup};
use crate::core::insights::{self, TemporalInsight};
use crate::core::log_entry::SeveritySummary;
use crate::util::error::{HostCareError, Result};

/// Everything the renderers show, derived from one report run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportAnalysis {
    pub summary: SeveritySummary,
    pub total_entries: usize,
    pub insights: Vec<TemporalInsight>,
    pub groups: Vec<EntryGroup>,
    pub warnings: Vec<String>,
}

impl ReportAnalysis {
    pub fn from_result(result: &ReportResult) -> Self {
        Self {
            summary: SeveritySummary::from_entries(&result.entries),
            total_entries: result.entries.len(),
            insights: insights::build(&result.entries),
            groups: group(&result.entries),
            warnings: result.warnings.clone(),
        }
    }

    pub fn actionable(&self) -> impl Iterator<Item = &EntryGroup> {
        self.groups.iter().filter(|g| g.actionable)
    }
}

/// Check that `path` can be written before rendering anything: its parent
/// directory must exist and `path` itself must not be a directory.
///
/// # Errors
/// [`HostCareError::Export`] describing the problem.
pub fn validate_export_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Err(HostCareError::Export(format!(
            "'{}' is a directory",
            path.display()
        )));
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(HostCareError::Export(format!(
                "Target directory '{}' does not exist",
                parent.display()
            )))
        }
        _ => Ok(()),
    }
}

/// Write `bytes` to `path`, mapping failures to [`HostCareError::Export`].
pub(crate) fn write_file(path: &Path, bytes: &[u8], what: &str) -> Result<()> {
    validate_export_path(path)?;
    std::fs::write(path, bytes)
        .map_err(|e| HostCareError::Export(format!("Failed to write {what} file: {e}")))?;
    tracing::info!("Exported {} report: {}", what, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_export_path(&dir.path().join("nope").join("r.csv")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_validate_rejects_directory_target() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_export_path(dir.path()).is_err());
    }

    #[test]
    fn test_validate_accepts_bare_file_name() {
        assert!(validate_export_path(Path::new("reporte.txt")).is_ok());
    }
}
