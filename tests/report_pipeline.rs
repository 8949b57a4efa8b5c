//! End-to-end tests of the event report: query, grouping, insights and the
//! three export formats.

use std::cell::Cell;

use chrono::{DateTime, Duration, TimeZone, Utc};
use hostcare::core::event_query::{
    generate, EntryStream, EventSource, QueryFilter, ReportOptions, StaticEventSource,
};
use hostcare::core::insights::TemporalInsight;
use hostcare::core::log_entry::{Level, LogEntry};
use hostcare::export::csv_export::write_csv;
use hostcare::export::json_export::write_json;
use hostcare::export::text_report::write_text;
use hostcare::export::ReportAnalysis;
use hostcare::util::cancel::CancelToken;
use hostcare::util::error::{HostCareError, Result};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 22, 0, 0).unwrap()
}

fn options(logs: &[&str], max_events: usize) -> ReportOptions {
    ReportOptions {
        log_names: logs.iter().map(|s| s.to_string()).collect(),
        levels: vec![Level::Critical, Level::Error, Level::Warning],
        from_utc: base() - Duration::days(7),
        max_events,
        include_full_message: false,
    }
}

fn disk_errors(n: usize) -> Vec<LogEntry> {
    (0..n)
        .map(|i| {
            LogEntry::new("System", "disk")
                .with_level(Level::Error)
                .with_event_id(7)
                .with_timestamp(base() + Duration::seconds(i as i64 * 30))
                .with_message("El dispositivo \\Device\\Harddisk0\\DR0 tiene un bloque defectuoso.")
        })
        .collect()
}

/// Counts queries so tests can assert none were issued.
struct CountingSource {
    inner: StaticEventSource,
    queries: Cell<usize>,
}

impl EventSource for CountingSource {
    fn query(&self, log_name: &str, filter: &QueryFilter) -> Result<EntryStream<'_>> {
        self.queries.set(self.queries.get() + 1);
        self.inner.query(log_name, filter)
    }
}

#[test]
fn cap_limits_entries_without_a_warning() {
    let source = StaticEventSource::new(disk_errors(20));
    let r = generate(&source, &options(&["System"], 5), &CancelToken::new(), &mut |_| {}).unwrap();
    assert_eq!(r.entries.len(), 5);
    assert!(r.warnings.is_empty());
}

#[test]
fn cap_is_global_across_logs() {
    let mut entries = disk_errors(4);
    entries.extend((0..4).map(|i| {
        LogEntry::new("Application", "Application Error")
            .with_level(Level::Error)
            .with_event_id(1000)
            .with_timestamp(base() + Duration::minutes(i))
    }));
    let source = StaticEventSource::new(entries);
    let r = generate(
        &source,
        &options(&["System", "Application"], 6),
        &CancelToken::new(),
        &mut |_| {},
    )
    .unwrap();
    assert_eq!(r.entries.len(), 6);
    assert_eq!(r.entries.iter().filter(|e| e.log_name == "System").count(), 4);
}

#[test]
fn empty_log_set_is_rejected_before_any_query() {
    let source = CountingSource {
        inner: StaticEventSource::new(disk_errors(3)),
        queries: Cell::new(0),
    };
    let err = generate(&source, &options(&[], 10), &CancelToken::new(), &mut |_| {}).unwrap_err();
    assert!(matches!(err, HostCareError::InvalidOptions(_)));
    assert!(err.to_string().contains("Debe seleccionar al menos un log."));
    assert_eq!(source.queries.get(), 0);
}

#[test]
fn empty_level_set_is_rejected() {
    let mut opts = options(&["System"], 10);
    opts.levels.clear();
    let source = StaticEventSource::new(Vec::new());
    let err = generate(&source, &opts, &CancelToken::new(), &mut |_| {}).unwrap_err();
    assert!(err.to_string().contains("Debe seleccionar al menos un nivel."));
}

#[test]
fn zero_cap_uses_default() {
    let source = StaticEventSource::new(disk_errors(12));
    let r = generate(&source, &options(&["System"], 0), &CancelToken::new(), &mut |_| {}).unwrap();
    assert_eq!(r.entries.len(), 12);
}

#[test]
fn full_pipeline_writes_all_formats() {
    let mut entries = disk_errors(12);
    entries.push(
        LogEntry::new("System", "Microsoft-Windows-Kernel-Power")
            .with_level(Level::Critical)
            .with_event_id(41)
            .with_timestamp(base() - Duration::hours(2)),
    );
    let source = StaticEventSource::new(entries).deny("Security");
    let result = generate(
        &source,
        &options(&["System", "Security"], 100),
        &CancelToken::new(),
        &mut |_| {},
    )
    .unwrap();
    assert_eq!(result.warnings.len(), 1);

    let analysis = ReportAnalysis::from_result(&result);
    assert_eq!(analysis.groups[0].count, 12);
    assert!(analysis.groups[0].actionable);
    assert!(matches!(analysis.insights[0], TemporalInsight::RebootMarkers { .. }));
    assert!(matches!(
        analysis.insights[1],
        TemporalInsight::ErrorBurst { count: 12, .. }
    ));

    let dir = tempfile::tempdir().unwrap();
    let txt = dir.path().join("reporte.txt");
    let csv = dir.path().join("reporte.csv");
    let json = dir.path().join("reporte.json");
    write_text(&analysis, &base(), &txt).unwrap();
    write_csv(&analysis, &csv).unwrap();
    write_json(&analysis, &json).unwrap();

    let text = std::fs::read_to_string(&txt).unwrap();
    assert!(text.contains("== Contexto temporal =="));
    assert!(text.contains("📍 Pico de errores (ventana 10 min)"));
    assert!(text.contains("disk EventId 7 [System] [Error] – 12 ocurrencias  [ACTIONABLE]"));
    assert!(text.contains("- [Security] Acceso denegado (prueba como administrador o evita este log)."));

    let csv_bytes = std::fs::read(&csv).unwrap();
    assert!(csv_bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
    let csv_text = String::from_utf8(csv_bytes[3..].to_vec()).unwrap();
    assert_eq!(csv_text.lines().count(), 1 + analysis.groups.len());

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(value["total_entries"], 13);
    assert_eq!(value["insights"][1]["kind"], "error_burst");
}

#[test]
fn export_into_missing_directory_fails() {
    let analysis = ReportAnalysis::from_result(&Default::default());
    let dir = tempfile::tempdir().unwrap();
    let err = write_csv(&analysis, &dir.path().join("no").join("r.csv")).unwrap_err();
    assert!(matches!(err, HostCareError::Export(_)));
}
