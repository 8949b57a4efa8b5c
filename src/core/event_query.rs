//! Event Query Engine.
//!
//! [`generate`] runs one structured query per requested log through an
//! [`EventSource`], most recent entries first, until a global cap is hit.
//! A log that cannot be read becomes a warning on the result; the remaining
//! logs are still queried.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::log_entry::{Level, LogEntry};
use crate::util::cancel::CancelToken;
use crate::util::constants::*;
use crate::util::error::{HostCareError, Result};
use crate::util::text::shorten;

/// What to read and how much of it.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub log_names: Vec<String>,
    pub levels: Vec<Level>,
    pub from_utc: DateTime<Utc>,
    /// Global cap across all logs. `0` selects [`DEFAULT_MAX_EVENTS`].
    pub max_events: usize,
    pub include_full_message: bool,
}

impl ReportOptions {
    /// Reject empty log or level sets.
    ///
    /// # Errors
    /// [`HostCareError::InvalidOptions`] naming what is missing.
    pub fn validate(&self) -> Result<()> {
        if self.log_names.iter().all(|l| l.trim().is_empty()) {
            return Err(HostCareError::InvalidOptions(
                "Debe seleccionar al menos un log.".into(),
            ));
        }
        if self.levels.is_empty() {
            return Err(HostCareError::InvalidOptions(
                "Debe seleccionar al menos un nivel.".into(),
            ));
        }
        Ok(())
    }

    /// Requested logs without blanks or repeats, in first-seen order. Channel
    /// names compare case-insensitively.
    pub fn distinct_logs(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for name in self.log_names.iter().map(|l| l.trim()) {
            if !name.is_empty() && !seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
                seen.push(name);
            }
        }
        seen
    }

    pub fn distinct_levels(&self) -> Vec<Level> {
        let mut seen = Vec::new();
        for level in &self.levels {
            if !seen.contains(level) {
                seen.push(*level);
            }
        }
        seen
    }

    /// The cap actually applied.
    pub fn effective_max_events(&self) -> usize {
        if self.max_events == 0 {
            DEFAULT_MAX_EVENTS
        } else {
            self.max_events
        }
    }
}

/// Entries read plus non-fatal per-log problems.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportResult {
    pub entries: Vec<LogEntry>,
    pub warnings: Vec<String>,
}

/// Server-side filter for one log query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    pub from_utc: DateTime<Utc>,
    pub levels: Vec<Level>,
}

impl QueryFilter {
    /// Event log XPath: time lower bound and a level disjunction, e.g.
    /// `*[System[TimeCreated[@SystemTime>='2024-01-01T00:00:00.000Z'] and (Level=1 or Level=2)]]`.
    pub fn to_xpath(&self) -> String {
        let levels = self
            .levels
            .iter()
            .map(|l| format!("Level={}", l.raw()))
            .collect::<Vec<_>>()
            .join(" or ");
        format!(
            "*[System[TimeCreated[@SystemTime>='{}'] and ({levels})]]",
            self.from_utc.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        )
    }

    /// In-memory equivalent of [`to_xpath`](Self::to_xpath).
    pub fn matches(&self, entry: &LogEntry) -> bool {
        let recent = entry.timestamp.is_some_and(|t| t >= self.from_utc);
        let level = entry.level.is_some_and(|l| self.levels.contains(&l));
        recent && level
    }
}

/// Streaming iterator over one log's matching entries, most recent first.
pub type EntryStream<'a> = Box<dyn Iterator<Item = Result<LogEntry>> + 'a>;

/// Anything that can answer a filtered query against a named log.
pub trait EventSource {
    /// Open a query on `log_name`.
    ///
    /// # Errors
    /// [`HostCareError::AccessDenied`] when the log cannot be opened for
    /// reading; any other error when the query itself fails. Errors yielded by
    /// the stream end that log's read.
    fn query(&self, log_name: &str, filter: &QueryFilter) -> Result<EntryStream<'_>>;
}

/// In-memory [`EventSource`]. Applies the filter itself and returns entries
/// most recent first.
#[derive(Debug, Clone, Default)]
pub struct StaticEventSource {
    entries: Vec<LogEntry>,
    denied: HashSet<String>,
}

impl StaticEventSource {
    pub fn new(entries: Vec<LogEntry>) -> Self {
        Self {
            entries,
            denied: HashSet::new(),
        }
    }

    /// Make queries on `log_name` fail with access denied.
    pub fn deny(mut self, log_name: impl Into<String>) -> Self {
        self.denied.insert(log_name.into());
        self
    }
}

impl EventSource for StaticEventSource {
    fn query(&self, log_name: &str, filter: &QueryFilter) -> Result<EntryStream<'_>> {
        if self.denied.contains(log_name) {
            return Err(HostCareError::AccessDenied {
                log: log_name.to_string(),
            });
        }
        let mut matching: Vec<LogEntry> = self
            .entries
            .iter()
            .filter(|e| e.log_name.eq_ignore_ascii_case(log_name) && filter.matches(e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(Box::new(matching.into_iter().map(Ok)))
    }
}

/// The event source for this platform.
#[cfg(windows)]
pub fn platform_event_source() -> Box<dyn EventSource> {
    Box::new(crate::core::win_source::WinEventSource::new())
}

/// The event source for this platform. Every query reports
/// [`HostCareError::Unsupported`].
#[cfg(not(windows))]
pub fn platform_event_source() -> Box<dyn EventSource> {
    Box::new(UnsupportedSource)
}

#[cfg(not(windows))]
struct UnsupportedSource;

#[cfg(not(windows))]
impl EventSource for UnsupportedSource {
    fn query(&self, _log_name: &str, _filter: &QueryFilter) -> Result<EntryStream<'_>> {
        Err(HostCareError::Unsupported(
            "el registro de eventos solo existe en Windows".into(),
        ))
    }
}

/// Read matching entries from every requested log.
///
/// Options are validated before any query is issued. `progress` receives the
/// running total every [`PROGRESS_EVERY`] entries and once at the end
/// unless that total was just reported. Repeated log names are queried once.
///
/// # Errors
/// [`HostCareError::InvalidOptions`] for empty log or level sets and
/// [`HostCareError::Cancelled`] once `cancel` fires. Per-log failures are
/// not errors.
pub fn generate(
    source: &dyn EventSource,
    options: &ReportOptions,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(usize),
) -> Result<ReportResult> {
    options.validate()?;

    let max_events = options.effective_max_events();
    let filter = QueryFilter {
        from_utc: options.from_utc,
        levels: options.distinct_levels(),
    };
    tracing::debug!("Event query filter: {}", filter.to_xpath());

    let mut result = ReportResult::default();

    for log_name in options.distinct_logs() {
        cancel.check()?;
        if result.entries.len() >= max_events {
            break;
        }

        let stream = match source.query(log_name, &filter) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Query on '{}' failed: {}", log_name, e);
                result.warnings.push(query_warning(log_name, &e));
                continue;
            }
        };

        let before = result.entries.len();
        for item in stream {
            cancel.check()?;
            match item {
                Ok(mut entry) => {
                    if !options.include_full_message {
                        entry.message = entry
                            .message
                            .map(|m| shorten(&m, SHORT_MESSAGE_MAX_CHARS));
                    }
                    result.entries.push(entry);
                    if result.entries.len() % PROGRESS_EVERY == 0 {
                        progress(result.entries.len());
                    }
                }
                Err(e) => {
                    tracing::warn!("Reading '{}' stopped: {}", log_name, e);
                    result
                        .warnings
                        .push(format!("[{log_name}] Advertencia al leer eventos: {e}"));
                    break;
                }
            }
            if result.entries.len() >= max_events {
                break;
            }
        }
        tracing::debug!(
            "Read {} entries from '{}'",
            result.entries.len() - before,
            log_name
        );
    }

    let total = result.entries.len();
    if total == 0 || total % PROGRESS_EVERY != 0 {
        progress(total);
    }
    tracing::info!(
        "Event query complete: {} entries, {} warnings",
        result.entries.len(),
        result.warnings.len()
    );
    Ok(result)
}

fn query_warning(log_name: &str, error: &HostCareError) -> String {
    match error {
        HostCareError::AccessDenied { .. } => {
            format!("[{log_name}] Acceso denegado (prueba como administrador o evita este log).")
        }
        other => format!("[{log_name}] Error al consultar: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn entries(log: &str, n: usize) -> Vec<LogEntry> {
        (0..n)
            .map(|i| {
                LogEntry::new(log, "disk")
                    .with_level(Level::Error)
                    .with_event_id(7)
                    .with_timestamp(base() + Duration::minutes(i as i64))
                    .with_message(format!("El dispositivo tiene un bloque defectuoso {i}."))
            })
            .collect()
    }

    fn options(logs: &[&str]) -> ReportOptions {
        ReportOptions {
            log_names: logs.iter().map(|s| s.to_string()).collect(),
            levels: vec![Level::Critical, Level::Error],
            from_utc: base() - Duration::days(1),
            max_events: 0,
            include_full_message: true,
        }
    }

    #[test]
    fn test_xpath_shape() {
        let filter = QueryFilter {
            from_utc: base(),
            levels: vec![Level::Critical, Level::Error],
        };
        assert_eq!(
            filter.to_xpath(),
            "*[System[TimeCreated[@SystemTime>='2024-03-01T12:00:00.000Z'] and (Level=1 or Level=2)]]"
        );
    }

    #[test]
    fn test_most_recent_first_within_a_log() {
        let source = StaticEventSource::new(entries("System", 3));
        let r = generate(&source, &options(&["System"]), &CancelToken::new(), &mut |_| {}).unwrap();
        let times: Vec<_> = r.entries.iter().map(|e| e.timestamp).collect();
        assert!(times.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_level_and_time_are_filtered() {
        let mut all = entries("System", 2);
        all.push(LogEntry::new("System", "x").with_level(Level::Information).with_timestamp(base()));
        all.push(
            LogEntry::new("System", "old")
                .with_level(Level::Error)
                .with_timestamp(base() - Duration::days(10)),
        );
        let r = generate(&StaticEventSource::new(all), &options(&["System"]), &CancelToken::new(), &mut |_| {})
            .unwrap();
        assert_eq!(r.entries.len(), 2);
        assert!(r.entries.iter().all(|e| e.provider == "disk"));
    }

    #[test]
    fn test_denied_log_becomes_warning_and_others_continue() {
        let source = StaticEventSource::new(entries("System", 4)).deny("Security");
        let r = generate(
            &source,
            &options(&["Security", "System"]),
            &CancelToken::new(),
            &mut |_| {},
        )
        .unwrap();
        assert_eq!(r.entries.len(), 4);
        assert_eq!(
            r.warnings,
            vec!["[Security] Acceso denegado (prueba como administrador o evita este log).".to_string()]
        );
    }

    #[test]
    fn test_short_message_mode() {
        let long = format!("Primera línea\r\n{}", "x".repeat(400));
        let source = StaticEventSource::new(vec![LogEntry::new("System", "p")
            .with_level(Level::Error)
            .with_timestamp(base())
            .with_message(long)]);
        let mut opts = options(&["System"]);
        opts.include_full_message = false;

        let r = generate(&source, &opts, &CancelToken::new(), &mut |_| {}).unwrap();
        let msg = r.entries[0].message.as_deref().unwrap();
        assert!(msg.starts_with("Primera línea x"));
        assert!(msg.ends_with("..."));
        assert_eq!(msg.chars().count(), SHORT_MESSAGE_MAX_CHARS + 3);
    }

    #[test]
    fn test_progress_every_fifty_and_at_end() {
        let source = StaticEventSource::new(entries("System", 120));
        let mut calls = Vec::new();
        generate(&source, &options(&["System"]), &CancelToken::new(), &mut |n| calls.push(n)).unwrap();
        assert_eq!(calls, vec![50, 100, 120]);
    }

    #[test]
    fn test_progress_total_on_a_multiple_of_fifty_is_not_repeated() {
        let source = StaticEventSource::new(entries("System", 100));
        let mut calls = Vec::new();
        generate(&source, &options(&["System"]), &CancelToken::new(), &mut |n| calls.push(n)).unwrap();
        assert_eq!(calls, vec![50, 100]);

        let mut calls = Vec::new();
        generate(&StaticEventSource::default(), &options(&["System"]), &CancelToken::new(), &mut |n| {
            calls.push(n)
        })
        .unwrap();
        assert_eq!(calls, vec![0]);
    }

    #[test]
    fn test_same_log_in_different_case_is_read_once() {
        let source = StaticEventSource::new(entries("System", 3));
        let mut opts = options(&["System", "system", " SYSTEM "]);
        opts.levels = vec![Level::Error, Level::Error, Level::Critical];

        let r = generate(&source, &opts, &CancelToken::new(), &mut |_| {}).unwrap();
        assert_eq!(r.entries.len(), 3);
        assert_eq!(opts.distinct_logs(), vec!["System"]);
        assert_eq!(opts.distinct_levels(), vec![Level::Error, Level::Critical]);
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let source = StaticEventSource::new(entries("System", 3));
        assert!(matches!(
            generate(&source, &options(&["System"]), &token, &mut |_| {}),
            Err(HostCareError::Cancelled)
        ));
    }

    struct FailingStream;

    impl EventSource for FailingStream {
        fn query(&self, log_name: &str, _filter: &QueryFilter) -> Result<EntryStream<'_>> {
            let first = LogEntry::new(log_name, "p").with_level(Level::Error);
            let items = vec![
                Ok(first),
                Err(HostCareError::Query {
                    log: log_name.into(),
                    detail: "canal dañado".into(),
                }),
            ];
            Ok(Box::new(items.into_iter()))
        }
    }

    #[test]
    fn test_mid_stream_error_keeps_partial_entries() {
        let r = generate(&FailingStream, &options(&["Setup"]), &CancelToken::new(), &mut |_| {}).unwrap();
        assert_eq!(r.entries.len(), 1);
        assert_eq!(r.warnings.len(), 1);
        assert!(r.warnings[0].starts_with("[Setup] Advertencia al leer eventos:"));
    }
}
