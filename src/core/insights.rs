//! Temporal context over the ungrouped entries: recent reboot/shutdown
//! markers and the densest burst of errors.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::core::log_entry::LogEntry;
use crate::util::constants::*;
use crate::util::text::contains_ignore_case;
use crate::util::time::format_local_timestamp;

/// Reboot or shutdown evidence found among the entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebootMarker {
    pub timestamp: Option<DateTime<Utc>>,
    pub provider: String,
    pub event_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemporalInsight {
    /// Up to [`REBOOT_MARKERS_KEPT`] markers, most recent first.
    RebootMarkers { markers: Vec<RebootMarker> },
    /// The window holding the most Critical/Error entries.
    ErrorBurst {
        count: usize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl TemporalInsight {
    pub fn title(&self) -> &'static str {
        match self {
            Self::RebootMarkers { .. } => "📍 Contexto: reinicios/apagados detectados",
            Self::ErrorBurst { .. } => "📍 Pico de errores (ventana 10 min)",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Self::RebootMarkers { markers } => {
                let latest = markers.first();
                let when = latest
                    .and_then(|m| m.timestamp.as_ref())
                    .map(format_local_timestamp)
                    .unwrap_or_else(|| "N/A".into());
                let provider = latest.map(|m| m.provider.as_str()).unwrap_or("N/A");
                let id = latest
                    .and_then(|m| m.event_id)
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "N/A".into());
                format!(
                    "Se detectaron marcadores recientes (ej. 6005/6006/6008/1074/Kernel-Power 41). \
                     Último marcador: {when} ({provider} / {id})"
                )
            }
            Self::ErrorBurst { count, start, end } => format!(
                "Se observó un pico de {count} errores/críticos entre {} y {}.",
                format_local_timestamp(start),
                format_local_timestamp(end)
            ),
        }
    }
}

/// Both passes, reboot markers first.
pub fn build(entries: &[LogEntry]) -> Vec<TemporalInsight> {
    [detect_reboot_markers(entries), detect_burst(entries)]
        .into_iter()
        .flatten()
        .collect()
}

/// Event log service start/stop/unexpected stop, Kernel-Power 41, or a
/// planned shutdown (1074).
pub fn is_reboot_marker(entry: &LogEntry) -> bool {
    match entry.event_id {
        Some(6005 | 6006 | 6008) => contains_ignore_case(&entry.provider, "eventlog"),
        Some(41) => contains_ignore_case(&entry.provider, "kernel-power"),
        Some(1074) => true,
        _ => false,
    }
}

pub fn detect_reboot_markers(entries: &[LogEntry]) -> Option<TemporalInsight> {
    let mut markers: Vec<RebootMarker> = entries
        .iter()
        .filter(|e| is_reboot_marker(e))
        .map(|e| RebootMarker {
            timestamp: e.timestamp,
            provider: e.provider.clone(),
            event_id: e.event_id,
        })
        .collect();
    if markers.is_empty() {
        return None;
    }
    // Most recent first; markers without a timestamp sort last.
    markers.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    markers.truncate(REBOOT_MARKERS_KEPT);
    Some(TemporalInsight::RebootMarkers { markers })
}

/// Largest number of Critical/Error entries whose timestamps fit in one
/// [`BURST_WINDOW_MINUTES`] span (inclusive). Reported only at
/// [`BURST_MIN_COUNT`] or more.
pub fn detect_burst(entries: &[LogEntry]) -> Option<TemporalInsight> {
    let mut times: Vec<DateTime<Utc>> = entries
        .iter()
        .filter(|e| e.level.is_some_and(|l| l.is_error_or_worse()))
        .filter_map(|e| e.timestamp)
        .collect();
    if times.len() < BURST_MIN_COUNT {
        return None;
    }
    times.sort_unstable();

    let window = Duration::minutes(BURST_WINDOW_MINUTES);
    let mut best = 0usize;
    let mut best_start = times[0];
    let mut left = 0usize;
    for right in 0..times.len() {
        while times[right] - times[left] > window {
            left += 1;
        }
        let count = right - left + 1;
        if count > best {
            best = count;
            best_start = times[left];
        }
    }

    (best >= BURST_MIN_COUNT).then(|| TemporalInsight::ErrorBurst {
        count: best,
        start: best_start,
        end: best_start + window,
    })
}
