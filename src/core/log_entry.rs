//! Data model for one event log entry and its severity level.
//!
//! Entries are produced by the query engine and never mutated afterwards.
//! Timestamps are kept in UTC and rendered in local time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::error::HostCareError;

/// Standard event severity levels. The discriminant is the raw ETW value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Critical = 1,
    Error = 2,
    Warning = 3,
    Information = 4,
    Verbose = 5,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Critical,
        Level::Error,
        Level::Warning,
        Level::Information,
        Level::Verbose,
    ];

    /// Map a raw level value. `0` (LogAlways) and unknown values have no level.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Critical),
            2 => Some(Self::Error),
            3 => Some(Self::Warning),
            4 => Some(Self::Information),
            5 => Some(Self::Verbose),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Information => "Information",
            Self::Verbose => "Verbose",
        }
    }

    /// Higher is more severe: Critical = 5 … Verbose = 1.
    pub fn severity(self) -> u8 {
        6 - self.raw()
    }

    /// Critical or Error.
    pub fn is_error_or_worse(self) -> bool {
        matches!(self, Self::Critical | Self::Error)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = HostCareError;

    /// Accepts English or Spanish names and the numeric value, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.trim().to_lowercase().as_str() {
            "1" | "critical" | "crítico" | "critico" => Self::Critical,
            "2" | "error" => Self::Error,
            "3" | "warning" | "advertencia" => Self::Warning,
            "4" | "information" | "info" | "informational" | "información" | "informacion" => {
                Self::Information
            }
            "5" | "verbose" | "detallado" => Self::Verbose,
            other => {
                return Err(HostCareError::InvalidOptions(format!(
                    "nivel desconocido: '{other}'"
                )))
            }
        };
        Ok(level)
    }
}

/// One event as read from a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: Option<DateTime<Utc>>,
    pub log_name: String,
    pub level: Option<Level>,
    pub event_id: Option<u32>,
    pub provider: String,
    pub machine: String,
    /// Account SID of the event, when the event records one.
    pub user: Option<String>,
    pub task_category: Option<String>,
    /// Formatted description, full or shortened. `None` when the provider's
    /// message resources are unavailable.
    pub message: Option<String>,
}

impl LogEntry {
    /// Minimal entry; the remaining fields start empty.
    pub fn new(log_name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            log_name: log_name.into(),
            level: None,
            event_id: None,
            provider: provider.into(),
            machine: String::new(),
            user: None,
            task_category: None,
            message: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_event_id(mut self, event_id: u32) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Entry counts per level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeveritySummary {
    pub critical: usize,
    pub error: usize,
    pub warning: usize,
    pub information: usize,
    pub verbose: usize,
}

impl SeveritySummary {
    /// Entries without a level are not counted.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> Self {
        let mut s = Self::default();
        for level in entries.into_iter().filter_map(|e| e.level) {
            match level {
                Level::Critical => s.critical += 1,
                Level::Error => s.error += 1,
                Level::Warning => s.warning += 1,
                Level::Information => s.information += 1,
                Level::Verbose => s.verbose += 1,
            }
        }
        s
    }

    pub fn total(&self) -> usize {
        self.critical + self.error + self.warning + self.information + self.verbose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!("Critical".parse::<Level>().unwrap(), Level::Critical);
        assert_eq!("ADVERTENCIA".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!("4".parse::<Level>().unwrap(), Level::Information);
        assert_eq!(" información ".parse::<Level>().unwrap(), Level::Information);
        assert!("fatal".parse::<Level>().is_err());
    }

    #[test]
    fn test_level_raw_round_trip_and_severity() {
        for level in Level::ALL {
            assert_eq!(Level::from_raw(level.raw()), Some(level));
        }
        assert_eq!(Level::from_raw(0), None);
        assert!(Level::Critical.severity() > Level::Error.severity());
        assert!(Level::Warning.severity() > Level::Verbose.severity());
    }

    #[test]
    fn test_summary_counts() {
        let entries = vec![
            LogEntry::new("System", "disk").with_level(Level::Error),
            LogEntry::new("System", "disk").with_level(Level::Error),
            LogEntry::new("System", "x").with_level(Level::Critical),
            LogEntry::new("System", "y"),
        ];
        let s = SeveritySummary::from_entries(&entries);
        assert_eq!(s.error, 2);
        assert_eq!(s.critical, 1);
        assert_eq!(s.total(), 3);
    }
}
