//! Entry grouping and the actionability heuristic.
//!
//! Entries that share log, level, provider, event id and the first
//! [`GROUP_KEY_MESSAGE_CHARS`] characters of their normalised message
//! collapse into one [`EntryGroup`]. Each group is then run through
//! [`RULES`] top-down; the first matching rule decides.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::log_entry::{Level, LogEntry};
use crate::util::constants::*;
use crate::util::text::{collapse_whitespace, take_chars};

/// A set of repeated entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryGroup {
    pub log_name: String,
    pub level: Option<Level>,
    pub provider: String,
    pub event_id: Option<u32>,
    pub count: usize,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub actionable: bool,
    pub reason: Option<String>,
    /// First non-blank message of the group, normalised like the key.
    pub sample_message: Option<String>,
}

impl EntryGroup {
    fn severity(&self) -> u8 {
        self.level.map(Level::severity).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    log_name: String,
    level: Option<Level>,
    provider: String,
    event_id: Option<u32>,
    message_prefix: String,
}

impl GroupKey {
    fn of(entry: &LogEntry) -> Self {
        Self {
            log_name: entry.log_name.clone(),
            level: entry.level,
            provider: entry.provider.clone(),
            event_id: entry.event_id,
            message_prefix: entry.message.as_deref().map(normalise).unwrap_or_default(),
        }
    }
}

/// Single-line, trimmed, at most [`GROUP_KEY_MESSAGE_CHARS`] characters.
fn normalise(message: &str) -> String {
    take_chars(&collapse_whitespace(message), GROUP_KEY_MESSAGE_CHARS).to_string()
}

/// What a rule gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    /// Lower-cased provider name.
    pub provider: &'a str,
    pub event_id: Option<u32>,
    pub level: Option<Level>,
    pub count: usize,
}

/// One row of the heuristic table. Exclusion rows carry a reason too, so
/// the export still says why a group was left out.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub actionable: bool,
    pub reason: &'static str,
    pub matches: fn(&RuleInput<'_>) -> bool,
}

fn provider_has(input: &RuleInput<'_>, needles: &[&str]) -> bool {
    needles.iter().any(|n| input.provider.contains(n))
}

/// Evaluated in order; earlier exclusions shadow later generic rules.
pub const RULES: &[Rule] = &[
    Rule {
        actionable: false,
        reason: "DCOM típico (ruido frecuente).",
        matches: |i| {
            provider_has(i, &["distributedcom"]) && matches!(i.event_id, Some(10010 | 10016))
        },
    },
    Rule {
        actionable: true,
        reason: "Almacenamiento/Disco (revisar salud SMART/cables/errores).",
        matches: |i| provider_has(i, &["disk", "ntfs", "storahci", "stornvme"]),
    },
    Rule {
        actionable: true,
        reason: "WHEA (hardware/CPU/RAM/PCIe).",
        matches: |i| provider_has(i, &["whea"]),
    },
    Rule {
        actionable: true,
        reason: "VSS/VolSnap (copias sombra/backups).",
        matches: |i| provider_has(i, &["volsnap", "vss"]),
    },
    Rule {
        actionable: true,
        reason: "Windows Update (posible atasco/fallo de actualización).",
        matches: |i| provider_has(i, &["windowsupdateclient", "wuau", "usoclient"]),
    },
    Rule {
        actionable: true,
        reason: "Servicios fallando (puede impactar arranque/rendimiento).",
        matches: |i| provider_has(i, &["service control manager", "servicecontrolmanager"]),
    },
    Rule {
        actionable: true,
        reason: "Apagado inesperado (energía, crash, PSU, temperatura).",
        matches: |i| provider_has(i, &["kernel-power"]) && i.event_id == Some(41),
    },
    Rule {
        actionable: true,
        reason: "Pantallazo/Crash (revisar minidumps).",
        matches: |i| provider_has(i, &["bugcheck"]) || i.event_id == Some(1001),
    },
    Rule {
        actionable: true,
        reason: "Error recurrente (priorizar revisión).",
        matches: |i| {
            i.level.is_some_and(Level::is_error_or_worse) && i.count >= RECURRING_MIN_COUNT
        },
    },
];

/// `(actionable, reason)` for a group with these attributes.
pub fn classify_group(
    provider: &str,
    event_id: Option<u32>,
    level: Option<Level>,
    count: usize,
) -> (bool, Option<&'static str>) {
    let provider = provider.to_lowercase();
    let input = RuleInput {
        provider: &provider,
        event_id,
        level,
        count,
    };
    match RULES.iter().find(|r| (r.matches)(&input)) {
        Some(rule) => (rule.actionable, Some(rule.reason)),
        None => (false, None),
    }
}

/// Group `entries` and order the groups by count descending, then severity
/// descending (entries without a level last), then provider ascending.
pub fn group(entries: &[LogEntry]) -> Vec<EntryGroup> {
    let mut by_key: HashMap<GroupKey, EntryGroup> = HashMap::new();

    for entry in entries {
        let g = by_key.entry(GroupKey::of(entry)).or_insert_with(|| EntryGroup {
            log_name: entry.log_name.clone(),
            level: entry.level,
            provider: entry.provider.clone(),
            event_id: entry.event_id,
            count: 0,
            first_seen: None,
            last_seen: None,
            actionable: false,
            reason: None,
            sample_message: None,
        });
        g.count += 1;
        if g.sample_message.is_none() {
            g.sample_message = entry
                .message
                .as_deref()
                .map(normalise)
                .filter(|m| !m.is_empty());
        }
        if let Some(ts) = entry.timestamp {
            g.first_seen = Some(g.first_seen.map_or(ts, |f| f.min(ts)));
            g.last_seen = Some(g.last_seen.map_or(ts, |l| l.max(ts)));
        }
    }

    let mut groups: Vec<EntryGroup> = by_key
        .into_values()
        .map(|mut g| {
            let (actionable, reason) = classify_group(&g.provider, g.event_id, g.level, g.count);
            g.actionable = actionable;
            g.reason = reason.map(String::from);
            g
        })
        .collect();

    groups.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.severity().cmp(&a.severity()))
            .then_with(|| a.provider.cmp(&b.provider))
            .then_with(|| a.event_id.cmp(&b.event_id))
            .then_with(|| a.log_name.cmp(&b.log_name))
    });
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn entry(provider: &str, id: u32, level: Level, msg: &str, minute: i64) -> LogEntry {
        LogEntry::new("System", provider)
            .with_event_id(id)
            .with_level(level)
            .with_message(msg)
            .with_timestamp(at(minute))
    }

    #[test]
    fn test_identical_entries_make_one_group() {
        let entries: Vec<_> = (0..4)
            .map(|m| entry("Tcpip", 4227, Level::Warning, "TCP/IP falló", 10 - m))
            .collect();
        let groups = group(&entries);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 4);
        assert_eq!(groups[0].first_seen, Some(at(7)));
        assert_eq!(groups[0].last_seen, Some(at(10)));
    }

    #[test]
    fn test_whitespace_differences_do_not_split_groups() {
        let groups = group(&[
            entry("x", 1, Level::Error, "fallo  en\r\nel disco", 0),
            entry("x", 1, Level::Error, "fallo en el disco ", 1),
        ]);
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_long_shared_preamble_still_splits_after_prefix() {
        let preamble = "a".repeat(GROUP_KEY_MESSAGE_CHARS);
        let groups = group(&[
            entry("x", 1, Level::Error, &format!("{preamble} uno"), 0),
            entry("x", 1, Level::Error, &format!("{preamble} dos"), 1),
            entry("x", 1, Level::Error, &format!("{} uno", "a".repeat(10)), 2),
            entry("x", 1, Level::Error, &format!("{} dos", "a".repeat(10)), 3),
        ]);
        // The first two agree on the whole prefix; the last two differ within it.
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_dcom_exclusion_shadows_disk_rule() {
        let dcom = Some("DCOM típico (ruido frecuente).");
        let disk = Some("Almacenamiento/Disco (revisar salud SMART/cables/errores).");
        assert_eq!(
            classify_group("Microsoft-Windows-DistributedCOM", Some(10016), Some(Level::Error), 50),
            (false, dcom)
        );
        // Matches both the exclusion and the storage rule; the exclusion is first.
        assert_eq!(classify_group("DistributedCOM-Disk", Some(10010), Some(Level::Error), 1), (false, dcom));
        // The exclusion is a provider/event-id pair, not an id alone.
        assert_eq!(classify_group("disk", Some(10016), Some(Level::Error), 1), (true, disk));
        assert_eq!(classify_group("DistributedCOM-Disk", Some(7), Some(Level::Error), 1), (true, disk));
    }

    #[test]
    fn test_sample_is_first_non_blank_message_normalised() {
        let mut no_message = entry("x", 1, Level::Error, "", 0);
        no_message.message = None;
        let groups = group(&[no_message, entry("x", 1, Level::Error, " \r\n ", 1)]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].sample_message, None);

        let long = format!("Línea uno\r\n  línea dos {}", "z".repeat(GROUP_KEY_MESSAGE_CHARS));
        let groups = group(&[entry("y", 2, Level::Error, &long, 2)]);
        let sample = groups[0].sample_message.as_deref().unwrap();
        assert!(sample.starts_with("Línea uno línea dos zzz"));
        assert_eq!(sample.chars().count(), GROUP_KEY_MESSAGE_CHARS);
    }

    #[test]
    fn test_rule_table_matches() {
        let reason = |p, id, count| classify_group(p, Some(id), Some(Level::Error), count).1;
        assert_eq!(reason("Microsoft-Windows-WHEA-Logger", 18, 1), Some("WHEA (hardware/CPU/RAM/PCIe)."));
        assert_eq!(reason("VSS", 8193, 1), Some("VSS/VolSnap (copias sombra/backups)."));
        assert_eq!(
            reason("Microsoft-Windows-WindowsUpdateClient", 20, 1),
            Some("Windows Update (posible atasco/fallo de actualización).")
        );
        assert_eq!(
            reason("Service Control Manager", 7000, 1),
            Some("Servicios fallando (puede impactar arranque/rendimiento).")
        );
        assert_eq!(
            reason("Microsoft-Windows-Kernel-Power", 41, 1),
            Some("Apagado inesperado (energía, crash, PSU, temperatura).")
        );
        assert_eq!(reason("Microsoft-Windows-Kernel-Power", 109, 1), None);
        assert_eq!(reason("Windows Error Reporting", 1001, 1), Some("Pantallazo/Crash (revisar minidumps)."));
        assert_eq!(reason("Application Error", 1000, 5), Some("Error recurrente (priorizar revisión)."));
        assert_eq!(reason("Application Error", 1000, 4), None);
        assert_eq!(
            classify_group("Application Error", Some(1000), Some(Level::Warning), 50),
            (false, None)
        );
    }

    #[test]
    fn test_group_ordering() {
        let mut entries = vec![
            entry("b-prov", 1, Level::Warning, "w", 0),
            entry("b-prov", 1, Level::Warning, "w", 1),
            entry("z-prov", 2, Level::Critical, "c", 2),
            entry("a-prov", 3, Level::Critical, "c", 3),
        ];
        entries.push(LogEntry::new("System", "0-prov").with_event_id(9));
        let order: Vec<_> = group(&entries).into_iter().map(|g| g.provider).collect();
        assert_eq!(order, vec!["b-prov", "a-prov", "z-prov", "0-prov"]);
    }

    #[test]
    fn test_flags_are_applied_to_groups() {
        let entries: Vec<_> = (0..5)
            .map(|m| entry("Application Error", 1000, Level::Error, "crash de app.exe", m))
            .collect();
        let groups = group(&entries);
        assert!(groups[0].actionable);
        assert_eq!(groups[0].reason.as_deref(), Some("Error recurrente (priorizar revisión)."));
    }
}
