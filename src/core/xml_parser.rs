//! Event XML parsing.
//!
//! Converts the XML rendered by `EvtRender` into a [`LogEntry`] using
//! `roxmltree`. Only the `<System>` block and the event payload are read.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::core::log_entry::{Level, LogEntry};
use crate::util::error::{HostCareError, Result};

/// Rendered fields that do not come from the XML itself.
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    /// Description from `EvtFormatMessage`.
    pub message: Option<String>,
    /// Task category display name from `EvtFormatMessage`.
    pub task_category: Option<String>,
}

/// Parse one event XML document.
///
/// ```xml
/// <Event xmlns="http://schemas.microsoft.com/win/2004/08/events/event">
///   <System>
///     <Provider Name="disk" />
///     <EventID Qualifiers="49156">7</EventID>
///     <Level>2</Level>
///     <TimeCreated SystemTime="2024-01-15T10:23:45.1234567Z" />
///     <Channel>System</Channel>
///     <Computer>PC-01</Computer>
///     <Security UserID="S-1-5-18" />
///   </System>
///   <EventData>...</EventData>
/// </Event>
/// ```
///
/// `log_name` is used when the XML carries no `<Channel>`. Without a
/// formatted message the payload values are joined as a stand-in.
///
/// # Errors
/// [`HostCareError::XmlParse`] if the document is malformed or has no
/// `<System>` element.
pub fn parse_event_xml(xml: &str, log_name: &str, rendered: Rendered) -> Result<LogEntry> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| HostCareError::XmlParse(format!("Failed to parse XML: {e}")))?;
    let root = doc.root_element();
    let system = find_child(&root, "System")
        .ok_or_else(|| HostCareError::XmlParse("Missing <System> element".into()))?;

    let text_of = |name: &str| {
        find_child(&system, name)
            .and_then(|n| n.text())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    };

    let provider = find_child(&system, "Provider")
        .and_then(|p| p.attribute("Name"))
        .unwrap_or_default()
        .to_string();

    let channel = text_of("Channel").unwrap_or(log_name).to_string();

    let message = rendered
        .message
        .filter(|m| !m.trim().is_empty())
        .or_else(|| payload_summary(&root));

    Ok(LogEntry {
        timestamp: find_child(&system, "TimeCreated")
            .and_then(|e| e.attribute("SystemTime"))
            .and_then(parse_system_time),
        log_name: channel,
        level: text_of("Level")
            .and_then(|t| t.parse::<u8>().ok())
            .and_then(Level::from_raw),
        event_id: text_of("EventID").and_then(|t| t.parse().ok()),
        provider,
        machine: text_of("Computer").unwrap_or_default().to_string(),
        user: find_child(&system, "Security")
            .and_then(|e| e.attribute("UserID"))
            .map(String::from),
        task_category: rendered.task_category.filter(|t| !t.trim().is_empty()),
        message,
    })
}

/// Provider name from the XML, without a full parse.
pub fn extract_provider_name(xml: &str) -> Option<String> {
    let start = xml.find("Provider Name=\"")? + "Provider Name=\"".len();
    let end = xml[start..].find('"')? + start;
    Some(xml[start..end].to_string())
}

/// Find a direct child element by local name, ignoring namespace.
fn find_child<'a>(
    parent: &roxmltree::Node<'a, 'a>,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    parent
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == local_name)
}

/// Parse `TimeCreated/@SystemTime`.
///
/// Windows emits between zero and seven fractional digits. Anything RFC 3339
/// parsing rejects is retried as a naive UTC timestamp.
fn parse_system_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// `name: value; …` from `<EventData>` or `<UserData>`, if any.
fn payload_summary(root: &roxmltree::Node) -> Option<String> {
    let mut pairs: Vec<String> = Vec::new();

    if let Some(event_data) = find_child(root, "EventData") {
        for child in event_data.children().filter(|n| n.is_element()) {
            let value = collect_text(&child);
            if value.is_empty() {
                continue;
            }
            match child.attribute("Name") {
                Some(name) => pairs.push(format!("{name}: {value}")),
                None => pairs.push(value),
            }
        }
    } else if let Some(user_data) = find_child(root, "UserData") {
        for wrapper in user_data.children().filter(|n| n.is_element()) {
            for child in wrapper.children().filter(|n| n.is_element()) {
                let value = collect_text(&child);
                if !value.is_empty() {
                    pairs.push(format!("{}: {value}", child.tag_name().name()));
                }
            }
        }
    }

    (!pairs.is_empty()).then(|| pairs.join("; "))
}

fn collect_text(node: &roxmltree::Node) -> String {
    node.descendants()
        .filter(|d| d.is_text())
        .filter_map(|d| d.text())
        .collect::<String>()
        .trim()
        .to_string()
}
