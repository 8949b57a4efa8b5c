//! Event log triage: the entry model, XML parsing, the query engine and its
//! Windows source, grouping heuristics and temporal insights.

pub mod event_query;
pub mod grouping;
pub mod insights;
pub mod log_entry;
#[cfg(windows)]
pub mod win_source;
pub mod xml_parser;
