//! Windows Event Log source built on the Evt* API.
//!
//! Each query opens a reverse-direction (newest first) result set and pulls
//! event handles in batches of [`EVT_BATCH_SIZE`]. Every handle is rendered
//! to XML, its description and task category formatted through the
//! publisher's message resources, then parsed into a [`LogEntry`].

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use windows::core::PCWSTR;
use windows::Win32::System::EventLog::{
    EvtClose, EvtFormatMessage, EvtFormatMessageEvent, EvtFormatMessageTask, EvtNext,
    EvtOpenPublisherMetadata, EvtQuery, EvtQueryChannelPath, EvtQueryReverseDirection, EvtRender,
    EvtRenderEventXml, EVT_HANDLE,
};

use crate::core::event_query::{EntryStream, EventSource, QueryFilter};
use crate::core::log_entry::LogEntry;
use crate::core::xml_parser::{extract_provider_name, parse_event_xml, Rendered};
use crate::util::constants::*;
use crate::util::error::{windows_err, HostCareError, Result};

const HR_ACCESS_DENIED: u32 = 0x8007_0005;
const HR_INSUFFICIENT_BUFFER: u32 = 0x8007_007A;
const HR_NO_MORE_ITEMS: u32 = 0x8007_0103;
const HR_TIMEOUT: u32 = 0x8007_05B4;

/// Local-machine event log reader.
///
/// Publisher metadata handles are opened once per provider and kept until
/// the source is dropped. `EVT_HANDLE(0)` records a provider whose metadata
/// could not be opened.
#[derive(Default)]
pub struct WinEventSource {
    publishers: RefCell<HashMap<String, EVT_HANDLE>>,
}

impl WinEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn publisher(&self, provider: &str) -> Option<EVT_HANDLE> {
        let mut cache = self.publishers.borrow_mut();
        if let Some(&h) = cache.get(provider) {
            return (h.0 != 0).then_some(h);
        }
        let provider_wide = to_wide(provider);
        // SAFETY: provider_wide is a valid null-terminated UTF-16 string.
        let opened = unsafe {
            EvtOpenPublisherMetadata(None, PCWSTR(provider_wide.as_ptr()), None, 0, 0)
        };
        match opened {
            Ok(h) => {
                cache.insert(provider.to_string(), h);
                Some(h)
            }
            Err(e) => {
                tracing::trace!(
                    "No publisher metadata for '{}' (0x{:08X})",
                    provider,
                    e.code().0 as u32
                );
                cache.insert(provider.to_string(), EVT_HANDLE(0));
                None
            }
        }
    }
}

impl Drop for WinEventSource {
    fn drop(&mut self) {
        for (name, handle) in self.publishers.get_mut().drain() {
            if handle.0 != 0 {
                // SAFETY: handle was opened by EvtOpenPublisherMetadata and
                // is closed exactly once here.
                unsafe {
                    let _ = EvtClose(handle);
                }
                tracing::trace!("Closed publisher metadata for '{}'", name);
            }
        }
    }
}

impl EventSource for WinEventSource {
    fn query(&self, log_name: &str, filter: &QueryFilter) -> Result<EntryStream<'_>> {
        let xpath = filter.to_xpath();
        let channel_wide = to_wide(log_name);
        let xpath_wide = to_wide(&xpath);

        tracing::debug!("Querying '{}' with XPath: {}", log_name, xpath);

        // SAFETY: both strings are null-terminated UTF-16 that outlive the
        // call. A `None` session means the local machine.
        let query = unsafe {
            EvtQuery(
                None,
                PCWSTR(channel_wide.as_ptr()),
                PCWSTR(xpath_wide.as_ptr()),
                (EvtQueryChannelPath.0 | EvtQueryReverseDirection.0) as u32,
            )
        }
        .map_err(|e| {
            let hr = e.code().0 as u32;
            if hr == HR_ACCESS_DENIED {
                HostCareError::AccessDenied {
                    log: log_name.to_string(),
                }
            } else {
                HostCareError::Query {
                    log: log_name.to_string(),
                    detail: e.message().to_string(),
                }
            }
        })?;

        Ok(Box::new(WinEntryStream {
            source: self,
            log_name: log_name.to_string(),
            query,
            handles: vec![0isize; EVT_BATCH_SIZE],
            pending: VecDeque::new(),
            exhausted: false,
            render_buf: vec![0; EVT_RENDER_BUFFER_SIZE],
            format_buf: vec![0; EVT_FORMAT_BUFFER_SIZE],
        }))
    }
}

/// Open result set. Closes every handle it still owns on drop.
struct WinEntryStream<'a> {
    source: &'a WinEventSource,
    log_name: String,
    query: EVT_HANDLE,
    handles: Vec<isize>,
    pending: VecDeque<isize>,
    exhausted: bool,
    render_buf: Vec<u16>,
    format_buf: Vec<u16>,
}

impl WinEntryStream<'_> {
    /// Pull the next batch into `pending`. `Ok(false)` at the end of the
    /// result set.
    fn fetch_batch(&mut self) -> Result<bool> {
        let mut returned = 0u32;
        // SAFETY: query is a live result set and `handles` has
        // EVT_BATCH_SIZE writable slots.
        let result = unsafe {
            EvtNext(
                self.query,
                &mut self.handles,
                EVT_NEXT_TIMEOUT_MS,
                0,
                &mut returned,
            )
        };
        match result {
            Ok(()) if returned == 0 => Ok(false),
            Ok(()) => {
                self.pending
                    .extend(self.handles[..returned as usize].iter().copied());
                Ok(true)
            }
            Err(e) => {
                let hr = e.code().0 as u32;
                if hr == HR_NO_MORE_ITEMS || hr == HR_TIMEOUT {
                    Ok(false)
                } else {
                    Err(HostCareError::Query {
                        log: self.log_name.clone(),
                        detail: windows_err(hr, "EvtNext").to_string(),
                    })
                }
            }
        }
    }

    fn read_one(&mut self, event: isize) -> Result<LogEntry> {
        let xml = render_event_xml(event, &mut self.render_buf)?;
        let rendered = match extract_provider_name(&xml).and_then(|p| self.source.publisher(&p)) {
            Some(publisher) => Rendered {
                message: format_message(
                    publisher,
                    event,
                    EvtFormatMessageEvent.0 as u32,
                    &mut self.format_buf,
                ),
                task_category: format_message(
                    publisher,
                    event,
                    EvtFormatMessageTask.0 as u32,
                    &mut self.format_buf,
                ),
            },
            None => Rendered::default(),
        };
        parse_event_xml(&xml, &self.log_name, rendered)
    }
}

impl Iterator for WinEntryStream<'_> {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                let entry = self.read_one(event);
                close(event);
                match entry {
                    Ok(entry) => return Some(Ok(entry)),
                    Err(e) => {
                        tracing::trace!("Skipping unreadable event in '{}': {}", self.log_name, e);
                        continue;
                    }
                }
            }
            if self.exhausted {
                return None;
            }
            match self.fetch_batch() {
                Ok(true) => {}
                Ok(false) => self.exhausted = true,
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl Drop for WinEntryStream<'_> {
    fn drop(&mut self) {
        for event in self.pending.drain(..) {
            close(event);
        }
        // SAFETY: query came from EvtQuery and is closed only here.
        unsafe {
            let _ = EvtClose(self.query);
        }
    }
}

fn close(event: isize) {
    // SAFETY: event came from EvtNext and is closed exactly once.
    unsafe {
        let _ = EvtClose(EVT_HANDLE(event));
    }
}

/// Render one event handle to XML, growing `buffer` once if it is too small.
fn render_event_xml(event: isize, buffer: &mut Vec<u16>) -> Result<String> {
    let mut used = 0u32;
    let mut property_count = 0u32;

    let mut render = |buffer: &mut Vec<u16>, used: &mut u32| {
        // SAFETY: event is a live handle and `buffer` holds
        // `buffer.len() * 2` writable bytes.
        unsafe {
            EvtRender(
                None,
                EVT_HANDLE(event),
                EvtRenderEventXml.0 as u32,
                (buffer.len() * 2) as u32,
                Some(buffer.as_mut_ptr() as *mut _),
                used,
                &mut property_count,
            )
        }
    };

    if let Err(e) = render(buffer, &mut used) {
        let hr = e.code().0 as u32;
        if hr != HR_INSUFFICIENT_BUFFER {
            return Err(windows_err(hr, "EvtRender"));
        }
        buffer.resize(used as usize / 2 + 1, 0);
        render(buffer, &mut used).map_err(|e| windows_err(e.code().0 as u32, "EvtRender retry"))?;
    }

    // `used` counts bytes, including the terminating null.
    let used_u16 = used as usize / 2;
    let end = if used_u16 > 0 && buffer[used_u16 - 1] == 0 {
        used_u16 - 1
    } else {
        used_u16
    };
    Ok(String::from_utf16_lossy(&buffer[..end]))
}

/// Format one message kind (`flags`) of an event. `None` when the publisher
/// has no such string.
fn format_message(
    publisher: EVT_HANDLE,
    event: isize,
    flags: u32,
    buffer: &mut Vec<u16>,
) -> Option<String> {
    let mut used = 0u32;
    let format = |buffer: &mut Vec<u16>, used: &mut u32| {
        // SAFETY: both handles are live and `buffer` is a valid slice.
        unsafe {
            EvtFormatMessage(
                publisher,
                EVT_HANDLE(event),
                0,
                None,
                flags,
                Some(buffer.as_mut_slice()),
                used,
            )
        }
    };

    if let Err(e) = format(buffer, &mut used) {
        if e.code().0 as u32 != HR_INSUFFICIENT_BUFFER {
            return None;
        }
        buffer.resize(used as usize + 1, 0);
        format(buffer, &mut used).ok()?;
    }

    // `used` counts u16 units, including the terminating null.
    let end = (used as usize).saturating_sub(1).min(buffer.len());
    let text = String::from_utf16_lossy(&buffer[..end]);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Null-terminated UTF-16 copy of `s`.
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_wide() {
        assert_eq!(to_wide("AB"), vec![0x41, 0x42, 0x00]);
    }

    #[test]
    fn test_missing_channel_is_a_query_error() {
        let source = WinEventSource::new();
        let filter = QueryFilter {
            from_utc: chrono::Utc::now(),
            levels: vec![crate::core::log_entry::Level::Error],
        };
        let err = source
            .query("HostCare-Canal-Inexistente/Operational", &filter)
            .err();
        assert!(matches!(err, Some(HostCareError::Query { .. })));
    }
}
