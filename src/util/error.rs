//! Unified error types for HostCare.
//!
//! All fallible operations throughout the codebase return `Result<T, HostCareError>`.
//! Process-level failures (non-zero exit, timeout, kill) are *not* errors: they
//! travel inside [`CommandResult`](crate::exec::executor::CommandResult) and are
//! classified, so the caller can always render a human summary.

/// Unified error type used throughout HostCare.
#[derive(Debug, thiserror::Error)]
pub enum HostCareError {
    /// A Windows API call failed. `hr` is the raw HRESULT code and `context`
    /// describes which operation triggered the failure.
    #[error("Windows API error: {context} (HRESULT: 0x{hr:08X})")]
    WindowsApi {
        /// The raw HRESULT error code from the Windows API.
        hr: u32,
        /// Human-readable description of the operation that failed.
        context: String,
    },

    /// XML returned by `EvtRender` could not be parsed.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// The caller supplied options that cannot be acted upon.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Reading a log was refused by the operating system.
    #[error("Access denied to log '{log}'")]
    AccessDenied {
        /// Log name that was queried.
        log: String,
    },

    /// Querying or reading one log failed for a reason other than access.
    #[error("Query failed on log '{log}': {detail}")]
    Query {
        /// Log name that was queried.
        log: String,
        /// Underlying failure description.
        detail: String,
    },

    /// Export (text, CSV or JSON) failed, usually on I/O.
    #[error("Export failed: {0}")]
    Export(String),

    /// The configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The operation observed a cancellation request.
    #[error("Operation cancelled")]
    Cancelled,

    /// The requested facility does not exist on this platform.
    #[error("Not supported on this platform: {0}")]
    Unsupported(String),

    /// Catch-all for I/O errors (file writes, renames, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HostCareError>;

/// Convert a raw Windows `HRESULT` into a [`HostCareError::WindowsApi`] with
/// the given context string.
///
/// # Example
/// ```ignore
/// windows_err(0x80070005, "EvtQuery on Security channel")
/// ```
pub fn windows_err(hr: u32, context: impl Into<String>) -> HostCareError {
    HostCareError::WindowsApi {
        hr,
        context: context.into(),
    }
}
