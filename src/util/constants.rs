//! Application-wide constants for HostCare.
//!
//! Centralising magic numbers and configuration defaults here keeps the rest
//! of the codebase clean and makes tuning straightforward.

use std::time::Duration;

/// Application display name used in log lines and report headers.
pub const APP_NAME: &str = "HostCare";

/// Application version string.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ── Command execution ───────────────────────────────────────────────────

/// How often the executor wakes up to check process liveness, the wall-clock
/// timeout and the cancellation token.
pub const EXEC_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Size of each raw read from a child's stdout/stderr pipe.
pub const PIPE_READ_CHUNK: usize = 8 * 1024;

/// How long a killed run waits for its pipe readers to reach EOF before
/// leaving them detached.
pub const READER_JOIN_GRACE: Duration = Duration::from_millis(500);

/// Exit code reported when the wall-clock timeout fired.
pub const EXIT_TIMED_OUT: i32 = -1;

/// Exit code reported when the process could not be started at all.
pub const EXIT_SPAWN_FAILED: i32 = -2;

/// Exit code reported when the run was cancelled.
pub const EXIT_CANCELED: i32 = -3;

/// Exit code reported when a task failed with an unexpected error.
pub const EXIT_EXCEPTION: i32 = -4;

/// Exit code reported when a task was refused for lack of elevation.
pub const EXIT_NOT_ELEVATED: i32 = -5;

/// `ERROR_SUCCESS_REBOOT_REQUIRED`: the operation succeeded but needs a reboot.
pub const EXIT_REBOOT_REQUIRED: i32 = 3010;

// ── Byte decoding ───────────────────────────────────────────────────────

/// Number of leading bytes sampled by the BOM-less UTF-16 detector.
pub const UTF16_SAMPLE_BYTES: usize = 400;

/// Below this many bytes the UTF-16 detector does not guess.
pub const UTF16_MIN_SAMPLE_BYTES: usize = 20;

/// OEM code page assumed when the platform cannot report one.
pub const FALLBACK_OEM_CODE_PAGE: u32 = 850;

// ── Remediation tasks ───────────────────────────────────────────────────

/// Default interval between "still working" heartbeat lines (seconds).
pub const DEFAULT_HEARTBEAT_SECS: u64 = 20;

/// Maximum number of command-output lines echoed to the log callback per step.
pub const MAX_LOGGED_OUTPUT_LINES: usize = 120;

/// Default per-command timeouts (seconds).
pub const DEFAULT_SERVICE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_SFC_TIMEOUT_SECS: u64 = 2 * 60 * 60;
pub const DEFAULT_DISM_TIMEOUT_SECS: u64 = 2 * 60 * 60;
pub const DEFAULT_DRIVERS_TIMEOUT_SECS: u64 = 10 * 60;

// ── Event log report ────────────────────────────────────────────────────

/// Cap substituted when the caller passes a zero `max_events`.
pub const DEFAULT_MAX_EVENTS: usize = 1000;

/// The progress callback fires every this many entries.
pub const PROGRESS_EVERY: usize = 50;

/// Short-message mode truncates after this many characters.
pub const SHORT_MESSAGE_MAX_CHARS: usize = 220;

/// Length of the normalised message prefix used in the grouping key.
pub const GROUP_KEY_MESSAGE_CHARS: usize = 350;

/// Critical/Error groups with at least this many occurrences count as recurring.
pub const RECURRING_MIN_COUNT: usize = 5;

/// How many reboot/shutdown markers the temporal pass keeps.
pub const REBOOT_MARKERS_KEPT: usize = 5;

/// Width of the sliding window used for error-burst detection.
pub const BURST_WINDOW_MINUTES: i64 = 10;

/// Minimum number of Critical/Error entries in one window to report a burst.
pub const BURST_MIN_COUNT: usize = 10;

/// Text report section caps.
pub const REPORT_MAX_ACTIONABLE: usize = 25;
pub const REPORT_MAX_GROUPS: usize = 80;

/// Number of event handles to request per `EvtNext` call.
pub const EVT_BATCH_SIZE: usize = 64;

/// Timeout in milliseconds passed to `EvtNext`.
pub const EVT_NEXT_TIMEOUT_MS: u32 = 1000;

/// Buffer size (in `u16` units) for `EvtRender` output. Grows on demand.
pub const EVT_RENDER_BUFFER_SIZE: usize = 8_192;

/// Buffer size (in `u16` units) for `EvtFormatMessage` output. Grows on demand.
pub const EVT_FORMAT_BUFFER_SIZE: usize = 2_048;

// ── Health check ────────────────────────────────────────────────────────

/// A fixed volume below this percentage free is flagged.
pub const LOW_SPACE_PERCENT: f64 = 10.0;

/// A fixed volume with less free space than this is flagged.
pub const LOW_SPACE_BYTES: u64 = 10 * 1024 * 1024 * 1024;

// ── Persistent files ────────────────────────────────────────────────────

/// Application data subdirectory name for logs and configuration.
pub const APP_DATA_DIR: &str = "HostCare";

/// Log subdirectory name under the app data directory.
pub const LOG_DIR: &str = "logs";

/// Log file name for persistent debug logging.
pub const LOG_FILE_NAME: &str = "hostcare.log";

/// Configuration file name under the app data directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Maximum log file size in bytes before rotation (5 MB).
pub const MAX_LOG_FILE_SIZE: u64 = 5 * 1024 * 1024;
