//! Validates that compile-time constants are internally consistent.
#![allow(clippy::assertions_on_constants)]

use hostcare::util::constants::*;

#[test]
fn batch_size_is_positive() {
    assert!(EVT_BATCH_SIZE > 0, "EVT_BATCH_SIZE must be > 0");
}

#[test]
fn sentinel_exit_codes_are_distinct_and_negative() {
    let codes = [
        EXIT_TIMED_OUT,
        EXIT_SPAWN_FAILED,
        EXIT_CANCELED,
        EXIT_EXCEPTION,
        EXIT_NOT_ELEVATED,
    ];
    for (i, a) in codes.iter().enumerate() {
        assert!(*a < 0, "sentinel {a} must be negative");
        for b in &codes[i + 1..] {
            assert_ne!(a, b, "sentinel exit codes must differ");
        }
    }
    assert_eq!(EXIT_REBOOT_REQUIRED, 3010);
}

#[test]
fn report_limits_are_consistent() {
    assert_eq!(DEFAULT_MAX_EVENTS, 1000);
    assert!(PROGRESS_EVERY > 0);
    assert!(
        GROUP_KEY_MESSAGE_CHARS > SHORT_MESSAGE_MAX_CHARS,
        "grouping prefix should be longer than the short message"
    );
    assert!(REPORT_MAX_ACTIONABLE <= REPORT_MAX_GROUPS);
}

#[test]
fn burst_window_is_ten_minutes_for_ten_errors() {
    assert_eq!(BURST_WINDOW_MINUTES, 10);
    assert_eq!(BURST_MIN_COUNT, 10);
    assert_eq!(RECURRING_MIN_COUNT, 5);
}

#[test]
fn utf16_sampling_bounds_are_sane() {
    assert!(UTF16_MIN_SAMPLE_BYTES < UTF16_SAMPLE_BYTES);
    assert_eq!(UTF16_SAMPLE_BYTES, 400);
}

#[test]
fn render_buffers_are_nonzero() {
    assert!(EVT_RENDER_BUFFER_SIZE > 0);
    assert!(EVT_FORMAT_BUFFER_SIZE > 0);
}

#[test]
fn log_file_size_is_reasonable() {
    assert!(
        MAX_LOG_FILE_SIZE >= 1024 * 1024,
        "MAX_LOG_FILE_SIZE should be at least 1 MB"
    );
}

#[test]
fn long_running_tools_get_long_timeouts() {
    assert!(DEFAULT_SFC_TIMEOUT_SECS >= 60 * 60);
    assert!(DEFAULT_DISM_TIMEOUT_SECS >= 60 * 60);
    assert!(DEFAULT_SERVICE_TIMEOUT_SECS < DEFAULT_DRIVERS_TIMEOUT_SECS);
}
