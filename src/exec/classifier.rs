//! Three-way classification of a finished command.

use serde::Serialize;

use crate::exec::executor::CommandResult;

/// How a command run should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Classification {
    Ok,
    /// Non-zero exit, but the tool only complained about access rights.
    Partial,
    Critical,
}

/// Access-denied phrases, lower-case, in the two languages the tools speak.
const ACCESS_DENIED_MARKERS: &[&str] = &["acceso denegado", "access is denied", "access denied"];

/// Classify a command result. Total: every result maps to exactly one value.
///
/// Exit code 0 is always [`Classification::Ok`]. A timed-out or cancelled run
/// is always [`Classification::Critical`], whatever it printed first.
pub fn classify(result: &CommandResult) -> Classification {
    if result.exit_code == 0 {
        return Classification::Ok;
    }
    if result.timed_out || result.canceled {
        return Classification::Critical;
    }
    classify_output(result.exit_code, &result.combined_text())
}

/// Classify from an exit code and the combined stdout/stderr text.
pub fn classify_output(exit_code: i32, text: &str) -> Classification {
    if exit_code == 0 {
        return Classification::Ok;
    }
    if mentions_access_denied(text) {
        Classification::Partial
    } else {
        Classification::Critical
    }
}

/// Whether `text` carries an access-denied message, in any letter case.
pub fn mentions_access_denied(text: &str) -> bool {
    let lower = text.to_lowercase();
    ACCESS_DENIED_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(exit_code: i32, stdout: &str, stderr: &str) -> CommandResult {
        CommandResult {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
            canceled: false,
        }
    }

    #[test]
    fn test_zero_exit_is_ok_whatever_the_text() {
        assert_eq!(classify(&result(0, "Access is denied.", "")), Classification::Ok);
    }

    #[test]
    fn test_access_denied_is_partial_in_both_languages() {
        assert_eq!(classify(&result(5, "", "Acceso denegado.")), Classification::Partial);
        assert_eq!(classify(&result(1, "ACCESS IS DENIED.", "")), Classification::Partial);
    }

    #[test]
    fn test_other_failures_are_critical() {
        assert_eq!(classify(&result(87, "El parámetro no es correcto.", "")), Classification::Critical);
    }

    #[test]
    fn test_timeout_is_critical_even_with_access_text() {
        let mut r = result(-1, "Acceso denegado.", "");
        r.timed_out = true;
        assert_eq!(classify(&r), Classification::Critical);
    }
}
