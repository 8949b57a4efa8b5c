//! Integration tests for the command executor, output decoding and
//! classification working together.

use std::time::Duration;

use hostcare::exec::classifier::{classify, classify_output, Classification};
use hostcare::exec::executor::CommandResult;
use hostcare::exec::ByteDecoder;
use hostcare::util::constants::*;

#[cfg(unix)]
#[test]
fn sleeping_past_the_timeout_is_killed_with_a_note() {
    use hostcare::exec::execute;
    use hostcare::util::cancel::CancelToken;

    let timeout = Duration::from_millis(500);
    let started = std::time::Instant::now();
    let r = execute("sleep", &["10".to_string()], timeout, &CancelToken::new());

    assert!(r.timed_out);
    assert!(!r.canceled);
    assert_eq!(r.exit_code, EXIT_TIMED_OUT);
    assert!(r.stderr.contains("TIMEOUT"), "stderr: {}", r.stderr);
    assert!(started.elapsed() < timeout + Duration::from_secs(3));
    assert_eq!(classify(&r), Classification::Critical);
}

#[test]
fn missing_program_becomes_spawn_failure() {
    use hostcare::exec::execute;
    use hostcare::util::cancel::CancelToken;

    let r = execute(
        "hostcare-no-such-tool-xyz",
        &[],
        Duration::from_secs(5),
        &CancelToken::new(),
    );
    assert_eq!(r.exit_code, EXIT_SPAWN_FAILED);
    assert!(!r.stderr.is_empty());
    assert_eq!(classify(&r), Classification::Critical);
}

#[test]
fn utf8_bom_decodes_like_plain_utf8() {
    let body = "Verificación completada al 100%.";
    let mut bytes = vec![0xEF, 0xBB, 0xBF];
    bytes.extend_from_slice(body.as_bytes());
    assert_eq!(ByteDecoder::new(850).decode(&bytes), body);
}

#[test]
fn utf16le_without_bom_round_trips() {
    let text = "Windows Resource Protection no encontró infracciones de integridad.";
    let utf16: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    assert_eq!(ByteDecoder::new(850).decode(&utf16), text);
}

#[test]
fn classification_is_total_and_zero_exit_wins() {
    let samples = ["", "Acceso denegado.", "Access is denied.", "Error 87", "\u{FFFD}"];
    for code in [-4, -1, 0, 1, 2, 5, 87, 3010] {
        for text in samples {
            let class = classify_output(code, text);
            if code == 0 {
                assert_eq!(class, Classification::Ok);
            }
            assert!(matches!(
                class,
                Classification::Ok | Classification::Partial | Classification::Critical
            ));
        }
    }
}

#[test]
fn access_denied_exit_is_partial() {
    let r = CommandResult {
        exit_code: 1,
        stdout: "Restableciendo Interfaz, error.".into(),
        stderr: "Acceso denegado.".into(),
        timed_out: false,
        canceled: false,
    };
    assert_eq!(classify(&r), Classification::Partial);
}
