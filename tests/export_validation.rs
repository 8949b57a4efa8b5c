//! Integration tests for export pre-flight validation.

use hostcare::export::validate_export_path;

#[test]
fn validate_export_path_valid_directory() {
    let dir = tempfile::tempdir().unwrap();
    let result = validate_export_path(&dir.path().join("reporte.csv"));
    assert!(result.is_ok(), "Temp dir should be writable: {result:?}");
}

#[test]
fn validate_export_path_nonexistent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("NonExistent_Dir_12345").join("output.csv");
    let result = validate_export_path(&path);
    assert!(result.is_err(), "Non-existent dir should fail");
    let msg = result.unwrap_err().to_string();
    assert!(
        msg.contains("does not exist"),
        "Should indicate dir missing: {msg}"
    );
}

#[test]
fn validate_export_path_no_parent() {
    let result = validate_export_path(std::path::Path::new("just_a_filename.csv"));
    assert!(result.is_ok(), "A bare file name targets the working directory");
}
