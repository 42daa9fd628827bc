//! Tests for error types

use std::path::PathBuf;

use fitflow::Error;

#[test]
fn test_store_open_error() {
    let error = Error::store_open(PathBuf::from("fitResults_bin1.db"), "permission denied");
    let error_str = format!("{error}");
    assert!(error_str.contains("Cannot open fit-result store"));
    assert!(error_str.contains("fitResults_bin1.db"));
    assert!(error_str.contains("permission denied"));
}

#[test]
fn test_read_only_store_error() {
    let error = Error::ReadOnlyStore(PathBuf::from("a.db"));
    let error_str = format!("{error}");
    assert!(error_str.contains("read-only"));
    assert!(error_str.contains("OpenMode::ReadWrite"));
}

#[test]
fn test_record_corrupt_error() {
    let error = Error::RecordCorrupt {
        key: "fl".to_string(),
        field: "min".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("'fl'"));
    assert!(error_str.contains("'min'"));
}

#[test]
fn test_record_missing_error() {
    let error = Error::RecordMissing("afb".to_string());
    assert!(format!("{error}").contains("No record 'afb'"));
}

#[test]
fn test_missing_dependency_error() {
    let error = Error::MissingDependency {
        stage: "StageB".to_string(),
        key: "StageA.out".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("StageB"));
    assert!(error_str.contains("StageA.out"));
    assert_eq!(error.stage(), Some("StageB"));
}

#[test]
fn test_config_error() {
    let error = Error::config("finalFitter", "pdf", "is required");
    assert_eq!(
        format!("{error}"),
        "Config error in stage 'finalFitter': key 'pdf' is required"
    );
    assert_eq!(error.stage(), Some("finalFitter"));
}

#[test]
fn test_fit_error() {
    let error = Error::Fit {
        stage: "toyFitter".to_string(),
        step: "migrad".to_string(),
        status: -1,
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("migrad"));
    assert!(error_str.contains("-1"));
    assert_eq!(error.stage(), Some("toyFitter"));
}

#[test]
fn test_invalid_state_error() {
    let error = Error::InvalidState {
        expected: "Running".to_string(),
        found: "Created".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("expected Running, found Created"));
    assert_eq!(error.stage(), None);
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom error message".to_string());
    let error_str = format!("{error}");
    assert_eq!(error_str, "custom error message");
}

#[test]
fn test_error_debug() {
    let error = Error::MissingService("dbplayer".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("MissingService"));
}
