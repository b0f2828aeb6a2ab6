//! Unit tests for the application error family.

use transfer_agent::AppError;

/// Display output carries the lowercase kind prefix.
#[test]
fn display_carries_kind_prefix() {
    assert_eq!(
        AppError::Config("bad credential".into()).to_string(),
        "config: bad credential"
    );
    assert_eq!(
        AppError::Protocol("stray line".into()).to_string(),
        "protocol: stray line"
    );
    assert_eq!(
        AppError::ConnectTimeout("2s elapsed".into()).to_string(),
        "connect timeout: 2s elapsed"
    );
    assert_eq!(
        AppError::Worker {
            message: "session aborted".into(),
            retryable: false,
        }
        .to_string(),
        "worker: session aborted"
    );
}

/// Machine-readable codes map one-to-one onto the variants.
#[test]
fn codes_map_to_variants() {
    assert_eq!(AppError::Config(String::new()).code(), "CONFIG");
    assert_eq!(AppError::Spawn(String::new()).code(), "SPAWN");
    assert_eq!(AppError::ConnectTimeout(String::new()).code(), "CONNECT_TIMEOUT");
    assert_eq!(AppError::Protocol(String::new()).code(), "PROTOCOL");
    assert_eq!(
        AppError::Worker {
            message: String::new(),
            retryable: true
        }
        .code(),
        "WORKER"
    );
    assert_eq!(AppError::AbnormalExit(String::new()).code(), "ABNORMAL_EXIT");
    assert_eq!(
        AppError::RetriesExhausted(String::new()).code(),
        "RETRIES_EXHAUSTED"
    );
    assert_eq!(AppError::NotFound(String::new()).code(), "NOT_FOUND");
    assert_eq!(AppError::Io(String::new()).code(), "IO");
}

/// The single retryable predicate: spawn failures and connect timeouts are
/// transient, worker errors follow their classification, the rest is fatal.
#[test]
fn retryable_predicate() {
    assert!(AppError::Spawn(String::new()).is_retryable());
    assert!(AppError::ConnectTimeout(String::new()).is_retryable());
    assert!(AppError::Worker {
        message: String::new(),
        retryable: true
    }
    .is_retryable());

    assert!(!AppError::Worker {
        message: String::new(),
        retryable: false
    }
    .is_retryable());
    assert!(!AppError::Config(String::new()).is_retryable());
    assert!(!AppError::Protocol(String::new()).is_retryable());
    assert!(!AppError::AbnormalExit(String::new()).is_retryable());
    assert!(!AppError::RetriesExhausted(String::new()).is_retryable());
    assert!(!AppError::NotFound(String::new()).is_retryable());
    assert!(!AppError::Io(String::new()).is_retryable());
}

/// Errors convert from I/O errors into the `Io` variant.
#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: AppError = io.into();
    assert_eq!(err.code(), "IO");
    assert!(err.to_string().contains("pipe closed"));
}

/// No display message ends with a period.
#[test]
fn messages_carry_no_trailing_period() {
    let err = AppError::AbnormalExit("worker exited unsuccessfully".into());
    assert!(!err.to_string().ends_with('.'));
}
