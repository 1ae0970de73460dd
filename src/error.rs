//! Error types for workstat.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for workstat.
#[derive(Error, Debug)]
pub enum StatusError {
    #[error("does not support worker threading model. use only worker pre-fork ({threads} threads active)")]
    Threading { threads: usize },

    #[error("Status file error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No status record for pid {0}")]
    RecordNotFound(u32),

    #[error("Status file is corrupt, treating it as empty: {0}")]
    TransientParse(#[source] serde_json::Error),

    #[error("Process {0} is not running")]
    ProcessIntrospection(u32),

    #[error("System call failed: {0}")]
    Signal(#[from] nix::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: HTTP {status} at {url}")]
    Api { status: u16, url: String },

    #[error("Supervisor gave up after {0} consecutive worker startup failures")]
    WorkerStartup(usize),
}

impl StatusError {
    /// Wrap an I/O error that occurred while touching the status file.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for workstat operations.
pub type Result<T> = std::result::Result<T, StatusError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_threading_error_message() {
        let err = StatusError::Threading { threads: 3 };
        let msg = err.to_string();
        assert!(msg.contains("does not support worker threading model"));
        assert!(msg.contains("pre-fork"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_storage_error_names_path() {
        let err = StatusError::storage(
            "/run/workstat.json",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/run/workstat.json"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_record_not_found_message() {
        let err = StatusError::RecordNotFound(4242);
        assert!(err.to_string().contains("4242"));
    }

    #[test]
    fn test_api_error_message() {
        let err = StatusError::Api {
            status: 503,
            url: "http://127.0.0.1:8080/wsgi_status".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("/wsgi_status"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: StatusError = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err: StatusError = json_err.into();
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn test_transient_parse_keeps_source() {
        let json_err = serde_json::from_str::<serde_json::Value>("{\"workers\": [").unwrap_err();
        let err = StatusError::TransientParse(json_err);
        assert!(std::error::Error::source(&err).is_some());
    }
}
