use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by ingestion, generation and storage.
///
/// The flashcard parser has no variant here: it never fails.
#[derive(Debug, Error)]
pub enum Error {
    /// Input path does not exist.
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    /// A source file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generation service answered with a non-success status, or the
    /// transport broke before a status was seen.
    #[error("generation service error{}: {message}", fmt_status(.status))]
    ServiceError { status: Option<u16>, message: String },

    /// Generation call exceeded its deadline.
    #[error("generation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("store error: {0}")]
    StoreError(String),

    #[error("configuration error: {0}")]
    Config(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::StoreError(e.to_string())
    }
}

impl From<::config::ConfigError> for Error {
    fn from(e: ::config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    pub fn service(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::ServiceError {
            status,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_display_includes_status() {
        let e = Error::service(Some(503), "unavailable");
        assert_eq!(e.to_string(), "generation service error (503): unavailable");

        let e = Error::service(None, "connection refused");
        assert_eq!(e.to_string(), "generation service error: connection refused");
    }

    #[test]
    fn timeout_is_distinguishable() {
        let t = Error::Timeout(std::time::Duration::from_secs(300));
        assert!(t.is_timeout());
        assert!(!Error::service(Some(500), "boom").is_timeout());
    }
}
