//! Crate-wide error type.
//!
//! Variants follow how a failure is handled by the pipelines:
//!
//! - [`NewsError::Http`] / [`NewsError::Status`]: transport failures, retried by
//!   [`crate::api::Retry`] and fatal once retries are exhausted.
//! - [`NewsError::MalformedResponse`]: an external service answered without the
//!   expected field. The ingestion pipeline drops the affected row.
//! - [`NewsError::Integrity`]: an article id was referenced but is missing from
//!   the metadata. Always fatal.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NewsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} answered with status {status}")]
    Status { service: &'static str, status: u16 },

    #[error("malformed {service} response: {detail}")]
    MalformedResponse {
        service: &'static str,
        detail: String,
    },

    #[error("data integrity error: {0}")]
    Integrity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid selector: {0}")]
    Selector(String),

    #[error("email error: {0}")]
    Email(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl NewsError {
    /// Whether the failure is worth another attempt at the transport layer.
    pub fn is_transient(&self) -> bool {
        match self {
            NewsError::Http(e) => !e.is_builder() && !e.is_decode(),
            NewsError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, NewsError::MalformedResponse { .. })
    }

    pub(crate) fn malformed(service: &'static str, detail: impl Into<String>) -> Self {
        NewsError::MalformedResponse {
            service,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NewsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transience() {
        let busy = NewsError::Status {
            service: "summarizer",
            status: 503,
        };
        let throttled = NewsError::Status {
            service: "translator",
            status: 429,
        };
        let rejected = NewsError::Status {
            service: "summarizer",
            status: 400,
        };
        assert!(busy.is_transient());
        assert!(throttled.is_transient());
        assert!(!rejected.is_transient());
    }

    #[test]
    fn test_malformed_is_not_transient() {
        let e = NewsError::malformed("summarizer", "missing summary_text");
        assert!(e.is_malformed());
        assert!(!e.is_transient());
        assert_eq!(
            e.to_string(),
            "malformed summarizer response: missing summary_text"
        );
    }

    #[test]
    fn test_integrity_message() {
        let e = NewsError::Integrity("N42 has no category".to_string());
        assert!(!e.is_transient());
        assert_eq!(e.to_string(), "data integrity error: N42 has no category");
    }
}
