//! Error types for the fetch pipeline
//!
//! Errors are classified by recoverability:
//! - Retryable: network failures, timeouts, 5xx responses
//! - NonRetryable: 4xx responses, undecodable bodies
//! - NoDataAvailable: both remote and cache came up empty

use thiserror::Error;

/// Errors from a single fetch attempt (remote call or cache fallback).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("No data available from remote or cache")]
    NoDataAvailable,
}

impl FetchError {
    /// Returns true if this error is worth retrying against the remote.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Status(code) => *code >= 500,
            FetchError::Decode(_) | FetchError::NoDataAvailable => false,
        }
    }

    /// Coarse classification exposed to the presentation layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Network(_) | FetchError::Status(_) => ErrorKind::Network,
            FetchError::Decode(_) => ErrorKind::Decode,
            FetchError::NoDataAvailable => ErrorKind::NoDataAvailable,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Error classification visible in refresh state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Network,
    Decode,
    NoDataAvailable,
}

/// Serializable error representation for the presentation layer.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshError {
    pub kind: ErrorKind,
    pub message: String,
    pub can_retry: bool,
}

impl From<&FetchError> for RefreshError {
    fn from(err: &FetchError) -> Self {
        RefreshError {
            kind: err.kind(),
            message: err.to_string(),
            // Every refresh error is recoverable by a manual or scheduled retry
            can_retry: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_errors_are_retryable() {
        assert!(FetchError::Network("connection reset".into()).is_retryable());
        assert!(FetchError::Status(503).is_retryable());
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        assert!(!FetchError::Status(404).is_retryable());
        assert!(!FetchError::Decode("expected object".into()).is_retryable());
        assert!(!FetchError::NoDataAvailable.is_retryable());
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(FetchError::Status(500).kind(), ErrorKind::Network);
        assert_eq!(FetchError::Decode("bad".into()).kind(), ErrorKind::Decode);
        assert_eq!(FetchError::NoDataAvailable.kind(), ErrorKind::NoDataAvailable);
    }

    #[test]
    fn test_refresh_error_serializes_camel_case() {
        let err = RefreshError::from(&FetchError::NoDataAvailable);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "noDataAvailable");
        assert_eq!(json["canRetry"], true);
    }
}
