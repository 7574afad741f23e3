use std::time::Duration;

use thiserror::Error;

use crate::types::EntityKind;

/// Typed fetch errors enabling retry classification.
///
/// `is_retryable()` separates transient failures (network trouble, rate
/// limiting, server errors, timeouts) from permanent ones (client errors,
/// pages that cannot be parsed) so the worker skips retries for the latter.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP error fetching {url}: {source}")]
    Http {
        source: reqwest::Error,
        url: String,
    },

    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Unparseable {kind} page for ID {id}: {reason}")]
    Parse {
        kind: EntityKind,
        id: u32,
        reason: String,
    },

    /// Failure reported by a non-HTTP fetcher.
    #[error("{message}")]
    Other { message: String, retryable: bool },
}

impl FetchError {
    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            FetchError::Http { .. } => true,
            FetchError::Timeout(_) => true,
            FetchError::Parse { .. } => false,
            FetchError::Other { retryable, .. } => *retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> FetchError {
        FetchError::HttpStatus {
            status,
            url: "x".into(),
        }
    }

    #[test]
    fn test_http_403_not_retryable() {
        assert!(!status(403).is_retryable());
    }

    #[test]
    fn test_http_400_not_retryable() {
        assert!(!status(400).is_retryable());
    }

    #[test]
    fn test_http_429_retryable() {
        assert!(status(429).is_retryable());
    }

    #[test]
    fn test_http_500_retryable() {
        assert!(status(500).is_retryable());
    }

    #[test]
    fn test_http_503_retryable() {
        assert!(status(503).is_retryable());
    }

    #[test]
    fn test_timeout_retryable() {
        assert!(FetchError::Timeout(Duration::from_secs(10)).is_retryable());
    }

    #[test]
    fn test_parse_not_retryable() {
        let e = FetchError::Parse {
            kind: EntityKind::Item,
            id: 1,
            reason: "no title".into(),
        };
        assert!(!e.is_retryable());
    }

    #[test]
    fn test_other_follows_flag() {
        let transient = FetchError::Other {
            message: "reset".into(),
            retryable: true,
        };
        let fatal = FetchError::Other {
            message: "bad".into(),
            retryable: false,
        };
        assert!(transient.is_retryable());
        assert!(!fatal.is_retryable());
    }

    #[test]
    fn test_timeout_display() {
        let e = FetchError::Timeout(Duration::from_millis(1500));
        assert_eq!(e.to_string(), "Timed out after 1500ms");
    }
}
