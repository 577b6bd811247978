//! Network plumbing shared by the filings client and the price sources:
//! error classification, retry with backoff, request pacing, circuit breaking.

pub mod circuit_breaker;
pub mod http;
pub mod retry;

pub use circuit_breaker::CircuitBreaker;
pub use retry::{Pacer, RetryPolicy};

use thiserror::Error;

/// Errors from any remote fetch.
///
/// Displayable in log lines and in failed-range reports.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("rate limited (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("invalid API credential: {0}")]
    InvalidCredential(String),

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("circuit breaker open for {0}")]
    CircuitOpen(String),

    #[error("cancelled")]
    Cancelled,
}

/// How the retry loop treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry with exponential backoff, bounded attempts.
    Transient,
    /// Wait the mandatory rate-limit delay and retry; never abandoned.
    RateLimit,
    /// Stop every worker.
    Fatal,
    /// Give up on this request only.
    Permanent,
}

impl FetchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            FetchError::NetworkUnreachable(_) | FetchError::Server(_) => ErrorClass::Transient,
            FetchError::RateLimited { .. } => ErrorClass::RateLimit,
            FetchError::InvalidCredential(_) => ErrorClass::Fatal,
            FetchError::ResponseFormat(_)
            | FetchError::NotFound(_)
            | FetchError::CircuitOpen(_)
            | FetchError::Cancelled => ErrorClass::Permanent,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            FetchError::NetworkUnreachable(e.to_string())
        } else if e.is_decode() {
            FetchError::ResponseFormat(e.to_string())
        } else {
            FetchError::Server(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(
            FetchError::NetworkUnreachable("reset".into()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            FetchError::RateLimited { retry_after_secs: 1 }.class(),
            ErrorClass::RateLimit
        );
        assert!(FetchError::InvalidCredential("010".into()).is_fatal());
        assert_eq!(
            FetchError::ResponseFormat("html".into()).class(),
            ErrorClass::Permanent
        );
    }
}
