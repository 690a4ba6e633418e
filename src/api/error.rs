use thiserror::Error;

/// Failure taxonomy for the signed API client.
///
/// Everything except `Signature` is eligible for the client's single
/// retry; whatever survives the final attempt is surfaced as-is.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad key material. Never retried; the client converts this into
    /// the sentinel payload so callers can detect it structurally.
    #[error("invalid key material: {0}")]
    Signature(String),

    /// Per-attempt timeout, or the offline-wait ceiling elapsed
    #[error("request timed out")]
    Timeout,

    /// DNS failure or connection refused
    #[error("host unreachable: {0}")]
    HostUnreachable(String),

    /// HTTP 429 from the exchange
    #[error("rate limited by exchange")]
    RateLimit,

    /// Any other non-success HTTP status
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Catch-all wrapping the underlying cause
    #[error("unexpected API failure: {0}")]
    Unexpected(String),
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ApiError::Signature(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_connect() {
            ApiError::HostUnreachable(err.to_string())
        } else {
            ApiError::Unexpected(err.to_string())
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_errors_are_not_retryable() {
        assert!(!ApiError::Signature("bad key".into()).is_retryable());
        assert!(ApiError::Timeout.is_retryable());
        assert!(ApiError::RateLimit.is_retryable());
        assert!(ApiError::HttpStatus { status: 500, body: String::new() }.is_retryable());
    }
}
