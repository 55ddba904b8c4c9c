//! Error types for search backend operations

use crate::error::AppError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors raised by a search backend.
///
/// The scan store never hands these to its callers; it uses the kind to
/// decide whether the cluster should be treated as gone.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The cluster could not be reached (refused, reset, timed out)
    #[error("Search service unreachable: {0}")]
    Unreachable(String),

    /// The cluster answered with an error status
    #[error("Search service returned {status}: {reason}")]
    Service { status: u16, reason: String },

    /// Index not found
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// The response body did not have the expected shape
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Index mapping could not be loaded
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl SearchError {
    /// True when the failure means the cluster itself is unavailable
    pub fn is_unreachable(&self) -> bool {
        matches!(self, SearchError::Unreachable(_))
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            SearchError::Unreachable(err.to_string())
        } else if err.is_decode() {
            SearchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            SearchError::Service {
                status: status.as_u16(),
                reason: err.to_string(),
            }
        } else {
            SearchError::Unreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Decode(err.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidConfiguration(msg) => AppError::Configuration(msg),
            SearchError::Mapping(msg) => AppError::Configuration(msg),
            SearchError::Unreachable(msg) => AppError::Unavailable(msg),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unreachable_counts_as_outage() {
        assert!(SearchError::Unreachable("refused".into()).is_unreachable());
        assert!(!SearchError::Service {
            status: 400,
            reason: "parse_exception".into()
        }
        .is_unreachable());
        assert!(!SearchError::IndexNotFound("nmap".into()).is_unreachable());
        assert!(!SearchError::Decode("missing hits".into()).is_unreachable());
    }

    #[test]
    fn test_conversion_to_app_error() {
        let err: AppError = SearchError::Unreachable("down".into()).into();
        assert_eq!(err.error_code(), "SERVICE_UNAVAILABLE");

        let err: AppError = SearchError::Mapping("bad json".into()).into();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }
}
