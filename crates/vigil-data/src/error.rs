//! Error types for data operations.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),

    /// Invalid date range
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Start date of the range
        start: String,
        /// End date of the range
        end: String,
    },

    /// Missing data
    #[error("Missing data for {symbol}: {reason}")]
    MissingData {
        /// Symbol that was queried
        symbol: String,
        /// Reason for missing data
        reason: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rate limit error
    #[error("Rate limit exceeded, please retry after {retry_after_ms}ms")]
    RateLimit {
        /// Milliseconds to wait before retrying
        retry_after_ms: u64,
    },

    /// Invalid symbol
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Upstream service error
    #[error("Upstream error for {symbol}: HTTP {status}")]
    Upstream {
        /// Symbol that was queried
        symbol: String,
        /// HTTP status code returned by the source
        status: u16,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    /// Whether a retry against the source could plausibly succeed.
    ///
    /// Network failures, rate limits and upstream 5xx responses are
    /// transient; everything else is not worth repeating.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimit { .. } => true,
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let rate_limited = DataError::RateLimit { retry_after_ms: 500 };
        assert!(rate_limited.is_transient());

        let server_error = DataError::Upstream {
            symbol: "AAPL".to_string(),
            status: 503,
        };
        assert!(server_error.is_transient());

        let not_found = DataError::Upstream {
            symbol: "AAPL".to_string(),
            status: 404,
        };
        assert!(!not_found.is_transient());

        let parse = DataError::Parse("bad payload".to_string());
        assert!(!parse.is_transient());
    }
}
