use std::time::Duration;

/// Why a single provider produced no forecast.
///
/// These never escape the aggregator: the failing source is dropped from the
/// pass and the error is logged.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("location '{0}' not found")]
    LocationNotFound(String),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with status {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("no answer within {0:?}")]
    Timeout(Duration),
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

impl From<chrono::ParseError> for SourceError {
    fn from(err: chrono::ParseError) -> Self {
        SourceError::Parse(err.to_string())
    }
}

/// A source that was excluded from an aggregation pass.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: String,
    pub error: SourceError,
}
