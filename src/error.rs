use datafusion::{arrow::error::ArrowError, error::DataFusionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("authentication rejected by upstream (status {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("upstream rate limit hit: {message}")]
    RateLimited { message: String },

    #[error("upstream API failure (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("cannot transform field '{field}' from raw value {raw_value}")]
    Transform { field: String, raw_value: String },

    #[error("schema mismatch on column '{field}': expected {expected_type}, got {actual_type}")]
    SchemaMismatch {
        field: String,
        expected_type: String,
        actual_type: String,
    },

    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    #[error("The start date: '{start_date}' is greater than the end date: '{end_date}'")]
    StartDateAfterEndDate {
        start_date: String,
        end_date: String,
    },

    #[error("'The date supplied {date} is invalid'")]
    InvalidDate { date: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse URL: {0}")]
    UrlParsingFailed(#[from] url::ParseError),

    #[error("DataFusion: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Arrow: {0}")]
    Arrow(#[from] ArrowError),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Auth failures poison every later window of a run, so the
    /// orchestrator aborts instead of moving on to the next window.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Auth { .. })
    }
}
