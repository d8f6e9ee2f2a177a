//! Error taxonomy shared by the template loader, the completion client and
//! the relevance checker.
//!
//! A missing template, an oversized prompt and an unparseable model reply each
//! get their own variant so callers can react to them without string matching.

use thiserror::Error;

/// Every failure a relcheck operation can report.
#[derive(Debug, Error)]
pub enum RelcheckError {
    /// Template object is absent from the object store
    #[error("The object {key} does not exist in {bucket}.")]
    NotFound {
        /// Bucket that was queried
        bucket: String,
        /// Key that was requested
        key: String,
    },

    /// Object store answered with a non-success status other than not-found
    #[error("Storage error reading {key} from {bucket}: {status} - {message}")]
    Storage {
        bucket: String,
        key: String,
        status: u16,
        message: String,
    },

    /// Object was fetched but its bytes are not valid UTF-8 text
    #[error("Object {key} in {bucket} is not valid UTF-8: {message}")]
    Encoding {
        bucket: String,
        key: String,
        message: String,
    },

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Completion API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code from API
        code: u16,
        /// Error message from API
        message: String,
    },

    /// Prompt exceeded the model's maximum input size
    #[error("Prompt exceeds model context length: {0}")]
    ContextLengthExceeded(String),

    /// Seed summarization could not fit even one article per request
    #[error(
        "Failed to summarize articles. A single article length already exceeds maximum token number ({seeds} folds tried)."
    )]
    SummaryTooLarge {
        /// Number of seed articles (and therefore folds) attempted
        seeds: usize,
    },

    /// Model reply for a candidate could not be turned into a JSON object
    #[error("Malformed relevancy response for {url}: {reason}")]
    MalformedResponse {
        /// Candidate URL the reply belongs to
        url: String,
        reason: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected response shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl RelcheckError {
    /// Whether the completion request was rejected for being too large.
    pub fn is_context_length_exceeded(&self) -> bool {
        matches!(self, RelcheckError::ContextLengthExceeded(_))
    }
}

/// Result type alias using `RelcheckError`
pub type Result<T> = std::result::Result<T, RelcheckError>;
