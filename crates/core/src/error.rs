//! Error types for the quoted-spread workspace.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the quoted-spread workspace.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller violated an input contract (empty series, bad bucket grid, ...).
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Data error (invalid or malformed data).
    #[error("Data error: {0}")]
    Data(String),

    /// Quote retrieval failed or did not finish.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// A requested symbol-day table is not available.
    #[error("Missing table for {symbol} on {date}")]
    MissingTable { date: NaiveDate, symbol: String },

    /// Tables that should share one bucket grid do not.
    #[error("Bucket grid mismatch: {0}")]
    GridMismatch(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Create a grid mismatch error.
    pub fn grid_mismatch(msg: impl Into<String>) -> Self {
        Error::GridMismatch(msg.into())
    }

    /// Create a missing table error.
    pub fn missing_table(date: NaiveDate, symbol: impl Into<String>) -> Self {
        Error::MissingTable {
            date,
            symbol: symbol.into(),
        }
    }
}

/// Why a symbol-day's quotes could not be fully retrieved.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Transport-level failure (HTTP error, connection reset, timeout).
    #[error("transient failure: {0}")]
    Transient(String),

    /// The source answered but flagged the response as unsuccessful.
    #[error("response rejected: {0}")]
    Rejected(String),

    /// The source returned no quotes for the requested window.
    #[error("empty payload")]
    EmptyPayload,

    /// The request budget ran out before the stop time was reached.
    #[error("request budget of {requests} exhausted before stop time (reached {reached_ns} ns)")]
    Incomplete { requests: u32, reached_ns: i64 },
}

impl FetchError {
    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_) | FetchError::Incomplete { .. })
    }
}
