//! Error types for the catalog, event frames and snapshot output

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed or incomplete sample description
    #[error("configuration error at {context}: {message}")]
    Config { context: String, message: String },

    /// Backing file that cannot be interpreted as an event table
    #[error("event source {path}: {message}")]
    Source { path: String, message: String },

    /// Column referenced but not present on the frame
    #[error("missing column '{0}'")]
    MissingColumn(String),

    /// Column defined twice on the same frame
    #[error("column '{0}' is already defined")]
    DuplicateColumn(String),

    /// Columns of one table with different lengths
    #[error("column '{name}' has {found} rows, expected {expected}")]
    LengthMismatch { name: String, expected: usize, found: usize },

    /// Event identity outside the packable range
    #[error("event key: {0}")]
    EventKey(#[from] xseccore::Error),

    /// Worker pool could not be created
    #[error("thread pool: {0}")]
    ThreadPool(String),

    /// Error raised while handling one sample
    #[error("{context}: {source}")]
    Sample {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn config(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config { context: context.into(), message: message.into() }
    }

    /// Attach the sample (beamline/period/label) the error belongs to.
    pub fn in_sample(self, context: impl Into<String>) -> Self {
        Error::Sample { context: context.into(), source: Box::new(self) }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
