//! Error types for aggregation and storage.

use thiserror::Error;

/// Errors raised while merging submissions or talking to the object store.
#[derive(Error, Debug)]
pub enum TallyError {
    /// The submission or notification is missing required data.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A submission was merged into a document for another quiz.
    #[error("Quiz mismatch: document belongs to quiz '{expected}', submission is for '{found}'")]
    QuizMismatch { expected: String, found: String },

    /// Stored document bytes could not be decoded.
    #[error("Failed to decode document at {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Stored document decoded but breaks a tally invariant.
    #[error("Corrupt document at {key}: {reason}")]
    CorruptDocument { key: String, reason: String },

    /// The object store rejected or failed an operation.
    #[error("Object store error: {0}")]
    Store(String),

    /// Filesystem failure underneath the object store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type TallyResult<T> = Result<T, TallyError>;
