use thiserror::Error;

/// Errors that can occur within the timer subsystem.
#[derive(Debug, Error)]
pub enum TimerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The args/kwargs payload document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored timestamp column failed to parse.
    #[error("Corrupt timestamp in store: {0}")]
    CorruptTimestamp(#[from] chrono::ParseError),

    /// No timer with the given id (and owner scope) exists in the store.
    #[error("Timer not found: {id}")]
    TimerNotFound { id: i64 },
}

pub type Result<T> = std::result::Result<T, TimerError>;
