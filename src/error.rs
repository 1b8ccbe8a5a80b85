use crate::domain::ExecutionStatus;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("observation at {timestamp_ms}ms predates execution start at {start_ms}ms")]
    ObservationBeforeStart { timestamp_ms: u64, start_ms: u64 },

    #[error("observation at {timestamp_ms}ms targets finalized bucket {bucket_number}")]
    ObservationTooLate {
        timestamp_ms: u64,
        bucket_number: u64,
    },

    #[error("execution is not running: {0}")]
    ExecutionNotRunning(String),

    #[error("invalid execution status transition: {from} -> {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("latency histogram error: {0}")]
    Histogram(String),
}

pub type Result<T> = std::result::Result<T, Error>;
