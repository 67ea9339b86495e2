use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid stored alarm: {0}")]
    InvalidRecord(String),
    #[error("Scheduler error: {0}")]
    Scheduler(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("Logging error: {0}")]
    Logging(String),
}
