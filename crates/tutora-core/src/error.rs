use thiserror::Error;
use tutora_domain::MonthParseError;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or malformed required fields, listed by name. Reported to
    /// the caller, never retried automatically.
    #[error("validation failed for fields: {}", .0.join(", "))]
    Validation(Vec<String>),
    #[error("student not found: {0}")]
    StudentNotFound(Uuid),
    #[error("payment not found: {0}")]
    PaymentNotFound(i64),
    #[error("invalid month: {0}")]
    InvalidMonth(String),
    /// Persistence read/write failure. The in-memory state stays
    /// authoritative; callers surface this as a non-fatal notification.
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serde(String),
    /// Snapshot rejected before any state was mutated.
    #[error("import rejected: {0}")]
    ImportFormat(String),
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Storage(err.to_string())
    }
}

impl From<MonthParseError> for CoreError {
    fn from(err: MonthParseError) -> Self {
        CoreError::InvalidMonth(err.0)
    }
}
