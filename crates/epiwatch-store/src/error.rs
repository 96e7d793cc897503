use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: String, id: String },

    /// Concurrent-edit conflict: the caller read an older revision and must
    /// re-read and retry. Recoverable by design.
    #[error("Stale write on event {id}: expected revision {expected}, found {actual}")]
    StaleWrite { id: String, expected: u64, actual: u64 },
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn already_exists(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn stale_write(id: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::StaleWrite {
            id: id.into(),
            expected,
            actual,
        }
    }
}

impl From<epiwatch_core::CoreError> for StoreError {
    fn from(err: epiwatch_core::CoreError) -> Self {
        Self::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
