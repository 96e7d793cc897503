use thiserror::Error;

/// Core error types shared across the surveillance pipeline
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Unknown hazard tag: {0}")]
    UnknownHazard(String),

    #[error("Invalid report: {message}")]
    InvalidReport { message: String },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Time parsing error: {0}")]
    TimeError(#[from] time::error::Parse),
}

impl CoreError {
    /// Create a new InvalidCoordinate error
    pub fn invalid_coordinate(message: impl Into<String>) -> Self {
        Self::InvalidCoordinate(message.into())
    }

    /// Create a new UnknownHazard error
    pub fn unknown_hazard(tag: impl Into<String>) -> Self {
        Self::UnknownHazard(tag.into())
    }

    /// Create a new InvalidReport error
    pub fn invalid_report(message: impl Into<String>) -> Self {
        Self::InvalidReport {
            message: message.into(),
        }
    }

    /// Create a new InvalidTransition error naming both states
    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a new NotFound error
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Check if this error is caused by caller input (never retried)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCoordinate(_)
                | Self::UnknownHazard(_)
                | Self::InvalidReport { .. }
                | Self::InvalidTransition { .. }
                | Self::NotFound { .. }
        )
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidCoordinate(_) | Self::UnknownHazard(_) | Self::InvalidReport { .. } => {
                ErrorCategory::Validation
            }
            Self::InvalidTransition { .. } => ErrorCategory::Transition,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::JsonError(_) => ErrorCategory::Serialization,
            Self::TimeError(_) => ErrorCategory::System,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Transition,
    NotFound,
    Serialization,
    System,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Transition => write!(f, "transition"),
            Self::NotFound => write!(f, "not_found"),
            Self::Serialization => write!(f, "serialization"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
