use thiserror::Error;

use epiwatch_core::{EventStatus, Severity};
use epiwatch_geo::GeoError;
use epiwatch_store::StoreError;

#[derive(Debug, Error)]
pub enum AggregatorError {
    /// Requested transition is not in the legality table. The event is
    /// left unchanged.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: EventStatus, to: EventStatus },

    #[error("A justification note is required to {action}")]
    NoteRequired { action: String },

    #[error("Cannot escalate at severity {severity}, requires at least {required}")]
    SeverityTooLow {
        severity: Severity,
        required: Severity,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Geo(#[from] GeoError),
}

impl AggregatorError {
    pub fn invalid_transition(from: EventStatus, to: EventStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    pub fn note_required(action: impl Into<String>) -> Self {
        Self::NoteRequired {
            action: action.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
