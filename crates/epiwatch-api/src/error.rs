use thiserror::Error;

use epiwatch_aggregator::AggregatorError;
use epiwatch_core::CoreError;
use epiwatch_dispatch::DispatchError;
use epiwatch_geo::GeoError;
use epiwatch_store::StoreError;

use crate::roles::OperatorRole;

/// Error surface of the operator service. Lower-layer errors pass through
/// transparently so callers can match on the concrete failure (stale
/// write, invalid transition, dispatch in progress).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Role {role} may not {action}")]
    Forbidden { role: OperatorRole, action: String },

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Geo(#[from] GeoError),
}

impl ApiError {
    pub fn forbidden(role: OperatorRole, action: impl Into<String>) -> Self {
        Self::Forbidden {
            role,
            action: action.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// True when the failure is an optimistic-concurrency conflict and the
    /// caller should re-read and retry.
    pub fn is_stale_write(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::StaleWrite { .. })
                | Self::Aggregator(AggregatorError::Store(StoreError::StaleWrite { .. }))
        )
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
