//! Collaborator contracts: the external notification gateway and the
//! identity/zone directory. The core never implements real SMS/push
//! delivery; it drives these traits and folds the results back into the
//! dispatch ledger.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::DispatchError;
use crate::types::{AlertChannel, Recipient, RecipientRole};

/// Gateway-side failure classification. Transient errors are retried with
/// backoff, permanent ones are recorded as failed with no retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway timeout")]
    Timeout,

    #[error("gateway rate limited")]
    RateLimited,

    #[error("invalid contact handle: {0}")]
    InvalidContact(String),

    #[error("recipient opted out")]
    OptedOut,

    #[error("gateway rejected send: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited)
    }
}

/// Acknowledgement from the gateway for one send.
#[derive(Debug, Clone, Default)]
pub struct DeliveryConfirmation {
    /// Gateway-side message id, when the provider returns one.
    pub external_id: Option<String>,
}

/// External send-and-acknowledge API. Must be idempotent-safe to retry:
/// the dispatcher assumes at-least-once semantics and tolerates duplicate
/// deliveries on the recipient's side. Calls are wrapped in a timeout by
/// the dispatcher; a hung gateway never blocks other work.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(
        &self,
        recipient: &Recipient,
        channel: AlertChannel,
        payload: &str,
    ) -> Result<DeliveryConfirmation, GatewayError>;
}

/// Filter for recipient resolution.
#[derive(Debug, Clone, Default)]
pub struct RecipientQuery {
    pub role: Option<RecipientRole>,
}

/// Identity collaborator: supplies registered stakeholders with their roles,
/// contact handles and jurisdiction polygons.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn resolve_recipients(
        &self,
        query: &RecipientQuery,
    ) -> Result<Vec<Recipient>, DispatchError>;
}
