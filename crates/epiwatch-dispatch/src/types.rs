use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

use epiwatch_core::{EventStatus, HazardTag, Polygon};

use crate::payload::AlertPayload;

/// Alert delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertChannel {
    Sms,
    Push,
    InApp,
    /// Shareable QR payload, rendered locally rather than sent out.
    Qr,
}

impl fmt::Display for AlertChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sms => write!(f, "sms"),
            Self::Push => write!(f, "push"),
            Self::InApp => write!(f, "in_app"),
            Self::Qr => write!(f, "qr"),
        }
    }
}

/// Per-recipient delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Delivered,
    Failed,
    Cancelled,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }
}

/// Delivery state of one recipient within a dispatch attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub recipient_id: String,
    pub channel: AlertChannel,
    pub status: DeliveryStatus,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Stakeholder roles for recipient resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    DistrictHealthOfficer,
    RegionalCoordinator,
    VeterinaryOfficer,
    PublicAlertList,
}

/// External identity supplied by the user/identity collaborator. The core
/// reads role, handles and jurisdiction; it never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub role: RecipientRole,
    pub preferred_channel: AlertChannel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
    /// Polygon of the recipient's jurisdiction, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<Polygon>,
    /// Hazard tags this recipient is notified about regardless of geography.
    #[serde(default)]
    pub always_notify: Vec<HazardTag>,
}

/// What kind of action created a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// State transition configured as alert-worthy.
    Automatic,
    /// Explicit operator rebroadcast.
    Rebroadcast,
}

/// The state transition a dispatch attempt was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub from: EventStatus,
    pub to: EventStatus,
    pub kind: TriggerKind,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)?;
        if self.kind == TriggerKind::Rebroadcast {
            write!(f, " (rebroadcast)")?;
        }
        Ok(())
    }
}

/// Overall status of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Running,
    Complete,
    Cancelled,
}

/// One broadcast instance. The recipient set and payload are frozen at
/// creation; later jurisdiction changes never alter history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchAttempt {
    pub id: String,
    pub event_id: String,
    pub trigger: Trigger,
    pub payload: AlertPayload,
    pub receipts: Vec<DeliveryReceipt>,
    pub status: AttemptStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl DispatchAttempt {
    pub fn stats(&self) -> DispatchStats {
        let mut stats = DispatchStats::default();
        for receipt in &self.receipts {
            match receipt.status {
                DeliveryStatus::Queued => stats.queued += 1,
                DeliveryStatus::Sent => stats.sent += 1,
                DeliveryStatus::Delivered => stats.delivered += 1,
                DeliveryStatus::Failed => stats.failed += 1,
                DeliveryStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// True when every recipient reached a terminal receipt state.
    pub fn is_settled(&self) -> bool {
        self.receipts.iter().all(|r| r.status.is_terminal())
    }
}

/// Per-status receipt counts surfaced to operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub queued: u32,
    pub sent: u32,
    pub delivered: u32,
    pub failed: u32,
    pub cancelled: u32,
}
