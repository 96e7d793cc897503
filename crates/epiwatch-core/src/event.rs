use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::error::CoreError;
use crate::geo::{Coordinate, Polygon};
use crate::hazard::HazardTag;
use crate::id::generate_id;
use crate::signal::Signal;
use crate::time::now_utc;

/// Event severity. Ordering matters: recomputation never moves severity
/// down, only an explicit operator action does.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Event workflow state. `open` is entered automatically when a signal
/// cannot merge anywhere; every other transition is operator-initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Open,
    Verifying,
    Confirmed,
    Escalated,
    Resolved,
    Dismissed,
}

impl EventStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }

    /// Events in these states still accept merged signals.
    pub fn accepts_signals(&self) -> bool {
        matches!(self, Self::Open | Self::Verifying | Self::Confirmed)
    }

    /// Transition legality table. Guards beyond legality (required notes,
    /// minimum severity) are enforced by the aggregator.
    pub fn can_transition(&self, to: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (*self, to),
            (Open, Verifying)
                | (Open, Dismissed)
                | (Verifying, Confirmed)
                | (Verifying, Dismissed)
                | (Confirmed, Escalated)
                | (Confirmed, Resolved)
                | (Escalated, Resolved)
                // Terminal events are retained and may be re-opened.
                | (Resolved, Open)
                | (Dismissed, Open)
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Verifying => write!(f, "verifying"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Escalated => write!(f, "escalated"),
            Self::Resolved => write!(f, "resolved"),
            Self::Dismissed => write!(f, "dismissed"),
        }
    }
}

impl FromStr for EventStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "verifying" => Ok(Self::Verifying),
            "confirmed" => Ok(Self::Confirmed),
            "escalated" => Ok(Self::Escalated),
            "resolved" => Ok(Self::Resolved),
            "dismissed" => Ok(Self::Dismissed),
            _ => Err(CoreError::invalid_report(format!("unknown status: {s}"))),
        }
    }
}

/// What one audit entry records. Status and severity changes are only ever
/// applied through the audit trail, never by silent field overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditChange {
    Status { from: EventStatus, to: EventStatus },
    Severity { from: Severity, to: Severity },
    SignalMerged { signal_id: String },
    ZoneDrawn,
    Assigned { operator: String },
    Annotated,
}

/// One immutable audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    /// "system" for automatic changes (creation, merges, severity recompute).
    pub operator: String,
    pub change: AuditChange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// An operator note attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub operator: String,
    pub text: String,
}

/// A clustered, operator-managed surveillance case.
///
/// Invariants: at least one contributing signal, signal ids ordered by
/// receipt time, status/severity changes appended to `audit`, never
/// physically deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub hazard: HazardTag,
    /// Running centroid of contributing signal coordinates.
    pub centroid: Coordinate,
    /// Affected zone, operator-drawn. Validated at the write boundary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<Polygon>,
    pub signal_ids: Vec<String>,
    /// Receipt times parallel to `signal_ids`; merges keep both sorted by
    /// receipt time regardless of arrival order.
    #[serde(default, with = "crate::time::rfc3339_vec")]
    pub signal_times: Vec<OffsetDateTime>,
    pub severity: Severity,
    pub status: EventStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Receipt time of the most recent contributing signal, used for the
    /// temporal merge window.
    #[serde(with = "time::serde::rfc3339")]
    pub last_signal_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub notes: Vec<Note>,
    /// Set when a signal matched several candidate events and recency decided.
    pub needs_review: bool,
    /// Ids of dispatch attempts triggered for this event (ledger is owned by
    /// the dispatcher, referenced here).
    pub dispatch_ids: Vec<String>,
    /// Optimistic-concurrency revision; bumped on every accepted write.
    pub revision: u64,
    pub audit: Vec<AuditEntry>,
}

impl Event {
    /// Creates a new `open` event from its first contributing signal.
    pub fn from_signal(signal: &Signal) -> Self {
        let now = now_utc();
        Self {
            id: generate_id(),
            hazard: signal.hazard,
            centroid: signal.coordinate,
            zone: None,
            signal_ids: vec![signal.id.clone()],
            signal_times: vec![signal.received_at],
            severity: Severity::Low,
            status: EventStatus::Open,
            created_at: now,
            updated_at: now,
            last_signal_at: signal.received_at,
            assigned_to: None,
            notes: Vec::new(),
            needs_review: false,
            dispatch_ids: Vec::new(),
            revision: 0,
            audit: Vec::new(),
        }
    }

    /// Merges a contributing signal and recomputes the running centroid.
    /// The signal id is inserted at its receipt-time position, so a late
    /// arrival with an earlier timestamp does not break the ordering.
    pub fn absorb_signal(&mut self, signal: &Signal) {
        let n = self.signal_ids.len() as f64;
        self.centroid = Coordinate {
            lat: (self.centroid.lat * n + signal.coordinate.lat) / (n + 1.0),
            lon: (self.centroid.lon * n + signal.coordinate.lon) / (n + 1.0),
        };
        let pos = self
            .signal_times
            .partition_point(|t| *t <= signal.received_at);
        self.signal_ids.insert(pos, signal.id.clone());
        self.signal_times.insert(pos, signal.received_at);
        if signal.received_at > self.last_signal_at {
            self.last_signal_at = signal.received_at;
        }
        self.push_audit(
            "system",
            AuditChange::SignalMerged {
                signal_id: signal.id.clone(),
            },
            None,
        );
    }

    /// Applies a status change through the audit trail. Legality must have
    /// been checked by the caller; this is the only mutation path for
    /// `status`.
    pub fn record_status(&mut self, to: EventStatus, operator: &str, note: Option<String>) {
        let from = self.status;
        self.status = to;
        self.push_audit(operator, AuditChange::Status { from, to }, note);
    }

    /// Applies a severity change through the audit trail.
    pub fn record_severity(&mut self, to: Severity, operator: &str, note: Option<String>) {
        let from = self.severity;
        self.severity = to;
        self.push_audit(operator, AuditChange::Severity { from, to }, note);
    }

    pub fn push_audit(&mut self, operator: &str, change: AuditChange, note: Option<String>) {
        self.updated_at = now_utc();
        self.audit.push(AuditEntry {
            at: self.updated_at,
            operator: operator.to_string(),
            change,
            note,
        });
    }
}

/// Replays an audit trail from the initial `open`/`low` state and returns
/// the resulting (status, severity). Serializing a trail and replaying it
/// must reproduce the event's final state.
pub fn replay_audit(audit: &[AuditEntry]) -> (EventStatus, Severity) {
    let mut status = EventStatus::Open;
    let mut severity = Severity::Low;
    for entry in audit {
        match &entry.change {
            AuditChange::Status { to, .. } => status = *to,
            AuditChange::Severity { to, .. } => severity = *to,
            _ => {}
        }
    }
    (status, severity)
}
