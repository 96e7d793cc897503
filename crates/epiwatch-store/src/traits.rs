//! Storage traits for the surveillance stores.
//!
//! The pipeline is written against these traits; the in-memory backends in
//! this crate implement them, a relational backend would live elsewhere.
//! Implementations must be thread-safe (`Send + Sync`).

use async_trait::async_trait;

use epiwatch_core::{BoundingBox, Event, EventStatus, HazardTag, Severity, Signal};

use crate::error::StoreError;

/// Append-only storage for raw signals. Signals are immutable history:
/// there is no update or delete.
#[async_trait]
pub trait SignalStorage: Send + Sync {
    /// Appends a signal.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` on an id collision.
    async fn append(&self, signal: Signal) -> Result<(), StoreError>;

    /// Reads a signal by id. Returns `None` when absent.
    async fn get(&self, id: &str) -> Result<Option<Signal>, StoreError>;

    /// All signals in receipt order.
    async fn all(&self) -> Result<Vec<Signal>, StoreError>;

    /// Number of stored signals.
    async fn count(&self) -> usize;
}

/// Read filter for the event list boundary. All fields are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub status: Option<EventStatus>,
    pub hazard: Option<HazardTag>,
    /// Matches on the event centroid.
    pub bounding_box: Option<BoundingBox>,
    /// Minimum severity.
    pub severity_at_least: Option<Severity>,
    pub needs_review: Option<bool>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(status) = self.status
            && event.status != status
        {
            return false;
        }
        if let Some(hazard) = self.hazard
            && event.hazard != hazard
        {
            return false;
        }
        if let Some(bbox) = self.bounding_box
            && !bbox.contains(event.centroid)
        {
            return false;
        }
        if let Some(min) = self.severity_at_least
            && event.severity < min
        {
            return false;
        }
        if let Some(flag) = self.needs_review
            && event.needs_review != flag
        {
            return false;
        }
        true
    }
}

/// Storage for events with optimistic-revision writes. Events are never
/// physically deleted; terminal states are retained for audit.
#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Inserts a brand-new event at revision 0.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` when the id is taken.
    async fn insert(&self, event: Event) -> Result<Event, StoreError>;

    /// Reads an event by id. Returns `None` when absent.
    async fn get(&self, id: &str) -> Result<Option<Event>, StoreError>;

    /// Replaces the event if and only if the stored revision equals
    /// `expected_revision`; the stored copy gets `expected_revision + 1`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::StaleWrite` on a revision mismatch and
    /// `StoreError::NotFound` for an unknown id. The stored event is
    /// untouched in both cases.
    async fn update(&self, event: Event, expected_revision: u64) -> Result<Event, StoreError>;

    /// Events matching the filter, most recently updated first.
    async fn list(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError>;
}
