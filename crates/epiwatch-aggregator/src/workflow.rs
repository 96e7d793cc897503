//! Operator-driven event workflow: status transitions, severity overrides,
//! assignment, annotation and zone drawing.
//!
//! Every write takes the caller's expected revision and fails with a stale
//! write error when the event moved underneath them; rejected writes leave
//! the event untouched.

use tracing::info;

use epiwatch_core::{AuditChange, Event, EventStatus, Polygon, Severity, now_utc};
use epiwatch_geo::validate_polygon;
use epiwatch_store::StoreError;

use crate::aggregator::EventAggregator;
use crate::error::{AggregatorError, Result};

/// Result of an accepted status transition.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub event: Event,
    pub from: EventStatus,
    pub to: EventStatus,
}

impl EventAggregator {
    /// Applies a status transition. Rejects transitions missing from the
    /// legality table, transitions without a required justification note,
    /// and escalations below `Medium` severity.
    pub async fn transition(
        &self,
        event_id: &str,
        expected_revision: u64,
        to: EventStatus,
        operator: &str,
        note: Option<String>,
    ) -> Result<TransitionOutcome> {
        let lock = self.event_lock(event_id);
        let _guard = lock.lock().await;

        let event = self.load(event_id, expected_revision).await?;
        let from = event.status;
        if !from.can_transition(to) {
            return Err(AggregatorError::invalid_transition(from, to));
        }
        if note_required(from, to) && note_is_blank(&note) {
            return Err(AggregatorError::note_required(format!(
                "move an event from {from} to {to}"
            )));
        }
        if to == EventStatus::Escalated && event.severity < Severity::Medium {
            return Err(AggregatorError::SeverityTooLow {
                severity: event.severity,
                required: Severity::Medium,
            });
        }

        let mut event = event;
        event.record_status(to, operator, note);
        let updated = self.events.update(event, expected_revision).await?;
        info!(
            event_id = %updated.id,
            from = %from,
            to = %to,
            operator = %operator,
            "event transitioned"
        );
        Ok(TransitionOutcome {
            event: updated,
            from,
            to,
        })
    }

    /// Operator severity override. Always requires a note; this is the only
    /// path that may lower a severity.
    pub async fn set_severity(
        &self,
        event_id: &str,
        expected_revision: u64,
        severity: Severity,
        operator: &str,
        note: String,
    ) -> Result<Event> {
        let lock = self.event_lock(event_id);
        let _guard = lock.lock().await;

        if note.trim().is_empty() {
            return Err(AggregatorError::note_required("override event severity"));
        }
        let mut event = self.load(event_id, expected_revision).await?;
        let from = event.severity;
        if severity != from {
            event.record_severity(severity, operator, Some(note));
        }
        let updated = self.events.update(event, expected_revision).await?;
        info!(
            event_id = %updated.id,
            from = %from,
            to = %severity,
            operator = %operator,
            "severity overridden"
        );
        Ok(updated)
    }

    pub async fn assign(
        &self,
        event_id: &str,
        expected_revision: u64,
        assignee: &str,
        operator: &str,
    ) -> Result<Event> {
        let lock = self.event_lock(event_id);
        let _guard = lock.lock().await;

        let mut event = self.load(event_id, expected_revision).await?;
        event.assigned_to = Some(assignee.to_string());
        event.push_audit(
            operator,
            AuditChange::Assigned {
                operator: assignee.to_string(),
            },
            None,
        );
        Ok(self.events.update(event, expected_revision).await?)
    }

    pub async fn annotate(
        &self,
        event_id: &str,
        expected_revision: u64,
        operator: &str,
        text: String,
    ) -> Result<Event> {
        let lock = self.event_lock(event_id);
        let _guard = lock.lock().await;

        if text.trim().is_empty() {
            return Err(AggregatorError::note_required("annotate an event"));
        }
        let mut event = self.load(event_id, expected_revision).await?;
        event.notes.push(epiwatch_core::Note {
            at: now_utc(),
            operator: operator.to_string(),
            text: text.clone(),
        });
        event.push_audit(operator, AuditChange::Annotated, Some(text));
        Ok(self.events.update(event, expected_revision).await?)
    }

    /// Clears the review flag set by an ambiguous merge.
    pub async fn clear_review(
        &self,
        event_id: &str,
        expected_revision: u64,
        operator: &str,
        note: String,
    ) -> Result<Event> {
        let lock = self.event_lock(event_id);
        let _guard = lock.lock().await;

        if note.trim().is_empty() {
            return Err(AggregatorError::note_required("clear the review flag"));
        }
        let mut event = self.load(event_id, expected_revision).await?;
        event.needs_review = false;
        event.push_audit(operator, AuditChange::Annotated, Some(note));
        Ok(self.events.update(event, expected_revision).await?)
    }

    /// Draws or replaces the affected zone. The polygon is validated before
    /// anything is written; the zone is also registered in the geo index
    /// under the event id so merge and read queries see it.
    pub async fn draw_zone(
        &self,
        event_id: &str,
        expected_revision: u64,
        polygon: Polygon,
        operator: &str,
    ) -> Result<Event> {
        let lock = self.event_lock(event_id);
        let _guard = lock.lock().await;

        validate_polygon(&polygon)?;
        let mut event = self.load(event_id, expected_revision).await?;
        self.geo.upsert_zone(event.id.clone(), polygon.clone())?;
        event.zone = Some(polygon);
        event.push_audit(operator, AuditChange::ZoneDrawn, None);
        let updated = self.events.update(event, expected_revision).await?;
        info!(event_id = %updated.id, operator = %operator, "zone drawn");
        Ok(updated)
    }

    /// Links a dispatch attempt to its event. System write against the
    /// current revision; the dispatch ledger itself lives with the
    /// dispatcher.
    pub async fn record_dispatch(&self, event_id: &str, attempt_id: &str) -> Result<Event> {
        let lock = self.event_lock(event_id);
        let _guard = lock.lock().await;

        let event = self
            .events
            .get(event_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Event", event_id))?;
        let revision = event.revision;
        let mut event = event;
        event.dispatch_ids.push(attempt_id.to_string());
        Ok(self.events.update(event, revision).await?)
    }

    /// Reads the event and rejects stale revisions before any guard runs,
    /// so callers get a stale-write error rather than a guard failure
    /// computed against state they have not seen.
    async fn load(&self, event_id: &str, expected_revision: u64) -> Result<Event> {
        let event = self
            .events
            .get(event_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Event", event_id))?;
        if event.revision != expected_revision {
            return Err(StoreError::stale_write(event_id, expected_revision, event.revision).into());
        }
        Ok(event)
    }
}

fn note_required(from: EventStatus, to: EventStatus) -> bool {
    use EventStatus::*;
    matches!(
        (from, to),
        (Verifying, Confirmed) | (Open | Verifying, Dismissed) | (_, Resolved)
    ) || from.is_terminal()
}

fn note_is_blank(note: &Option<String>) -> bool {
    note.as_deref().is_none_or(|n| n.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use epiwatch_core::time::parse_rfc3339;
    use epiwatch_core::{Coordinate, RawReport, ReportChannel, Signal, replay_audit};
    use epiwatch_geo::{DEFAULT_FLAT_PROJECTION_MAX_M, GeoIndex};
    use epiwatch_store::InMemoryEventStore;

    use crate::policy::MergePolicy;

    fn aggregator() -> EventAggregator {
        EventAggregator::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(GeoIndex::new(DEFAULT_FLAT_PROJECTION_MAX_M)),
            MergePolicy::default(),
        )
    }

    async fn open_event(agg: &EventAggregator, tag: &str) -> Event {
        let signal = Signal::from_report(&RawReport {
            hazard_tag: tag.into(),
            lat: 4.05,
            lon: 9.70,
            description: "dog bite, animal behaving erratically".into(),
            reporter_ref: "chw-003".into(),
            channel: ReportChannel::Sms,
            timestamp: parse_rfc3339("2026-08-12T09:00:00Z").unwrap(),
        })
        .unwrap();
        agg.fold(&signal).await.unwrap().event
    }

    #[tokio::test]
    async fn test_legal_path_to_confirmed() {
        let agg = aggregator();
        let event = open_event(&agg, "rabies_suspect").await;
        let verifying = agg
            .transition(&event.id, event.revision, EventStatus::Verifying, "op-1", None)
            .await
            .unwrap();
        assert_eq!(verifying.to, EventStatus::Verifying);
        let confirmed = agg
            .transition(
                &event.id,
                verifying.event.revision,
                EventStatus::Confirmed,
                "op-1",
                Some("lab positive".into()),
            )
            .await
            .unwrap();
        assert_eq!(confirmed.event.status, EventStatus::Confirmed);
        // Audit replay reproduces the current state.
        let (status, severity) = replay_audit(&confirmed.event.audit);
        assert_eq!(status, confirmed.event.status);
        assert_eq!(severity, confirmed.event.severity);
    }

    #[tokio::test]
    async fn test_illegal_transition_leaves_event_unchanged() {
        let agg = aggregator();
        let event = open_event(&agg, "rabies_suspect").await;
        let err = agg
            .transition(&event.id, event.revision, EventStatus::Confirmed, "op-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AggregatorError::InvalidTransition { .. }));
        let stored = agg.events.get(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.revision, event.revision);
        assert_eq!(stored.status, EventStatus::Open);
    }

    #[tokio::test]
    async fn test_confirm_without_note_is_rejected() {
        let agg = aggregator();
        let event = open_event(&agg, "rabies_suspect").await;
        let r = agg
            .transition(&event.id, event.revision, EventStatus::Verifying, "op-1", None)
            .await
            .unwrap()
            .event
            .revision;
        let err = agg
            .transition(&event.id, r, EventStatus::Confirmed, "op-1", Some("  ".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregatorError::NoteRequired { .. }));
    }

    #[tokio::test]
    async fn test_escalate_requires_medium_severity() {
        let agg = aggregator();
        // Single animal_dieoff signal folds at Low severity.
        let event = open_event(&agg, "animal_dieoff").await;
        assert_eq!(event.severity, Severity::Low);
        let mut rev = event.revision;
        for (to, note) in [
            (EventStatus::Verifying, None),
            (EventStatus::Confirmed, Some("field visit confirms".to_string())),
        ] {
            rev = agg
                .transition(&event.id, rev, to, "op-1", note)
                .await
                .unwrap()
                .event
                .revision;
        }
        let err = agg
            .transition(&event.id, rev, EventStatus::Escalated, "op-2", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AggregatorError::SeverityTooLow { .. }));

        let raised = agg
            .set_severity(&event.id, rev, Severity::High, "op-2", "mass mortality".into())
            .await
            .unwrap();
        agg.transition(&event.id, raised.revision, EventStatus::Escalated, "op-2", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stale_revision_is_rejected_before_guards() {
        let agg = aggregator();
        let event = open_event(&agg, "rabies_suspect").await;
        agg.transition(&event.id, event.revision, EventStatus::Verifying, "op-1", None)
            .await
            .unwrap();
        // Second writer still holds the pre-transition revision.
        let err = agg
            .transition(&event.id, event.revision, EventStatus::Verifying, "op-2", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AggregatorError::Store(StoreError::StaleWrite { .. })
        ));
    }

    #[tokio::test]
    async fn test_reopen_terminal_event_requires_note() {
        let agg = aggregator();
        let event = open_event(&agg, "rabies_suspect").await;
        let rev = agg
            .transition(
                &event.id,
                event.revision,
                EventStatus::Dismissed,
                "op-1",
                Some("duplicate of district report".into()),
            )
            .await
            .unwrap()
            .event
            .revision;
        let err = agg
            .transition(&event.id, rev, EventStatus::Open, "op-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AggregatorError::NoteRequired { .. }));
        let reopened = agg
            .transition(
                &event.id,
                rev,
                EventStatus::Open,
                "op-1",
                Some("new lab result contradicts dismissal".into()),
            )
            .await
            .unwrap();
        assert_eq!(reopened.event.status, EventStatus::Open);
    }

    #[tokio::test]
    async fn test_draw_zone_rejects_self_intersecting_polygon() {
        let agg = aggregator();
        let event = open_event(&agg, "water_contamination").await;
        let bowtie = Polygon::new(vec![
            Coordinate { lat: 4.0, lon: 9.6 },
            Coordinate { lat: 4.1, lon: 9.7 },
            Coordinate { lat: 4.0, lon: 9.7 },
            Coordinate { lat: 4.1, lon: 9.6 },
        ]);
        assert!(
            agg.draw_zone(&event.id, event.revision, bowtie, "op-1")
                .await
                .is_err()
        );
        let square = Polygon::new(vec![
            Coordinate { lat: 4.0, lon: 9.6 },
            Coordinate { lat: 4.0, lon: 9.8 },
            Coordinate { lat: 4.1, lon: 9.8 },
            Coordinate { lat: 4.1, lon: 9.6 },
        ]);
        let updated = agg
            .draw_zone(&event.id, event.revision, square, "op-1")
            .await
            .unwrap();
        assert!(updated.zone.is_some());
        assert!(agg.geo.zone(&updated.id).is_some());
    }

    #[tokio::test]
    async fn test_operator_severity_override_may_lower() {
        let agg = aggregator();
        let event = open_event(&agg, "human_zoonotic_case").await;
        assert_eq!(event.severity, Severity::High);
        let lowered = agg
            .set_severity(
                &event.id,
                event.revision,
                Severity::Medium,
                "op-1",
                "single case, contact traced".into(),
            )
            .await
            .unwrap();
        assert_eq!(lowered.severity, Severity::Medium);
    }
}
