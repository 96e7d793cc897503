//! The operator-facing service: report intake, event workflow commands and
//! the read boundary, with role checks at the edge.
//!
//! `SurveillanceService` wires the pipeline together: reports pass through
//! the signal store (validation, duplicate flagging) into the clustering
//! fold, and alert-worthy transitions hand the event to the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use epiwatch_aggregator::{EventAggregator, FoldOutcome, MergePolicy};
use epiwatch_config::settings::{AggregatorSettings, DedupSettings, DispatchSettings};
use epiwatch_config::EpiwatchConfig;
use epiwatch_core::{
    Coordinate, Event, EventStatus, Polygon, RawReport, Severity, Signal,
};
use epiwatch_dispatch::{
    AlertDispatcher, DispatchAttempt, DispatchStats, NotificationGateway, RecipientDirectory,
    RetryPolicy, Trigger, TriggerKind,
};
use epiwatch_geo::{GeoIndex, NearbyHit};
use epiwatch_store::{
    DedupConfig, EventFilter, EventStorage, InMemoryEventStore, InMemorySignalStore, SignalStore,
    StoreError,
};

use crate::error::{ApiError, Result};
use crate::roles::{OperatorContext, OperatorRole};

/// Result of ingesting one field report.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub signal: Signal,
    pub event: Event,
    pub merged: bool,
    pub ambiguous: bool,
}

/// Result of an accepted operator transition, including the dispatch
/// attempt when the transition was alert-worthy.
#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub event: Event,
    pub from: EventStatus,
    pub to: EventStatus,
    pub dispatch: Option<DispatchAttempt>,
}

/// Full event view for the detail screen.
#[derive(Debug, Clone)]
pub struct EventDetail {
    pub event: Event,
    pub signals: Vec<Signal>,
    pub attempts: Vec<DispatchAttempt>,
}

pub struct SurveillanceService {
    settings: EpiwatchConfig,
    signals: SignalStore,
    events: Arc<dyn EventStorage>,
    geo: Arc<GeoIndex>,
    aggregator: EventAggregator,
    dispatcher: AlertDispatcher,
}

impl SurveillanceService {
    pub fn new(
        settings: EpiwatchConfig,
        gateway: Arc<dyn NotificationGateway>,
        directory: Arc<dyn RecipientDirectory>,
    ) -> Self {
        let geo = Arc::new(GeoIndex::new(settings.geo.flat_projection_max_m));
        let events: Arc<dyn EventStorage> = Arc::new(InMemoryEventStore::new());
        let signals = SignalStore::new(
            Arc::new(InMemorySignalStore::new()),
            dedup_config(&settings.dedup),
        );
        let aggregator = EventAggregator::new(
            Arc::clone(&events),
            Arc::clone(&geo),
            merge_policy(&settings.aggregator),
        );
        let dispatcher = AlertDispatcher::new(gateway, directory, retry_policy(&settings.dispatch));
        Self {
            settings,
            signals,
            events,
            geo,
            aggregator,
            dispatcher,
        }
    }

    // ---- intake ----

    /// Validates and stores a field report, then folds the resulting signal
    /// into the event set.
    pub async fn ingest_report(&self, report: &RawReport) -> Result<IngestOutcome> {
        let signal = self.signals.ingest(report).await?;
        let FoldOutcome {
            event,
            merged,
            ambiguous,
        } = self.aggregator.fold(&signal).await?;
        Ok(IngestOutcome {
            signal,
            event,
            merged,
            ambiguous,
        })
    }

    // ---- read boundary (any role) ----

    pub async fn event(&self, event_id: &str) -> Result<Event> {
        self.events
            .get(event_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Event", event_id).into())
    }

    /// Events matching the filter, most recently updated first.
    pub async fn events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        Ok(self.events.list(filter).await?)
    }

    pub async fn event_detail(&self, event_id: &str) -> Result<EventDetail> {
        let event = self.event(event_id).await?;
        let mut signals = Vec::with_capacity(event.signal_ids.len());
        for signal_id in &event.signal_ids {
            if let Some(signal) = self.signals.get(signal_id).await? {
                signals.push(signal);
            }
        }
        let attempts = self.dispatcher.history(event_id).await;
        Ok(EventDetail {
            event,
            signals,
            attempts,
        })
    }

    pub async fn signal(&self, signal_id: &str) -> Result<Signal> {
        self.signals
            .get(signal_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Signal", signal_id).into())
    }

    /// Signals within `radius_m` of the origin, nearest first.
    pub fn signals_near(&self, origin: Coordinate, radius_m: f64) -> Vec<NearbyHit> {
        self.geo.nearby(origin, radius_m)
    }

    pub async fn dispatch_history(&self, event_id: &str) -> Vec<DispatchAttempt> {
        self.dispatcher.history(event_id).await
    }

    pub async fn dispatch_attempt(&self, attempt_id: &str) -> Result<DispatchAttempt> {
        Ok(self.dispatcher.attempt(attempt_id).await?)
    }

    pub async fn dispatch_stats(&self, attempt_id: &str) -> Result<DispatchStats> {
        Ok(self.dispatcher.stats(attempt_id).await?)
    }

    // ---- workflow commands ----

    /// Applies a status transition on behalf of an operator. Escalation and
    /// reopening are coordinator actions. When the transition is
    /// alert-worthy the dispatcher is triggered and the attempt id recorded
    /// on the event.
    pub async fn transition(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
        expected_revision: u64,
        to: EventStatus,
        note: Option<String>,
    ) -> Result<TransitionResult> {
        let min_role = match to {
            EventStatus::Escalated | EventStatus::Open => OperatorRole::Coordinator,
            _ => OperatorRole::Operator,
        };
        self.require(ctx, min_role, format!("move an event to {to}"))?;

        let outcome = self
            .aggregator
            .transition(event_id, expected_revision, to, &ctx.operator_id, note)
            .await?;
        let dispatch = if self.alert_worthy(outcome.from, outcome.to) {
            self.trigger_dispatch(
                &outcome.event,
                Trigger {
                    from: outcome.from,
                    to: outcome.to,
                    kind: TriggerKind::Automatic,
                },
            )
            .await
        } else {
            None
        };
        // Re-read so callers see the revision bump from the dispatch link.
        let event = match &dispatch {
            Some(_) => self.event(event_id).await?,
            None => outcome.event,
        };
        Ok(TransitionResult {
            event,
            from: outcome.from,
            to: outcome.to,
            dispatch,
        })
    }

    pub async fn verify(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
        expected_revision: u64,
    ) -> Result<TransitionResult> {
        self.transition(ctx, event_id, expected_revision, EventStatus::Verifying, None)
            .await
    }

    pub async fn confirm(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
        expected_revision: u64,
        note: String,
    ) -> Result<TransitionResult> {
        self.transition(ctx, event_id, expected_revision, EventStatus::Confirmed, Some(note))
            .await
    }

    pub async fn escalate(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
        expected_revision: u64,
    ) -> Result<TransitionResult> {
        self.transition(ctx, event_id, expected_revision, EventStatus::Escalated, None)
            .await
    }

    pub async fn resolve(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
        expected_revision: u64,
        note: String,
    ) -> Result<TransitionResult> {
        self.transition(ctx, event_id, expected_revision, EventStatus::Resolved, Some(note))
            .await
    }

    pub async fn dismiss(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
        expected_revision: u64,
        note: String,
    ) -> Result<TransitionResult> {
        self.transition(ctx, event_id, expected_revision, EventStatus::Dismissed, Some(note))
            .await
    }

    /// Brings a resolved or dismissed event back to `open`.
    pub async fn reopen(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
        expected_revision: u64,
        note: String,
    ) -> Result<TransitionResult> {
        self.transition(ctx, event_id, expected_revision, EventStatus::Open, Some(note))
            .await
    }

    pub async fn set_severity(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
        expected_revision: u64,
        severity: Severity,
        note: String,
    ) -> Result<Event> {
        self.require(ctx, OperatorRole::Coordinator, "override event severity")?;
        Ok(self
            .aggregator
            .set_severity(event_id, expected_revision, severity, &ctx.operator_id, note)
            .await?)
    }

    pub async fn assign(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
        expected_revision: u64,
        assignee: &str,
    ) -> Result<Event> {
        self.require(ctx, OperatorRole::Operator, "assign an event")?;
        Ok(self
            .aggregator
            .assign(event_id, expected_revision, assignee, &ctx.operator_id)
            .await?)
    }

    pub async fn annotate(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
        expected_revision: u64,
        text: String,
    ) -> Result<Event> {
        self.require(ctx, OperatorRole::Operator, "annotate an event")?;
        Ok(self
            .aggregator
            .annotate(event_id, expected_revision, &ctx.operator_id, text)
            .await?)
    }

    pub async fn draw_zone(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
        expected_revision: u64,
        polygon: Polygon,
    ) -> Result<Event> {
        self.require(ctx, OperatorRole::Operator, "draw an event zone")?;
        Ok(self
            .aggregator
            .draw_zone(event_id, expected_revision, polygon, &ctx.operator_id)
            .await?)
    }

    pub async fn clear_review(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
        expected_revision: u64,
        note: String,
    ) -> Result<Event> {
        self.require(ctx, OperatorRole::Operator, "clear the review flag")?;
        Ok(self
            .aggregator
            .clear_review(event_id, expected_revision, &ctx.operator_id, note)
            .await?)
    }

    // ---- alert management ----

    /// Re-sends the current alert for a confirmed or escalated event.
    /// Rejected while a previous attempt is still running.
    pub async fn rebroadcast(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
    ) -> Result<DispatchAttempt> {
        self.require(ctx, OperatorRole::Coordinator, "rebroadcast an alert")?;
        let event = self.event(event_id).await?;
        if !matches!(
            event.status,
            EventStatus::Confirmed | EventStatus::Escalated
        ) {
            return Err(ApiError::invalid(format!(
                "cannot rebroadcast an event in status {}",
                event.status
            )));
        }
        let attempt = self
            .dispatcher
            .dispatch(
                &event,
                Trigger {
                    from: event.status,
                    to: event.status,
                    kind: TriggerKind::Rebroadcast,
                },
            )
            .await?;
        self.aggregator.record_dispatch(event_id, &attempt.id).await?;
        Ok(attempt)
    }

    /// Cancels the running dispatch attempt for an event. Deliveries not
    /// yet attempted are marked cancelled; already-sent ones keep their
    /// status.
    pub async fn cancel_alerts(
        &self,
        ctx: &OperatorContext,
        event_id: &str,
    ) -> Result<DispatchAttempt> {
        self.require(ctx, OperatorRole::Coordinator, "cancel alert delivery")?;
        Ok(self.dispatcher.cancel(event_id).await?)
    }

    // ---- internals ----

    fn require(
        &self,
        ctx: &OperatorContext,
        min_role: OperatorRole,
        action: impl Into<String>,
    ) -> Result<()> {
        if ctx.role < min_role {
            return Err(ApiError::forbidden(ctx.role, action));
        }
        Ok(())
    }

    fn alert_worthy(&self, from: EventStatus, to: EventStatus) -> bool {
        use EventStatus::*;
        match (from, to) {
            (Verifying, Confirmed) | (Confirmed, Escalated) => true,
            (Open, Verifying) => self.settings.dispatch.alert_on_verifying,
            _ => false,
        }
    }

    /// Fires the dispatcher for an already-committed transition. Dispatch
    /// failures (no recipients resolvable, attempt already running) are
    /// logged, not propagated: the state change has happened.
    async fn trigger_dispatch(&self, event: &Event, trigger: Trigger) -> Option<DispatchAttempt> {
        match self.dispatcher.dispatch(event, trigger).await {
            Ok(attempt) => {
                if let Err(err) = self.aggregator.record_dispatch(&event.id, &attempt.id).await {
                    warn!(event_id = %event.id, attempt_id = %attempt.id, error = %err,
                        "failed to link dispatch attempt to event");
                }
                Some(attempt)
            }
            Err(err) => {
                warn!(event_id = %event.id, error = %err, "automatic alert dispatch failed");
                None
            }
        }
    }
}

fn merge_policy(settings: &AggregatorSettings) -> MergePolicy {
    MergePolicy {
        human_proximity_m: settings.human_proximity_m,
        animal_proximity_m: settings.animal_proximity_m,
        environmental_proximity_m: settings.environmental_proximity_m,
        human_window_hours: settings.human_window_hours as i64,
        animal_window_hours: settings.animal_window_hours as i64,
        environmental_window_hours: settings.environmental_window_hours as i64,
    }
}

fn dedup_config(settings: &DedupSettings) -> DedupConfig {
    DedupConfig {
        cell_size_deg: settings.cell_size_deg,
        bucket_secs: settings.bucket_secs as i64,
        similarity_threshold: settings.similarity_threshold,
    }
}

fn retry_policy(settings: &DispatchSettings) -> RetryPolicy {
    RetryPolicy {
        max_retries: settings.max_retries,
        base_delay: Duration::from_secs(settings.base_delay_secs),
        max_delay: Duration::from_secs(settings.max_delay_secs),
        gateway_timeout: Duration::from_secs(settings.gateway_timeout_secs),
        max_in_flight: settings.max_in_flight,
    }
}
