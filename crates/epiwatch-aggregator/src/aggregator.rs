//! The merge fold: every validated signal either joins an existing event
//! or opens a new one.
//!
//! Folds are serialized per hazard tag so concurrent arrivals of signals
//! that belong together can never open two events for one cluster, while
//! unrelated hazards proceed independently. Operator writes on a single
//! event are serialized by a per-event lock; there is no global lock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use epiwatch_core::{Event, HazardTag, Signal};
use epiwatch_geo::{GeoIndex, contains, haversine_m};
use epiwatch_store::{EventFilter, EventStorage, StoreError};

use crate::error::Result;
use crate::policy::{MergePolicy, recompute_severity};

/// Result of folding one signal.
#[derive(Debug, Clone)]
pub struct FoldOutcome {
    pub event: Event,
    /// False when the signal opened a new event.
    pub merged: bool,
    /// True when several events qualified and recency decided the merge.
    pub ambiguous: bool,
}

/// Owns the event state machine and the signal-to-event clustering fold.
pub struct EventAggregator {
    pub(crate) events: Arc<dyn EventStorage>,
    pub(crate) geo: Arc<GeoIndex>,
    pub(crate) policy: MergePolicy,
    fold_locks: DashMap<HazardTag, Arc<Mutex<()>>>,
    pub(crate) event_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl EventAggregator {
    pub fn new(events: Arc<dyn EventStorage>, geo: Arc<GeoIndex>, policy: MergePolicy) -> Self {
        Self {
            events,
            geo,
            policy,
            fold_locks: DashMap::new(),
            event_locks: DashMap::new(),
        }
    }

    // Lock granularity is the whole hazard tag: the candidate scan and the
    // event insert must be atomic, or two concurrent folds of one cluster
    // would each open an event. Fold volume is low enough that hazard-wide
    // serialization is acceptable; shard the lock by grid cell if it stops
    // being so.
    fn fold_lock(&self, hazard: HazardTag) -> Arc<Mutex<()>> {
        self.fold_locks
            .entry(hazard)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) fn event_lock(&self, event_id: &str) -> Arc<Mutex<()>> {
        self.event_locks
            .entry(event_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Folds a validated signal into the event set: merge into the single
    /// qualifying candidate, merge into the most recently updated of
    /// several (flagging the event for review), or open a new event.
    pub async fn fold(&self, signal: &Signal) -> Result<FoldOutcome> {
        let lock = self.fold_lock(signal.hazard);
        let _fold_guard = lock.lock().await;

        self.geo.insert(signal.id.clone(), signal.coordinate);

        let candidates = self.candidates(signal).await?;
        match candidates.len() {
            0 => {
                let mut event = Event::from_signal(signal);
                let severity = recompute_severity(event.severity, 1, signal.hazard.is_high_risk());
                if severity != event.severity {
                    event.record_severity(severity, "system", None);
                }
                let event = self.events.insert(event).await?;
                info!(
                    event_id = %event.id,
                    signal_id = %signal.id,
                    hazard = %signal.hazard,
                    "signal opened new event"
                );
                Ok(FoldOutcome {
                    event,
                    merged: false,
                    ambiguous: false,
                })
            }
            n => {
                // Candidates arrive most recently updated first; recency is
                // the deterministic tie-break when several qualify.
                let ambiguous = n > 1;
                let target = candidates[0].id.clone();
                if ambiguous {
                    warn!(
                        event_id = %target,
                        signal_id = %signal.id,
                        candidates = n,
                        "ambiguous merge, flagged for operator review"
                    );
                }
                let event = self.merge_into(&target, signal, ambiguous).await?;
                Ok(FoldOutcome {
                    event,
                    merged: true,
                    ambiguous,
                })
            }
        }
    }

    /// Events that qualify for merging: still accepting signals, same
    /// hazard tag, most recent contributing signal inside the hazard time
    /// window, and the signal within the proximity threshold of the
    /// centroid or inside the drawn zone.
    async fn candidates(&self, signal: &Signal) -> Result<Vec<Event>> {
        // Linear scan over the live event list. Active events number in the
        // hundreds at most; switch to a geo-index pre-filter before that
        // assumption breaks.
        let all = self.events.list(&EventFilter::default()).await?;
        let proximity = self.policy.proximity_m(signal.hazard);
        let window = self.policy.window(signal.hazard);
        Ok(all
            .into_iter()
            .filter(|event| {
                if !event.status.accepts_signals() || event.hazard != signal.hazard {
                    return false;
                }
                let age = signal.received_at - event.last_signal_at;
                if age.abs() > window {
                    return false;
                }
                if haversine_m(event.centroid, signal.coordinate) <= proximity {
                    return true;
                }
                event
                    .zone
                    .as_ref()
                    .is_some_and(|zone| contains(zone, signal.coordinate))
            })
            .collect())
    }

    async fn merge_into(&self, event_id: &str, signal: &Signal, ambiguous: bool) -> Result<Event> {
        let lock = self.event_lock(event_id);
        let _event_guard = lock.lock().await;

        // An operator edit can land between our read and write; the merge
        // re-reads and retries on a revision conflict.
        let mut last_conflict = StoreError::stale_write(event_id, 0, 0);
        for _ in 0..3 {
            let mut event = self
                .events
                .get(event_id)
                .await?
                .ok_or_else(|| StoreError::not_found("Event", event_id))?;
            let revision = event.revision;
            event.absorb_signal(signal);
            if ambiguous {
                event.needs_review = true;
            }
            let severity = recompute_severity(
                event.severity,
                event.signal_ids.len(),
                event.hazard.is_high_risk(),
            );
            if severity != event.severity {
                event.record_severity(severity, "system", None);
            }
            match self.events.update(event, revision).await {
                Ok(updated) => {
                    info!(
                        event_id = %updated.id,
                        signal_id = %signal.id,
                        signals = updated.signal_ids.len(),
                        severity = %updated.severity,
                        "signal merged into event"
                    );
                    return Ok(updated);
                }
                Err(err @ StoreError::StaleWrite { .. }) => {
                    last_conflict = err;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(last_conflict.into())
    }
}
