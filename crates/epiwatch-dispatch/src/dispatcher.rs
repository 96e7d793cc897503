//! Alert dispatch engine.
//!
//! One dispatch attempt per alert-worthy transition: the recipient set is
//! resolved once and frozen, every (recipient, preferred channel) delivery
//! runs as its own task bounded by a semaphore, transient gateway errors
//! are retried with exponential backoff, and an in-flight guard enforces
//! at-most-one active attempt per event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::join_all;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use epiwatch_core::{Event, generate_id, now_utc};
use epiwatch_geo::{contains, polygons_intersect};

use crate::error::{DispatchError, Result};
use crate::gateway::{GatewayError, NotificationGateway, RecipientDirectory, RecipientQuery};
use crate::payload::AlertPayload;
use crate::policy::RetryPolicy;
use crate::types::{
    AlertChannel, AttemptStatus, DeliveryReceipt, DeliveryStatus, DispatchAttempt, DispatchStats,
    Recipient, Trigger,
};

struct AttemptHandle {
    attempt: Arc<RwLock<DispatchAttempt>>,
    cancel: Arc<AtomicBool>,
}

/// Drives multi-recipient, multi-channel delivery and owns the dispatch
/// ledger. Events reference attempts by id; they never own them.
pub struct AlertDispatcher {
    gateway: Arc<dyn NotificationGateway>,
    directory: Arc<dyn RecipientDirectory>,
    policy: RetryPolicy,
    attempts: DashMap<String, AttemptHandle>,
    /// Attempt ids per event, in creation order.
    by_event: DashMap<String, Vec<String>>,
    /// Active attempt id per event; presence means a dispatch is running.
    /// Shared with driver tasks, which clear the guard on settlement.
    in_flight: Arc<DashMap<String, String>>,
}

impl AlertDispatcher {
    pub fn new(
        gateway: Arc<dyn NotificationGateway>,
        directory: Arc<dyn RecipientDirectory>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            directory,
            policy,
            attempts: DashMap::new(),
            by_event: DashMap::new(),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Creates and starts a dispatch attempt for the given transition.
    ///
    /// Returns the initial attempt snapshot (all receipts queued); delivery
    /// proceeds in the background. Fails with `DispatchInProgress` when an
    /// attempt for this event is still running; such requests are rejected,
    /// not queued.
    pub async fn dispatch(&self, event: &Event, trigger: Trigger) -> Result<DispatchAttempt> {
        let attempt_id = generate_id();
        match self.in_flight.entry(event.id.clone()) {
            Entry::Occupied(_) => return Err(DispatchError::InProgress(event.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(attempt_id.clone());
            }
        }

        let recipients = match self.resolve_audience(event).await {
            Ok(r) => r,
            Err(err) => {
                self.in_flight.remove(&event.id);
                return Err(err);
            }
        };

        let payload = AlertPayload::render(event, &trigger);
        let receipts: Vec<DeliveryReceipt> = recipients
            .iter()
            .map(|r| DeliveryReceipt {
                recipient_id: r.id.clone(),
                channel: r.preferred_channel,
                status: DeliveryStatus::Queued,
                retry_count: 0,
                last_error: None,
                updated_at: now_utc(),
            })
            .collect();

        let attempt = DispatchAttempt {
            id: attempt_id.clone(),
            event_id: event.id.clone(),
            trigger,
            payload,
            receipts,
            status: AttemptStatus::Running,
            created_at: now_utc(),
        };
        let snapshot = attempt.clone();

        let handle = AttemptHandle {
            attempt: Arc::new(RwLock::new(attempt)),
            cancel: Arc::new(AtomicBool::new(false)),
        };
        let shared = Arc::clone(&handle.attempt);
        let cancel = Arc::clone(&handle.cancel);
        self.attempts.insert(attempt_id.clone(), handle);
        self.by_event
            .entry(event.id.clone())
            .or_default()
            .push(attempt_id.clone());

        info!(
            attempt_id = %attempt_id,
            event_id = %event.id,
            trigger = %trigger,
            recipients = recipients.len(),
            "dispatch attempt created"
        );

        self.spawn_driver(event.id.clone(), shared, cancel, recipients);
        Ok(snapshot)
    }

    fn spawn_driver(
        &self,
        event_id: String,
        attempt: Arc<RwLock<DispatchAttempt>>,
        cancel: Arc<AtomicBool>,
        recipients: Vec<Recipient>,
    ) {
        let gateway = Arc::clone(&self.gateway);
        let policy = self.policy.clone();
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            let permits = Arc::new(Semaphore::new(policy.max_in_flight));
            let mut tasks = Vec::with_capacity(recipients.len());
            for (index, recipient) in recipients.into_iter().enumerate() {
                let gateway = Arc::clone(&gateway);
                let policy = policy.clone();
                let attempt = Arc::clone(&attempt);
                let cancel = Arc::clone(&cancel);
                let permits = Arc::clone(&permits);
                tasks.push(tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await;
                    deliver_one(gateway, policy, attempt, cancel, recipient, index).await;
                }));
            }
            join_all(tasks).await;

            let stats = {
                let mut guard = attempt.write().await;
                // Drop the guard before the status becomes visible so a
                // caller that sees a settled attempt can immediately start
                // a new one.
                in_flight.remove(&event_id);
                if guard.status == AttemptStatus::Running {
                    guard.status = if cancel.load(Ordering::SeqCst) {
                        AttemptStatus::Cancelled
                    } else {
                        AttemptStatus::Complete
                    };
                }
                guard.stats()
            };
            info!(
                event_id = %event_id,
                delivered = stats.delivered,
                failed = stats.failed,
                cancelled = stats.cancelled,
                "dispatch attempt settled"
            );
        });
    }

    /// Recipient resolution, frozen per attempt: roles whose jurisdiction
    /// intersects the event zone (or contains the centroid when no zone is
    /// drawn) union anyone marked always-notify for the hazard.
    async fn resolve_audience(&self, event: &Event) -> Result<Vec<Recipient>> {
        let all = self
            .directory
            .resolve_recipients(&RecipientQuery::default())
            .await?;
        Ok(all
            .into_iter()
            .filter(|r| {
                if r.always_notify.contains(&event.hazard) {
                    return true;
                }
                match (&r.jurisdiction, &event.zone) {
                    (Some(jur), Some(zone)) => polygons_intersect(jur, zone),
                    (Some(jur), None) => contains(jur, event.centroid),
                    (None, _) => false,
                }
            })
            .collect())
    }

    /// Marks the event's active attempt cancelled. Sends already handed to
    /// the gateway complete (no recall); queued recipients and pending
    /// retries are not issued.
    pub async fn cancel(&self, event_id: &str) -> Result<DispatchAttempt> {
        let attempt_id = self
            .in_flight
            .get(event_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DispatchError::AttemptNotFound(event_id.to_string()))?;
        let (attempt, cancel) = self
            .shared_handle(&attempt_id)
            .ok_or_else(|| DispatchError::AttemptNotFound(attempt_id.clone()))?;
        cancel.store(true, Ordering::SeqCst);
        let mut guard = attempt.write().await;
        // The driver may have settled between the in-flight lookup and the
        // write lock; a completed attempt must not be relabelled.
        if guard.status != AttemptStatus::Running {
            return Err(DispatchError::AttemptSettled(attempt_id));
        }
        guard.status = AttemptStatus::Cancelled;
        for receipt in &mut guard.receipts {
            if receipt.status == DeliveryStatus::Queued {
                receipt.status = DeliveryStatus::Cancelled;
                receipt.updated_at = now_utc();
            }
        }
        warn!(event_id, attempt_id = %attempt_id, "dispatch attempt cancelled");
        Ok(guard.clone())
    }

    /// Whether a dispatch is currently running for the event.
    pub fn has_active(&self, event_id: &str) -> bool {
        self.in_flight.contains_key(event_id)
    }

    /// Snapshot of one attempt.
    pub async fn attempt(&self, attempt_id: &str) -> Result<DispatchAttempt> {
        let (attempt, _) = self
            .shared_handle(attempt_id)
            .ok_or_else(|| DispatchError::AttemptNotFound(attempt_id.to_string()))?;
        let guard = attempt.read().await;
        Ok(guard.clone())
    }

    /// All attempts for an event, in creation order.
    pub async fn history(&self, event_id: &str) -> Vec<DispatchAttempt> {
        let ids = self
            .by_event
            .get(event_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((attempt, _)) = self.shared_handle(&id) {
                out.push(attempt.read().await.clone());
            }
        }
        out
    }

    /// Clones the shared state out of the ledger entry. Map shard guards
    /// must not be held across an await, so callers lock the clone.
    fn shared_handle(
        &self,
        attempt_id: &str,
    ) -> Option<(Arc<RwLock<DispatchAttempt>>, Arc<AtomicBool>)> {
        self.attempts
            .get(attempt_id)
            .map(|handle| (Arc::clone(&handle.attempt), Arc::clone(&handle.cancel)))
    }

    /// Per-status receipt counts for one attempt.
    pub async fn stats(&self, attempt_id: &str) -> Result<DispatchStats> {
        Ok(self.attempt(attempt_id).await?.stats())
    }
}

/// Drives one recipient to a terminal receipt state.
async fn deliver_one(
    gateway: Arc<dyn NotificationGateway>,
    policy: RetryPolicy,
    attempt: Arc<RwLock<DispatchAttempt>>,
    cancel: Arc<AtomicBool>,
    recipient: Recipient,
    index: usize,
) {
    let (channel, payload_text) = {
        let guard = attempt.read().await;
        let channel = guard.receipts[index].channel;
        (channel, guard.payload.for_channel(channel))
    };

    // QR is rendered locally, not sent through the gateway.
    if channel == AlertChannel::Qr {
        set_receipt(&attempt, index, DeliveryStatus::Delivered, 0, None).await;
        return;
    }

    let mut retry = 0u32;
    loop {
        if cancel.load(Ordering::SeqCst) {
            set_receipt(&attempt, index, DeliveryStatus::Cancelled, retry, None).await;
            return;
        }
        set_receipt(&attempt, index, DeliveryStatus::Sent, retry, None).await;

        let outcome = match timeout(
            policy.gateway_timeout,
            gateway.send(&recipient, channel, &payload_text),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        };

        match outcome {
            Ok(_) => {
                set_receipt(&attempt, index, DeliveryStatus::Delivered, retry, None).await;
                return;
            }
            Err(err) if err.is_transient() && retry < policy.max_retries => {
                retry += 1;
                warn!(
                    recipient = %recipient.id,
                    channel = %channel,
                    retry,
                    error = %err,
                    "transient delivery failure, backing off"
                );
                set_receipt(
                    &attempt,
                    index,
                    DeliveryStatus::Queued,
                    retry,
                    Some(err.to_string()),
                )
                .await;
                sleep(policy.delay_for(retry)).await;
            }
            Err(err) => {
                warn!(
                    recipient = %recipient.id,
                    channel = %channel,
                    retry,
                    error = %err,
                    "delivery failed"
                );
                set_receipt(
                    &attempt,
                    index,
                    DeliveryStatus::Failed,
                    retry,
                    Some(err.to_string()),
                )
                .await;
                return;
            }
        }
    }
}

async fn set_receipt(
    attempt: &Arc<RwLock<DispatchAttempt>>,
    index: usize,
    status: DeliveryStatus,
    retry_count: u32,
    last_error: Option<String>,
) {
    let mut guard = attempt.write().await;
    let receipt = &mut guard.receipts[index];
    // Cancellation already finalized this receipt; keep the ledger stable.
    if receipt.status.is_terminal() && receipt.status != status {
        return;
    }
    receipt.status = status;
    receipt.retry_count = retry_count;
    if last_error.is_some() {
        receipt.last_error = last_error;
    }
    receipt.updated_at = now_utc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use epiwatch_core::time::parse_rfc3339;
    use epiwatch_core::{
        Coordinate, EventStatus, HazardTag, Polygon, RawReport, ReportChannel, Signal,
    };

    use crate::gateway::DeliveryConfirmation;
    use crate::types::{RecipientRole, TriggerKind};

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate { lat, lon }
    }

    fn square(south: f64, west: f64, size: f64) -> Polygon {
        Polygon::new(vec![
            c(south, west),
            c(south, west + size),
            c(south + size, west + size),
            c(south + size, west),
        ])
    }

    fn event_with_zone() -> Event {
        let signal = Signal::from_report(&RawReport {
            hazard_tag: "rabies_suspect".into(),
            lat: 4.05,
            lon: 9.70,
            description: "dog bite near market".into(),
            reporter_ref: "chw-006".into(),
            channel: ReportChannel::App,
            timestamp: parse_rfc3339("2026-08-12T09:00:00Z").unwrap(),
        })
        .unwrap();
        let mut event = Event::from_signal(&signal);
        event.zone = Some(square(4.0, 9.6, 0.2));
        event
    }

    fn trigger() -> Trigger {
        Trigger {
            from: EventStatus::Verifying,
            to: EventStatus::Confirmed,
            kind: TriggerKind::Automatic,
        }
    }

    fn recipient(id: &str, role: RecipientRole, channel: AlertChannel) -> Recipient {
        Recipient {
            id: id.into(),
            role,
            preferred_channel: channel,
            sms_number: Some("+237600000001".into()),
            push_token: Some("tok".into()),
            jurisdiction: None,
            always_notify: Vec::new(),
        }
    }

    struct FixedDirectory {
        recipients: std::sync::RwLock<Vec<Recipient>>,
    }

    impl FixedDirectory {
        fn new(recipients: Vec<Recipient>) -> Self {
            Self {
                recipients: std::sync::RwLock::new(recipients),
            }
        }
    }

    #[async_trait]
    impl RecipientDirectory for FixedDirectory {
        async fn resolve_recipients(
            &self,
            _query: &RecipientQuery,
        ) -> std::result::Result<Vec<Recipient>, DispatchError> {
            Ok(self
                .recipients
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone())
        }
    }

    /// Gateway scripted per test: counts calls, can fail or block.
    struct ScriptedGateway {
        calls: AtomicU32,
        error: Option<GatewayError>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedGateway {
        fn ok() -> Self {
            Self {
                calls: AtomicU32::new(0),
                error: None,
                gate: None,
            }
        }

        fn failing(error: GatewayError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                error: Some(error),
                gate: None,
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                error: None,
                gate: Some(gate),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationGateway for ScriptedGateway {
        async fn send(
            &self,
            _recipient: &Recipient,
            _channel: AlertChannel,
            _payload: &str,
        ) -> std::result::Result<DeliveryConfirmation, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.error {
                Some(err) => Err(err.clone()),
                None => Ok(DeliveryConfirmation::default()),
            }
        }
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            gateway_timeout: Duration::from_secs(60),
            max_in_flight: 4,
        }
    }

    async fn wait_settled(dispatcher: &AlertDispatcher, event_id: &str) {
        // Budget must cover the longest virtual-time backoff schedule any
        // paused-clock test asserts (14s at 5ms per poll).
        for _ in 0..5000 {
            if !dispatcher.has_active(event_id) {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("dispatch did not settle");
    }

    /// Like `wait_settled`, but re-notifies the gate each poll so a delivery
    /// task that parks in `Notify::notified` after the first notification is
    /// not left waiting on a lost wakeup.
    async fn wait_settled_gated(dispatcher: &AlertDispatcher, event_id: &str, gate: &Notify) {
        for _ in 0..500 {
            if !dispatcher.has_active(event_id) {
                return;
            }
            gate.notify_waiters();
            sleep(Duration::from_millis(5)).await;
        }
        panic!("dispatch did not settle");
    }

    #[tokio::test]
    async fn test_dispatch_targets_zone_and_always_notify() {
        let mut in_zone = recipient("dho-1", RecipientRole::DistrictHealthOfficer, AlertChannel::Sms);
        in_zone.jurisdiction = Some(square(4.0, 9.6, 0.3));
        let mut out_of_zone =
            recipient("dho-2", RecipientRole::DistrictHealthOfficer, AlertChannel::Sms);
        out_of_zone.jurisdiction = Some(square(10.0, 10.0, 0.5));
        let mut always = recipient("vet-1", RecipientRole::VeterinaryOfficer, AlertChannel::Push);
        always.always_notify = vec![HazardTag::RabiesSuspect];

        let gateway = Arc::new(ScriptedGateway::ok());
        let dispatcher = AlertDispatcher::new(
            gateway.clone(),
            Arc::new(FixedDirectory::new(vec![in_zone, out_of_zone, always])),
            quick_policy(),
        );

        let event = event_with_zone();
        let attempt = dispatcher.dispatch(&event, trigger()).await.unwrap();
        let mut ids: Vec<_> = attempt
            .receipts
            .iter()
            .map(|r| r.recipient_id.clone())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["dho-1", "vet-1"]);

        wait_settled(&dispatcher, &event.id).await;
        let settled = dispatcher.attempt(&attempt.id).await.unwrap();
        assert_eq!(settled.status, AttemptStatus::Complete);
        assert_eq!(settled.stats().delivered, 2);
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retried_three_times_with_growing_delay() {
        let gateway = Arc::new(ScriptedGateway::failing(GatewayError::Timeout));
        let target = {
            let mut r = recipient("dho-1", RecipientRole::DistrictHealthOfficer, AlertChannel::Sms);
            r.jurisdiction = Some(square(4.0, 9.6, 0.3));
            r
        };
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            gateway_timeout: Duration::from_secs(5),
            max_in_flight: 4,
        };
        let dispatcher = AlertDispatcher::new(
            gateway.clone(),
            Arc::new(FixedDirectory::new(vec![target])),
            policy,
        );

        let event = event_with_zone();
        let started = tokio::time::Instant::now();
        let attempt = dispatcher.dispatch(&event, trigger()).await.unwrap();
        wait_settled(&dispatcher, &event.id).await;

        let settled = dispatcher.attempt(&attempt.id).await.unwrap();
        assert_eq!(settled.receipts[0].status, DeliveryStatus::Failed);
        assert_eq!(settled.receipts[0].retry_count, 3);
        assert!(settled.receipts[0].last_error.as_deref().unwrap().contains("timeout"));
        // Initial send plus exactly 3 retries.
        assert_eq!(gateway.call_count(), 4);
        // Backoff 2s + 4s + 8s elapsed between sends.
        assert!(started.elapsed() >= Duration::from_secs(14));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let gateway = Arc::new(ScriptedGateway::failing(GatewayError::InvalidContact(
            "bad number".into(),
        )));
        let target = {
            let mut r = recipient("dho-1", RecipientRole::DistrictHealthOfficer, AlertChannel::Sms);
            r.jurisdiction = Some(square(4.0, 9.6, 0.3));
            r
        };
        let dispatcher = AlertDispatcher::new(
            gateway.clone(),
            Arc::new(FixedDirectory::new(vec![target])),
            quick_policy(),
        );

        let event = event_with_zone();
        let attempt = dispatcher.dispatch(&event, trigger()).await.unwrap();
        wait_settled(&dispatcher, &event.id).await;

        let settled = dispatcher.attempt(&attempt.id).await.unwrap();
        assert_eq!(settled.receipts[0].status, DeliveryStatus::Failed);
        assert_eq!(settled.receipts[0].retry_count, 0);
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_guard_rejects_second_dispatch() {
        let gate = Arc::new(Notify::new());
        let gateway = Arc::new(ScriptedGateway::gated(gate.clone()));
        let target = {
            let mut r = recipient("dho-1", RecipientRole::DistrictHealthOfficer, AlertChannel::Sms);
            r.jurisdiction = Some(square(4.0, 9.6, 0.3));
            r
        };
        let dispatcher = AlertDispatcher::new(
            gateway,
            Arc::new(FixedDirectory::new(vec![target])),
            quick_policy(),
        );

        let event = event_with_zone();
        dispatcher.dispatch(&event, trigger()).await.unwrap();
        let err = dispatcher.dispatch(&event, trigger()).await.unwrap_err();
        assert!(matches!(err, DispatchError::InProgress(_)));

        wait_settled_gated(&dispatcher, &event.id, &gate).await;
        // After settling, a rebroadcast is accepted again.
        assert!(dispatcher.dispatch(&event, trigger()).await.is_ok());
        wait_settled_gated(&dispatcher, &event.id, &gate).await;
        assert_eq!(dispatcher.history(&event.id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_recipient_set_frozen_at_creation() {
        let mut first = recipient("dho-1", RecipientRole::DistrictHealthOfficer, AlertChannel::Sms);
        first.jurisdiction = Some(square(4.0, 9.6, 0.3));
        let directory = Arc::new(FixedDirectory::new(vec![first.clone()]));
        let dispatcher = AlertDispatcher::new(
            Arc::new(ScriptedGateway::ok()),
            directory.clone(),
            quick_policy(),
        );

        let event = event_with_zone();
        let attempt = dispatcher.dispatch(&event, trigger()).await.unwrap();
        wait_settled(&dispatcher, &event.id).await;

        // Jurisdiction data changes after the attempt was created.
        let mut second = recipient("dho-9", RecipientRole::DistrictHealthOfficer, AlertChannel::Sms);
        second.jurisdiction = Some(square(4.0, 9.6, 0.3));
        directory
            .recipients
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(second);

        let frozen = dispatcher.attempt(&attempt.id).await.unwrap();
        assert_eq!(frozen.receipts.len(), 1);
        assert_eq!(frozen.receipts[0].recipient_id, "dho-1");
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_complete_and_drops_pending() {
        let gate = Arc::new(Notify::new());
        let gateway = Arc::new(ScriptedGateway::gated(gate.clone()));
        let mut recipients = Vec::new();
        for i in 0..3 {
            let mut r = recipient(
                &format!("dho-{i}"),
                RecipientRole::DistrictHealthOfficer,
                AlertChannel::Sms,
            );
            r.jurisdiction = Some(square(4.0, 9.6, 0.3));
            recipients.push(r);
        }
        let policy = RetryPolicy {
            max_in_flight: 1,
            ..quick_policy()
        };
        let dispatcher = AlertDispatcher::new(
            gateway.clone(),
            Arc::new(FixedDirectory::new(recipients)),
            policy,
        );

        let event = event_with_zone();
        let attempt = dispatcher.dispatch(&event, trigger()).await.unwrap();
        // Give the first delivery task a chance to reach the gateway.
        for _ in 0..100 {
            if gateway.call_count() == 1 {
                break;
            }
            sleep(Duration::from_millis(2)).await;
        }

        let cancelled = dispatcher.cancel(&event.id).await.unwrap();
        assert_eq!(cancelled.status, AttemptStatus::Cancelled);
        gate.notify_waiters();
        wait_settled(&dispatcher, &event.id).await;

        let settled = dispatcher.attempt(&attempt.id).await.unwrap();
        assert_eq!(settled.status, AttemptStatus::Cancelled);
        let stats = settled.stats();
        // The in-flight send completed; nothing new was issued.
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.cancelled, 2);
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_settlement_leaves_attempt_complete() {
        let gateway = Arc::new(ScriptedGateway::ok());
        let target = {
            let mut r = recipient("dho-1", RecipientRole::DistrictHealthOfficer, AlertChannel::Sms);
            r.jurisdiction = Some(square(4.0, 9.6, 0.3));
            r
        };
        let dispatcher = AlertDispatcher::new(
            gateway,
            Arc::new(FixedDirectory::new(vec![target])),
            quick_policy(),
        );

        let event = event_with_zone();
        let attempt = dispatcher.dispatch(&event, trigger()).await.unwrap();
        wait_settled(&dispatcher, &event.id).await;

        assert!(dispatcher.cancel(&event.id).await.is_err());
        let settled = dispatcher.attempt(&attempt.id).await.unwrap();
        assert_eq!(settled.status, AttemptStatus::Complete);
        assert_eq!(settled.stats().delivered, 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_ledger_reads_interleave_with_new_dispatches() {
        let gate = Arc::new(Notify::new());
        let gateway = Arc::new(ScriptedGateway::gated(gate.clone()));
        let target = {
            let mut r = recipient("dho-1", RecipientRole::DistrictHealthOfficer, AlertChannel::Sms);
            r.jurisdiction = Some(square(4.0, 9.6, 0.3));
            r
        };
        let dispatcher = AlertDispatcher::new(
            gateway,
            Arc::new(FixedDirectory::new(vec![target])),
            quick_policy(),
        );

        let first = event_with_zone();
        let attempt = dispatcher.dispatch(&first, trigger()).await.unwrap();

        // Ledger reads and fresh dispatches for other events must make
        // progress on a single worker thread while the first attempt is
        // parked inside the gateway.
        let interleaved = timeout(Duration::from_secs(5), async {
            for _ in 0..8 {
                let other = event_with_zone();
                dispatcher.dispatch(&other, trigger()).await.unwrap();
                dispatcher.attempt(&attempt.id).await.unwrap();
                dispatcher.history(&first.id).await;
            }
        })
        .await;
        assert!(interleaved.is_ok());

        for _ in 0..500 {
            if !dispatcher.has_active(&first.id) {
                break;
            }
            gate.notify_waiters();
            sleep(Duration::from_millis(2)).await;
        }
        assert!(!dispatcher.has_active(&first.id));
    }

    #[tokio::test]
    async fn test_qr_channel_renders_locally() {
        let gateway = Arc::new(ScriptedGateway::ok());
        let mut r = recipient("pub-1", RecipientRole::PublicAlertList, AlertChannel::Qr);
        r.jurisdiction = Some(square(4.0, 9.6, 0.3));
        let dispatcher = AlertDispatcher::new(
            gateway.clone(),
            Arc::new(FixedDirectory::new(vec![r])),
            quick_policy(),
        );

        let event = event_with_zone();
        let attempt = dispatcher.dispatch(&event, trigger()).await.unwrap();
        wait_settled(&dispatcher, &event.id).await;

        let settled = dispatcher.attempt(&attempt.id).await.unwrap();
        assert_eq!(settled.receipts[0].status, DeliveryStatus::Delivered);
        // No gateway involvement for the shareable QR.
        assert_eq!(gateway.call_count(), 0);
        assert!(settled.payload.qr_text.contains(&event.id));
    }
}
