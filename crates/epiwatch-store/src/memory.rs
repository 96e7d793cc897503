//! In-memory storage backends.
//!
//! The signal log uses a papaya lock-free map for the hot read path plus a
//! small receipt-order vector; the event map sits behind a `tokio::sync`
//! RwLock because the revision compare-and-swap needs a short exclusive
//! section.

use std::collections::HashMap;
use std::sync::RwLock as StdRwLock;

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use tokio::sync::RwLock;

use epiwatch_core::{Event, Signal};

use crate::error::StoreError;
use crate::traits::{EventFilter, EventStorage, SignalStorage};

/// Append-only in-memory signal log.
#[derive(Default)]
pub struct InMemorySignalStore {
    data: PapayaHashMap<String, Signal>,
    order: StdRwLock<Vec<String>>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStorage for InMemorySignalStore {
    async fn append(&self, signal: Signal) -> Result<(), StoreError> {
        let guard = self.data.pin();
        if guard.get(&signal.id).is_some() {
            return Err(StoreError::already_exists("Signal", signal.id));
        }
        let id = signal.id.clone();
        guard.insert(id.clone(), signal);
        self.order
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Signal>, StoreError> {
        let guard = self.data.pin();
        Ok(guard.get(id).cloned())
    }

    async fn all(&self) -> Result<Vec<Signal>, StoreError> {
        let order = self
            .order
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        let guard = self.data.pin();
        Ok(order.iter().filter_map(|id| guard.get(id).cloned()).collect())
    }

    async fn count(&self) -> usize {
        self.order
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

/// In-memory event store enforcing the optimistic-revision write discipline.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<HashMap<String, Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStorage for InMemoryEventStore {
    async fn insert(&self, mut event: Event) -> Result<Event, StoreError> {
        let mut events = self.events.write().await;
        if events.contains_key(&event.id) {
            return Err(StoreError::already_exists("Event", event.id));
        }
        event.revision = 0;
        events.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    async fn get(&self, id: &str) -> Result<Option<Event>, StoreError> {
        let events = self.events.read().await;
        Ok(events.get(id).cloned())
    }

    async fn update(&self, mut event: Event, expected_revision: u64) -> Result<Event, StoreError> {
        let mut events = self.events.write().await;
        let current = events
            .get(&event.id)
            .ok_or_else(|| StoreError::not_found("Event", event.id.clone()))?;
        if current.revision != expected_revision {
            return Err(StoreError::stale_write(
                event.id,
                expected_revision,
                current.revision,
            ));
        }
        event.revision = expected_revision + 1;
        events.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    async fn list(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let events = self.events.read().await;
        let mut matched: Vec<Event> = events
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epiwatch_core::{EventStatus, RawReport, ReportChannel, Severity};
    use epiwatch_core::time::parse_rfc3339;

    fn signal(lat: f64, lon: f64, desc: &str) -> Signal {
        Signal::from_report(&RawReport {
            hazard_tag: "animal_dieoff".into(),
            lat,
            lon,
            description: desc.into(),
            reporter_ref: "chw-002".into(),
            channel: ReportChannel::Hotline,
            timestamp: parse_rfc3339("2026-08-12T08:00:00Z").unwrap(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_signal_store_preserves_receipt_order() {
        let store = InMemorySignalStore::new();
        let a = signal(4.0, 9.0, "dead chickens in yard");
        let b = signal(4.1, 9.1, "more dead birds");
        store.append(a.clone()).await.unwrap();
        store.append(b.clone()).await.unwrap();
        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a.id);
        assert_eq!(all[1].id, b.id);
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn test_signal_store_rejects_duplicate_id() {
        let store = InMemorySignalStore::new();
        let s = signal(4.0, 9.0, "dead chickens");
        store.append(s.clone()).await.unwrap();
        assert!(matches!(
            store.append(s).await,
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_event_update_bumps_revision() {
        let store = InMemoryEventStore::new();
        let event = Event::from_signal(&signal(4.0, 9.0, "dead chickens"));
        let stored = store.insert(event).await.unwrap();
        assert_eq!(stored.revision, 0);

        let mut edited = stored.clone();
        edited.record_status(EventStatus::Verifying, "op-1", None);
        let updated = store.update(edited, 0).await.unwrap();
        assert_eq!(updated.revision, 1);
    }

    #[tokio::test]
    async fn test_stale_write_rejected_and_event_untouched() {
        let store = InMemoryEventStore::new();
        let stored = store
            .insert(Event::from_signal(&signal(4.0, 9.0, "dead chickens")))
            .await
            .unwrap();

        let mut first = stored.clone();
        first.record_status(EventStatus::Verifying, "op-1", None);
        store.update(first, 0).await.unwrap();

        // Second writer still holds revision 0.
        let mut second = stored.clone();
        second.record_status(EventStatus::Dismissed, "op-2", Some("noise".into()));
        let err = store.update(second, 0).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::StaleWrite { expected: 0, actual: 1, .. }
        ));

        let current = store.get(&stored.id).await.unwrap().unwrap();
        assert_eq!(current.status, EventStatus::Verifying);
        assert_eq!(current.revision, 1);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_by_update_recency() {
        let store = InMemoryEventStore::new();
        let older = store
            .insert(Event::from_signal(&signal(4.0, 9.0, "dead chickens")))
            .await
            .unwrap();
        let newer = store
            .insert(Event::from_signal(&signal(4.5, 9.5, "dead goats")))
            .await
            .unwrap();

        let mut bump = newer.clone();
        bump.record_severity(Severity::Medium, "system", None);
        store.update(bump, 0).await.unwrap();

        let all = store.list(&EventFilter::default()).await.unwrap();
        assert_eq!(all[0].id, newer.id);
        assert_eq!(all[1].id, older.id);

        let filter = EventFilter {
            severity_at_least: Some(Severity::Medium),
            ..Default::default()
        };
        let severe = store.list(&filter).await.unwrap();
        assert_eq!(severe.len(), 1);
        assert_eq!(severe[0].id, newer.id);
    }
}
