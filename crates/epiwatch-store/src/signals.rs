//! SignalStore facade: validation, duplicate flagging, append.

use std::sync::Arc;

use tracing::{debug, info};

use epiwatch_core::{RawReport, Signal};

use crate::dedup::{DedupConfig, DedupIndex};
use crate::error::StoreError;
use crate::traits::SignalStorage;

/// Front door for raw reports. Validates, computes the advisory duplicate
/// flag and appends to the immutable log.
pub struct SignalStore {
    storage: Arc<dyn SignalStorage>,
    dedup: DedupIndex,
}

impl SignalStore {
    pub fn new(storage: Arc<dyn SignalStorage>, dedup_cfg: DedupConfig) -> Self {
        Self {
            storage,
            dedup: DedupIndex::new(dedup_cfg),
        }
    }

    /// Ingests a raw report. Fails with a validation error on out-of-range
    /// coordinates or an unknown hazard tag; otherwise the signal is
    /// appended and returned, possibly flagged as a probable duplicate.
    pub async fn ingest(&self, report: &RawReport) -> Result<Signal, StoreError> {
        let mut signal = Signal::from_report(report)?;
        if let Some(prior) = self.dedup.check_and_record(&signal) {
            debug!(signal_id = %signal.id, duplicate_of = %prior, "probable duplicate");
            signal.probable_duplicate_of = Some(prior);
        }
        self.storage.append(signal.clone()).await?;
        info!(
            signal_id = %signal.id,
            hazard = %signal.hazard,
            channel = %signal.channel,
            duplicate = signal.probable_duplicate_of.is_some(),
            "signal ingested"
        );
        Ok(signal)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Signal>, StoreError> {
        self.storage.get(id).await
    }

    pub async fn all(&self) -> Result<Vec<Signal>, StoreError> {
        self.storage.all().await
    }

    pub async fn count(&self) -> usize {
        self.storage.count().await
    }
}
