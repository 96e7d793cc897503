//! Dedup fingerprinting for incoming signals.
//!
//! The fingerprint is (rounded coordinate cell, hazard tag, time bucket).
//! Two reports sharing a fingerprint whose normalized descriptions are
//! similar enough are flagged as probable duplicates. The flag is advisory
//! metadata for the aggregator; both reports are preserved for audit.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use epiwatch_core::{Coordinate, HazardTag, Signal};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Tunables for the duplicate fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Cell edge in degrees; 0.01° is roughly 1.1 km at the equator.
    pub cell_size_deg: f64,
    /// Time bucket width in seconds.
    pub bucket_secs: i64,
    /// Jaccard word-set similarity at or above which a report within the
    /// same fingerprint is flagged.
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            cell_size_deg: 0.01,
            bucket_secs: 6 * 3600,
            similarity_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Fingerprint {
    cell_lat: i64,
    cell_lon: i64,
    hazard: HazardTag,
    bucket: i64,
}

fn fingerprint(cfg: &DedupConfig, hazard: HazardTag, at: Coordinate, ts: OffsetDateTime) -> Fingerprint {
    Fingerprint {
        cell_lat: (at.lat / cfg.cell_size_deg).floor() as i64,
        cell_lon: (at.lon / cfg.cell_size_deg).floor() as i64,
        hazard,
        bucket: ts.unix_timestamp().div_euclid(cfg.bucket_secs),
    }
}

/// Lowercased alphanumeric word set used for description similarity.
fn normalize_words(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Tracks fingerprints of everything ingested so far and answers "is this
/// probably a duplicate of an earlier signal".
pub struct DedupIndex {
    cfg: DedupConfig,
    seen: RwLock<HashMap<Fingerprint, Vec<(String, BTreeSet<String>)>>>,
}

impl DedupIndex {
    pub fn new(cfg: DedupConfig) -> Self {
        Self {
            cfg,
            seen: RwLock::new(HashMap::new()),
        }
    }

    /// Records the signal's fingerprint and returns the id of the earliest
    /// prior signal it likely duplicates, if any.
    pub fn check_and_record(&self, signal: &Signal) -> Option<String> {
        let key = fingerprint(
            &self.cfg,
            signal.hazard,
            signal.coordinate,
            signal.received_at,
        );
        let words = normalize_words(&signal.description);
        let mut seen = self.seen.write().unwrap_or_else(PoisonError::into_inner);
        let bucket = seen.entry(key).or_default();
        let duplicate_of = bucket
            .iter()
            .find(|(_, prior)| jaccard(prior, &words) >= self.cfg.similarity_threshold)
            .map(|(id, _)| id.clone());
        bucket.push((signal.id.clone(), words));
        duplicate_of
    }
}
