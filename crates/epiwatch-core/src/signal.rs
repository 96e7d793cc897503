use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::error::{CoreError, Result};
use crate::geo::Coordinate;
use crate::hazard::HazardTag;
use crate::id::generate_id;

/// Channel a raw report arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportChannel {
    App,
    Sms,
    Hotline,
}

impl fmt::Display for ReportChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App => write!(f, "app"),
            Self::Sms => write!(f, "sms"),
            Self::Hotline => write!(f, "hotline"),
        }
    }
}

/// A raw community report as received on the ingestion boundary.
/// Hazard tag and coordinates are unvalidated strings/floats here; they are
/// checked when the report becomes a [`Signal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReport {
    pub hazard_tag: String,
    pub lat: f64,
    pub lon: f64,
    pub description: String,
    pub reporter_ref: String,
    pub channel: ReportChannel,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// A single validated report. Immutable once created; the store is
/// append-only and signals are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub reporter_ref: String,
    pub hazard: HazardTag,
    pub coordinate: Coordinate,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
    pub channel: ReportChannel,
    /// Advisory duplicate flag: set when an earlier signal shares the dedup
    /// fingerprint and a highly similar description. Both signals are kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probable_duplicate_of: Option<String>,
}

impl Signal {
    /// Validates a raw report into a signal. Fails with a validation error
    /// on an unknown hazard tag, out-of-range coordinates or an empty
    /// description.
    pub fn from_report(report: &RawReport) -> Result<Self> {
        let hazard = HazardTag::from_str(&report.hazard_tag)?;
        let coordinate = Coordinate::new(report.lat, report.lon)?;
        if report.description.trim().is_empty() {
            return Err(CoreError::invalid_report("description must not be empty"));
        }
        if report.reporter_ref.trim().is_empty() {
            return Err(CoreError::invalid_report("reporter_ref must not be empty"));
        }
        Ok(Self {
            id: generate_id(),
            reporter_ref: report.reporter_ref.clone(),
            hazard,
            coordinate,
            description: report.description.clone(),
            received_at: report.timestamp,
            channel: report.channel,
            probable_duplicate_of: None,
        })
    }
}
