//! In-memory spatial index over reported signal coordinates and drawn
//! outbreak zone polygons.
//!
//! Reads are unbounded and concurrent; writes take a short exclusive
//! section scoped to the affected map only. At surveillance scale (tens of
//! thousands of points per deployment) a guarded linear scan beats tree
//! maintenance, and distance ordering stays exact.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use epiwatch_core::{Coordinate, Polygon};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance::distance_m;
use crate::error::Result;
use crate::polygon::{contains, validate_polygon};

/// One hit from a radius query, nearest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyHit {
    pub signal_id: String,
    pub distance_m: f64,
}

struct PointEntry {
    signal_id: String,
    coordinate: Coordinate,
}

/// Spatial index over signal points and zone polygons.
pub struct GeoIndex {
    points: RwLock<Vec<PointEntry>>,
    zones: RwLock<HashMap<String, Polygon>>,
    flat_projection_max_m: f64,
}

impl GeoIndex {
    /// `flat_projection_max_m` bounds the equirectangular fast path for
    /// distance computation (see the distance module).
    pub fn new(flat_projection_max_m: f64) -> Self {
        Self {
            points: RwLock::new(Vec::new()),
            zones: RwLock::new(HashMap::new()),
            flat_projection_max_m,
        }
    }

    /// Inserts a signal point. Points are never removed; signals are
    /// immutable history.
    pub fn insert(&self, signal_id: impl Into<String>, coordinate: Coordinate) {
        let mut points = self.points.write().unwrap_or_else(PoisonError::into_inner);
        points.push(PointEntry {
            signal_id: signal_id.into(),
            coordinate,
        });
    }

    /// Signal ids within `radius_m` of `origin`, nearest first.
    pub fn nearby(&self, origin: Coordinate, radius_m: f64) -> Vec<NearbyHit> {
        let points = self.points.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<NearbyHit> = points
            .iter()
            .filter_map(|entry| {
                let d = distance_m(origin, entry.coordinate, self.flat_projection_max_m);
                (d <= radius_m).then(|| NearbyHit {
                    signal_id: entry.signal_id.clone(),
                    distance_m: d,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        hits
    }

    /// Registers or replaces a zone polygon. The polygon is validated;
    /// degenerate geometry is rejected, the previous zone (if any) kept.
    pub fn upsert_zone(&self, zone_id: impl Into<String>, polygon: Polygon) -> Result<()> {
        validate_polygon(&polygon)?;
        let zone_id = zone_id.into();
        debug!(zone_id = %zone_id, vertices = polygon.outer.len(), "zone registered");
        let mut zones = self.zones.write().unwrap_or_else(PoisonError::into_inner);
        zones.insert(zone_id, polygon);
        Ok(())
    }

    /// Ids of all zones whose polygon contains the coordinate (even-odd
    /// rule), in unspecified order.
    pub fn containing_zones(&self, point: Coordinate) -> Vec<String> {
        let zones = self.zones.read().unwrap_or_else(PoisonError::into_inner);
        zones
            .iter()
            .filter(|(_, polygon)| contains(polygon, point))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Current polygon of a zone, if drawn.
    pub fn zone(&self, zone_id: &str) -> Option<Polygon> {
        let zones = self.zones.read().unwrap_or_else(PoisonError::into_inner);
        zones.get(zone_id).cloned()
    }

    pub fn point_count(&self) -> usize {
        self.points.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
