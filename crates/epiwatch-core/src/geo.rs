use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// A WGS84 point coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, [-90, 90].
    pub lat: f64,
    /// Longitude in degrees, [-180, 180].
    pub lon: f64,
}

impl Coordinate {
    /// Creates a coordinate, rejecting non-finite or out-of-range values.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(CoreError::invalid_coordinate(format!(
                "non-finite coordinate ({lat}, {lon})"
            )));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CoreError::invalid_coordinate(format!(
                "latitude {lat} out of range [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(CoreError::invalid_coordinate(format!(
                "longitude {lon} out of range [-180, 180]"
            )));
        }
        Ok(Self { lat, lon })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lon)
    }
}

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn contains(&self, point: Coordinate) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lon >= self.west
            && point.lon <= self.east
    }
}

/// One closed ring of a polygon. Vertices are listed without repeating the
/// first one; the closing edge is implied.
pub type Ring = Vec<Coordinate>;

/// A polygon geometry with optional holes (administrative exclusions).
///
/// Structural validity (vertex count, coordinate ranges, self-intersection)
/// is enforced by the geo crate at the zone-write boundary; this type is
/// only the serialized shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub outer: Ring,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub holes: Vec<Ring>,
}

impl Polygon {
    pub fn new(outer: Ring) -> Self {
        Self {
            outer,
            holes: Vec::new(),
        }
    }

    pub fn with_holes(outer: Ring, holes: Vec<Ring>) -> Self {
        Self { outer, holes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(4.05, 9.70).is_ok());
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_bounding_box_contains() {
        let bbox = BoundingBox::new(9.0, 3.5, 10.5, 4.5);
        assert!(bbox.contains(Coordinate { lat: 4.05, lon: 9.70 }));
        assert!(!bbox.contains(Coordinate { lat: 5.0, lon: 9.70 }));
        assert!(!bbox.contains(Coordinate { lat: 4.05, lon: 11.0 }));
    }

    #[test]
    fn test_polygon_serde_skips_empty_holes() {
        let poly = Polygon::new(vec![
            Coordinate { lat: 0.0, lon: 0.0 },
            Coordinate { lat: 0.0, lon: 1.0 },
            Coordinate { lat: 1.0, lon: 0.0 },
        ]);
        let json = serde_json::to_string(&poly).unwrap();
        assert!(!json.contains("holes"));
    }
}
