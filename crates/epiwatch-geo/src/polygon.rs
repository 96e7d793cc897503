//! Polygon geometry: validation at the zone-write boundary and even-odd
//! containment used by both zone lookup and recipient jurisdiction checks.

use epiwatch_core::{BoundingBox, Coordinate, Polygon, Ring};

use crate::error::{GeoError, Result};

/// Validates a polygon for use as a zone or jurisdiction geometry.
///
/// Rules: every ring (outer and holes) needs at least 3 vertices, all
/// coordinates must be finite and in WGS84 range, no zero-length edges, and
/// no ring may self-intersect. Degenerate geometry is rejected here rather
/// than silently processed downstream.
pub fn validate_polygon(polygon: &Polygon) -> Result<()> {
    validate_ring(&polygon.outer, "outer ring")?;
    for (i, hole) in polygon.holes.iter().enumerate() {
        validate_ring(hole, &format!("hole {i}"))?;
    }
    Ok(())
}

fn validate_ring(ring: &Ring, label: &str) -> Result<()> {
    if ring.len() < 3 {
        return Err(GeoError::invalid_polygon(format!(
            "{label} has {} vertices, need at least 3",
            ring.len()
        )));
    }
    for c in ring {
        Coordinate::new(c.lat, c.lon)?;
    }
    let n = ring.len();
    for i in 0..n {
        let (a1, a2) = (ring[i], ring[(i + 1) % n]);
        if a1 == a2 {
            return Err(GeoError::invalid_polygon(format!(
                "{label} has a zero-length edge at vertex {i}"
            )));
        }
        for j in (i + 1)..n {
            // Adjacent edges share a vertex and are allowed to touch there.
            if j == i || (j + 1) % n == i || (i + 1) % n == j {
                continue;
            }
            let (b1, b2) = (ring[j], ring[(j + 1) % n]);
            if segments_intersect(a1, a2, b1, b2) {
                return Err(GeoError::invalid_polygon(format!(
                    "{label} self-intersects between edges {i} and {j}"
                )));
            }
        }
    }
    Ok(())
}

/// Even-odd point-in-polygon over all rings. A point inside the outer ring
/// and inside a hole crosses an odd number of rings twice, so the same rule
/// handles holes without a special case.
pub fn contains(polygon: &Polygon, point: Coordinate) -> bool {
    let mut inside = ring_contains(&polygon.outer, point);
    for hole in &polygon.holes {
        if ring_contains(hole, point) {
            inside = !inside;
        }
    }
    inside
}

fn ring_contains(ring: &Ring, p: Coordinate) -> bool {
    let n = ring.len();
    let mut inside = false;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        if (a.lat > p.lat) != (b.lat > p.lat) {
            let t = (p.lat - a.lat) / (b.lat - a.lat);
            let lon_at = a.lon + t * (b.lon - a.lon);
            if p.lon < lon_at {
                inside = !inside;
            }
        }
    }
    inside
}

/// Axis-aligned bounding box of the outer ring.
pub fn polygon_bbox(polygon: &Polygon) -> BoundingBox {
    let mut west = f64::INFINITY;
    let mut south = f64::INFINITY;
    let mut east = f64::NEG_INFINITY;
    let mut north = f64::NEG_INFINITY;
    for c in &polygon.outer {
        west = west.min(c.lon);
        east = east.max(c.lon);
        south = south.min(c.lat);
        north = north.max(c.lat);
    }
    BoundingBox::new(west, south, east, north)
}

/// Whether two polygons overlap: a vertex of one inside the other, or any
/// pair of outer-ring edges crossing. Used to match recipient jurisdictions
/// against an event zone.
pub fn polygons_intersect(a: &Polygon, b: &Polygon) -> bool {
    if a.outer.iter().any(|&v| contains(b, v)) || b.outer.iter().any(|&v| contains(a, v)) {
        return true;
    }
    let na = a.outer.len();
    let nb = b.outer.len();
    for i in 0..na {
        for j in 0..nb {
            if segments_intersect(
                a.outer[i],
                a.outer[(i + 1) % na],
                b.outer[j],
                b.outer[(j + 1) % nb],
            ) {
                return true;
            }
        }
    }
    false
}

fn orientation(a: Coordinate, b: Coordinate, c: Coordinate) -> f64 {
    (b.lon - a.lon) * (c.lat - a.lat) - (b.lat - a.lat) * (c.lon - a.lon)
}

fn on_segment(a: Coordinate, b: Coordinate, p: Coordinate) -> bool {
    p.lon >= a.lon.min(b.lon)
        && p.lon <= a.lon.max(b.lon)
        && p.lat >= a.lat.min(b.lat)
        && p.lat <= a.lat.max(b.lat)
}

/// Segment intersection including collinear overlap.
fn segments_intersect(p1: Coordinate, p2: Coordinate, q1: Coordinate, q2: Coordinate) -> bool {
    let o1 = orientation(p1, p2, q1);
    let o2 = orientation(p1, p2, q2);
    let o3 = orientation(q1, q2, p1);
    let o4 = orientation(q1, q2, p2);

    if o1 * o2 < 0.0 && o3 * o4 < 0.0 {
        return true;
    }
    (o1 == 0.0 && on_segment(p1, p2, q1))
        || (o2 == 0.0 && on_segment(p1, p2, q2))
        || (o3 == 0.0 && on_segment(q1, q2, p1))
        || (o4 == 0.0 && on_segment(q1, q2, p2))
}
