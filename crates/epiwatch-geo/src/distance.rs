//! Great-circle distances.
//!
//! Haversine is the reference formula. Below a configurable radius the
//! equirectangular projection is close enough (relative error under 0.5%
//! for spans up to 50 km outside the polar regions, see tests) and cheaper,
//! so the index uses it as a fast path.

use epiwatch_core::Coordinate;

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Default upper bound for the flat-projection fast path: 50 km.
pub const DEFAULT_FLAT_PROJECTION_MAX_M: f64 = 50_000.0;

/// Haversine great-circle distance in meters.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Equirectangular approximation in meters. Only valid for short spans.
pub fn equirectangular_m(a: Coordinate, b: Coordinate) -> f64 {
    let mean_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let x = (b.lon - a.lon).to_radians() * mean_lat.cos();
    let y = (b.lat - a.lat).to_radians();
    EARTH_RADIUS_M * (x * x + y * y).sqrt()
}

/// Distance in meters: equirectangular when the approximate span is within
/// `flat_max_m`, haversine otherwise.
pub fn distance_m(a: Coordinate, b: Coordinate, flat_max_m: f64) -> f64 {
    let flat = equirectangular_m(a, b);
    if flat <= flat_max_m { flat } else { haversine_m(a, b) }
}
