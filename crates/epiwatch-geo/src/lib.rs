//! Spatial support for the surveillance pipeline: great-circle distances,
//! polygon geometry with holes, and the in-memory [`GeoIndex`] used for
//! proximity merges and zone containment.

pub mod distance;
pub mod error;
pub mod index;
pub mod polygon;

pub use distance::{DEFAULT_FLAT_PROJECTION_MAX_M, distance_m, equirectangular_m, haversine_m};
pub use error::{GeoError, Result};
pub use index::{GeoIndex, NearbyHit};
pub use polygon::{contains, polygon_bbox, polygons_intersect, validate_polygon};
