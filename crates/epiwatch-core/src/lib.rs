pub mod error;
pub mod event;
pub mod geo;
pub mod hazard;
pub mod id;
pub mod signal;
pub mod time;

pub use error::{CoreError, ErrorCategory, Result};
pub use event::{
    AuditChange, AuditEntry, Event, EventStatus, Note, Severity, replay_audit,
};
pub use geo::{BoundingBox, Coordinate, Polygon, Ring};
pub use hazard::{HazardClass, HazardTag};
pub use id::generate_id;
pub use signal::{RawReport, ReportChannel, Signal};
pub use time::now_utc;
