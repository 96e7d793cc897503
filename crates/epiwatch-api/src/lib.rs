//! Operator-facing surface of the epiwatch surveillance server.
//!
//! Wires signal intake, event aggregation and alert dispatch into a single
//! service with role checks and optimistic-concurrency semantics at the
//! boundary. Transport adapters (HTTP, USSD bridges) sit on top of
//! [`SurveillanceService`]; nothing in this crate speaks a wire protocol.

pub mod error;
pub mod observability;
pub mod roles;
pub mod service;

pub use error::{ApiError, Result};
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level};
pub use roles::{OperatorContext, OperatorRole};
pub use service::{EventDetail, IngestOutcome, SurveillanceService, TransitionResult};
