pub mod aggregator;
pub mod error;
pub mod policy;
pub mod workflow;

pub use aggregator::{EventAggregator, FoldOutcome};
pub use error::{AggregatorError, Result};
pub use policy::{MergePolicy, recompute_severity};
pub use workflow::TransitionOutcome;
