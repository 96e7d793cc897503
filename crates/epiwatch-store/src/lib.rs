pub mod dedup;
pub mod error;
pub mod memory;
pub mod signals;
pub mod traits;

pub use dedup::{DedupConfig, DedupIndex};
pub use error::{Result, StoreError};
pub use memory::{InMemoryEventStore, InMemorySignalStore};
pub use signals::SignalStore;
pub use traits::{EventFilter, EventStorage, SignalStorage};
