//! Layered configuration for the epiwatch server.
//!
//! Settings are read from an optional `epiwatch.toml` file and overridden
//! by `EPIWATCH__`-prefixed environment variables, e.g.
//! `EPIWATCH__DISPATCH__MAX_RETRIES=5`. Every section has working
//! defaults, so an empty configuration is valid.

pub mod loader;
pub mod settings;

pub use loader::load_config;
pub use settings::{
    AggregatorSettings, DedupSettings, DispatchSettings, EpiwatchConfig, GeoSettings,
    LoggingSettings,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Build(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
