use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EpiwatchConfig {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub geo: GeoSettings,
    #[serde(default)]
    pub dedup: DedupSettings,
    #[serde(default)]
    pub aggregator: AggregatorSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
}

impl EpiwatchConfig {
    pub fn validate(&self) -> Result<()> {
        let level = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&level.as_str()) {
            return Err(ConfigError::validation(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        if self.geo.flat_projection_max_m <= 0.0 {
            return Err(ConfigError::validation(
                "geo.flat_projection_max_m must be > 0",
            ));
        }
        if self.dedup.cell_size_deg <= 0.0 {
            return Err(ConfigError::validation("dedup.cell_size_deg must be > 0"));
        }
        if self.dedup.bucket_secs == 0 {
            return Err(ConfigError::validation("dedup.bucket_secs must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.dedup.similarity_threshold) {
            return Err(ConfigError::validation(
                "dedup.similarity_threshold must be within [0, 1]",
            ));
        }
        for (name, proximity, window) in [
            (
                "human",
                self.aggregator.human_proximity_m,
                self.aggregator.human_window_hours,
            ),
            (
                "animal",
                self.aggregator.animal_proximity_m,
                self.aggregator.animal_window_hours,
            ),
            (
                "environmental",
                self.aggregator.environmental_proximity_m,
                self.aggregator.environmental_window_hours,
            ),
        ] {
            if proximity <= 0.0 {
                return Err(ConfigError::validation(format!(
                    "aggregator.{name}_proximity_m must be > 0"
                )));
            }
            if window == 0 {
                return Err(ConfigError::validation(format!(
                    "aggregator.{name}_window_hours must be > 0"
                )));
            }
        }
        if self.dispatch.base_delay_secs == 0 {
            return Err(ConfigError::validation("dispatch.base_delay_secs must be > 0"));
        }
        if self.dispatch.max_delay_secs < self.dispatch.base_delay_secs {
            return Err(ConfigError::validation(
                "dispatch.max_delay_secs must be >= dispatch.base_delay_secs",
            ));
        }
        if self.dispatch.gateway_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "dispatch.gateway_timeout_secs must be > 0",
            ));
        }
        if self.dispatch.max_in_flight == 0 {
            return Err(ConfigError::validation("dispatch.max_in_flight must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoSettings {
    /// Below this distance the fast equirectangular approximation is used
    /// instead of the haversine formula.
    #[serde(default = "default_flat_projection_max_m")]
    pub flat_projection_max_m: f64,
}
fn default_flat_projection_max_m() -> f64 {
    50_000.0
}
impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            flat_projection_max_m: default_flat_projection_max_m(),
        }
    }
}

/// Duplicate-report fingerprinting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupSettings {
    #[serde(default = "default_cell_size_deg")]
    pub cell_size_deg: f64,
    #[serde(default = "default_bucket_secs")]
    pub bucket_secs: u64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}
fn default_cell_size_deg() -> f64 {
    0.01
}
fn default_bucket_secs() -> u64 {
    6 * 3600
}
fn default_similarity_threshold() -> f64 {
    0.6
}
impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            cell_size_deg: default_cell_size_deg(),
            bucket_secs: default_bucket_secs(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Per-hazard-class merge thresholds for the clustering fold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorSettings {
    #[serde(default = "default_human_proximity_m")]
    pub human_proximity_m: f64,
    #[serde(default = "default_human_window_hours")]
    pub human_window_hours: u64,
    #[serde(default = "default_animal_proximity_m")]
    pub animal_proximity_m: f64,
    #[serde(default = "default_animal_window_hours")]
    pub animal_window_hours: u64,
    #[serde(default = "default_environmental_proximity_m")]
    pub environmental_proximity_m: f64,
    #[serde(default = "default_environmental_window_hours")]
    pub environmental_window_hours: u64,
}
fn default_human_proximity_m() -> f64 {
    5_000.0
}
fn default_human_window_hours() -> u64 {
    48
}
fn default_animal_proximity_m() -> f64 {
    10_000.0
}
fn default_animal_window_hours() -> u64 {
    7 * 24
}
fn default_environmental_proximity_m() -> f64 {
    20_000.0
}
fn default_environmental_window_hours() -> u64 {
    14 * 24
}
impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            human_proximity_m: default_human_proximity_m(),
            human_window_hours: default_human_window_hours(),
            animal_proximity_m: default_animal_proximity_m(),
            animal_window_hours: default_animal_window_hours(),
            environmental_proximity_m: default_environmental_proximity_m(),
            environmental_window_hours: default_environmental_window_hours(),
        }
    }
}

/// Alert delivery behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// When true, the open -> verifying transition also dispatches alerts.
    #[serde(default)]
    pub alert_on_verifying: bool,
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_secs() -> u64 {
    2
}
fn default_max_delay_secs() -> u64 {
    30
}
fn default_gateway_timeout_secs() -> u64 {
    5
}
fn default_max_in_flight() -> usize {
    8
}
impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            max_in_flight: default_max_in_flight(),
            alert_on_verifying: false,
        }
    }
}
