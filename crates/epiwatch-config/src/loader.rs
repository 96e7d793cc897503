use std::path::PathBuf;

use config::{Config, Environment, File};

use crate::settings::EpiwatchConfig;
use crate::Result;

/// Loads configuration from an optional TOML file with environment
/// overrides, e.g. `EPIWATCH__DISPATCH__MAX_RETRIES=5`. A missing file is
/// not an error; defaults apply.
pub fn load_config(path: Option<&str>) -> Result<EpiwatchConfig> {
    let mut builder = Config::builder();
    let file = PathBuf::from(path.unwrap_or("epiwatch.toml"));
    if file.exists() {
        builder = builder.add_source(File::from(file));
    }
    builder = builder.add_source(
        Environment::with_prefix("EPIWATCH")
            .try_parsing(true)
            .separator("__"),
    );
    let merged: EpiwatchConfig = builder.build()?.try_deserialize()?;
    merged.validate()?;
    Ok(merged)
}
