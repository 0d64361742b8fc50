// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawSiteConfig, SiteConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw model.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] to
/// also check required site values.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSiteConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawSiteConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<SiteConfig> {
    let raw_config = load_from_path(&path)?;
    let config = SiteConfig::try_from(raw_config)?;
    Ok(config)
}

/// Default config location: `structpipe.toml` in the current directory,
/// unless `STRUCTPIPE_CONFIG` points elsewhere.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("STRUCTPIPE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("structpipe.toml"))
}
