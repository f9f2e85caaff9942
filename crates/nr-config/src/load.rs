//! Configuration file loading.

use std::path::Path;

use nr_common::{Error, Result};

use crate::model::{Config, RawConfig};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/needrestart/needrestart.toml";

/// Load the configuration.
///
/// An explicitly given path must exist and parse; an unreadable or invalid
/// file there is fatal in every mode. Only a missing file at the default
/// location silently yields the built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let (path, required) = match explicit {
        Some(p) => (p.to_path_buf(), true),
        None => (DEFAULT_CONFIG_PATH.into(), false),
    };

    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(_) if !required => return Ok(Config::default()),
        Err(source) => return Err(Error::ConfigRead { path, source }),
    };

    let raw: RawConfig = toml::from_str(&content).map_err(|e| Error::ConfigParse {
        path: path.clone(),
        message: e.to_string(),
    })?;

    Config::from_raw(raw)
}
