//! Configuration loading from the file system.

use crate::models::settings::GatewaySettings;
use log::{debug, warn};
use std::fs;
use std::path::Path;

/// Upper bound on configuration file size; anything larger is rejected
/// before parsing.
const MAX_CONFIG_SIZE: u64 = 10 * 1024 * 1024;

/// Loads gateway configuration from disk.
///
/// The file path is taken from `VANGUARD_CONFIG_PATH`, defaulting to
/// `./config.json`. The file must exist, be readable, stay under the size
/// cap, and parse as a [`GatewaySettings`] JSON document. Validation is the
/// caller's job (see [`crate::config::validation::ConfigValidator`]).
pub fn load_settings() -> Result<GatewaySettings, Box<dyn std::error::Error>> {
    let config_path =
        std::env::var("VANGUARD_CONFIG_PATH").unwrap_or_else(|_| "./config.json".to_string());

    debug!("Loading gateway configuration from {}", config_path);
    load_settings_from(&config_path)
}

/// Loads gateway configuration from an explicit path.
pub fn load_settings_from(path: &str) -> Result<GatewaySettings, Box<dyn std::error::Error>> {
    let path = Path::new(path);

    if !path.exists() {
        return Err(format!("Configuration file not found: {}", path.display()).into());
    }

    let metadata = fs::metadata(path)?;
    if metadata.len() > MAX_CONFIG_SIZE {
        return Err(format!(
            "Configuration file too large: {} bytes (max {})",
            metadata.len(),
            MAX_CONFIG_SIZE
        )
        .into());
    }

    let contents = fs::read_to_string(path)?;
    let settings: GatewaySettings = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;

    if settings.routes.is_empty() {
        warn!("Configuration contains no routes; every request will return 404");
    }

    Ok(settings)
}
