// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! # Loading Pipeline
//!
//! 1. Parse the YAML/TOML/JSON file (format by extension)
//! 2. Apply `SUNBRIDGE_*` environment overrides (broker credentials and
//!    log level, the values that differ between deployments)
//! 3. Validate
//!
//! # Environment Overrides
//!
//! ```text
//! SUNBRIDGE_MQTT_HOST
//! SUNBRIDGE_MQTT_PORT
//! SUNBRIDGE_MQTT_USERNAME
//! SUNBRIDGE_MQTT_PASSWORD
//! SUNBRIDGE_LOG_LEVEL
//! ```

use std::env;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::BridgeConfig;

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "SUNBRIDGE";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Loads, overrides, and validates gateway configuration.
///
/// # Examples
///
/// ```no_run
/// use sunbridge_config::loader::ConfigLoader;
///
/// let config = ConfigLoader::new().load("sunbridge.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    apply_env: bool,
}

impl ConfigLoader {
    /// Creates a loader with environment overrides enabled.
    pub fn new() -> Self {
        Self { apply_env: true }
    }

    /// Enables or disables environment overrides.
    pub fn with_env_overrides(mut self, enabled: bool) -> Self {
        self.apply_env = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The format is chosen by extension: `.yaml`/`.yml`, `.toml`, or
    /// `.json`.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<BridgeConfig> {
        let path = path.as_ref();
        info!("Loading configuration from {}", path.display());

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = parse(path, &content)?;

        if self.apply_env {
            apply_env_overrides(&mut config);
        }

        config.validate()?;

        debug!(
            devices = config.devices.len(),
            adapters = config.devices_by_adapter().len(),
            "Configuration valid"
        );

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience wrapper around [`ConfigLoader::load`].
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<BridgeConfig> {
    ConfigLoader::new().load(path)
}

// =============================================================================
// Parsing
// =============================================================================

fn parse(path: &Path, content: &str) -> ConfigResult<BridgeConfig> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(content)
            .map_err(|e| ConfigError::parse(path, e.to_string())),
        "toml" => toml::from_str(content).map_err(|e| ConfigError::parse(path, e.to_string())),
        "json" => serde_json::from_str(content)
            .map_err(|e| ConfigError::parse(path, e.to_string())),
        other => Err(ConfigError::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

// =============================================================================
// Environment Overrides
// =============================================================================

fn apply_env_overrides(config: &mut BridgeConfig) {
    if let Some(host) = env_var("MQTT_HOST") {
        config.mqtt.host = host;
    }
    if let Some(port) = env_var("MQTT_PORT").and_then(|p| p.parse().ok()) {
        config.mqtt.port = port;
    }
    if let Some(username) = env_var("MQTT_USERNAME") {
        config.mqtt.username = Some(username);
    }
    if let Some(password) = env_var("MQTT_PASSWORD") {
        config.mqtt.password = Some(password);
    }
    if let Some(level) = env_var("LOG_LEVEL") {
        config.logging.level = level;
    }
}

fn env_var(suffix: &str) -> Option<String> {
    let name = format!("{ENV_PREFIX}_{suffix}");
    match env::var(&name) {
        Ok(value) if !value.is_empty() => {
            debug!(variable = %name, "Applying environment override");
            Some(value)
        }
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
