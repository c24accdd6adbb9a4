// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema for the gateway.
//!
//! # Schema Structure
//!
//! ```text
//! BridgeConfig
//! ├── mqtt: MqttConfig
//! ├── bluetooth: BluetoothConfig
//! ├── polling: PollingConfig
//! ├── devices: Vec<DeviceEntry>
//! ├── validation: ValidationConfig
//! └── logging: LoggingConfig
//! ```
//!
//! Every level carries its own `validate()`; the top-level validation also
//! enforces cross-device invariants (unique IDs, consistent hub wiring).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Constants
// =============================================================================

/// Default poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Minimum poll interval in seconds.
pub const MIN_POLL_INTERVAL_SECS: u64 = 10;

/// Maximum poll interval in seconds.
pub const MAX_POLL_INTERVAL_SECS: u64 = 600;

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Default protocol device address (broadcast).
pub const DEFAULT_UNIT_ID: u8 = 255;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Broker connection and topic settings.
    pub mqtt: MqttConfig,

    /// Host Bluetooth settings.
    #[serde(default)]
    pub bluetooth: BluetoothConfig,

    /// Poll loop settings.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Devices to poll.
    pub devices: Vec<DeviceEntry>,

    /// Validator settings.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.mqtt.validate()?;
        self.polling.validate()?;
        self.logging.validate()?;

        if self.devices.is_empty() {
            return Err(ConfigError::validation("devices", "no devices configured"));
        }

        let mut ids = HashSet::new();
        for device in &self.devices {
            if !ids.insert(&device.id) {
                return Err(ConfigError::duplicate_device_id(&device.id));
            }
            device.validate()?;
        }

        // Devices sharing an adapter key sit behind the same physical hub:
        // one MAC per key, distinct protocol addresses on it.
        let mut hub_macs: HashMap<&str, &str> = HashMap::new();
        let mut hub_units: HashSet<(&str, u8)> = HashSet::new();
        for device in &self.devices {
            let mac = hub_macs
                .entry(device.adapter.as_str())
                .or_insert(device.mac_address.as_str());
            if *mac != device.mac_address {
                return Err(ConfigError::validation(
                    format!("devices.{}.mac_address", device.id),
                    format!(
                        "adapter '{}' is already bound to {}, cannot also be {}",
                        device.adapter, mac, device.mac_address
                    ),
                ));
            }
            if !hub_units.insert((device.adapter.as_str(), device.unit_id)) {
                return Err(ConfigError::validation(
                    format!("devices.{}.unit_id", device.id),
                    format!(
                        "protocol address {} is already used on adapter '{}'",
                        device.unit_id, device.adapter
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Returns a device entry by ID.
    pub fn get_device(&self, device_id: &str) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.id == device_id)
    }

    /// Returns the devices grouped by adapter key.
    pub fn devices_by_adapter(&self) -> HashMap<&str, Vec<&DeviceEntry>> {
        let mut groups: HashMap<&str, Vec<&DeviceEntry>> = HashMap::new();
        for device in &self.devices {
            groups.entry(device.adapter.as_str()).or_default().push(device);
        }
        groups
    }
}

// =============================================================================
// MQTT Configuration
// =============================================================================

/// Broker connection and topic settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MqttConfig {
    /// Broker hostname or IP.
    pub host: String,

    /// Broker port.
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Optional username.
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password.
    #[serde(default)]
    pub password: Option<String>,

    /// Client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Prefix for state/availability topics.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Prefix for discovery config topics.
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "sunbridge".to_string()
}

fn default_topic_prefix() -> String {
    "sunbridge".to_string()
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

impl MqttConfig {
    /// Validates the MQTT settings.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.is_empty() {
            return Err(ConfigError::validation("mqtt.host", "cannot be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::validation("mqtt.port", "cannot be zero"));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::validation(
                "mqtt.username",
                "username and password must be set together",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Bluetooth Configuration
// =============================================================================

/// Host Bluetooth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BluetoothConfig {
    /// Host adapter to use ("hci0", "hci1", ...).
    #[serde(default = "default_bt_adapter")]
    pub adapter: String,
}

fn default_bt_adapter() -> String {
    "hci0".to_string()
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: default_bt_adapter(),
        }
    }
}

// =============================================================================
// Polling Configuration
// =============================================================================

/// Poll loop settings, shared by all devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollingConfig {
    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Per-request response timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Additional attempts per register block after a frame error.
    #[serde(default = "default_frame_retries")]
    pub frame_retries: u32,

    /// Consecutive failed cycles before a device is reported unavailable.
    #[serde(default = "default_offline_after")]
    pub offline_after: u32,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_frame_retries() -> u32 {
    2
}

fn default_offline_after() -> u32 {
    3
}

impl PollingConfig {
    /// Validates the polling settings.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&self.interval_secs) {
            return Err(ConfigError::validation(
                "polling.interval_secs",
                format!(
                    "must be between {MIN_POLL_INTERVAL_SECS} and {MAX_POLL_INTERVAL_SECS} seconds"
                ),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "polling.request_timeout_secs",
                "cannot be zero",
            ));
        }
        if self.offline_after == 0 {
            return Err(ConfigError::validation(
                "polling.offline_after",
                "cannot be zero",
            ));
        }
        Ok(())
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
            frame_retries: default_frame_retries(),
            offline_after: default_offline_after(),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// One device to poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceEntry {
    /// Unique device identifier; used in topics.
    pub id: String,

    /// Display name; defaults to the ID.
    #[serde(default)]
    pub name: Option<String>,

    /// MAC address of the BT module this device sits behind.
    pub mac_address: String,

    /// Advertised module name ("BT-TH-..."), informational.
    #[serde(default)]
    pub alias: Option<String>,

    /// Device category.
    pub kind: DeviceKindEntry,

    /// Numeric device address inside protocol frames.
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Adapter key; devices sharing a key share one radio link.
    #[serde(default = "default_adapter_key")]
    pub adapter: String,
}

fn default_unit_id() -> u8 {
    DEFAULT_UNIT_ID
}

fn default_adapter_key() -> String {
    "bt1".to_string()
}

/// Device category in configuration files.
///
/// Mirrors the gateway's closed kind set; kept separate so this crate
/// stays schema-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKindEntry {
    /// Solar charge controller.
    Controller,
    /// Smart battery.
    Battery,
    /// Inverter.
    Inverter,
}

impl DeviceKindEntry {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKindEntry::Controller => "controller",
            DeviceKindEntry::Battery => "battery",
            DeviceKindEntry::Inverter => "inverter",
        }
    }
}

impl DeviceEntry {
    /// Returns the display name.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Validates the device entry.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.id.is_empty() {
            return Err(ConfigError::missing_field("devices.id"));
        }
        if self
            .id
            .chars()
            .any(|c| !c.is_ascii_alphanumeric() && c != '-' && c != '_')
        {
            return Err(ConfigError::validation(
                format!("devices.{}.id", self.id),
                "only alphanumerics, '-' and '_' are allowed",
            ));
        }

        let hex_digits = self
            .mac_address
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .count();
        let separators = self
            .mac_address
            .chars()
            .filter(|c| !c.is_ascii_hexdigit())
            .all(|c| c == ':' || c == '-');
        if hex_digits != 12 || !separators {
            return Err(ConfigError::invalid_address(
                &self.mac_address,
                "expected 12 hex digits, optionally ':' or '-' separated",
            ));
        }

        if self.unit_id == 0 {
            return Err(ConfigError::validation(
                format!("devices.{}.unit_id", self.id),
                "cannot be zero",
            ));
        }
        if self.adapter.is_empty() {
            return Err(ConfigError::validation(
                format!("devices.{}.adapter", self.id),
                "cannot be empty",
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Validation Configuration
// =============================================================================

/// Per-field limit override in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitEntry {
    /// Minimum plausible value.
    pub min: f64,
    /// Maximum plausible value.
    pub max: f64,
    /// Maximum allowed change per poll; omit to disable the spike check.
    #[serde(default)]
    pub max_delta: Option<f64>,
}

/// Validator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    /// Disables validation entirely when `false`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-device, per-field limit overrides, merged over the built-in
    /// controller defaults.
    #[serde(default)]
    pub overrides: HashMap<String, HashMap<String, LimitEntry>>,
}

fn default_true() -> bool {
    true
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            overrides: HashMap::new(),
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: text, json, compact.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl LoggingConfig {
    /// Validates the logging settings.
    pub fn validate(&self) -> ConfigResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::validation(
                "logging.level",
                format!("unknown level '{}'", self.level),
            ));
        }

        const FORMATS: &[&str] = &["text", "json", "compact"];
        if !FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::validation(
                "logging.format",
                format!("unknown format '{}'", self.format),
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, adapter: &str, mac: &str, unit_id: u8) -> DeviceEntry {
        DeviceEntry {
            id: id.to_string(),
            name: None,
            mac_address: mac.to_string(),
            alias: None,
            kind: DeviceKindEntry::Battery,
            unit_id,
            adapter: adapter.to_string(),
        }
    }

    fn base_config(devices: Vec<DeviceEntry>) -> BridgeConfig {
        BridgeConfig {
            mqtt: MqttConfig {
                host: "localhost".to_string(),
                port: default_mqtt_port(),
                username: None,
                password: None,
                client_id: default_client_id(),
                topic_prefix: default_topic_prefix(),
                discovery_prefix: default_discovery_prefix(),
            },
            bluetooth: BluetoothConfig::default(),
            polling: PollingConfig::default(),
            devices,
            validation: ValidationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = base_config(vec![
            device("batt-1", "bt2", "C4:D3:6A:66:10:2E", 0x30),
            device("batt-2", "bt2", "C4:D3:6A:66:10:2E", 0x31),
        ]);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_devices_rejected() {
        let config = base_config(Vec::new());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_duplicate_device_id_rejected() {
        let config = base_config(vec![
            device("batt-1", "bt1", "C4:D3:6A:66:10:2E", 0x30),
            device("batt-1", "bt2", "AA:BB:CC:DD:EE:FF", 0x31),
        ]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateDeviceId { .. })
        ));
    }

    #[test]
    fn test_shared_adapter_must_share_mac() {
        let config = base_config(vec![
            device("batt-1", "bt2", "C4:D3:6A:66:10:2E", 0x30),
            device("batt-2", "bt2", "AA:BB:CC:DD:EE:FF", 0x31),
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shared_adapter_needs_distinct_unit_ids() {
        let config = base_config(vec![
            device("batt-1", "bt2", "C4:D3:6A:66:10:2E", 0x30),
            device("batt-2", "bt2", "C4:D3:6A:66:10:2E", 0x30),
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_mac_rejected() {
        let config = base_config(vec![device("batt-1", "bt1", "not-a-mac", 0x30)]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_poll_interval_bounds() {
        let mut config = base_config(vec![device("c-1", "bt1", "C4:D3:6A:66:10:2E", 255)]);
        config.polling.interval_secs = 5;
        assert!(config.validate().is_err());

        config.polling.interval_secs = 601;
        assert!(config.validate().is_err());

        config.polling.interval_secs = 60;
        config.validate().unwrap();
    }

    #[test]
    fn test_credentials_must_pair() {
        let mut config = base_config(vec![device("c-1", "bt1", "C4:D3:6A:66:10:2E", 255)]);
        config.mqtt.username = Some("solar".to_string());
        assert!(config.validate().is_err());

        config.mqtt.password = Some("hunter2".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = r#"
mqtt:
  host: "homeassistant.local"
  username: "solar"
  password: "hunter2"
bluetooth:
  adapter: "hci1"
polling:
  interval_secs: 120
devices:
  - id: "rover-40"
    mac_address: "C4:D3:6A:66:10:2E"
    kind: controller
    adapter: "bt1"
  - id: "batt-1"
    mac_address: "F8:55:48:11:22:33"
    alias: "BT-TH-66F94E1C"
    kind: battery
    unit_id: 48
    adapter: "bt2"
validation:
  overrides:
    rover-40:
      pv_power:
        min: 0.0
        max: 800.0
        max_delta: 500.0
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.polling.interval_secs, 120);
        assert_eq!(config.bluetooth.adapter, "hci1");

        let rover = config.get_device("rover-40").unwrap();
        assert_eq!(rover.kind, DeviceKindEntry::Controller);
        assert_eq!(rover.unit_id, DEFAULT_UNIT_ID);

        let limit = config.validation.overrides["rover-40"]["pv_power"];
        assert_eq!(limit.max, 800.0);
        assert_eq!(limit.max_delta, Some(500.0));

        let groups = config.devices_by_adapter();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = r#"
mqtt:
  host: "localhost"
  hostname: "typo"
devices: []
"#;
        assert!(serde_yaml::from_str::<BridgeConfig>(yaml).is_err());
    }
}
