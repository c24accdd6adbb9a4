// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Gateway runtime orchestration.
//!
//! Wires configuration into running components:
//!
//! 1. Broker client + publish sink
//! 2. One adapter session per adapter key (hub topology)
//! 3. One poller task per device
//! 4. Shutdown: stop pollers, publish offline, close sessions and broker

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use sunbridge_ble::{AdapterSession, DevicePoller, DeviceSpec, GattTransport, PollerConfig};
use sunbridge_config::{load_config, BridgeConfig, DeviceEntry, DeviceKindEntry};
use sunbridge_core::retry::{FixedDelay, RetryConfig, RetryStrategy};
use sunbridge_core::types::{DeviceId, DeviceKind};
use sunbridge_core::validator::{controller_limits, FieldLimits, Validator};
use sunbridge_core::DataBus;
use sunbridge_mqtt::{publish_all_offline, MqttPublisher, MqttSettings, PublishSink, TopicScheme};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

/// How long shutdown waits for the poller tasks before abandoning them.
const POLLER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// BridgeRuntime
// =============================================================================

/// The main runtime that owns every component for one gateway process.
pub struct BridgeRuntime {
    config: Arc<BridgeConfig>,
    shutdown: ShutdownCoordinator,
}

impl BridgeRuntime {
    /// Creates a runtime from validated configuration.
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Returns the shutdown coordinator, for embedding.
    pub fn shutdown_coordinator(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Runs the gateway until shutdown is signaled.
    pub async fn run(self) -> BinResult<()> {
        info!("Starting sunbridge v{}", sunbridge_core::VERSION);

        let bus = Arc::new(DataBus::new(256));

        // Broker side first, so the sink subscription exists before any
        // poller can publish.
        let settings = mqtt_settings(&self.config);
        let scheme = TopicScheme::new(
            &self.config.mqtt.topic_prefix,
            &self.config.mqtt.discovery_prefix,
        );
        let (publisher, broker_driver) = MqttPublisher::start(&settings);

        let sink = PublishSink::new(publisher.clone(), scheme.clone());
        let sink_task = tokio::spawn(sink.run(bus.subscribe(), self.shutdown.subscribe()));

        // One session per adapter key; devices behind the same key share
        // the radio link. Modules sometimes miss the first connect after
        // power-up, so the initial attempt gets a short retry budget.
        let sessions = self.build_sessions();
        let connect_retry = FixedDelay::simple(3, Duration::from_secs(5));
        for session in sessions.values() {
            let result = connect_retry
                .execute(|| async { session.connect().await })
                .await;
            if let Err(err) = result {
                warn!(
                    adapter = %session.key(),
                    error = %err,
                    "Initial connection failed, pollers will keep retrying"
                );
            }
        }

        // One poller task per device.
        let mut poller_tasks = Vec::with_capacity(self.config.devices.len());
        for device in &self.config.devices {
            let session = sessions
                .get(device.adapter.as_str())
                .expect("session exists for every configured adapter key")
                .clone();

            let poller = DevicePoller::new(
                device_spec(device),
                self.poller_config(),
                session,
                self.build_validator(device),
                bus.clone(),
            );
            poller_tasks.push(tokio::spawn(poller.run(self.shutdown.subscribe())));
        }

        info!(
            devices = self.config.devices.len(),
            adapters = sessions.len(),
            "sunbridge is running"
        );

        self.shutdown.wait_for_shutdown().await;
        info!("Shutting down...");

        // Pollers exit at their next suspension point.
        let drain = async {
            for task in poller_tasks {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(POLLER_DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("Pollers did not stop in time");
        }

        let _ = sink_task.await;

        // Tell the broker the devices are gone before the link drops.
        let device_ids: Vec<DeviceId> = self
            .config
            .devices
            .iter()
            .map(|d| DeviceId::new(&d.id))
            .collect();
        publish_all_offline(&publisher, &scheme, &device_ids).await;

        for session in sessions.values() {
            if let Err(err) = session.disconnect().await {
                warn!(adapter = %session.key(), error = %err, "Session disconnect failed");
            }
        }

        publisher.disconnect().await;
        broker_driver.abort();

        info!("sunbridge shutdown complete");
        Ok(())
    }

    /// Builds one adapter session per configured adapter key.
    fn build_sessions(&self) -> HashMap<String, Arc<AdapterSession>> {
        let mut sessions = HashMap::new();

        for (key, devices) in self.config.devices_by_adapter() {
            // Validation guarantees all devices on one key share a MAC.
            let mac = &devices[0].mac_address;
            let transport = GattTransport::new(mac, &self.config.bluetooth.adapter);
            let session = Arc::new(AdapterSession::new(key, Box::new(transport)));

            if devices.len() > 1 {
                info!(
                    adapter = key,
                    mac = %mac,
                    devices = devices.len(),
                    "Hub mode: multiple devices share one BT module"
                );
            }

            sessions.insert(key.to_string(), session);
        }

        sessions
    }

    /// Builds the validator for one device.
    fn build_validator(&self, device: &DeviceEntry) -> Validator {
        let device_id = DeviceId::new(&device.id);

        if !self.config.validation.enabled {
            return Validator::passthrough(device_id);
        }

        // Controllers get the built-in envelope; other kinds validate only
        // what the configuration explicitly asks for.
        let mut limits = match device.kind {
            DeviceKindEntry::Controller => controller_limits(),
            _ => HashMap::new(),
        };

        if let Some(overrides) = self.config.validation.overrides.get(&device.id) {
            for (field, entry) in overrides {
                limits.insert(
                    field.clone(),
                    FieldLimits {
                        min: entry.min,
                        max: entry.max,
                        max_delta: entry.max_delta,
                    },
                );
            }
        }

        Validator::new(device_id, limits)
    }

    fn poller_config(&self) -> PollerConfig {
        let polling = &self.config.polling;
        PollerConfig {
            interval: Duration::from_secs(polling.interval_secs),
            request_timeout: Duration::from_secs(polling.request_timeout_secs),
            frame_retries: polling.frame_retries,
            offline_after: polling.offline_after,
            reconnect: RetryConfig::default()
                .with_initial_delay(Duration::from_secs(5))
                .with_max_delay(Duration::from_secs(120))
                .with_jitter(0.1),
        }
    }
}

// =============================================================================
// Mapping Helpers
// =============================================================================

fn mqtt_settings(config: &BridgeConfig) -> MqttSettings {
    let mut settings = MqttSettings::new(&config.mqtt.host)
        .with_port(config.mqtt.port)
        .with_client_id(&config.mqtt.client_id);

    if let (Some(user), Some(pass)) = (&config.mqtt.username, &config.mqtt.password) {
        settings = settings.with_auth(user, pass);
    }

    settings
}

fn device_spec(device: &DeviceEntry) -> DeviceSpec {
    DeviceSpec {
        device_id: DeviceId::new(&device.id),
        kind: device_kind(device.kind),
        unit_id: device.unit_id,
    }
}

fn device_kind(kind: DeviceKindEntry) -> DeviceKind {
    match kind {
        DeviceKindEntry::Controller => DeviceKind::Controller,
        DeviceKindEntry::Battery => DeviceKind::Battery,
        DeviceKindEntry::Inverter => DeviceKind::Inverter,
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the gateway runtime.
pub struct RuntimeBuilder {
    config_path: Option<std::path::PathBuf>,
    config: Option<BridgeConfig>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_path: None,
            config: None,
        }
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<BridgeRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => {
                let path = self.config_path.ok_or_else(|| {
                    BinError::initialization("no configuration provided")
                })?;
                load_config(&path)?
            }
        };

        Ok(BridgeRuntime::new(config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sunbridge_config::{
        BluetoothConfig, LoggingConfig, MqttConfig, PollingConfig, ValidationConfig,
    };

    fn test_config() -> BridgeConfig {
        let yaml = r#"
mqtt:
  host: "localhost"
devices:
  - id: "rover-40"
    mac_address: "C4:D3:6A:66:10:2E"
    kind: controller
  - id: "batt-1"
    mac_address: "F8:55:48:11:22:33"
    kind: battery
    unit_id: 48
    adapter: "bt2"
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_runtime_builder_requires_config() {
        assert!(RuntimeBuilder::new().build().is_err());
    }

    #[test]
    fn test_runtime_builder_with_config() {
        let runtime = RuntimeBuilder::new().config(test_config()).build().unwrap();
        assert_eq!(runtime.config.devices.len(), 2);
    }

    #[test]
    fn test_sessions_grouped_by_adapter() {
        let runtime = BridgeRuntime::new(test_config());
        let sessions = runtime.build_sessions();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.contains_key("bt1"));
        assert!(sessions.contains_key("bt2"));
    }

    #[test]
    fn test_controller_gets_default_limits() {
        let runtime = BridgeRuntime::new(test_config());
        let controller = runtime.config.get_device("rover-40").unwrap().clone();
        let battery = runtime.config.get_device("batt-1").unwrap().clone();

        let mut reading = sunbridge_core::Reading::new(
            DeviceId::new("rover-40"),
            DeviceKind::Controller,
        );
        reading.insert("battery_percentage", 150i64);
        let mut validator = runtime.build_validator(&controller);
        assert_eq!(validator.validate(&mut reading).len(), 1);

        // Batteries have no built-in limits.
        let mut reading =
            sunbridge_core::Reading::new(DeviceId::new("batt-1"), DeviceKind::Battery);
        reading.insert("soc", 900i64);
        let mut validator = runtime.build_validator(&battery);
        assert!(validator.validate(&mut reading).is_empty());
    }

    #[test]
    fn test_validation_can_be_disabled() {
        let mut config = test_config();
        config.validation = ValidationConfig {
            enabled: false,
            overrides: Default::default(),
        };
        let runtime = BridgeRuntime::new(config);
        let controller = runtime.config.get_device("rover-40").unwrap().clone();

        let mut reading = sunbridge_core::Reading::new(
            DeviceId::new("rover-40"),
            DeviceKind::Controller,
        );
        reading.insert("battery_percentage", 150i64);
        let mut validator = runtime.build_validator(&controller);
        assert!(validator.validate(&mut reading).is_empty());
    }

    #[test]
    fn test_mqtt_settings_mapping() {
        let config = BridgeConfig {
            mqtt: MqttConfig {
                host: "broker.local".to_string(),
                port: 8883,
                username: Some("solar".to_string()),
                password: Some("hunter2".to_string()),
                client_id: "bridge-7".to_string(),
                topic_prefix: "solar".to_string(),
                discovery_prefix: "homeassistant".to_string(),
            },
            bluetooth: BluetoothConfig::default(),
            polling: PollingConfig::default(),
            devices: Vec::new(),
            validation: ValidationConfig::default(),
            logging: LoggingConfig::default(),
        };

        let settings = mqtt_settings(&config);
        assert_eq!(settings.host, "broker.local");
        assert_eq!(settings.port, 8883);
        assert_eq!(settings.username.as_deref(), Some("solar"));
        assert_eq!(settings.client_id, "bridge-7");
    }
}
