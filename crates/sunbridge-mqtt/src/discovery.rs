// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Auto-discovery registration for home-automation consumers.
//!
//! A thin mapping from well-known sensor fields to discovery metadata,
//! published retained once per device so the consumer materializes its
//! entities before the first reading arrives. Fields outside these tables
//! still appear in the state payload; they just get no dedicated entity.

use serde_json::json;

use sunbridge_core::error::PublishResult;
use sunbridge_core::types::{DeviceId, DeviceKind};

use crate::client::MqttPublisher;
use crate::topics::TopicScheme;

// =============================================================================
// Sensor Metadata
// =============================================================================

/// Discovery metadata for one sensor field.
#[derive(Debug, Clone, Copy)]
pub struct SensorMeta {
    /// Field name in the state payload.
    pub key: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Unit of measurement, if any.
    pub unit: Option<&'static str>,
    /// Consumer-side device class, if any.
    pub device_class: Option<&'static str>,
    /// State class for statistics ("measurement", "total_increasing").
    pub state_class: Option<&'static str>,
}

const fn sensor(
    key: &'static str,
    name: &'static str,
    unit: Option<&'static str>,
    device_class: Option<&'static str>,
    state_class: Option<&'static str>,
) -> SensorMeta {
    SensorMeta {
        key,
        name,
        unit,
        device_class,
        state_class,
    }
}

const CONTROLLER_SENSORS: &[SensorMeta] = &[
    sensor("battery_percentage", "Battery", Some("%"), Some("battery"), Some("measurement")),
    sensor("battery_voltage", "Battery Voltage", Some("V"), Some("voltage"), Some("measurement")),
    sensor("battery_current", "Battery Current", Some("A"), Some("current"), Some("measurement")),
    sensor("battery_temperature", "Battery Temperature", Some("°C"), Some("temperature"), Some("measurement")),
    sensor("battery_type", "Battery Type", None, None, None),
    sensor("pv_voltage", "PV Voltage", Some("V"), Some("voltage"), Some("measurement")),
    sensor("pv_current", "PV Current", Some("A"), Some("current"), Some("measurement")),
    sensor("pv_power", "PV Power", Some("W"), Some("power"), Some("measurement")),
    sensor("load_voltage", "Load Voltage", Some("V"), Some("voltage"), Some("measurement")),
    sensor("load_current", "Load Current", Some("A"), Some("current"), Some("measurement")),
    sensor("load_power", "Load Power", Some("W"), Some("power"), Some("measurement")),
    sensor("load_status", "Load Status", None, None, None),
    sensor("controller_temperature", "Controller Temperature", Some("°C"), Some("temperature"), Some("measurement")),
    sensor("charging_status", "Charging Status", None, None, None),
    sensor("charging_amp_hours_today", "Charging Ah Today", Some("Ah"), None, Some("total_increasing")),
    sensor("discharging_amp_hours_today", "Discharging Ah Today", Some("Ah"), None, Some("total_increasing")),
    sensor("power_generation_today", "Power Generation Today", Some("Wh"), Some("energy"), Some("total_increasing")),
    sensor("power_consumption_today", "Power Consumption Today", Some("Wh"), Some("energy"), Some("total_increasing")),
    sensor("power_generation_total", "Power Generation Total", Some("Wh"), Some("energy"), Some("total_increasing")),
    sensor("fault_count", "Active Faults", None, None, None),
    sensor("warning_count", "Active Warnings", None, None, None),
];

const BATTERY_SENSORS: &[SensorMeta] = &[
    sensor("voltage", "Voltage", Some("V"), Some("voltage"), Some("measurement")),
    sensor("current", "Current", Some("A"), Some("current"), Some("measurement")),
    sensor("power", "Power", Some("W"), Some("power"), Some("measurement")),
    sensor("soc", "State of Charge", Some("%"), Some("battery"), Some("measurement")),
    sensor("remaining_capacity", "Remaining Capacity", Some("Ah"), None, Some("measurement")),
    sensor("total_capacity", "Total Capacity", Some("Ah"), None, Some("measurement")),
    sensor("battery_temperature", "Battery Temperature", Some("°C"), Some("temperature"), Some("measurement")),
    sensor("cell_count", "Cell Count", None, None, None),
    sensor("alarm_count", "Active Alarms", None, None, None),
    sensor("warning_count", "Active Warnings", None, None, None),
];

const INVERTER_SENSORS: &[SensorMeta] = &[
    sensor("input_voltage", "AC Input Voltage", Some("V"), Some("voltage"), Some("measurement")),
    sensor("input_current", "AC Input Current", Some("A"), Some("current"), Some("measurement")),
    sensor("input_power", "AC Input Power", Some("W"), Some("power"), Some("measurement")),
    sensor("input_frequency", "AC Input Frequency", Some("Hz"), Some("frequency"), Some("measurement")),
    sensor("output_voltage", "AC Output Voltage", Some("V"), Some("voltage"), Some("measurement")),
    sensor("output_current", "AC Output Current", Some("A"), Some("current"), Some("measurement")),
    sensor("output_power", "AC Output Power", Some("W"), Some("power"), Some("measurement")),
    sensor("output_frequency", "AC Output Frequency", Some("Hz"), Some("frequency"), Some("measurement")),
    sensor("battery_voltage", "Battery Voltage", Some("V"), Some("voltage"), Some("measurement")),
    sensor("temperature", "Temperature", Some("°C"), Some("temperature"), Some("measurement")),
    sensor("fault_count", "Active Faults", None, None, None),
];

/// Boolean fields exposed as binary sensors.
const BATTERY_BINARY_SENSORS: &[(&str, &str)] =
    &[("heater_on", "Heater"), ("fully_charged", "Fully Charged")];

const INVERTER_BINARY_SENSORS: &[(&str, &str)] =
    &[("eco_mode", "ECO Mode"), ("beeper_on", "Beeper")];

/// Returns the sensor table for a device kind.
pub fn sensors_for(kind: DeviceKind) -> &'static [SensorMeta] {
    match kind {
        DeviceKind::Controller => CONTROLLER_SENSORS,
        DeviceKind::Battery => BATTERY_SENSORS,
        DeviceKind::Inverter => INVERTER_SENSORS,
    }
}

/// Returns the binary-sensor table for a device kind.
pub fn binary_sensors_for(kind: DeviceKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        DeviceKind::Controller => &[],
        DeviceKind::Battery => BATTERY_BINARY_SENSORS,
        DeviceKind::Inverter => INVERTER_BINARY_SENSORS,
    }
}

// =============================================================================
// Publishing
// =============================================================================

/// Publishes retained discovery configs for every known field of a device.
pub async fn publish_discovery(
    publisher: &MqttPublisher,
    scheme: &TopicScheme,
    device_id: &DeviceId,
    kind: DeviceKind,
) -> PublishResult<()> {
    let device_block = json!({
        "identifiers": [format!("sunbridge_{device_id}")],
        "name": device_id.as_str(),
        "model": kind.as_str(),
        "manufacturer": "sunbridge",
    });

    for meta in sensors_for(kind) {
        let payload = json!({
            "name": meta.name,
            "unique_id": format!("sunbridge_{device_id}_{}", meta.key),
            "state_topic": scheme.state(device_id),
            "availability_topic": scheme.availability(device_id),
            "value_template": format!("{{{{ value_json.{} }}}}", meta.key),
            "unit_of_measurement": meta.unit,
            "device_class": meta.device_class,
            "state_class": meta.state_class,
            "device": device_block,
        });

        let topic = scheme.discovery("sensor", device_id, meta.key);
        publisher.publish_json(&topic, &payload, true).await?;
    }

    for (key, name) in binary_sensors_for(kind) {
        let payload = json!({
            "name": name,
            "unique_id": format!("sunbridge_{device_id}_{key}"),
            "state_topic": scheme.state(device_id),
            "availability_topic": scheme.availability(device_id),
            "value_template": format!("{{{{ 'ON' if value_json.{key} else 'OFF' }}}}"),
            "device": device_block,
        });

        let topic = scheme.discovery("binary_sensor", device_id, key);
        publisher.publish_json(&topic, &payload, true).await?;
    }

    tracing::debug!(device_id = %device_id, kind = %kind, "Discovery published");
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
