// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data types for sunbridge.
//!
//! This module provides the transport-agnostic data types that flow through
//! the gateway: device identities, sensor values, data quality, and the
//! per-poll [`Reading`] snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Identifiers
// =============================================================================

/// A unique identifier for a configured device.
///
/// Device IDs are stable across restarts and unique within a gateway
/// instance.
///
/// # Examples
///
/// ```
/// use sunbridge_core::types::DeviceId;
///
/// let id = DeviceId::new("rover-40");
/// assert_eq!(id.as_str(), "rover-40");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new device ID.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the ID and returns the inner string.
    #[inline]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Device Kind
// =============================================================================

/// The category of solar hardware behind a device ID.
///
/// The register map, the per-cycle read plan, and the decoder are all keyed
/// by this closed set. Dispatch is resolved once per device at construction,
/// never per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Solar charge controller (Rover/Wanderer class).
    Controller,
    /// Smart LiFePO4 battery with built-in BMS.
    Battery,
    /// Inverter / inverter-charger.
    Inverter,
}

impl DeviceKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Controller => "controller",
            DeviceKind::Battery => "battery",
            DeviceKind::Inverter => "inverter",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "controller" => Ok(DeviceKind::Controller),
            "battery" => Ok(DeviceKind::Battery),
            "inverter" => Ok(DeviceKind::Inverter),
            other => Err(format!("unknown device kind: {other}")),
        }
    }
}

// =============================================================================
// Value Types
// =============================================================================

/// A decoded sensor value.
///
/// The register decoder produces exactly these shapes: scaled floats,
/// raw integers, boolean flags, enum labels, per-cell float arrays, and
/// label lists for fault/alarm summaries.
///
/// # Examples
///
/// ```
/// use sunbridge_core::types::Value;
///
/// let soc = Value::Float(87.5);
/// assert_eq!(soc.as_f64(), Some(87.5));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Scaled measurement (voltage, current, power, temperature, ...).
    Float(f64),
    /// Raw counter or percentage.
    Integer(i64),
    /// Boolean status flag (heater on, fully charged, ...).
    Bool(bool),
    /// Enum label or free-form text (charging status, model name).
    Text(String),
    /// Per-cell measurements; length equals the reported cell count.
    FloatArray(Vec<f64>),
    /// Active fault / warning labels.
    Labels(Vec<String>),
}

impl Value {
    /// Returns the type name of this value.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Float(_) => "float",
            Value::Integer(_) => "integer",
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
            Value::FloatArray(_) => "float_array",
            Value::Labels(_) => "labels",
        }
    }

    /// Returns `true` if this is a numeric value.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Float(_) | Value::Integer(_))
    }

    /// Attempts to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Attempts to convert this value to an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Attempts to get this value as a string reference.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Converts this value to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Float(v) => serde_json::json!(*v),
            Value::Integer(v) => serde_json::json!(*v),
            Value::Bool(v) => serde_json::Value::Bool(*v),
            Value::Text(v) => serde_json::Value::String(v.clone()),
            Value::FloatArray(v) => serde_json::json!(v),
            Value::Labels(v) => serde_json::json!(v),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::FloatArray(v) => write!(f, "[{} cells]", v.len()),
            Value::Labels(v) => write!(f, "[{} labels]", v.len()),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

// =============================================================================
// Data Quality
// =============================================================================

/// The quality status of a sensor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DataQuality {
    /// The value passed validation and is current.
    #[default]
    Good,

    /// The value is usable but not current.
    Uncertain(UncertainReason),

    /// The value should not be used.
    Bad(BadReason),
}

impl DataQuality {
    /// Returns `true` if the quality is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        matches!(self, DataQuality::Good)
    }

    /// Returns `true` if the value is usable (good or uncertain).
    #[inline]
    pub fn is_usable(&self) -> bool {
        matches!(self, DataQuality::Good | DataQuality::Uncertain(_))
    }

    /// Quality for a field held at its last accepted value.
    #[inline]
    pub fn stale() -> Self {
        DataQuality::Uncertain(UncertainReason::LastKnownValue)
    }
}

impl fmt::Display for DataQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQuality::Good => write!(f, "good"),
            DataQuality::Uncertain(reason) => write!(f, "uncertain({})", reason),
            DataQuality::Bad(reason) => write!(f, "bad({})", reason),
        }
    }
}

/// Reasons for uncertain quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertainReason {
    /// Validation rejected the incoming value; the last accepted value is
    /// reported instead.
    LastKnownValue,
}

impl fmt::Display for UncertainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UncertainReason::LastKnownValue => write!(f, "last_known_value"),
        }
    }
}

/// Reasons for bad quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadReason {
    /// Value outside configured absolute bounds with no prior accepted value.
    OutOfRange,
    /// Device unreachable.
    NotConnected,
}

impl fmt::Display for BadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BadReason::OutOfRange => write!(f, "out_of_range"),
            BadReason::NotConnected => write!(f, "not_connected"),
        }
    }
}

// =============================================================================
// Reading
// =============================================================================

/// A single sensor field inside a [`Reading`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// The decoded (or held-over) value.
    pub value: Value,
    /// The quality of the value.
    pub quality: DataQuality,
}

impl Field {
    /// Creates a good-quality field.
    pub fn good(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            quality: DataQuality::Good,
        }
    }
}

/// One poll cycle's worth of decoded, validated sensor data for a device.
///
/// A reading is assembled once per cycle and never mutated after the
/// validator has run. Fields that failed validation are present with
/// `Uncertain` quality and the last accepted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// The device this reading came from.
    pub device_id: DeviceId,

    /// The device category.
    pub kind: DeviceKind,

    /// When the poll cycle that produced this reading started.
    pub captured_at: DateTime<Utc>,

    /// Sensor fields, keyed by field name.
    pub fields: BTreeMap<String, Field>,
}

impl Reading {
    /// Creates an empty reading stamped with the current time.
    pub fn new(device_id: DeviceId, kind: DeviceKind) -> Self {
        Self {
            device_id,
            kind,
            captured_at: Utc::now(),
            fields: BTreeMap::new(),
        }
    }

    /// Inserts a good-quality field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), Field::good(value));
    }

    /// Inserts a field with explicit quality.
    pub fn insert_with_quality(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        quality: DataQuality,
    ) {
        self.fields.insert(
            name.into(),
            Field {
                value: value.into(),
                quality,
            },
        );
    }

    /// Returns a field value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).map(|f| &f.value)
    }

    /// Returns a field's quality by name.
    pub fn quality(&self, name: &str) -> Option<DataQuality> {
        self.fields.get(name).map(|f| f.quality)
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the reading carries no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merges another reading's fields into this one.
    ///
    /// Later blocks win on name collisions, matching the order the poller
    /// reads register blocks.
    pub fn merge(&mut self, other: Reading) {
        self.fields.extend(other.fields);
    }

    /// Serializes the usable fields as a flat JSON object.
    ///
    /// Fields with `Bad` quality are omitted rather than published.
    pub fn to_state_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .filter(|(_, f)| f.quality.is_usable())
            .map(|(k, f)| (k.clone(), f.value.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} fields @ {}",
            self.device_id,
            self.kind,
            self.fields.len(),
            self.captured_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// The connection state of an adapter session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,

    /// Connection attempt in progress.
    Connecting,

    /// Connected and operational.
    Connected,

    /// Reconnecting after a failure.
    Reconnecting,
}

impl ConnectionState {
    /// Returns `true` if the session is connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Returns `true` if the session is in a transitional state.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id() {
        let id = DeviceId::new("rover-40");
        assert_eq!(id.as_str(), "rover-40");
        assert_eq!(format!("{}", id), "rover-40");
    }

    #[test]
    fn test_device_kind_round_trip() {
        for kind in [
            DeviceKind::Controller,
            DeviceKind::Battery,
            DeviceKind::Inverter,
        ] {
            let parsed: DeviceKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("toaster".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::Float(12.8).as_f64(), Some(12.8));
        assert_eq!(Value::Integer(87).as_f64(), Some(87.0));
        assert_eq!(Value::Integer(87).as_i64(), Some(87));
        assert_eq!(Value::Text("mppt".into()).as_str(), Some("mppt"));
        assert_eq!(Value::Text("mppt".into()).as_f64(), None);
        assert!(Value::Float(1.0).is_numeric());
        assert!(!Value::Bool(true).is_numeric());
    }

    #[test]
    fn test_data_quality() {
        assert!(DataQuality::Good.is_good());
        assert!(DataQuality::stale().is_usable());
        assert!(!DataQuality::stale().is_good());
        assert!(!DataQuality::Bad(BadReason::OutOfRange).is_usable());
    }

    #[test]
    fn test_reading_merge_and_state_json() {
        let mut reading = Reading::new(DeviceId::new("batt-1"), DeviceKind::Battery);
        reading.insert("voltage", 13.2);

        let mut block = Reading::new(DeviceId::new("batt-1"), DeviceKind::Battery);
        block.insert("soc", 87i64);
        block.insert_with_quality(
            "current",
            0.0,
            DataQuality::Bad(BadReason::OutOfRange),
        );
        reading.merge(block);

        assert_eq!(reading.len(), 3);
        assert_eq!(reading.get("voltage"), Some(&Value::Float(13.2)));

        let json = reading.to_state_json();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("voltage"));
        assert!(obj.contains_key("soc"));
        // Bad-quality fields never reach the broker.
        assert!(!obj.contains_key("current"));
    }

    #[test]
    fn test_connection_state() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(ConnectionState::Reconnecting.is_transitioning());
        assert!(!ConnectionState::Disconnected.is_connected());
    }
}
