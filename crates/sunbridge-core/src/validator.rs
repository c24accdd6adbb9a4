// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Stateful plausibility filter for decoded readings.
//!
//! Some charge controllers occasionally emit wild register values (a 40 A
//! battery current on a 20 A system, a 600 % state of charge). The validator
//! rejects those without losing track of legitimate trends:
//!
//! - absolute bounds: value must lie in `[min, max]`
//! - rate-of-change clamp: `|value - last_accepted| <= max_delta`
//!
//! A rejected field is held at its last accepted value and downgraded to
//! [`DataQuality::stale`]. Validator state belongs to the device poller and
//! survives reconnects; a link drop must not open a window in which a spike
//! would be accepted as a "first" reading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::{BadReason, DataQuality, DeviceId, Reading, Value};

/// Maximum number of rejections kept for diagnostics.
const MAX_REJECTION_LOG: usize = 100;

// =============================================================================
// Field Limits
// =============================================================================

/// Validation limits for a single sensor field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldLimits {
    /// Minimum plausible value.
    pub min: f64,
    /// Maximum plausible value.
    pub max: f64,
    /// Maximum allowed change per poll; `None` disables the spike check
    /// (used for cumulative counters).
    #[serde(default)]
    pub max_delta: Option<f64>,
}

impl FieldLimits {
    /// Creates limits with a rate-of-change clamp.
    pub const fn new(min: f64, max: f64, max_delta: f64) -> Self {
        Self {
            min,
            max,
            max_delta: Some(max_delta),
        }
    }

    /// Creates limits with absolute bounds only.
    pub const fn bounds_only(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            max_delta: None,
        }
    }
}

/// Default limits for charge-controller fields.
///
/// Values follow the envelope of a 12/24 V Rover-class controller, the one
/// device family observed to produce spikes in the field.
pub fn controller_limits() -> HashMap<String, FieldLimits> {
    let table: &[(&str, FieldLimits)] = &[
        // Battery
        ("battery_voltage", FieldLimits::new(0.0, 20.0, 5.0)),
        ("battery_current", FieldLimits::new(-100.0, 100.0, 50.0)),
        ("battery_percentage", FieldLimits::new(0.0, 100.0, 50.0)),
        ("battery_temperature", FieldLimits::new(-40.0, 85.0, 20.0)),
        ("charging_amp_hours_today", FieldLimits::new(0.0, 10_000.0, 200.0)),
        ("discharging_amp_hours_today", FieldLimits::new(0.0, 10_000.0, 200.0)),
        // PV
        ("pv_voltage", FieldLimits::new(0.0, 100.0, 40.0)),
        ("pv_current", FieldLimits::new(0.0, 100.0, 50.0)),
        ("pv_power", FieldLimits::new(0.0, 5_000.0, 2_000.0)),
        ("max_charging_power_today", FieldLimits::bounds_only(0.0, 5_000.0)),
        ("power_generation_today", FieldLimits::bounds_only(0.0, 50_000.0)),
        ("power_generation_total", FieldLimits::new(0.0, 1e9, 100_000.0)),
        // Load
        ("load_voltage", FieldLimits::new(0.0, 20.0, 20.0)),
        ("load_current", FieldLimits::new(0.0, 20.0, 20.0)),
        ("load_power", FieldLimits::new(0.0, 3_000.0, 1_500.0)),
        ("power_consumption_today", FieldLimits::bounds_only(0.0, 50_000.0)),
        ("max_discharging_power_today", FieldLimits::bounds_only(0.0, 3_000.0)),
        // Controller
        ("controller_temperature", FieldLimits::new(-40.0, 85.0, 20.0)),
    ];

    table
        .iter()
        .map(|(name, limits)| (name.to_string(), *limits))
        .collect()
}

// =============================================================================
// Rejection
// =============================================================================

/// Why a field value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Value below the configured minimum.
    BelowMinimum {
        /// The configured minimum.
        min: f64,
    },
    /// Value above the configured maximum.
    AboveMaximum {
        /// The configured maximum.
        max: f64,
    },
    /// Change since the last accepted value exceeded the clamp.
    SpikeDetected {
        /// Absolute change observed.
        change: f64,
        /// The configured clamp.
        max_delta: f64,
    },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::BelowMinimum { min } => write!(f, "below minimum {min}"),
            RejectionReason::AboveMaximum { max } => write!(f, "above maximum {max}"),
            RejectionReason::SpikeDetected { change, max_delta } => {
                write!(f, "spike: change {change:.2} exceeds {max_delta}")
            }
        }
    }
}

/// Record of one rejected field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// When the rejection happened.
    pub timestamp: DateTime<Utc>,
    /// The affected field.
    pub field: String,
    /// The value that was rejected.
    pub rejected_value: f64,
    /// Why it was rejected.
    pub reason: RejectionReason,
    /// The value reported instead, if any.
    pub last_good_value: Option<f64>,
}

/// Aggregated rejection statistics for publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionStats {
    /// Total rejections in the log window.
    pub total_rejections: usize,
    /// Rejection counts per field.
    pub counts_by_field: HashMap<String, usize>,
    /// The most recent rejections (up to 5).
    pub recent: Vec<Rejection>,
}

// =============================================================================
// Validator
// =============================================================================

/// Per-field state: last accepted value plus the number of polls since the
/// last acceptance.
#[derive(Debug, Clone, Copy)]
struct FieldState {
    last_accepted: f64,
    polls_since_accept: u32,
}

/// Stateful per-device validator.
///
/// Calling [`Validator::validate`] twice with an identical, already-accepted
/// reading leaves the state unchanged: the delta against the stored value is
/// zero the second time.
#[derive(Debug)]
pub struct Validator {
    device_id: DeviceId,
    limits: HashMap<String, FieldLimits>,
    state: HashMap<String, FieldState>,
    rejection_log: Vec<Rejection>,
}

impl Validator {
    /// Creates a validator with the given per-field limits.
    ///
    /// A field without an entry in `limits` passes through unvalidated.
    pub fn new(device_id: DeviceId, limits: HashMap<String, FieldLimits>) -> Self {
        Self {
            device_id,
            limits,
            state: HashMap::new(),
            rejection_log: Vec::new(),
        }
    }

    /// Creates a validator with no limits; every field passes through.
    pub fn passthrough(device_id: DeviceId) -> Self {
        Self::new(device_id, HashMap::new())
    }

    /// Validates a reading in place.
    ///
    /// Rejected fields are replaced with the last accepted value and marked
    /// [`DataQuality::stale`]; a field rejected before any value was ever
    /// accepted is downgraded to `Bad(OutOfRange)` so the sink suppresses
    /// it. Returns the rejections from this cycle.
    pub fn validate(&mut self, reading: &mut Reading) -> Vec<Rejection> {
        if self.limits.is_empty() {
            return Vec::new();
        }

        let mut rejections = Vec::new();

        for (name, field) in reading.fields.iter_mut() {
            let Some(limits) = self.limits.get(name) else {
                continue;
            };
            let Some(value) = field.value.as_f64() else {
                continue;
            };

            let reason = self.check(name, value, limits);

            match reason {
                None => {
                    let entry = self.state.entry(name.clone()).or_insert(FieldState {
                        last_accepted: value,
                        polls_since_accept: 0,
                    });
                    entry.last_accepted = value;
                    entry.polls_since_accept = 0;
                }
                Some(reason) => {
                    let last_good = self.state.get_mut(name).map(|s| {
                        s.polls_since_accept = s.polls_since_accept.saturating_add(1);
                        s.last_accepted
                    });

                    tracing::warn!(
                        device_id = %self.device_id,
                        field = %name,
                        rejected = value,
                        reason = %reason,
                        "Rejected implausible value"
                    );

                    match last_good {
                        Some(last) => {
                            field.value = Value::Float(last);
                            field.quality = DataQuality::stale();
                        }
                        None => {
                            field.quality = DataQuality::Bad(BadReason::OutOfRange);
                        }
                    }

                    let rejection = Rejection {
                        timestamp: Utc::now(),
                        field: name.clone(),
                        rejected_value: value,
                        reason,
                        last_good_value: last_good,
                    };
                    rejections.push(rejection.clone());
                    self.log_rejection(rejection);
                }
            }
        }

        rejections
    }

    /// Checks one value against its limits.
    fn check(&self, field: &str, value: f64, limits: &FieldLimits) -> Option<RejectionReason> {
        if value < limits.min {
            return Some(RejectionReason::BelowMinimum { min: limits.min });
        }
        if value > limits.max {
            return Some(RejectionReason::AboveMaximum { max: limits.max });
        }

        if let (Some(max_delta), Some(state)) = (limits.max_delta, self.state.get(field)) {
            let change = (value - state.last_accepted).abs();
            if change > max_delta {
                return Some(RejectionReason::SpikeDetected { change, max_delta });
            }
        }

        None
    }

    fn log_rejection(&mut self, rejection: Rejection) {
        self.rejection_log.push(rejection);
        if self.rejection_log.len() > MAX_REJECTION_LOG {
            let excess = self.rejection_log.len() - MAX_REJECTION_LOG;
            self.rejection_log.drain(..excess);
        }
    }

    /// Returns the last accepted value for a field, if any.
    pub fn last_accepted(&self, field: &str) -> Option<f64> {
        self.state.get(field).map(|s| s.last_accepted)
    }

    /// Returns how many polls ago a field was last accepted.
    pub fn polls_since_accept(&self, field: &str) -> Option<u32> {
        self.state.get(field).map(|s| s.polls_since_accept)
    }

    /// Returns aggregated rejection statistics.
    pub fn rejection_stats(&self) -> RejectionStats {
        let mut counts_by_field: HashMap<String, usize> = HashMap::new();
        for r in &self.rejection_log {
            *counts_by_field.entry(r.field.clone()).or_default() += 1;
        }

        let recent = self
            .rejection_log
            .iter()
            .rev()
            .take(5)
            .rev()
            .cloned()
            .collect();

        RejectionStats {
            total_rejections: self.rejection_log.len(),
            counts_by_field,
            recent,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceKind;

    fn limits(min: f64, max: f64, max_delta: f64) -> HashMap<String, FieldLimits> {
        let mut m = HashMap::new();
        m.insert("power".to_string(), FieldLimits::new(min, max, max_delta));
        m
    }

    fn reading_with(field: &str, value: f64) -> Reading {
        let mut reading = Reading::new(DeviceId::new("test"), DeviceKind::Controller);
        reading.insert(field, value);
        reading
    }

    #[test]
    fn test_first_reading_accepted() {
        let mut validator = Validator::new(DeviceId::new("test"), limits(0.0, 100.0, 5.0));
        let mut reading = reading_with("power", 50.0);

        let rejections = validator.validate(&mut reading);

        assert!(rejections.is_empty());
        assert_eq!(validator.last_accepted("power"), Some(50.0));
        assert_eq!(reading.quality("power"), Some(DataQuality::Good));
    }

    #[test]
    fn test_spike_rejected_and_held_at_last_good() {
        let mut validator = Validator::new(DeviceId::new("test"), limits(0.0, 100.0, 5.0));

        let mut reading = reading_with("power", 50.0);
        validator.validate(&mut reading);

        let mut reading = reading_with("power", 80.0);
        let rejections = validator.validate(&mut reading);

        assert_eq!(rejections.len(), 1);
        assert!(matches!(
            rejections[0].reason,
            RejectionReason::SpikeDetected { .. }
        ));
        assert_eq!(reading.get("power"), Some(&Value::Float(50.0)));
        assert_eq!(reading.quality("power"), Some(DataQuality::stale()));
        assert_eq!(validator.last_accepted("power"), Some(50.0));
        assert_eq!(validator.polls_since_accept("power"), Some(1));
    }

    #[test]
    fn test_small_change_accepted() {
        let mut validator = Validator::new(DeviceId::new("test"), limits(0.0, 100.0, 5.0));

        let mut reading = reading_with("power", 50.0);
        validator.validate(&mut reading);

        let mut reading = reading_with("power", 53.0);
        let rejections = validator.validate(&mut reading);

        assert!(rejections.is_empty());
        assert_eq!(validator.last_accepted("power"), Some(53.0));
    }

    #[test]
    fn test_out_of_bounds_rejected_without_prior_state() {
        // Absolute bounds apply even to the very first reading.
        let mut validator = Validator::new(DeviceId::new("test"), limits(0.0, 100.0, 5.0));
        let mut reading = reading_with("power", 150.0);

        let rejections = validator.validate(&mut reading);

        assert_eq!(rejections.len(), 1);
        assert!(matches!(
            rejections[0].reason,
            RejectionReason::AboveMaximum { .. }
        ));
        assert_eq!(rejections[0].last_good_value, None);
        assert_eq!(
            reading.quality("power"),
            Some(DataQuality::Bad(BadReason::OutOfRange))
        );
        assert_eq!(validator.last_accepted("power"), None);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let mut validator = Validator::new(DeviceId::new("test"), limits(0.0, 100.0, 5.0));

        let mut reading = reading_with("power", 50.0);
        validator.validate(&mut reading);

        // Same value again: delta is zero, state unchanged.
        let mut reading = reading_with("power", 50.0);
        let rejections = validator.validate(&mut reading);

        assert!(rejections.is_empty());
        assert_eq!(validator.last_accepted("power"), Some(50.0));
        assert_eq!(validator.polls_since_accept("power"), Some(0));
    }

    #[test]
    fn test_unconfigured_field_passes_through() {
        let mut validator = Validator::new(DeviceId::new("test"), limits(0.0, 100.0, 5.0));
        let mut reading = reading_with("pv_voltage", 9999.0);

        let rejections = validator.validate(&mut reading);

        assert!(rejections.is_empty());
        assert_eq!(reading.get("pv_voltage"), Some(&Value::Float(9999.0)));
    }

    #[test]
    fn test_non_numeric_fields_ignored() {
        let mut validator = Validator::new(DeviceId::new("test"), limits(0.0, 100.0, 5.0));
        let mut reading = Reading::new(DeviceId::new("test"), DeviceKind::Controller);
        reading.insert("power", "mppt");

        let rejections = validator.validate(&mut reading);
        assert!(rejections.is_empty());
    }

    #[test]
    fn test_bounds_only_field_allows_any_delta() {
        let mut m = HashMap::new();
        m.insert(
            "power_generation_today".to_string(),
            FieldLimits::bounds_only(0.0, 50_000.0),
        );
        let mut validator = Validator::new(DeviceId::new("test"), m);

        let mut reading = reading_with("power_generation_today", 10.0);
        validator.validate(&mut reading);
        let mut reading = reading_with("power_generation_today", 40_000.0);
        let rejections = validator.validate(&mut reading);

        assert!(rejections.is_empty());
    }

    #[test]
    fn test_rejection_log_bounded() {
        let mut validator = Validator::new(DeviceId::new("test"), limits(0.0, 100.0, 5.0));

        for _ in 0..150 {
            let mut reading = reading_with("power", 500.0);
            validator.validate(&mut reading);
        }

        let stats = validator.rejection_stats();
        assert_eq!(stats.total_rejections, MAX_REJECTION_LOG);
        assert_eq!(stats.counts_by_field.get("power"), Some(&MAX_REJECTION_LOG));
        assert_eq!(stats.recent.len(), 5);
    }

    #[test]
    fn test_controller_limits_table() {
        let limits = controller_limits();
        let soc = limits.get("battery_percentage").unwrap();
        assert_eq!(soc.min, 0.0);
        assert_eq!(soc.max, 100.0);
        assert_eq!(soc.max_delta, Some(50.0));

        // Cumulative counters carry no delta clamp.
        assert_eq!(
            limits.get("power_generation_today").unwrap().max_delta,
            None
        );
    }
}
