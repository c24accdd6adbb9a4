// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Topic layout for the broker.
//!
//! ```text
//! {prefix}/{device}/state          - flat JSON of the latest reading
//! {prefix}/{device}/availability   - "online" / "offline", retained
//! {prefix}/{device}/validation     - validator rejection diagnostics
//! {discovery_prefix}/{component}/{device}_{field}/config
//! ```

use sunbridge_core::types::DeviceId;

/// Topic builder shared by the sink and discovery publisher.
#[derive(Debug, Clone)]
pub struct TopicScheme {
    topic_prefix: String,
    discovery_prefix: String,
}

impl TopicScheme {
    /// Creates a scheme from the configured prefixes.
    pub fn new(topic_prefix: impl Into<String>, discovery_prefix: impl Into<String>) -> Self {
        Self {
            topic_prefix: trim_slashes(topic_prefix.into()),
            discovery_prefix: trim_slashes(discovery_prefix.into()),
        }
    }

    /// State topic for a device.
    pub fn state(&self, device: &DeviceId) -> String {
        format!("{}/{}/state", self.topic_prefix, device)
    }

    /// Availability topic for a device.
    pub fn availability(&self, device: &DeviceId) -> String {
        format!("{}/{}/availability", self.topic_prefix, device)
    }

    /// Validation diagnostics topic for a device.
    pub fn validation(&self, device: &DeviceId) -> String {
        format!("{}/{}/validation", self.topic_prefix, device)
    }

    /// Discovery config topic for one sensor of a device.
    pub fn discovery(&self, component: &str, device: &DeviceId, field: &str) -> String {
        format!(
            "{}/{}/{}_{}/config",
            self.discovery_prefix, component, device, field
        )
    }
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self::new("sunbridge", "homeassistant")
    }
}

fn trim_slashes(s: String) -> String {
    s.trim_matches('/').to_string()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_layout() {
        let scheme = TopicScheme::new("solar", "homeassistant");
        let device = DeviceId::new("batt-1");

        assert_eq!(scheme.state(&device), "solar/batt-1/state");
        assert_eq!(scheme.availability(&device), "solar/batt-1/availability");
        assert_eq!(scheme.validation(&device), "solar/batt-1/validation");
        assert_eq!(
            scheme.discovery("sensor", &device, "soc"),
            "homeassistant/sensor/batt-1_soc/config"
        );
    }

    #[test]
    fn test_prefixes_trimmed() {
        let scheme = TopicScheme::new("solar/", "/homeassistant/");
        let device = DeviceId::new("inv-1");
        assert_eq!(scheme.state(&device), "solar/inv-1/state");
        assert_eq!(
            scheme.discovery("sensor", &device, "temperature"),
            "homeassistant/sensor/inv-1_temperature/config"
        );
    }
}
