// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Abstract BLE transport for the vendor BT modules.
//!
//! The [`BleTransport`] trait is the seam between the adapter session and
//! the radio: the production implementation drives a GATT peripheral
//! ([`crate::gatt::GattTransport`]), while tests inject scripted mocks.
//! Nothing above this trait touches the radio directly.

use std::time::Duration;

use async_trait::async_trait;

use sunbridge_core::error::BleResult;

// =============================================================================
// BleTransport Trait
// =============================================================================

/// Byte-level exchange with one physical BT module.
///
/// The protocol is write-then-notify: a request frame is written to the
/// module's write characteristic and the response arrives as one or more
/// notification chunks on the notify characteristic. The transport exposes
/// the chunks as they arrive; frame reassembly happens above.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Serialization of concurrent
/// callers is the adapter session's job; a transport may assume one
/// outstanding exchange at a time.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Establishes the link to the module.
    ///
    /// # Errors
    ///
    /// Returns [`BleError::ConnectionFailed`](sunbridge_core::BleError) if
    /// the peripheral cannot be found or connected, or
    /// `CharacteristicNotFound` if it lacks the vendor GATT service.
    async fn connect(&mut self) -> BleResult<()>;

    /// Closes the link.
    async fn disconnect(&mut self) -> BleResult<()>;

    /// Returns `true` if the link is up.
    fn is_connected(&self) -> bool;

    /// Writes a request frame to the module.
    ///
    /// # Errors
    ///
    /// `ConnectionLost` if the link dropped, `NotConnected` if it was never
    /// up.
    async fn send(&mut self, request: &[u8]) -> BleResult<()>;

    /// Waits for the next notification chunk.
    ///
    /// # Errors
    ///
    /// `Timeout` if no chunk arrives within `timeout`; `ConnectionLost` if
    /// the link dropped while waiting.
    async fn recv_chunk(&mut self, timeout: Duration) -> BleResult<Vec<u8>>;

    /// Returns a display name for logs.
    fn display_name(&self) -> String;
}

// =============================================================================
// Discovered Devices
// =============================================================================

/// One peripheral seen during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    /// MAC address (colon-separated, upper case).
    pub address: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength in dBm, if reported.
    pub rssi: Option<i16>,
}

impl DiscoveredDevice {
    /// Returns `true` if the advertised name looks like a vendor BT module.
    pub fn is_vendor_module(&self) -> bool {
        match &self.name {
            Some(name) => name.starts_with("BT-TH") || name.to_uppercase().contains("RENOGY"),
            None => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_module_detection() {
        let named = |name: &str| DiscoveredDevice {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            name: Some(name.to_string()),
            rssi: Some(-60),
        };

        assert!(named("BT-TH-66F94E1C").is_vendor_module());
        assert!(named("Renogy Hub").is_vendor_module());
        assert!(!named("Kitchen Speaker").is_vendor_module());

        let unnamed = DiscoveredDevice {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            name: None,
            rssi: None,
        };
        assert!(!unnamed.is_vendor_module());
    }
}
