// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `btleplug` implementation of [`BleTransport`].
//!
//! The vendor BT modules (BT-1 dongles and BT-2 hubs) expose one write
//! characteristic for requests and one notify characteristic for
//! responses. Responses larger than the MTU arrive as several
//! notifications; this transport surfaces them chunk by chunk and leaves
//! reassembly to the frame codec.

use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use uuid::Uuid;

use sunbridge_core::error::{BleError, BleResult};

use crate::transport::{BleTransport, DiscoveredDevice};

/// Write characteristic carrying request frames.
pub const WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ffd1_0000_1000_8000_00805f9b34fb);

/// Notify characteristic carrying response frames.
pub const NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb);

/// How long a connect-time discovery scan runs before giving up.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(15);

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

// =============================================================================
// GattTransport
// =============================================================================

/// BLE transport over a GATT peripheral.
pub struct GattTransport {
    /// Target MAC address (colon-separated).
    address: String,
    /// Host adapter name ("hci0", "hci1", ...).
    adapter_name: String,
    peripheral: Option<Peripheral>,
    write_char: Option<Characteristic>,
    notifications: Option<Mutex<NotificationStream>>,
}

impl GattTransport {
    /// Creates a transport for one module address on one host adapter.
    pub fn new(address: impl Into<String>, adapter_name: impl Into<String>) -> Self {
        Self {
            address: normalize_address(&address.into()),
            adapter_name: adapter_name.into(),
            peripheral: None,
            write_char: None,
            notifications: None,
        }
    }

    /// Returns the target address.
    pub fn address(&self) -> &str {
        &self.address
    }

    fn drop_link(&mut self) {
        self.peripheral = None;
        self.write_char = None;
        self.notifications = None;
    }

    async fn find_peripheral(&self, adapter: &Adapter) -> BleResult<Peripheral> {
        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| BleError::connection_failed_with("scan start failed", e))?;

        let deadline = tokio::time::Instant::now() + DISCOVERY_TIMEOUT;
        loop {
            let peripherals = adapter
                .peripherals()
                .await
                .map_err(|e| BleError::connection_failed_with("peripheral enumeration failed", e))?;

            for peripheral in peripherals {
                if normalize_address(&peripheral.address().to_string()) == self.address {
                    let _ = adapter.stop_scan().await;
                    return Ok(peripheral);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                let _ = adapter.stop_scan().await;
                return Err(BleError::device_not_found(&self.address));
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

#[async_trait]
impl BleTransport for GattTransport {
    async fn connect(&mut self) -> BleResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let adapter = open_adapter(&self.adapter_name).await?;
        let peripheral = self.find_peripheral(&adapter).await?;

        peripheral
            .connect()
            .await
            .map_err(|e| BleError::connection_failed_with("GATT connect failed", e))?;

        let result = self.setup_characteristics(&peripheral).await;
        if result.is_err() {
            let _ = peripheral.disconnect().await;
            return result;
        }

        self.peripheral = Some(peripheral);

        tracing::info!(
            address = %self.address,
            adapter = %self.adapter_name,
            "Connected to BT module"
        );

        Ok(())
    }

    async fn disconnect(&mut self) -> BleResult<()> {
        if let Some(peripheral) = self.peripheral.take() {
            if let Err(err) = peripheral.disconnect().await {
                tracing::warn!(address = %self.address, error = %err, "Disconnect failed");
            }
        }
        self.drop_link();

        tracing::debug!(address = %self.address, "Disconnected from BT module");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.peripheral.is_some() && self.write_char.is_some()
    }

    async fn send(&mut self, request: &[u8]) -> BleResult<()> {
        let (peripheral, write_char) = match (&self.peripheral, &self.write_char) {
            (Some(p), Some(c)) => (p.clone(), c.clone()),
            _ => return Err(BleError::NotConnected),
        };

        if let Err(err) = peripheral
            .write(&write_char, request, WriteType::WithoutResponse)
            .await
        {
            // A failed write means the link is gone; the session decides
            // when to reconnect.
            self.drop_link();
            return Err(BleError::connection_lost(format!("write failed: {err}")));
        }

        tracing::trace!(
            address = %self.address,
            frame = %hex::encode(request),
            "Request written"
        );
        Ok(())
    }

    async fn recv_chunk(&mut self, timeout: Duration) -> BleResult<Vec<u8>> {
        let stream = self
            .notifications
            .as_mut()
            .ok_or(BleError::NotConnected)?
            .get_mut()
            .expect("notification stream mutex poisoned");

        match tokio::time::timeout(timeout, stream.next()).await {
            Ok(Some(notification)) => {
                tracing::trace!(
                    address = %self.address,
                    chunk = %hex::encode(&notification.value),
                    "Notification chunk"
                );
                Ok(notification.value)
            }
            Ok(None) => {
                self.drop_link();
                Err(BleError::connection_lost("notification stream closed"))
            }
            Err(_) => Err(BleError::timeout(timeout)),
        }
    }

    fn display_name(&self) -> String {
        format!("BT module {} via {}", self.address, self.adapter_name)
    }
}

impl GattTransport {
    /// Locates the vendor characteristics and subscribes to notifications.
    async fn setup_characteristics(&mut self, peripheral: &Peripheral) -> BleResult<()> {
        peripheral
            .discover_services()
            .await
            .map_err(|e| BleError::connection_failed_with("service discovery failed", e))?;

        let find = |uuid: Uuid| {
            peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == uuid)
                .ok_or_else(|| BleError::characteristic_not_found(uuid.to_string()))
        };

        let write_char = find(WRITE_CHAR_UUID)?;
        let notify_char = find(NOTIFY_CHAR_UUID)?;

        peripheral
            .subscribe(&notify_char)
            .await
            .map_err(|e| BleError::connection_failed_with("notify subscription failed", e))?;

        let stream = peripheral
            .notifications()
            .await
            .map_err(|e| BleError::connection_failed_with("notification stream failed", e))?;

        self.write_char = Some(write_char);
        self.notifications = Some(Mutex::new(Box::pin(
            stream.filter(|n| futures::future::ready(n.uuid == NOTIFY_CHAR_UUID)),
        )));

        Ok(())
    }
}

impl std::fmt::Debug for GattTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GattTransport")
            .field("address", &self.address)
            .field("adapter", &self.adapter_name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

// =============================================================================
// Scanning
// =============================================================================

/// Scans for nearby peripherals on the given host adapter.
///
/// Returns discovered devices sorted by descending signal strength.
pub async fn scan(adapter_name: &str, duration: Duration) -> BleResult<Vec<DiscoveredDevice>> {
    let adapter = open_adapter(adapter_name).await?;

    adapter
        .start_scan(ScanFilter::default())
        .await
        .map_err(|e| BleError::scan_failed(e.to_string()))?;

    tokio::time::sleep(duration).await;

    let peripherals = adapter
        .peripherals()
        .await
        .map_err(|e| BleError::scan_failed(e.to_string()))?;
    let _ = adapter.stop_scan().await;

    let mut devices = Vec::with_capacity(peripherals.len());
    for peripheral in peripherals {
        let properties = peripheral
            .properties()
            .await
            .map_err(|e| BleError::scan_failed(e.to_string()))?;

        let (name, rssi) = match properties {
            Some(p) => (p.local_name, p.rssi),
            None => (None, None),
        };

        devices.push(DiscoveredDevice {
            address: normalize_address(&peripheral.address().to_string()),
            name,
            rssi,
        });
    }

    devices.sort_by_key(|d| -(d.rssi.unwrap_or(-100)));
    Ok(devices)
}

/// Opens the named host adapter, falling back to the first available.
async fn open_adapter(name: &str) -> BleResult<Adapter> {
    let manager = Manager::new()
        .await
        .map_err(|e| BleError::connection_failed_with("BLE manager unavailable", e))?;

    let adapters = manager
        .adapters()
        .await
        .map_err(|e| BleError::connection_failed_with("adapter enumeration failed", e))?;

    if adapters.is_empty() {
        return Err(BleError::connection_failed("no Bluetooth adapters present"));
    }

    for adapter in &adapters {
        let info = adapter.adapter_info().await.unwrap_or_default();
        if info.starts_with(name) {
            return Ok(adapter.clone());
        }
    }

    tracing::warn!(
        requested = %name,
        "Requested Bluetooth adapter not found, using the first available"
    );
    Ok(adapters.into_iter().next().expect("adapters is non-empty"))
}

/// Normalizes a MAC address to `AA:BB:CC:DD:EE:FF`.
pub fn normalize_address(address: &str) -> String {
    address
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect::<String>()
        .to_uppercase()
        .as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(":")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("c4:d3:6a:66:10:2e"), "C4:D3:6A:66:10:2E");
        assert_eq!(normalize_address("C4-D3-6A-66-10-2E"), "C4:D3:6A:66:10:2E");
        assert_eq!(normalize_address("c4d36a66102e"), "C4:D3:6A:66:10:2E");
    }

    #[test]
    fn test_characteristic_uuids() {
        assert_eq!(
            WRITE_CHAR_UUID.to_string(),
            "0000ffd1-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            NOTIFY_CHAR_UUID.to_string(),
            "0000fff1-0000-1000-8000-00805f9b34fb"
        );
    }
}
