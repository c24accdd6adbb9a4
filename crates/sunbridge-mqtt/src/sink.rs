// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bus-to-broker forwarding task.
//!
//! Subscribes to the data bus and pushes readings, availability, and
//! validation diagnostics to the broker. Publish failures are logged and
//! dropped; the pollers keep their cadence and the next cycle carries
//! fresh data anyway.

use std::collections::HashSet;

use tokio::sync::broadcast;

use sunbridge_core::bus::BusEvent;
use sunbridge_core::types::{DeviceId, DeviceKind};

use crate::client::MqttPublisher;
use crate::discovery::publish_discovery;
use crate::topics::TopicScheme;

/// Availability payloads, retained so consumers see state across restarts.
const ONLINE: &str = "online";
const OFFLINE: &str = "offline";

// =============================================================================
// PublishSink
// =============================================================================

/// Forwards bus events to the broker.
pub struct PublishSink {
    publisher: MqttPublisher,
    scheme: TopicScheme,
    discovery_sent: HashSet<DeviceId>,
}

impl PublishSink {
    /// Creates a sink.
    pub fn new(publisher: MqttPublisher, scheme: TopicScheme) -> Self {
        Self {
            publisher,
            scheme,
            discovery_sent: HashSet::new(),
        }
    }

    /// Runs the forwarding loop until shutdown is signaled.
    ///
    /// `events` is a subscription taken from the data bus before the
    /// pollers start, so no early reading is lost.
    pub async fn run(
        mut self,
        mut events: broadcast::Receiver<BusEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!("Publish sink started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                event = events.recv() => match event {
                    Ok(event) => self.handle(event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed = missed, "Publish sink lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        tracing::info!("Publish sink stopped");
    }

    /// Handles one bus event.
    pub async fn handle(&mut self, event: BusEvent) {
        match event {
            BusEvent::Reading(reading) => {
                self.ensure_discovery(&reading.device_id, reading.kind).await;

                let topic = self.scheme.state(&reading.device_id);
                if let Err(err) = self
                    .publisher
                    .publish_json(&topic, &reading.to_state_json(), false)
                    .await
                {
                    tracing::warn!(
                        device_id = %reading.device_id,
                        error = %err,
                        "State publish failed, retrying next cycle"
                    );
                }
            }
            BusEvent::Availability { device_id, online } => {
                let topic = self.scheme.availability(&device_id);
                let payload = if online { ONLINE } else { OFFLINE };
                if let Err(err) = self.publisher.publish_str(&topic, payload, true).await {
                    tracing::warn!(
                        device_id = %device_id,
                        error = %err,
                        "Availability publish failed"
                    );
                }
            }
            BusEvent::Rejections { device_id, stats } => {
                let topic = self.scheme.validation(&device_id);
                match serde_json::to_value(&*stats) {
                    Ok(payload) => {
                        if let Err(err) = self.publisher.publish_json(&topic, &payload, false).await
                        {
                            tracing::warn!(
                                device_id = %device_id,
                                error = %err,
                                "Validation stats publish failed"
                            );
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Validation stats serialization failed");
                    }
                }
            }
        }
    }

    /// Publishes discovery metadata the first time a device produces data.
    async fn ensure_discovery(&mut self, device_id: &DeviceId, kind: DeviceKind) {
        if self.discovery_sent.contains(device_id) {
            return;
        }

        match publish_discovery(&self.publisher, &self.scheme, device_id, kind).await {
            Ok(()) => {
                self.discovery_sent.insert(device_id.clone());
            }
            Err(err) => {
                // Not marked as sent; retried with the next reading.
                tracing::warn!(
                    device_id = %device_id,
                    error = %err,
                    "Discovery publish failed"
                );
            }
        }
    }

}

/// Publishes a final retained offline notice for the given devices.
///
/// Called by the runtime during shutdown, after the pollers stopped, so
/// consumers do not keep showing stale data from a dead gateway.
pub async fn publish_all_offline(
    publisher: &MqttPublisher,
    scheme: &TopicScheme,
    devices: &[DeviceId],
) {
    for device_id in devices {
        let topic = scheme.availability(device_id);
        if let Err(err) = publisher.publish_str(&topic, OFFLINE, true).await {
            tracing::debug!(
                device_id = %device_id,
                error = %err,
                "Final offline publish failed"
            );
        }
    }
}

impl std::fmt::Debug for PublishSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishSink")
            .field("discovery_sent", &self.discovery_sent.len())
            .finish()
    }
}
