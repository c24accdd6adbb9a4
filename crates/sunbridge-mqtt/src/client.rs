// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Broker client wrapper.
//!
//! Wraps `rumqttc`'s async client: the event loop runs in its own task and
//! keeps the connection alive; publishes enqueue into the client and fail
//! fast with a [`PublishError`] instead of ever blocking a poller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;

use sunbridge_core::error::{PublishError, PublishResult};

// =============================================================================
// MqttSettings
// =============================================================================

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// Broker hostname or IP.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Optional username.
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<String>,
    /// Client identifier.
    pub client_id: String,
    /// Keep-alive interval.
    pub keep_alive: Duration,
}

impl MqttSettings {
    /// Creates settings for a broker address.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 1883,
            username: None,
            password: None,
            client_id: "sunbridge".to_string(),
            keep_alive: Duration::from_secs(60),
        }
    }

    /// Sets the broker port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets authentication credentials.
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the client ID.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }
}

// =============================================================================
// MqttPublisher
// =============================================================================

/// Handle for publishing to the broker.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl MqttPublisher {
    /// Starts the client and its event-loop driver task.
    ///
    /// The returned task owns the network connection; abort or await it on
    /// shutdown after [`MqttPublisher::disconnect`].
    pub fn start(settings: &MqttSettings) -> (Self, JoinHandle<()>) {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            options.set_credentials(user, pass);
        }

        let (client, mut event_loop) = AsyncClient::new(options, 64);
        let connected = Arc::new(AtomicBool::new(false));

        let host = settings.host.clone();
        let port = settings.port;
        let connected_flag = connected.clone();
        let driver = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        connected_flag.store(true, Ordering::SeqCst);
                        tracing::info!(host = %host, port = port, "Connected to broker");
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        connected_flag.store(false, Ordering::SeqCst);
                        tracing::warn!(host = %host, "Broker closed the connection");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        connected_flag.store(false, Ordering::SeqCst);
                        tracing::warn!(host = %host, error = %err, "Broker connection error");
                        // rumqttc reconnects on the next poll; pace it.
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        (Self { client, connected }, driver)
    }

    /// Returns `true` once a CONNACK has been seen and the link is up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Publishes a JSON payload.
    pub async fn publish_json(
        &self,
        topic: &str,
        payload: &serde_json::Value,
        retain: bool,
    ) -> PublishResult<()> {
        let bytes =
            serde_json::to_vec(payload).map_err(|e| PublishError::serialization(e.to_string()))?;
        self.publish_raw(topic, bytes, retain).await
    }

    /// Publishes a plain string payload.
    pub async fn publish_str(&self, topic: &str, payload: &str, retain: bool) -> PublishResult<()> {
        self.publish_raw(topic, payload.as_bytes().to_vec(), retain)
            .await
    }

    async fn publish_raw(&self, topic: &str, payload: Vec<u8>, retain: bool) -> PublishResult<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| PublishError::send_failed(topic, e.to_string()))
    }

    /// Disconnects from the broker.
    pub async fn disconnect(&self) {
        if let Err(err) = self.client.disconnect().await {
            tracing::debug!(error = %err, "Broker disconnect failed");
        }
    }
}

impl std::fmt::Debug for MqttPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttPublisher")
            .field("connected", &self.is_connected())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
