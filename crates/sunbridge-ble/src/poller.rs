// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-device poll loop.
//!
//! One [`DevicePoller`] task drives one configured device: on its interval
//! it walks the device kind's register read plan through the shared
//! [`AdapterSession`], decodes and merges the blocks into a [`Reading`],
//! runs the validator, and hands the result to the data bus.
//!
//! Failure policy (per error class):
//!
//! - frame errors: bounded per-request retries, then skip the block
//! - decode errors: skip the block, keep the cycle
//! - transport errors: abort the cycle, reconnect with exponential backoff
//!
//! A wholly failed cycle is logged and skipped; validator state is
//! untouched, so the next good cycle resumes rate-of-change checks against
//! the last accepted values rather than a phantom baseline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use sunbridge_core::bus::{BusEvent, DataBus};
use sunbridge_core::error::{BridgeError, BridgeResult};
use sunbridge_core::retry::{Backoff, RetryConfig};
use sunbridge_core::types::{DeviceId, DeviceKind, Reading};
use sunbridge_core::validator::Validator;

use crate::registers::{decode_block, read_plan, FieldPair, RegisterBlock};
use crate::session::AdapterSession;

/// Shortest allowed poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Longest allowed poll interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(600);

// =============================================================================
// Configuration
// =============================================================================

/// Identity of one logical device on a BT module.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    /// Gateway-wide device ID.
    pub device_id: DeviceId,
    /// Device category; selects the register read plan.
    pub kind: DeviceKind,
    /// Numeric device address inside protocol frames (255 = broadcast,
    /// 0x30.. for hub-attached batteries).
    pub unit_id: u8,
}

/// Poll loop tuning for one device.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Poll interval; clamped to `[MIN_POLL_INTERVAL, MAX_POLL_INTERVAL]`.
    pub interval: Duration,
    /// Per-request response timeout.
    pub request_timeout: Duration,
    /// Additional attempts per register block after a retryable frame error.
    pub frame_retries: u32,
    /// Consecutive failed cycles before the device is reported unavailable.
    pub offline_after: u32,
    /// Backoff settings for the reconnect loop.
    pub reconnect: RetryConfig,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(5),
            frame_retries: 2,
            offline_after: 3,
            reconnect: RetryConfig::default()
                .with_initial_delay(Duration::from_secs(5))
                .with_max_delay(Duration::from_secs(120)),
        }
    }
}

// =============================================================================
// CycleOutcome
// =============================================================================

/// What one poll cycle produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    /// A reading was published.
    Published,
    /// Every block failed to decode; connection still up.
    Empty,
    /// The transport failed; reconnect before the next cycle.
    Transport,
}

// =============================================================================
// DevicePoller
// =============================================================================

/// Drives one configured device against its shared adapter session.
pub struct DevicePoller {
    spec: DeviceSpec,
    config: PollerConfig,
    session: Arc<AdapterSession>,
    validator: Validator,
    bus: Arc<DataBus>,
    backoff: Backoff,
    consecutive_failures: u32,
    announced_online: Option<bool>,
}

impl DevicePoller {
    /// Creates a poller.
    pub fn new(
        spec: DeviceSpec,
        config: PollerConfig,
        session: Arc<AdapterSession>,
        validator: Validator,
        bus: Arc<DataBus>,
    ) -> Self {
        let backoff = Backoff::new(config.reconnect.clone());
        Self {
            spec,
            config,
            session,
            validator,
            bus,
            backoff,
            consecutive_failures: 0,
            announced_online: None,
        }
    }

    /// Returns the device ID this poller drives.
    pub fn device_id(&self) -> &DeviceId {
        &self.spec.device_id
    }

    /// Runs the poll loop until shutdown is signaled.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let interval = self.config.interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        if interval != self.config.interval {
            tracing::warn!(
                device_id = %self.spec.device_id,
                configured = ?self.config.interval,
                clamped = ?interval,
                "Poll interval clamped"
            );
        }

        tracing::info!(
            device_id = %self.spec.device_id,
            kind = %self.spec.kind,
            unit_id = self.spec.unit_id,
            adapter = %self.session.key(),
            interval = ?interval,
            "Device poller started"
        );

        loop {
            let outcome = self.poll_cycle().await;

            let delay = match outcome {
                CycleOutcome::Published => {
                    self.backoff.reset();
                    interval
                }
                CycleOutcome::Empty => interval,
                CycleOutcome::Transport => self.backoff.next_delay(),
            };

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            if outcome == CycleOutcome::Transport && !self.session.is_connected() {
                match self.session.reconnect().await {
                    Ok(()) => {
                        tracing::info!(
                            device_id = %self.spec.device_id,
                            adapter = %self.session.key(),
                            "Reconnected after backoff"
                        );
                    }
                    Err(err) => {
                        tracing::warn!(
                            device_id = %self.spec.device_id,
                            adapter = %self.session.key(),
                            error = %err,
                            "Reconnect attempt failed"
                        );
                    }
                }
            }
        }

        tracing::info!(device_id = %self.spec.device_id, "Device poller stopped");
    }

    /// Executes one poll cycle.
    async fn poll_cycle(&mut self) -> CycleOutcome {
        if !self.session.is_connected() {
            self.mark_failed();
            return CycleOutcome::Transport;
        }

        match self.collect_reading().await {
            Ok(mut reading) if !reading.is_empty() => {
                let rejections = self.validator.validate(&mut reading);
                if !rejections.is_empty() {
                    self.publish(BusEvent::rejections(
                        self.spec.device_id.clone(),
                        self.validator.rejection_stats(),
                    ));
                }

                tracing::debug!(
                    device_id = %self.spec.device_id,
                    fields = reading.len(),
                    rejected = rejections.len(),
                    "Poll cycle complete"
                );

                self.publish(BusEvent::reading(reading));
                self.mark_online();
                CycleOutcome::Published
            }
            Ok(_) => {
                tracing::warn!(
                    device_id = %self.spec.device_id,
                    "Skipped cycle: no block decoded"
                );
                self.mark_failed();
                CycleOutcome::Empty
            }
            Err(err) => {
                tracing::warn!(
                    device_id = %self.spec.device_id,
                    error = %err,
                    "Skipped cycle: transport failure"
                );
                self.mark_failed();
                CycleOutcome::Transport
            }
        }
    }

    /// Reads and decodes every block of the device's plan into one reading.
    ///
    /// Frame and decode failures skip the affected block; transport
    /// failures abort the cycle so the whole plan is retried after
    /// reconnection.
    async fn collect_reading(&self) -> BridgeResult<Reading> {
        let mut reading = Reading::new(self.spec.device_id.clone(), self.spec.kind);

        for block in read_plan(self.spec.kind) {
            match self.read_block(block).await {
                Ok(fields) => {
                    for (name, value) in fields {
                        reading.insert(name, value);
                    }
                }
                Err(BridgeError::Frame(err)) => {
                    tracing::warn!(
                        device_id = %self.spec.device_id,
                        block = block.name,
                        error = %err,
                        "Block failed after retries"
                    );
                }
                Err(BridgeError::Decode(err)) => {
                    tracing::warn!(
                        device_id = %self.spec.device_id,
                        block = block.name,
                        error = %err,
                        "Block payload undecodable"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Ok(reading)
    }

    /// Reads one register block with bounded frame-error retries.
    async fn read_block(&self, block: &RegisterBlock) -> BridgeResult<Vec<FieldPair>> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = self
                .session
                .read_registers(
                    self.spec.unit_id,
                    block.register,
                    block.words,
                    self.config.request_timeout,
                )
                .await;

            match result {
                Ok(payload) => {
                    return decode_block(self.spec.kind, block.register, &payload)
                        .map_err(BridgeError::Decode)
                }
                Err(BridgeError::Frame(err))
                    if err.is_retryable() && attempt <= self.config.frame_retries =>
                {
                    tracing::debug!(
                        device_id = %self.spec.device_id,
                        block = block.name,
                        attempt = attempt,
                        error = %err,
                        "Retrying request after frame error"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn mark_online(&mut self) {
        self.consecutive_failures = 0;
        if self.announced_online != Some(true) {
            self.announced_online = Some(true);
            self.publish(BusEvent::availability(self.spec.device_id.clone(), true));
        }
    }

    fn mark_failed(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.config.offline_after
            && self.announced_online != Some(false)
        {
            self.announced_online = Some(false);
            tracing::warn!(
                device_id = %self.spec.device_id,
                failures = self.consecutive_failures,
                "Device reported unavailable"
            );
            self.publish(BusEvent::availability(self.spec.device_id.clone(), false));
        }
    }

    fn publish(&self, event: BusEvent) {
        if let Err(err) = self.bus.publish(event) {
            // The sink may not be subscribed yet during startup; data loss
            // here is acceptable, the next cycle produces a fresh reading.
            tracing::trace!(
                device_id = %self.spec.device_id,
                error = %err,
                "Bus publish dropped"
            );
        }
    }
}

impl std::fmt::Debug for DevicePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePoller")
            .field("device_id", &self.spec.device_id)
            .field("kind", &self.spec.kind)
            .field("adapter", &self.session.key())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{checksum, FUNCTION_READ};
    use crate::transport::BleTransport;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use sunbridge_core::error::{BleError, BleResult};

    struct ScriptedTransport {
        connected: bool,
        responses: StdMutex<VecDeque<Vec<u8>>>,
        pending: StdMutex<Option<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Vec<u8>>) -> Self {
            Self {
                connected: false,
                responses: StdMutex::new(responses.into_iter().collect()),
                pending: StdMutex::new(None),
            }
        }
    }

    #[async_trait]
    impl BleTransport for ScriptedTransport {
        async fn connect(&mut self) -> BleResult<()> {
            self.connected = true;
            Ok(())
        }

        async fn disconnect(&mut self) -> BleResult<()> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn send(&mut self, _request: &[u8]) -> BleResult<()> {
            *self.pending.lock().unwrap() = self.responses.lock().unwrap().pop_front();
            Ok(())
        }

        async fn recv_chunk(&mut self, timeout: Duration) -> BleResult<Vec<u8>> {
            match self.pending.lock().unwrap().take() {
                Some(chunk) => Ok(chunk),
                None => Err(BleError::timeout(timeout)),
            }
        }

        fn display_name(&self) -> String {
            "scripted".to_string()
        }
    }

    fn frame_for(unit_id: u8, payload_len: usize) -> Vec<u8> {
        let payload = vec![0u8; payload_len];
        let mut frame = vec![unit_id, FUNCTION_READ, payload.len() as u8];
        frame.extend_from_slice(&payload);
        let crc = checksum(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    fn battery_responses(unit_id: u8) -> Vec<Vec<u8>> {
        read_plan(DeviceKind::Battery)
            .iter()
            .map(|block| frame_for(unit_id, block.words as usize * 2))
            .collect()
    }

    fn poller_with_script(
        responses: Vec<Vec<u8>>,
        bus: Arc<DataBus>,
    ) -> (DevicePoller, Arc<AdapterSession>) {
        let session = Arc::new(AdapterSession::new(
            "bt2",
            Box::new(ScriptedTransport::new(responses)),
        ));
        let spec = DeviceSpec {
            device_id: DeviceId::new("batt-1"),
            kind: DeviceKind::Battery,
            unit_id: 0x30,
        };
        let poller = DevicePoller::new(
            spec,
            PollerConfig {
                request_timeout: Duration::from_millis(200),
                ..Default::default()
            },
            session.clone(),
            Validator::passthrough(DeviceId::new("batt-1")),
            bus,
        );
        (poller, session)
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_cycle_publishes_reading_and_online() {
        let bus = Arc::new(DataBus::new(16));
        let mut rx = bus.subscribe();
        let (mut poller, session) = poller_with_script(battery_responses(0x30), bus);

        session.connect().await.unwrap();
        let outcome = poller.poll_cycle().await;
        assert_eq!(outcome, CycleOutcome::Published);

        // Reading first, then the availability flip to online.
        let mut saw_reading = false;
        let mut saw_online = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                BusEvent::Reading(reading) => {
                    assert_eq!(reading.device_id.as_str(), "batt-1");
                    assert!(!reading.is_empty());
                    saw_reading = true;
                }
                BusEvent::Availability { online, .. } => {
                    assert!(online);
                    saw_online = true;
                }
                BusEvent::Rejections { .. } => {}
            }
        }
        assert!(saw_reading && saw_online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_after_consecutive_failures() {
        let bus = Arc::new(DataBus::new(16));
        let mut rx = bus.subscribe();
        let (mut poller, session) = poller_with_script(Vec::new(), bus);

        session.connect().await.unwrap();
        for _ in 0..3 {
            let outcome = poller.poll_cycle().await;
            assert_eq!(outcome, CycleOutcome::Transport);
        }

        let mut offline_events = 0;
        while let Ok(event) = rx.try_recv() {
            if let BusEvent::Availability { online, .. } = event {
                assert!(!online);
                offline_events += 1;
            }
        }
        // Announced exactly once despite repeated failures.
        assert_eq!(offline_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_without_connection_is_transport_failure() {
        let bus = Arc::new(DataBus::new(16));
        let (mut poller, _session) = poller_with_script(Vec::new(), bus);

        let outcome = poller.poll_cycle().await;
        assert_eq!(outcome, CycleOutcome::Transport);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_announces_online_again() {
        let bus = Arc::new(DataBus::new(32));
        let mut rx = bus.subscribe();

        // Three timed-out cycles worth of nothing, then one good cycle.
        let mut responses = Vec::new();
        responses.extend(battery_responses(0x30));
        let (mut poller, session) = poller_with_script(responses, bus);
        session.connect().await.unwrap();

        // Exhaust availability: fail three cycles against an empty script
        // by disconnecting the session.
        session.disconnect().await.unwrap();
        for _ in 0..3 {
            poller.poll_cycle().await;
        }
        session.connect().await.unwrap();
        let outcome = poller.poll_cycle().await;
        assert_eq!(outcome, CycleOutcome::Published);

        let mut transitions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BusEvent::Availability { online, .. } = event {
                transitions.push(online);
            }
        }
        assert_eq!(transitions, vec![false, true]);
    }
}
