// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Exclusive owner of one physical BLE radio link.
//!
//! A BT-2 hub multiplexes several logical devices (controller, batteries)
//! over one radio link, and the module corrupts framing if two requests
//! are in flight at once. [`AdapterSession`] therefore owns the transport
//! behind a `tokio::sync::Mutex` and holds the lock for the *entire*
//! request/response cycle, including the inter-request settle gap. The
//! serialization invariant of the whole gateway lives here and nowhere
//! else.

use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::Mutex;

use sunbridge_core::error::{BleError, BleResult, BridgeError, BridgeResult};
use sunbridge_core::types::ConnectionState;

use crate::frame::{FrameAssembler, RequestFrame, FUNCTION_READ};
use crate::transport::BleTransport;

/// Gap held after each exchange so the module settles before the next
/// request on the shared link.
const REQUEST_GAP: Duration = Duration::from_millis(250);

/// Extra wait after the first notification chunk so trailing chunks of a
/// multi-MTU response arrive before the frame is judged incomplete.
const CHUNK_FOLLOWUP_TIMEOUT: Duration = Duration::from_millis(400);

// =============================================================================
// AdapterSession
// =============================================================================

/// Serialized access to one BT module shared by one or more device pollers.
pub struct AdapterSession {
    /// Stable adapter key from configuration ("bt1", "bt2", ...).
    key: String,
    transport: Mutex<Box<dyn BleTransport>>,
    state: RwLock<ConnectionState>,
}

impl AdapterSession {
    /// Creates a session owning the given transport.
    pub fn new(key: impl Into<String>, transport: Box<dyn BleTransport>) -> Self {
        Self {
            key: key.into(),
            transport: Mutex::new(transport),
            state: RwLock::new(ConnectionState::Disconnected),
        }
    }

    /// Returns the adapter key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read().expect("state lock poisoned")
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write().expect("state lock poisoned") = state;
    }

    /// Returns `true` if the link is up.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Establishes the link.
    pub async fn connect(&self) -> BleResult<()> {
        let mut transport = self.transport.lock().await;
        if transport.is_connected() {
            self.set_state(ConnectionState::Connected);
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        match transport.connect().await {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                tracing::info!(adapter = %self.key, "Adapter session connected");
                Ok(())
            }
            Err(err) => {
                self.set_state(ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    /// Tears down and re-establishes the link.
    pub async fn reconnect(&self) -> BleResult<()> {
        self.set_state(ConnectionState::Reconnecting);

        {
            let mut transport = self.transport.lock().await;
            let _ = transport.disconnect().await;
        }

        self.connect().await
    }

    /// Closes the link.
    pub async fn disconnect(&self) -> BleResult<()> {
        let mut transport = self.transport.lock().await;
        let result = transport.disconnect().await;
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(adapter = %self.key, "Adapter session disconnected");
        result
    }

    /// Reads `count` registers starting at `register` from the logical
    /// device `device_id` on this module.
    ///
    /// Exactly one request is in flight on the radio at any time: the
    /// transport lock is held from the write through frame completion and
    /// the settle gap.
    ///
    /// # Errors
    ///
    /// - [`FrameError`](sunbridge_core::FrameError) via `BridgeError::Frame`
    ///   for corrupt or mismatched responses: retry the request.
    /// - `BleError::Timeout` when no complete frame arrived in time.
    /// - `BleError::ConnectionLost` when the link dropped mid-request:
    ///   reconnect before retrying.
    pub async fn read_registers(
        &self,
        device_id: u8,
        register: u16,
        count: u16,
        timeout: Duration,
    ) -> BridgeResult<Vec<u8>> {
        let mut transport = self.transport.lock().await;

        if !transport.is_connected() {
            self.set_state(ConnectionState::Disconnected);
            return Err(BridgeError::Ble(BleError::NotConnected));
        }

        let request = RequestFrame::read(device_id, register, count);
        let result = self
            .exchange(&mut **transport, &request, timeout)
            .await;

        if let Err(BridgeError::Ble(ref err)) = result {
            if err.needs_reconnect() {
                self.set_state(ConnectionState::Disconnected);
            }
        }

        // Settle gap while still holding the lock, so back-to-back requests
        // from different pollers keep their spacing.
        tokio::time::sleep(REQUEST_GAP).await;

        result
    }

    async fn exchange(
        &self,
        transport: &mut dyn BleTransport,
        request: &RequestFrame,
        timeout: Duration,
    ) -> BridgeResult<Vec<u8>> {
        transport.send(&request.encode()).await.map_err(BridgeError::Ble)?;

        let mut assembler = FrameAssembler::new(request.device_id, FUNCTION_READ);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .filter(|d| !d.is_zero())
                .ok_or(BridgeError::Ble(BleError::timeout(timeout)))?;

            // After the first chunk, wait only a short follow-up window for
            // the rest of a multi-chunk frame.
            let chunk_timeout = if assembler.buffered() == 0 {
                remaining
            } else {
                remaining.min(CHUNK_FOLLOWUP_TIMEOUT)
            };

            match transport.recv_chunk(chunk_timeout).await {
                Ok(chunk) => assembler.extend(&chunk),
                Err(BleError::Timeout { .. }) if assembler.buffered() > 0 => {
                    // Partial frame and the stream went quiet: report what
                    // the assembler makes of it.
                    return match assembler.poll_frame() {
                        Some(Ok(frame)) => Ok(frame.payload),
                        Some(Err(frame_err)) => Err(BridgeError::Frame(frame_err)),
                        None => Err(BridgeError::Ble(BleError::timeout(timeout))),
                    };
                }
                Err(err) => return Err(BridgeError::Ble(err)),
            }

            match assembler.poll_frame() {
                Some(Ok(frame)) => return Ok(frame.payload),
                Some(Err(frame_err)) => return Err(BridgeError::Frame(frame_err)),
                None => continue,
            }
        }
    }
}

impl std::fmt::Debug for AdapterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSession")
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::checksum;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Scripted transport: pops one canned chunk sequence per request.
    struct ScriptedTransport {
        connected: bool,
        responses: StdMutex<VecDeque<Vec<Vec<u8>>>>,
        pending: StdMutex<VecDeque<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Vec<Vec<u8>>>) -> Self {
            Self {
                connected: false,
                responses: StdMutex::new(responses.into_iter().collect()),
                pending: StdMutex::new(VecDeque::new()),
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
            let chunks = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            *self.pending.lock().unwrap() = chunks.into_iter().collect();
            Ok(())
        }

        async fn recv_chunk(&mut self, timeout: Duration) -> BleResult<Vec<u8>> {
            match self.pending.lock().unwrap().pop_front() {
                Some(chunk) => Ok(chunk),
                None => Err(BleError::timeout(timeout)),
            }
        }

        fn display_name(&self) -> String {
            "scripted".to_string()
        }
    }

    fn response_frame(device_id: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![device_id, FUNCTION_READ, payload.len() as u8];
        frame.extend_from_slice(payload);
        let crc = checksum(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_registers_single_chunk() {
        let frame = response_frame(0x30, &[0x01, 0x02]);
        let session = AdapterSession::new(
            "bt2",
            Box::new(ScriptedTransport::new(vec![vec![frame]])),
        );

        session.connect().await.unwrap();
        let payload = session
            .read_registers(0x30, 5042, 1, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(payload, vec![0x01, 0x02]);
        assert!(session.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_registers_chunked_response() {
        let frame = response_frame(0x30, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let (a, b) = frame.split_at(5);
        let session = AdapterSession::new(
            "bt2",
            Box::new(ScriptedTransport::new(vec![vec![a.to_vec(), b.to_vec()]])),
        );

        session.connect().await.unwrap();
        let payload = session
            .read_registers(0x30, 5000, 4, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(payload.len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_without_connection() {
        let session = AdapterSession::new(
            "bt1",
            Box::new(ScriptedTransport::new(vec![])),
        );

        let result = session
            .read_registers(0x30, 5000, 4, Duration::from_secs(1))
            .await;
        assert!(matches!(
            result,
            Err(BridgeError::Ble(BleError::NotConnected))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_response() {
        let session = AdapterSession::new(
            "bt1",
            Box::new(ScriptedTransport::new(vec![vec![]])),
        );

        session.connect().await.unwrap();
        let result = session
            .read_registers(0x30, 5000, 4, Duration::from_secs(1))
            .await;
        assert!(matches!(
            result,
            Err(BridgeError::Ble(BleError::Timeout { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_frame_reported() {
        let mut frame = response_frame(0x30, &[0x01, 0x02]);
        frame[3] ^= 0xFF;
        let session = AdapterSession::new(
            "bt2",
            Box::new(ScriptedTransport::new(vec![vec![frame]])),
        );

        session.connect().await.unwrap();
        let result = session
            .read_registers(0x30, 5042, 1, Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(BridgeError::Frame(_))));
        // A frame error is not a link failure.
        assert!(session.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions() {
        let session = AdapterSession::new(
            "bt1",
            Box::new(ScriptedTransport::new(vec![])),
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);

        session.connect().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);

        session.reconnect().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);

        session.disconnect().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }
}
