// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Mock implementations for testing components in isolation.
//!
//! ## Design Principles
//!
//! - Configurable behavior for different test scenarios
//! - Recording of interactions for verification
//! - Thread-safe for concurrent testing
//! - Easy error injection

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use sunbridge_ble::transport::BleTransport;
use sunbridge_core::error::{BleError, BleResult};

// =============================================================================
// Mock BLE Transport
// =============================================================================

/// Shared state between a [`MockBleTransport`] and its [`MockHandle`].
#[derive(Debug, Default)]
struct MockState {
    /// Scripted responses: one chunk list per request, FIFO.
    script: Mutex<VecDeque<Vec<Vec<u8>>>>,
    /// Chunks of the response currently being delivered.
    pending: Mutex<VecDeque<Vec<u8>>>,
    /// Raw request frames observed, for verification.
    requests: Mutex<Vec<Vec<u8>>>,
    connected: AtomicBool,
    /// Fail the next send with `ConnectionLost` and drop the link.
    fail_next_send: AtomicBool,
    /// Fail every connect attempt.
    fail_connect: AtomicBool,
    /// Requests currently between send and response completion.
    in_flight: AtomicU32,
    /// High-water mark of `in_flight`; 1 proves serialization.
    max_in_flight: AtomicU32,
    /// Total requests sent.
    sends: AtomicU32,
}

/// A scripted BLE transport with interaction recording.
///
/// Each `send` consumes the next scripted chunk list; `recv_chunk` then
/// delivers those chunks one by one and times out when they run dry. The
/// window between `send` and the final chunk counts as "in flight", which
/// is what the adapter-sharing serialization property observes.
#[derive(Debug)]
pub struct MockBleTransport {
    state: Arc<MockState>,
    /// `true` while this instance owes a decrement to `in_flight`.
    exchanging: bool,
}

impl MockBleTransport {
    /// Creates a disconnected mock with an empty script.
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState::default()),
            exchanging: false,
        }
    }

    /// Creates a mock preloaded with one chunk list per request.
    pub fn with_script(script: Vec<Vec<Vec<u8>>>) -> Self {
        let mock = Self::new();
        *mock.state.script.lock().unwrap() = script.into_iter().collect();
        mock
    }

    /// Returns a handle for observing and steering the mock.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: self.state.clone(),
        }
    }

    fn finish_exchange(&mut self) {
        if self.exchanging {
            self.exchanging = false;
            self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Default for MockBleTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BleTransport for MockBleTransport {
    async fn connect(&mut self) -> BleResult<()> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(BleError::connection_failed("mock connect failure"));
        }
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> BleResult<()> {
        self.state.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    async fn send(&mut self, request: &[u8]) -> BleResult<()> {
        if !self.is_connected() {
            return Err(BleError::NotConnected);
        }
        if self.state.fail_next_send.swap(false, Ordering::SeqCst) {
            self.state.connected.store(false, Ordering::SeqCst);
            return Err(BleError::connection_lost("mock link drop"));
        }

        self.state.requests.lock().unwrap().push(request.to_vec());
        self.state.sends.fetch_add(1, Ordering::SeqCst);

        let in_flight = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        self.exchanging = true;

        // Yield so a second task gets a chance to interleave here; the
        // session lock must prevent it from actually sending.
        tokio::time::sleep(Duration::from_millis(2)).await;

        let chunks = self
            .state
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        *self.state.pending.lock().unwrap() = chunks.into_iter().collect();

        Ok(())
    }

    async fn recv_chunk(&mut self, timeout: Duration) -> BleResult<Vec<u8>> {
        tokio::time::sleep(Duration::from_millis(1)).await;

        let chunk = self.state.pending.lock().unwrap().pop_front();
        match chunk {
            Some(chunk) => {
                if self.state.pending.lock().unwrap().is_empty() {
                    self.finish_exchange();
                }
                Ok(chunk)
            }
            None => {
                self.finish_exchange();
                Err(BleError::timeout(timeout))
            }
        }
    }

    fn display_name(&self) -> String {
        "mock transport".to_string()
    }
}

// =============================================================================
// Mock Handle
// =============================================================================

/// Observer/controller handle for a [`MockBleTransport`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<MockState>,
}

impl MockHandle {
    /// Appends one scripted response (a list of notification chunks).
    pub fn push_response(&self, chunks: Vec<Vec<u8>>) {
        self.state.script.lock().unwrap().push_back(chunks);
    }

    /// Makes the next send fail with `ConnectionLost`.
    pub fn fail_next_send(&self) {
        self.state.fail_next_send.store(true, Ordering::SeqCst);
    }

    /// Makes every connect attempt fail until cleared.
    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Returns the total number of requests sent.
    pub fn sends(&self) -> u32 {
        self.state.sends.load(Ordering::SeqCst)
    }

    /// Returns the highest number of simultaneously in-flight requests.
    pub fn max_in_flight(&self) -> u32 {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Returns the raw request frames observed.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.state.requests.lock().unwrap().clone()
    }
}
