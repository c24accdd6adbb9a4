// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for sunbridge.
//!
//! # Error Hierarchy
//!
//! ```text
//! BridgeError (root)
//! ├── FrameError    - Corrupt or mismatched protocol frames
//! ├── DecodeError   - Payload too short / malformed for a register table
//! ├── BleError      - Transport failures (connect, timeout, link drop)
//! ├── PublishError  - Broker publishing failures
//! └── BusError      - Internal data-bus failures
//! ```
//!
//! The taxonomy mirrors recovery policy: frame errors are retried per
//! request, decode errors skip the affected block, transport errors trigger
//! reconnection with backoff, and publish errors are retried on the next
//! cycle. None of these escape the device poller.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// BridgeError - Root Error Type
// =============================================================================

/// The root error type for the gateway.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Protocol frame error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Register decode error.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// BLE transport error.
    #[error("transport error: {0}")]
    Ble(#[from] BleError),

    /// Broker publish error.
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// Data bus error.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

impl BridgeError {
    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Frame(e) => e.is_retryable(),
            BridgeError::Decode(_) => false,
            BridgeError::Ble(e) => e.is_retryable(),
            BridgeError::Publish(_) => true,
            BridgeError::Bus(e) => e.is_retryable(),
        }
    }

    /// Returns the error category for logging and metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::Frame(_) => "frame",
            BridgeError::Decode(_) => "decode",
            BridgeError::Ble(_) => "ble",
            BridgeError::Publish(_) => "publish",
            BridgeError::Bus(_) => "bus",
        }
    }
}

// =============================================================================
// FrameError
// =============================================================================

/// Errors produced by the frame codec while parsing a response.
///
/// A frame error means the bytes on the wire did not form a valid response
/// to the outstanding request. The poller retries the request a bounded
/// number of times before counting the block as failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer shorter than the minimum frame length.
    #[error("response too short: {actual} bytes, need at least {needed}")]
    TooShort {
        /// Bytes available.
        actual: usize,
        /// Minimum bytes required.
        needed: usize,
    },

    /// CRC trailer did not match the computed checksum.
    #[error("checksum mismatch: received {received:#06x}, computed {computed:#06x}")]
    ChecksumMismatch {
        /// CRC from the frame trailer.
        received: u16,
        /// CRC computed over the frame body.
        computed: u16,
    },

    /// Response header carried a different device ID than the request.
    #[error("unexpected device id: expected {expected}, got {actual}")]
    UnexpectedDevice {
        /// Device ID from the request.
        expected: u8,
        /// Device ID echoed in the response.
        actual: u8,
    },

    /// Response header carried a different function code than the request.
    #[error("unexpected function code: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedFunction {
        /// Function code from the request.
        expected: u8,
        /// Function code echoed in the response.
        actual: u8,
    },

    /// The device answered with an exception frame.
    #[error("device exception: code {code:#04x}")]
    Exception {
        /// Vendor exception code (0x02 = illegal data address, ...).
        code: u8,
    },
}

impl FrameError {
    /// Creates a too-short error.
    pub fn too_short(actual: usize, needed: usize) -> Self {
        Self::TooShort { actual, needed }
    }

    /// Creates a checksum mismatch error.
    pub fn checksum_mismatch(received: u16, computed: u16) -> Self {
        Self::ChecksumMismatch { received, computed }
    }

    /// Returns `true` if re-issuing the request may succeed.
    ///
    /// An exception frame is a well-formed answer; repeating the same
    /// request yields the same exception, so it is not retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FrameError::Exception { .. })
    }

    /// Returns the error category for logging and metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            FrameError::TooShort { .. } => "too_short",
            FrameError::ChecksumMismatch { .. } => "checksum_mismatch",
            FrameError::UnexpectedDevice { .. } => "unexpected_device",
            FrameError::UnexpectedFunction { .. } => "unexpected_function",
            FrameError::Exception { .. } => "exception",
        }
    }
}

// =============================================================================
// DecodeError
// =============================================================================

/// Errors produced by the register decoder.
///
/// Decode errors are transient poll failures: the poller skips the affected
/// block and keeps the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload shorter than the register table requires.
    #[error("payload too short for {block}: {actual} bytes, need {needed}")]
    PayloadTooShort {
        /// The register block being decoded.
        block: &'static str,
        /// Bytes available.
        actual: usize,
        /// Bytes required by the table.
        needed: usize,
    },

    /// No decoder registered for this (kind, register) pair.
    #[error("no decoder for register {register} of kind {kind}")]
    UnknownBlock {
        /// Device kind name.
        kind: &'static str,
        /// Starting register address.
        register: u16,
    },
}

impl DecodeError {
    /// Creates a payload-too-short error.
    pub fn payload_too_short(block: &'static str, actual: usize, needed: usize) -> Self {
        Self::PayloadTooShort {
            block,
            actual,
            needed,
        }
    }
}

// =============================================================================
// BleError
// =============================================================================

/// BLE transport errors.
///
/// `ConnectionLost` is kept distinct from frame-level errors so the poller
/// can tell "the link died mid-request" apart from "the link delivered
/// garbage".
#[derive(Debug, Error)]
pub enum BleError {
    /// Could not establish a connection.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The link dropped while a request was outstanding.
    #[error("connection lost: {message}")]
    ConnectionLost {
        /// Error message.
        message: String,
    },

    /// No response arrived within the per-request timeout.
    #[error("request timed out after {duration:?}")]
    Timeout {
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation attempted without a connection.
    #[error("adapter is not connected")]
    NotConnected,

    /// Peripheral not found during discovery.
    #[error("device not found: {address}")]
    DeviceNotFound {
        /// The MAC address searched for.
        address: String,
    },

    /// Required GATT characteristic missing on the peripheral.
    #[error("characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The characteristic UUID.
        uuid: String,
    },

    /// Scan failed.
    #[error("scan failed: {message}")]
    ScanFailed {
        /// Error message.
        message: String,
    },
}

impl BleError {
    /// Creates a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a connection failed error with a source.
    pub fn connection_failed_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a connection lost error.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Creates a device not found error.
    pub fn device_not_found(address: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            address: address.into(),
        }
    }

    /// Creates a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>) -> Self {
        Self::CharacteristicNotFound { uuid: uuid.into() }
    }

    /// Creates a scan failed error.
    pub fn scan_failed(message: impl Into<String>) -> Self {
        Self::ScanFailed {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BleError::ConnectionFailed { .. }
                | BleError::ConnectionLost { .. }
                | BleError::Timeout { .. }
                | BleError::NotConnected
                | BleError::DeviceNotFound { .. }
        )
    }

    /// Returns `true` if the session should reconnect before retrying.
    pub fn needs_reconnect(&self) -> bool {
        matches!(
            self,
            BleError::ConnectionLost { .. } | BleError::NotConnected
        )
    }

    /// Returns the error category for logging and metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            BleError::ConnectionFailed { .. } => "connection_failed",
            BleError::ConnectionLost { .. } => "connection_lost",
            BleError::Timeout { .. } => "timeout",
            BleError::NotConnected => "not_connected",
            BleError::DeviceNotFound { .. } => "device_not_found",
            BleError::CharacteristicNotFound { .. } => "characteristic_not_found",
            BleError::ScanFailed { .. } => "scan_failed",
        }
    }
}

// =============================================================================
// PublishError
// =============================================================================

/// Broker publishing errors.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Client-side queueing failed (disconnected, queue full).
    #[error("publish failed for '{topic}': {message}")]
    SendFailed {
        /// The topic being published.
        topic: String,
        /// Error message.
        message: String,
    },

    /// Payload serialization failed.
    #[error("payload serialization failed: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// Broker connection is down.
    #[error("broker is not connected")]
    NotConnected,
}

impl PublishError {
    /// Creates a send failed error.
    pub fn send_failed(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SendFailed {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns the error category for logging and metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            PublishError::SendFailed { .. } => "send_failed",
            PublishError::Serialization { .. } => "serialization",
            PublishError::NotConnected => "not_connected",
        }
    }
}

// =============================================================================
// BusError
// =============================================================================

/// Internal data-bus errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Channel is closed.
    #[error("channel is closed")]
    Closed,

    /// Receiver lagged behind and missed messages.
    #[error("receiver lagged by {count} messages")]
    Lagged {
        /// Number of missed messages.
        count: u64,
    },

    /// No receivers are subscribed.
    #[error("no receivers available")]
    NoReceivers,
}

impl BusError {
    /// Creates a lagged error.
    pub fn lagged(count: u64) -> Self {
        Self::Lagged { count }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BusError::Lagged { .. })
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// A Result type with BridgeError.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// A Result type with FrameError.
pub type FrameResult<T> = Result<T, FrameError>;

/// A Result type with DecodeError.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// A Result type with BleError.
pub type BleResult<T> = Result<T, BleError>;

/// A Result type with PublishError.
pub type PublishResult<T> = Result<T, PublishError>;

/// A Result type with BusError.
pub type BusResult<T> = Result<T, BusError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_retryable() {
        assert!(FrameError::too_short(3, 5).is_retryable());
        assert!(FrameError::checksum_mismatch(0x1234, 0x4321).is_retryable());
        assert!(!FrameError::Exception { code: 0x02 }.is_retryable());
    }

    #[test]
    fn test_ble_error_classification() {
        assert!(BleError::timeout(Duration::from_secs(5)).is_retryable());
        assert!(!BleError::timeout(Duration::from_secs(5)).needs_reconnect());

        let lost = BleError::connection_lost("link dropped");
        assert!(lost.is_retryable());
        assert!(lost.needs_reconnect());

        let missing = BleError::characteristic_not_found("0000fff1");
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_bridge_error_conversion() {
        let err: BridgeError = FrameError::too_short(0, 5).into();
        assert_eq!(err.error_type(), "frame");
        assert!(err.is_retryable());

        let err: BridgeError = DecodeError::payload_too_short("cell_info", 2, 6).into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = FrameError::checksum_mismatch(0xABCD, 0x1234);
        assert!(err.to_string().contains("0xabcd"));

        let err = BleError::device_not_found("C4:D3:6A:66:10:2E");
        assert!(err.to_string().contains("C4:D3:6A:66:10:2E"));
    }
}
