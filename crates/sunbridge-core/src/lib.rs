// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # sunbridge-core
//!
//! Protocol-agnostic foundation of the sunbridge gateway: data types,
//! error hierarchy, retry policies, the reading validator, and the
//! internal data bus.

pub mod bus;
pub mod error;
pub mod retry;
pub mod types;
pub mod validator;

pub use bus::{BusEvent, DataBus};
pub use error::{
    BleError, BleResult, BridgeError, BridgeResult, BusError, DecodeError, DecodeResult,
    FrameError, FrameResult, PublishError, PublishResult,
};
pub use retry::{Backoff, FixedDelay, RetryConfig, RetryStrategy};
pub use types::{
    BadReason, ConnectionState, DataQuality, DeviceId, DeviceKind, Field, Reading,
    UncertainReason, Value,
};
pub use validator::{controller_limits, FieldLimits, Rejection, RejectionStats, Validator};

/// Crate version, stamped into logs and the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
