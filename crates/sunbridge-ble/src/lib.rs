// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # sunbridge-ble
//!
//! The vendor register protocol over Bluetooth Low Energy: frame codec,
//! per-kind register decoders, the adapter session that serializes access
//! to shared BT modules, and the per-device poll loop.

pub mod frame;
pub mod gatt;
pub mod poller;
pub mod registers;
pub mod session;
pub mod transport;

pub use frame::{
    checksum, parse_response, FrameAssembler, RequestFrame, ResponseFrame, FUNCTION_READ,
};
pub use gatt::{scan, GattTransport, NOTIFY_CHAR_UUID, WRITE_CHAR_UUID};
pub use poller::{
    DevicePoller, DeviceSpec, PollerConfig, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL,
};
pub use registers::{decode_block, read_plan, RegisterBlock};
pub use session::AdapterSession;
pub use transport::{BleTransport, DiscoveredDevice};
