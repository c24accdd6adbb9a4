// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # sunbridge-config
//!
//! Configuration schema, file loader, and validation for the sunbridge
//! gateway.

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, ConfigLoader};
pub use schema::{
    BluetoothConfig, BridgeConfig, DeviceEntry, DeviceKindEntry, LimitEntry, LoggingConfig,
    MqttConfig, PollingConfig, ValidationConfig,
};
