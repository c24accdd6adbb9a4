// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Binary-level error type.

use thiserror::Error;

use sunbridge_config::ConfigError;
use sunbridge_core::BleError;

/// Errors surfaced by the binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A component could not be initialized.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// A Bluetooth operation outside the poll loop failed (scan).
    #[error("bluetooth error: {0}")]
    Ble(#[from] BleError),
}

impl BinError {
    /// Creates an initialization error.
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization(message.into())
    }
}

/// A Result type with BinError.
pub type BinResult<T> = Result<T, BinError>;
