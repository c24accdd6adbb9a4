// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration error types.
//!
//! Configuration errors are the only errors in the gateway that are fatal,
//! and only at startup: a process that cannot trust its device list must
//! not start polling.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse the configuration file.
    #[error("failed to parse config file '{path}': {message}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Parser error message.
        message: String,
    },

    /// File I/O error.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Unsupported file extension.
    #[error("unsupported config format '{extension}' (expected yaml, toml, or json)")]
    UnsupportedFormat {
        /// The offending extension.
        extension: String,
    },

    /// A field failed validation.
    #[error("validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// What went wrong.
        message: String,
    },

    /// A required field is missing.
    #[error("missing required field: {field}")]
    MissingField {
        /// The missing field name.
        field: String,
    },

    /// Two devices share an ID.
    #[error("duplicate device id: {device_id}")]
    DuplicateDeviceId {
        /// The duplicated device ID.
        device_id: String,
    },

    /// A BLE address is malformed.
    #[error("invalid BLE address '{address}': {message}")]
    InvalidAddress {
        /// The invalid address string.
        address: String,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigError {
    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates a duplicate device ID error.
    pub fn duplicate_device_id(device_id: impl Into<String>) -> Self {
        Self::DuplicateDeviceId {
            device_id: device_id.into(),
        }
    }

    /// Creates an invalid address error.
    pub fn invalid_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }
}

/// A Result type with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;
