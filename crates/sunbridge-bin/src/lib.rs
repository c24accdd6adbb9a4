// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # sunbridge-bin
//!
//! The gateway binary: CLI surface, logging setup, runtime orchestration,
//! and graceful shutdown.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

pub use error::{BinError, BinResult};
pub use runtime::{BridgeRuntime, RuntimeBuilder};
pub use shutdown::ShutdownCoordinator;
