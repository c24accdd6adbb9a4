// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `run` command: start the gateway.

use std::path::Path;

use crate::cli::RunArgs;
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

/// Loads configuration and runs the gateway until terminated.
pub async fn execute(config_path: &Path, _args: &RunArgs) -> BinResult<()> {
    let runtime = RuntimeBuilder::new().config_path(config_path).build()?;
    runtime.run().await
}
