// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `validate` command: check a configuration file.

use std::path::Path;

use crate::cli::ValidateArgs;
use crate::error::BinResult;

/// Loads and validates the configuration without starting anything.
pub async fn execute(config_path: &Path, args: &ValidateArgs) -> BinResult<()> {
    let config = sunbridge_config::load_config(config_path)?;

    println!("Configuration OK: {}", config_path.display());
    println!("  devices:  {}", config.devices.len());
    println!("  adapters: {}", config.devices_by_adapter().len());
    println!("  broker:   {}:{}", config.mqtt.host, config.mqtt.port);

    for device in &config.devices {
        println!(
            "  - {} ({}, unit {}, adapter {})",
            device.id,
            device.kind.as_str(),
            device.unit_id,
            device.adapter
        );
    }

    if args.show_config {
        match serde_yaml::to_string(&config) {
            Ok(yaml) => println!("\n{yaml}"),
            Err(err) => tracing::warn!(error = %err, "Could not render configuration"),
        }
    }

    Ok(())
}
