// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `scan` command: discover nearby BT modules.

use std::path::Path;
use std::time::Duration;

use crate::cli::ScanArgs;
use crate::error::BinResult;

/// Scans for peripherals and prints a table of candidates.
///
/// By default only vendor BT modules are shown; `--all` lists everything
/// in range. The configured host adapter is used unless `--adapter`
/// overrides it; a missing or invalid config file is not fatal here.
pub async fn execute(config_path: &Path, args: &ScanArgs) -> BinResult<()> {
    let adapter = match &args.adapter {
        Some(adapter) => adapter.clone(),
        None => sunbridge_config::load_config(config_path)
            .map(|c| c.bluetooth.adapter)
            .unwrap_or_else(|_| "hci0".to_string()),
    };

    println!(
        "Scanning on {} for {} seconds...\n",
        adapter, args.duration
    );

    let devices = sunbridge_ble::scan(&adapter, Duration::from_secs(args.duration)).await?;

    let shown: Vec<_> = devices
        .iter()
        .filter(|d| args.all || d.is_vendor_module())
        .collect();

    if shown.is_empty() {
        println!("No {} found.", if args.all { "devices" } else { "BT modules" });
        println!("Make sure the modules are powered and in range, or try --all.");
        return Ok(());
    }

    println!("{:<20} {:<24} {:>6}", "ADDRESS", "NAME", "RSSI");
    for device in &shown {
        println!(
            "{:<20} {:<24} {:>6}",
            device.address,
            device.name.as_deref().unwrap_or("-"),
            device
                .rssi
                .map(|r| format!("{r}"))
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    println!(
        "\n{} device(s). Copy the address into the `mac_address` field of sunbridge.yaml.",
        shown.len()
    );

    Ok(())
}
