// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `version` command.

/// Prints version information.
pub fn execute() {
    println!("sunbridge {}", sunbridge_core::VERSION);
    println!("BLE-to-MQTT gateway for solar power hardware");
}
