// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Realistic register payload fixtures.

use sunbridge_ble::registers::read_plan;
use sunbridge_core::types::DeviceKind;

use super::builders::{response_frame, words};

// =============================================================================
// Battery Fixture
// =============================================================================

/// A smart battery's register state, with hand-computable expectations.
#[derive(Debug, Clone)]
pub struct BatteryFixture {
    /// Protocol address on the hub.
    pub unit_id: u8,
    /// Pack current in 0.01 A units (signed).
    pub current_centi_amps: i16,
    /// Pack voltage in 0.1 V units.
    pub voltage_deci_volts: u16,
    /// Remaining capacity in 0.001 Ah units.
    pub remaining_milli_ah: u32,
    /// Total capacity in 0.001 Ah units.
    pub total_milli_ah: u32,
}

impl Default for BatteryFixture {
    fn default() -> Self {
        // 13.2 V pack, 1.5 A charge, 50/100 Ah.
        Self {
            unit_id: 0x30,
            current_centi_amps: 150,
            voltage_deci_volts: 132,
            remaining_milli_ah: 50_000,
            total_milli_ah: 100_000,
        }
    }
}

impl BatteryFixture {
    /// The `soc` percentage the decoder must produce for this state.
    pub fn expected_soc(&self) -> f64 {
        let soc = self.remaining_milli_ah as f64 / self.total_milli_ah as f64 * 100.0;
        (soc * 10.0).round() / 10.0
    }

    /// Payload for the main battery block (registers 5042..5049).
    pub fn battery_info_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(16);
        payload.extend_from_slice(&self.current_centi_amps.to_be_bytes());
        payload.extend_from_slice(&self.voltage_deci_volts.to_be_bytes());
        payload.extend_from_slice(&self.remaining_milli_ah.to_be_bytes());
        payload.extend_from_slice(&self.total_milli_ah.to_be_bytes());
        payload.resize(16, 0);
        payload
    }

    /// Payload for the cell block: four cells at 3.3 V.
    pub fn cell_info_payload(&self) -> Vec<u8> {
        let mut regs = vec![4u16, 33, 33, 33, 33];
        regs.resize(17, 0);
        words(&regs)
    }

    /// One framed response per read-plan block, single chunk each, in plan
    /// order.
    pub fn cycle_responses(&self) -> Vec<Vec<Vec<u8>>> {
        read_plan(DeviceKind::Battery)
            .iter()
            .map(|block| {
                let payload = match block.register {
                    5000 => self.cell_info_payload(),
                    5042 => self.battery_info_payload(),
                    _ => vec![0u8; block.words as usize * 2],
                };
                vec![response_frame(self.unit_id, &payload)]
            })
            .collect()
    }
}

// =============================================================================
// Controller Fixture
// =============================================================================

/// Charging-info payload for a controller at the given telemetry point.
pub fn controller_charging_payload(
    battery_percentage: u16,
    battery_deci_volts: u16,
    pv_watts: u16,
) -> Vec<u8> {
    let mut payload = vec![0u8; 68];
    payload[0..2].copy_from_slice(&battery_percentage.to_be_bytes());
    payload[2..4].copy_from_slice(&battery_deci_volts.to_be_bytes());
    payload[18..20].copy_from_slice(&pv_watts.to_be_bytes());
    payload[65] = 2; // mppt
    payload
}

/// One framed response per controller read-plan block.
pub fn controller_cycle_responses(unit_id: u8, charging_payload: Vec<u8>) -> Vec<Vec<Vec<u8>>> {
    read_plan(DeviceKind::Controller)
        .iter()
        .map(|block| {
            let payload = match block.register {
                256 => charging_payload.clone(),
                _ => vec![0u8; block.words as usize * 2],
            };
            vec![response_frame(unit_id, &payload)]
        })
        .collect()
}
