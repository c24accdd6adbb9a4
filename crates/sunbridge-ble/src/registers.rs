// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Register maps and decoders for the supported device kinds.
//!
//! Each [`DeviceKind`] has a fixed read plan (which register blocks to
//! request every poll cycle) and one decoder per block mapping payload
//! offsets to named sensor fields. Decoders are pure: payload bytes in,
//! `(name, value)` pairs out. Offsets are relative to the start of the
//! register payload, scales and widths per the vendor register maps
//! (SRNE-style controller map, BMS Modbus map V1.7, inverter map V1.8).
//!
//! Multi-register fields (per-cell voltages, temperature sensors) expand to
//! arrays of the reported length; slots beyond the device's actual count
//! are omitted rather than zero-filled so no phantom sensors appear
//! downstream. Unrecognized enum codes decode to `unknown(<code>)` instead
//! of failing the block.

use sunbridge_core::error::{DecodeError, DecodeResult};
use sunbridge_core::types::{DeviceKind, Value};

/// A decoded sensor field.
pub type FieldPair = (&'static str, Value);

// =============================================================================
// Read Plan
// =============================================================================

/// One register block to request per poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterBlock {
    /// Block name for logs and errors.
    pub name: &'static str,
    /// Starting register address.
    pub register: u16,
    /// Number of 16-bit registers.
    pub words: u16,
}

/// Charge controller blocks (SRNE-style map).
const CONTROLLER_PLAN: &[RegisterBlock] = &[
    RegisterBlock {
        name: "device_info",
        register: 12,
        words: 8,
    },
    RegisterBlock {
        name: "charging_info",
        register: 256,
        words: 34,
    },
    RegisterBlock {
        name: "fault_info",
        register: 289,
        words: 2,
    },
    RegisterBlock {
        name: "battery_type",
        register: 57348,
        words: 1,
    },
];

/// Smart battery blocks (BMS map V1.7).
const BATTERY_PLAN: &[RegisterBlock] = &[
    RegisterBlock {
        name: "cell_info",
        register: 5000,
        words: 17,
    },
    RegisterBlock {
        name: "temp_info",
        register: 5017,
        words: 17,
    },
    RegisterBlock {
        name: "battery_info",
        register: 5042,
        words: 8,
    },
    RegisterBlock {
        name: "status_info",
        register: 5100,
        words: 10,
    },
    RegisterBlock {
        name: "device_info",
        register: 5122,
        words: 8,
    },
];

/// Inverter blocks (map V1.8). Only the registers every model answers;
/// energy-storage extensions return exception 0x02 on plain inverters.
const INVERTER_PLAN: &[RegisterBlock] = &[
    RegisterBlock {
        name: "main_status",
        register: 4000,
        words: 10,
    },
    RegisterBlock {
        name: "device_info",
        register: 4303,
        words: 24,
    },
];

/// Returns the per-cycle read plan for a device kind.
pub fn read_plan(kind: DeviceKind) -> &'static [RegisterBlock] {
    match kind {
        DeviceKind::Controller => CONTROLLER_PLAN,
        DeviceKind::Battery => BATTERY_PLAN,
        DeviceKind::Inverter => INVERTER_PLAN,
    }
}

// =============================================================================
// Decode Dispatch
// =============================================================================

/// Decodes one register block's payload into named fields.
///
/// Dispatch is over the closed `(kind, register)` set; an address outside
/// the read plan is a programming error surfaced as
/// [`DecodeError::UnknownBlock`].
pub fn decode_block(
    kind: DeviceKind,
    register: u16,
    payload: &[u8],
) -> DecodeResult<Vec<FieldPair>> {
    match (kind, register) {
        (DeviceKind::Controller, 12) => decode_model_string("device_info", payload, "model"),
        (DeviceKind::Controller, 256) => decode_controller_charging(payload),
        (DeviceKind::Controller, 289) => decode_controller_faults(payload),
        (DeviceKind::Controller, 57348) => decode_controller_battery_type(payload),
        (DeviceKind::Battery, 5000) => decode_battery_cells(payload),
        (DeviceKind::Battery, 5017) => decode_battery_temps(payload),
        (DeviceKind::Battery, 5042) => decode_battery_info(payload),
        (DeviceKind::Battery, 5100) => decode_battery_status(payload),
        (DeviceKind::Battery, 5122) => decode_model_string("device_info", payload, "model"),
        (DeviceKind::Inverter, 4000) => decode_inverter_status(payload),
        (DeviceKind::Inverter, 4303) => decode_inverter_device_info(payload),
        (kind, register) => Err(DecodeError::UnknownBlock {
            kind: kind.as_str(),
            register,
        }),
    }
}

// =============================================================================
// Byte Helpers
// =============================================================================

fn require(block: &'static str, payload: &[u8], needed: usize) -> DecodeResult<()> {
    if payload.len() < needed {
        return Err(DecodeError::payload_too_short(block, payload.len(), needed));
    }
    Ok(())
}

fn u16_at(payload: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([payload[offset], payload[offset + 1]])
}

fn i16_at(payload: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([payload[offset], payload[offset + 1]])
}

fn u32_at(payload: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

fn scaled(raw: u16, scale: f64) -> f64 {
    round3(raw as f64 * scale)
}

fn scaled_i(raw: i16, scale: f64) -> f64 {
    round3(raw as f64 * scale)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Decodes the vendor's sign-bit temperature encoding: values above 127
/// carry the magnitude in the low seven bits with the sign flipped.
fn sign_bit_temperature(raw: u8) -> f64 {
    if raw > 127 {
        -((raw - 128) as f64)
    } else {
        raw as f64
    }
}

/// Extracts printable ASCII from a fixed-width field, trimming padding.
fn ascii_at(payload: &[u8], offset: usize, len: usize) -> String {
    payload[offset..offset + len]
        .iter()
        .copied()
        .filter(|b| (0x20..=0x7E).contains(b))
        .map(char::from)
        .collect::<String>()
        .trim()
        .to_string()
}

fn label(map: &[(u16, &'static str)], code: u16) -> String {
    map.iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("unknown({code})"))
}

// =============================================================================
// Controller Decoders
// =============================================================================

const CHARGING_STATE: &[(u16, &str)] = &[
    (0, "deactivated"),
    (1, "activated"),
    (2, "mppt"),
    (3, "equalizing"),
    (4, "boost"),
    (5, "floating"),
    (6, "current_limiting"),
];

const BATTERY_TYPE: &[(u16, &str)] = &[
    (1, "open"),
    (2, "sealed"),
    (3, "gel"),
    (4, "lithium"),
    (5, "custom"),
];

/// Model string block shared by controllers and batteries.
fn decode_model_string(
    block: &'static str,
    payload: &[u8],
    field: &'static str,
) -> DecodeResult<Vec<FieldPair>> {
    require(block, payload, 16)?;
    let model = ascii_at(payload, 0, 16);
    if model.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![(field, Value::Text(model))])
}

/// Main controller telemetry block (registers 256..289).
fn decode_controller_charging(payload: &[u8]) -> DecodeResult<Vec<FieldPair>> {
    require("charging_info", payload, 68)?;

    let mut fields: Vec<FieldPair> = vec![
        ("battery_percentage", Value::Integer(u16_at(payload, 0) as i64)),
        ("battery_voltage", Value::Float(scaled(u16_at(payload, 2), 0.1))),
        ("battery_current", Value::Float(scaled(u16_at(payload, 4), 0.01))),
        (
            "controller_temperature",
            Value::Float(sign_bit_temperature(payload[6])),
        ),
        (
            "battery_temperature",
            Value::Float(sign_bit_temperature(payload[7])),
        ),
        ("load_voltage", Value::Float(scaled(u16_at(payload, 8), 0.1))),
        ("load_current", Value::Float(scaled(u16_at(payload, 10), 0.01))),
        ("load_power", Value::Integer(u16_at(payload, 12) as i64)),
        ("pv_voltage", Value::Float(scaled(u16_at(payload, 14), 0.1))),
        ("pv_current", Value::Float(scaled(u16_at(payload, 16), 0.01))),
        ("pv_power", Value::Integer(u16_at(payload, 18) as i64)),
        (
            "max_charging_power_today",
            Value::Integer(u16_at(payload, 30) as i64),
        ),
        (
            "max_discharging_power_today",
            Value::Integer(u16_at(payload, 32) as i64),
        ),
        (
            "charging_amp_hours_today",
            Value::Integer(u16_at(payload, 34) as i64),
        ),
        (
            "discharging_amp_hours_today",
            Value::Integer(u16_at(payload, 36) as i64),
        ),
        (
            "power_generation_today",
            Value::Integer(u16_at(payload, 38) as i64),
        ),
        (
            "power_consumption_today",
            Value::Integer(u16_at(payload, 40) as i64),
        ),
        (
            "power_generation_total",
            Value::Integer(u32_at(payload, 56) as i64),
        ),
    ];

    let load_on = payload[64] >> 7 & 1 == 1;
    fields.push((
        "load_status",
        Value::Text(if load_on { "on" } else { "off" }.to_string()),
    ));
    fields.push((
        "charging_status",
        Value::Text(label(CHARGING_STATE, payload[65] as u16)),
    ));

    Ok(fields)
}

/// Fault and warning bits (registers 0x0121-0x0122, one 32-bit word).
fn decode_controller_faults(payload: &[u8]) -> DecodeResult<Vec<FieldPair>> {
    require("fault_info", payload, 4)?;

    let bits = ((u16_at(payload, 0) as u32) << 16) | u16_at(payload, 2) as u32;

    const FAULT_BITS: &[(u32, &str)] = &[
        (30, "charge_mos_short_circuit"),
        (29, "anti_reverse_mos_short"),
        (28, "solar_panel_reversed"),
        (27, "pv_working_point_overvoltage"),
        (26, "pv_counter_current"),
        (25, "pv_input_overvoltage"),
        (24, "pv_input_short_circuit"),
        (23, "pv_input_overpower"),
        (22, "ambient_temp_too_high"),
        (21, "controller_temp_too_high"),
        (20, "load_overpower"),
        (19, "load_short_circuit"),
        (17, "battery_overvoltage"),
        (16, "battery_over_discharge"),
    ];

    let faults: Vec<String> = FAULT_BITS
        .iter()
        .filter(|(bit, _)| bits & (1 << bit) != 0)
        .map(|(_, name)| name.to_string())
        .collect();

    // Bit 18 is a warning, not a fault.
    let mut warnings = Vec::new();
    if bits & (1 << 18) != 0 {
        warnings.push("battery_undervoltage".to_string());
    }

    if bits != 0 {
        tracing::debug!(fault_bits = format!("{bits:#010x}"), "Controller fault bits set");
    }

    Ok(vec![
        ("fault_count", Value::Integer(faults.len() as i64)),
        ("warning_count", Value::Integer(warnings.len() as i64)),
        ("faults", Value::Labels(faults)),
        ("warnings", Value::Labels(warnings)),
    ])
}

fn decode_controller_battery_type(payload: &[u8]) -> DecodeResult<Vec<FieldPair>> {
    require("battery_type", payload, 2)?;
    Ok(vec![(
        "battery_type",
        Value::Text(label(BATTERY_TYPE, u16_at(payload, 0))),
    )])
}

// =============================================================================
// Battery Decoders
// =============================================================================

/// Maximum cells a BMS reports.
const MAX_CELLS: usize = 16;

/// Maximum temperature probes a BMS reports.
const MAX_TEMP_SENSORS: usize = 8;

/// Cell count and per-cell voltages (registers 5000..5016, 0.1 V units).
fn decode_battery_cells(payload: &[u8]) -> DecodeResult<Vec<FieldPair>> {
    require("cell_info", payload, 4)?;

    let cell_count = (u16_at(payload, 0) as usize).min(MAX_CELLS);

    let mut voltages = Vec::with_capacity(cell_count);
    for i in 0..cell_count {
        let offset = 2 + i * 2;
        if offset + 2 > payload.len() {
            break;
        }
        voltages.push(round1(scaled(u16_at(payload, offset), 0.1)));
    }

    Ok(vec![
        ("cell_count", Value::Integer(cell_count as i64)),
        ("cell_voltages", Value::FloatArray(voltages)),
    ])
}

/// Temperature probe count and values (registers 5017..5033, 0.1 °C signed).
fn decode_battery_temps(payload: &[u8]) -> DecodeResult<Vec<FieldPair>> {
    require("temp_info", payload, 4)?;

    let sensor_count = (u16_at(payload, 0) as usize).min(MAX_TEMP_SENSORS);

    let mut temps = Vec::with_capacity(sensor_count);
    for i in 0..sensor_count {
        let offset = 2 + i * 2;
        if offset + 2 > payload.len() {
            break;
        }
        temps.push(round1(scaled_i(i16_at(payload, offset), 0.1)));
    }

    let mut fields = vec![(
        "temperature_count",
        Value::Integer(sensor_count as i64),
    )];
    if let Some(first) = temps.first() {
        fields.push(("battery_temperature", Value::Float(*first)));
    }
    fields.push(("temperatures", Value::FloatArray(temps)));

    Ok(fields)
}

/// Pack current, voltage, and capacity (registers 5042..5049).
fn decode_battery_info(payload: &[u8]) -> DecodeResult<Vec<FieldPair>> {
    require("battery_info", payload, 12)?;

    let current = scaled_i(i16_at(payload, 0), 0.01);
    let voltage = scaled(u16_at(payload, 2), 0.1);
    let remaining = round3(u32_at(payload, 4) as f64 * 0.001);
    let total = round3(u32_at(payload, 8) as f64 * 0.001);

    let soc = if total > 0.0 {
        round1(remaining / total * 100.0)
    } else {
        0.0
    };

    Ok(vec![
        ("current", Value::Float(current)),
        ("voltage", Value::Float(voltage)),
        ("remaining_capacity", Value::Float(remaining)),
        ("total_capacity", Value::Float(total)),
        ("soc", Value::Float(soc)),
        ("power", Value::Float(round1(voltage * current))),
    ])
}

/// Alarm, protection, and status flags (registers 5100..5109).
fn decode_battery_status(payload: &[u8]) -> DecodeResult<Vec<FieldPair>> {
    require("status_info", payload, 20)?;

    let mut alarms = Vec::new();

    // Two bits per cell: 01 = under limit, 10 = over limit, 11 = other.
    let cell_voltage_bits = u32_at(payload, 0);
    push_cell_alarms(&mut alarms, cell_voltage_bits, "undervoltage", "overvoltage");

    let cell_temp_bits = u32_at(payload, 4);
    push_cell_alarms(&mut alarms, cell_temp_bits, "undertemp", "overtemp");

    let status1 = u16_at(payload, 12);
    const STATUS1_BITS: &[(u16, &str)] = &[
        (15, "module_undervoltage"),
        (14, "charge_overtemp"),
        (13, "charge_undertemp"),
        (12, "discharge_overtemp"),
        (11, "discharge_undertemp"),
        (10, "discharge_overcurrent"),
        (9, "charge_overcurrent"),
        (8, "cell_overvoltage"),
        (7, "cell_undervoltage"),
        (6, "module_overvoltage"),
        (0, "short_circuit"),
    ];
    for (bit, name) in STATUS1_BITS {
        if status1 & (1 << bit) != 0 {
            alarms.push(name.to_string());
        }
    }

    let status2 = u16_at(payload, 14);
    let status3 = u16_at(payload, 16);

    let mut warnings = Vec::new();
    const STATUS3_BITS: &[(u16, &str)] = &[
        (7, "discharge_high_temp"),
        (6, "discharge_low_temp"),
        (5, "charge_high_temp"),
        (4, "charge_low_temp"),
        (3, "module_high_voltage"),
        (2, "module_low_voltage"),
        (1, "cell_high_voltage"),
        (0, "cell_low_voltage"),
    ];
    for (bit, name) in STATUS3_BITS {
        if status3 & (1 << bit) != 0 {
            warnings.push(name.to_string());
        }
    }

    Ok(vec![
        ("alarm_count", Value::Integer(alarms.len() as i64)),
        ("warning_count", Value::Integer(warnings.len() as i64)),
        ("alarms", Value::Labels(alarms)),
        ("warnings", Value::Labels(warnings)),
        (
            "discharge_mosfet",
            Value::Text(mosfet_state(status1, 2).to_string()),
        ),
        (
            "charge_mosfet",
            Value::Text(mosfet_state(status1, 1).to_string()),
        ),
        ("heater_on", Value::Bool(status2 & (1 << 13) != 0)),
        ("fully_charged", Value::Bool(status2 & (1 << 11) != 0)),
    ])
}

fn push_cell_alarms(alarms: &mut Vec<String>, bits: u32, low: &str, high: &str) {
    for cell in 0..MAX_CELLS {
        match (bits >> (cell * 2)) & 0x03 {
            1 => alarms.push(format!("cell_{}_{low}", cell + 1)),
            2 => alarms.push(format!("cell_{}_{high}", cell + 1)),
            3 => alarms.push(format!("cell_{}_alarm", cell + 1)),
            _ => {}
        }
    }
}

fn mosfet_state(status: u16, bit: u16) -> &'static str {
    if status & (1 << bit) != 0 {
        "on"
    } else {
        "off"
    }
}

// =============================================================================
// Inverter Decoders
// =============================================================================

/// Raw register readings at or above this are "no data" markers (0xFFFF on
/// a disconnected AC input).
const INVERTER_ABSENT: u16 = 65000;

fn absent_or(raw: u16, scale: f64) -> f64 {
    if raw >= INVERTER_ABSENT {
        0.0
    } else {
        scaled(raw, scale)
    }
}

/// AC input/output, battery, and status flags (registers 4000..4009).
fn decode_inverter_status(payload: &[u8]) -> DecodeResult<Vec<FieldPair>> {
    require("main_status", payload, 18)?;

    let input_voltage = absent_or(u16_at(payload, 0), 0.1);
    let input_current = absent_or(u16_at(payload, 2), 0.01);
    let output_voltage = scaled(u16_at(payload, 4), 0.1);
    let output_current = scaled(u16_at(payload, 6), 0.01);

    let mut fields: Vec<FieldPair> = vec![
        ("input_voltage", Value::Float(input_voltage)),
        ("input_current", Value::Float(input_current)),
        ("output_voltage", Value::Float(output_voltage)),
        ("output_current", Value::Float(output_current)),
        (
            "output_frequency",
            Value::Float(scaled(u16_at(payload, 8), 0.01)),
        ),
        (
            "battery_voltage",
            Value::Float(scaled(u16_at(payload, 10), 0.1)),
        ),
        ("temperature", Value::Float(scaled(u16_at(payload, 12), 0.1))),
    ];

    let status_high = u16_at(payload, 14);
    let status_low = u16_at(payload, 16);

    const HIGH_FAULT_BITS: &[(u16, &str)] = &[
        (15, "input_uvp"),
        (14, "input_ovp"),
        (13, "output_overload"),
        (12, "dcdc_overload"),
        (11, "dcdc_overcurrent"),
        (10, "bus_overvoltage"),
        (9, "ground_fault"),
        (8, "over_temperature"),
        (7, "output_short_circuit"),
        (6, "output_uvp"),
        (5, "output_ovp"),
    ];
    const LOW_FAULT_BITS: &[(u16, &str)] = &[
        (15, "utility_fail"),
        (14, "battery_low"),
        (12, "ups_fail"),
        (9, "shutdown_active"),
        (7, "fan_locked"),
        (6, "inverter_overload"),
        (5, "inverter_short_circuit"),
        (4, "battery_bad"),
    ];

    let mut faults = Vec::new();
    for (bit, name) in HIGH_FAULT_BITS {
        if status_high & (1 << bit) != 0 {
            faults.push(name.to_string());
        }
    }
    for (bit, name) in LOW_FAULT_BITS {
        if status_low & (1 << bit) != 0 {
            faults.push(name.to_string());
        }
    }

    fields.push(("fault_count", Value::Integer(faults.len() as i64)));
    fields.push(("faults", Value::Labels(faults)));
    fields.push(("eco_mode", Value::Bool(status_high & (1 << 4) != 0)));
    fields.push(("beeper_on", Value::Bool(status_low & (1 << 8) != 0)));

    if payload.len() >= 20 {
        fields.push((
            "input_frequency",
            Value::Float(absent_or(u16_at(payload, 18), 0.01)),
        ));
    }

    let input_power = if input_voltage > 0.0 && input_current > 0.0 {
        round1(input_voltage * input_current)
    } else {
        0.0
    };
    fields.push(("input_power", Value::Float(input_power)));
    fields.push((
        "output_power",
        Value::Float(round1(output_voltage * output_current)),
    ));

    Ok(fields)
}

/// Manufacturer, model, and firmware strings (registers 4303..4326).
fn decode_inverter_device_info(payload: &[u8]) -> DecodeResult<Vec<FieldPair>> {
    require("device_info", payload, 48)?;

    let mut fields = Vec::new();
    for (name, offset) in [
        ("manufacturer", 0),
        ("model", 16),
        ("firmware_version", 32),
    ] {
        let text = ascii_at(payload, offset, 16);
        if !text.is_empty() {
            fields.push((name, Value::Text(text)));
        }
    }

    Ok(fields)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn words(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    #[test]
    fn test_read_plan_covers_all_kinds() {
        assert_eq!(read_plan(DeviceKind::Controller).len(), 4);
        assert_eq!(read_plan(DeviceKind::Battery).len(), 5);
        assert_eq!(read_plan(DeviceKind::Inverter).len(), 2);

        // Every planned block must have a decoder.
        for kind in [
            DeviceKind::Controller,
            DeviceKind::Battery,
            DeviceKind::Inverter,
        ] {
            for block in read_plan(kind) {
                let payload = vec![0u8; block.words as usize * 2];
                let result = decode_block(kind, block.register, &payload);
                assert!(
                    !matches!(result, Err(DecodeError::UnknownBlock { .. })),
                    "no decoder for {kind} register {}",
                    block.register
                );
            }
        }
    }

    #[test]
    fn test_unknown_block_rejected() {
        assert!(matches!(
            decode_block(DeviceKind::Battery, 9999, &[]),
            Err(DecodeError::UnknownBlock { .. })
        ));
    }

    #[test]
    fn test_battery_cells() {
        // 4 cells at 3.3 V (raw 33 in 0.1 V units).
        let mut regs = vec![4u16, 33, 33, 33, 33];
        regs.resize(17, 0);
        let fields = decode_block(DeviceKind::Battery, 5000, &words(&regs)).unwrap();

        let cells = fields
            .iter()
            .find(|(n, _)| *n == "cell_voltages")
            .map(|(_, v)| v)
            .unwrap();
        assert_eq!(
            cells,
            &Value::FloatArray(vec![3.3, 3.3, 3.3, 3.3]),
            "unused cell slots must be omitted, not zero-filled"
        );
    }

    #[test]
    fn test_battery_cell_count_clamped() {
        let mut regs = vec![99u16];
        regs.resize(17, 32);
        let fields = decode_block(DeviceKind::Battery, 5000, &words(&regs)).unwrap();
        let count = fields
            .iter()
            .find(|(n, _)| *n == "cell_count")
            .and_then(|(_, v)| v.as_i64())
            .unwrap();
        assert_eq!(count, 16);
    }

    #[test]
    fn test_battery_info_soc() {
        // current 1.50 A, voltage 13.2 V, remaining 50.0 Ah, total 100.0 Ah.
        let mut payload = Vec::new();
        payload.extend_from_slice(&150i16.to_be_bytes());
        payload.extend_from_slice(&132u16.to_be_bytes());
        payload.extend_from_slice(&50_000u32.to_be_bytes());
        payload.extend_from_slice(&100_000u32.to_be_bytes());
        payload.resize(16, 0);

        let fields = decode_block(DeviceKind::Battery, 5042, &payload).unwrap();
        let get = |name: &str| {
            fields
                .iter()
                .find(|(n, _)| *n == name)
                .and_then(|(_, v)| v.as_f64())
                .unwrap()
        };

        assert_eq!(get("current"), 1.5);
        assert_eq!(get("voltage"), 13.2);
        assert_eq!(get("soc"), 50.0);
        assert_eq!(get("power"), 19.8);
    }

    #[test]
    fn test_battery_negative_current() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(-250i16).to_be_bytes());
        payload.extend_from_slice(&128u16.to_be_bytes());
        payload.extend_from_slice(&10_000u32.to_be_bytes());
        payload.extend_from_slice(&100_000u32.to_be_bytes());
        payload.resize(16, 0);

        let fields = decode_block(DeviceKind::Battery, 5042, &payload).unwrap();
        let current = fields
            .iter()
            .find(|(n, _)| *n == "current")
            .and_then(|(_, v)| v.as_f64())
            .unwrap();
        assert_eq!(current, -2.5);
    }

    #[test]
    fn test_battery_zero_total_capacity() {
        let payload = vec![0u8; 16];
        let fields = decode_block(DeviceKind::Battery, 5042, &payload).unwrap();
        let soc = fields
            .iter()
            .find(|(n, _)| *n == "soc")
            .and_then(|(_, v)| v.as_f64())
            .unwrap();
        assert_eq!(soc, 0.0);
    }

    #[test]
    fn test_controller_charging_info() {
        let mut payload = vec![0u8; 68];
        payload[0..2].copy_from_slice(&87u16.to_be_bytes()); // 87 %
        payload[2..4].copy_from_slice(&132u16.to_be_bytes()); // 13.2 V
        payload[4..6].copy_from_slice(&250u16.to_be_bytes()); // 2.5 A
        payload[6] = 25; // controller 25 °C
        payload[7] = 128 + 3; // battery -3 °C
        payload[14..16].copy_from_slice(&189u16.to_be_bytes()); // PV 18.9 V
        payload[18..20].copy_from_slice(&120u16.to_be_bytes()); // PV 120 W
        payload[65] = 2; // mppt

        let fields = decode_block(DeviceKind::Controller, 256, &payload).unwrap();
        let get = |name: &str| fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v);

        assert_eq!(get("battery_percentage"), Some(&Value::Integer(87)));
        assert_eq!(get("battery_voltage"), Some(&Value::Float(13.2)));
        assert_eq!(get("battery_current"), Some(&Value::Float(2.5)));
        assert_eq!(get("battery_temperature"), Some(&Value::Float(-3.0)));
        assert_eq!(get("controller_temperature"), Some(&Value::Float(25.0)));
        assert_eq!(get("pv_voltage"), Some(&Value::Float(18.9)));
        assert_eq!(get("pv_power"), Some(&Value::Integer(120)));
        assert_eq!(
            get("charging_status"),
            Some(&Value::Text("mppt".to_string()))
        );
    }

    #[test]
    fn test_controller_unknown_charging_status() {
        let mut payload = vec![0u8; 68];
        payload[65] = 42;
        let fields = decode_block(DeviceKind::Controller, 256, &payload).unwrap();
        let status = fields
            .iter()
            .find(|(n, _)| *n == "charging_status")
            .map(|(_, v)| v)
            .unwrap();
        assert_eq!(status, &Value::Text("unknown(42)".to_string()));
    }

    #[test]
    fn test_controller_faults() {
        // Bit 17 (battery_overvoltage) + bit 18 (warning).
        let bits: u32 = (1 << 17) | (1 << 18);
        let payload = words(&[(bits >> 16) as u16, bits as u16]);

        let fields = decode_block(DeviceKind::Controller, 289, &payload).unwrap();
        let get = |name: &str| fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v);

        assert_eq!(get("fault_count"), Some(&Value::Integer(1)));
        assert_eq!(get("warning_count"), Some(&Value::Integer(1)));
        assert_eq!(
            get("faults"),
            Some(&Value::Labels(vec!["battery_overvoltage".to_string()]))
        );
    }

    #[test]
    fn test_short_payload_is_decode_error() {
        assert!(matches!(
            decode_block(DeviceKind::Controller, 256, &[0u8; 10]),
            Err(DecodeError::PayloadTooShort { .. })
        ));
    }

    #[test]
    fn test_inverter_absent_input() {
        let mut regs = vec![0xFFFFu16, 0xFFFF, 2300, 43, 5000, 132, 251, 0, 0, 0xFFFF];
        regs.resize(10, 0);
        let fields = decode_block(DeviceKind::Inverter, 4000, &words(&regs)).unwrap();
        let get = |name: &str| {
            fields
                .iter()
                .find(|(n, _)| *n == name)
                .and_then(|(_, v)| v.as_f64())
                .unwrap()
        };

        // 0xFFFF markers decode as "no AC input present".
        assert_eq!(get("input_voltage"), 0.0);
        assert_eq!(get("input_frequency"), 0.0);
        assert_eq!(get("input_power"), 0.0);
        assert_eq!(get("output_voltage"), 230.0);
        assert_eq!(get("output_frequency"), 50.0);
        assert_eq!(get("battery_voltage"), 13.2);
        assert_eq!(get("temperature"), 25.1);
        assert_eq!(get("output_power"), 98.9);
    }

    #[test]
    fn test_inverter_device_info() {
        let mut payload = vec![0u8; 48];
        payload[..6].copy_from_slice(b"ACME  ");
        payload[16..26].copy_from_slice(b"INV-2000  ");

        let fields = decode_block(DeviceKind::Inverter, 4303, &payload).unwrap();
        let get = |name: &str| fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v);

        assert_eq!(get("manufacturer"), Some(&Value::Text("ACME".to_string())));
        assert_eq!(get("model"), Some(&Value::Text("INV-2000".to_string())));
        // Empty firmware field omitted entirely.
        assert_eq!(get("firmware_version"), None);
    }

    #[test]
    fn test_battery_status_flags() {
        let mut payload = vec![0u8; 20];
        // status1: charge mosfet on (bit 1), cell_overvoltage (bit 8).
        payload[12..14].copy_from_slice(&((1u16 << 1) | (1 << 8)).to_be_bytes());
        // status2: heater on (bit 13).
        payload[14..16].copy_from_slice(&(1u16 << 13).to_be_bytes());

        let fields = decode_block(DeviceKind::Battery, 5100, &payload).unwrap();
        let get = |name: &str| fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v);

        assert_eq!(get("charge_mosfet"), Some(&Value::Text("on".to_string())));
        assert_eq!(get("discharge_mosfet"), Some(&Value::Text("off".to_string())));
        assert_eq!(get("heater_on"), Some(&Value::Bool(true)));
        assert_eq!(
            get("alarms"),
            Some(&Value::Labels(vec!["cell_overvoltage".to_string()]))
        );
    }

    #[test]
    fn test_cell_alarm_bit_pairs() {
        let mut payload = vec![0u8; 20];
        // Cell 1 undervoltage (01), cell 2 overvoltage (10).
        let bits: u32 = 0b1001;
        payload[0..4].copy_from_slice(&bits.to_be_bytes());

        let fields = decode_block(DeviceKind::Battery, 5100, &payload).unwrap();
        let alarms = fields
            .iter()
            .find(|(n, _)| *n == "alarms")
            .map(|(_, v)| v)
            .unwrap();
        assert_eq!(
            alarms,
            &Value::Labels(vec![
                "cell_1_undervoltage".to_string(),
                "cell_2_overvoltage".to_string(),
            ])
        );
    }
}
