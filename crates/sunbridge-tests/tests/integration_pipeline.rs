// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! End-to-end pipeline tests: raw register frames through the frame codec,
//! register decoder, and validator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sunbridge_ble::frame::{parse_response, FUNCTION_READ};
use sunbridge_ble::registers::{decode_block, read_plan};
use sunbridge_ble::{AdapterSession, DevicePoller, DeviceSpec, PollerConfig};
use sunbridge_core::bus::{BusEvent, DataBus};
use sunbridge_core::types::{DataQuality, DeviceId, DeviceKind, Reading, Value};
use sunbridge_core::validator::{FieldLimits, Validator};
use sunbridge_tests::common::fixtures::BatteryFixture;
use sunbridge_tests::common::mocks::MockBleTransport;

/// Runs one scripted poll cycle's frames through codec + decoder into a
/// merged reading.
fn decode_cycle(fixture: &BatteryFixture) -> Reading {
    let mut reading = Reading::new(DeviceId::new("batt-1"), DeviceKind::Battery);

    let responses = fixture.cycle_responses();
    for (block, chunks) in read_plan(DeviceKind::Battery).iter().zip(responses) {
        let frame = parse_response(&chunks[0], fixture.unit_id, FUNCTION_READ).unwrap();
        let fields = decode_block(DeviceKind::Battery, block.register, &frame.payload).unwrap();
        for (name, value) in fields {
            reading.insert(name, value);
        }
    }

    reading
}

fn soc_limits() -> HashMap<String, FieldLimits> {
    let mut limits = HashMap::new();
    limits.insert("soc".to_string(), FieldLimits::new(0.0, 100.0, 5.0));
    limits
}

#[test]
fn battery_frames_decode_to_expected_soc() {
    let fixture = BatteryFixture::default();
    let mut reading = decode_cycle(&fixture);

    let mut validator = Validator::new(DeviceId::new("batt-1"), soc_limits());
    let rejections = validator.validate(&mut reading);
    assert!(rejections.is_empty());

    assert_eq!(
        reading.get("soc"),
        Some(&Value::Float(fixture.expected_soc()))
    );
    assert_eq!(reading.get("voltage"), Some(&Value::Float(13.2)));
    assert_eq!(reading.get("current"), Some(&Value::Float(1.5)));
    assert_eq!(
        reading.get("cell_voltages"),
        Some(&Value::FloatArray(vec![3.3, 3.3, 3.3, 3.3]))
    );
    assert_eq!(reading.quality("soc"), Some(DataQuality::Good));
}

#[test]
fn soc_spike_is_held_at_last_accepted_value() {
    let mut validator = Validator::new(DeviceId::new("batt-1"), soc_limits());

    // Cycle 1: 50 % accepted.
    let fixture = BatteryFixture::default();
    let mut first = decode_cycle(&fixture);
    validator.validate(&mut first);
    assert_eq!(first.get("soc"), Some(&Value::Float(50.0)));

    // Cycle 2: the BMS claims a jump to 90 %; the validator holds 50.
    let spiked = BatteryFixture {
        remaining_milli_ah: 90_000,
        ..BatteryFixture::default()
    };
    let mut second = decode_cycle(&spiked);
    let rejections = validator.validate(&mut second);

    assert_eq!(rejections.len(), 1);
    assert_eq!(second.get("soc"), Some(&Value::Float(50.0)));
    assert_eq!(second.quality("soc"), Some(DataQuality::stale()));

    // Cycle 3: a believable step is accepted again.
    let stepped = BatteryFixture {
        remaining_milli_ah: 54_000,
        ..BatteryFixture::default()
    };
    let mut third = decode_cycle(&stepped);
    assert!(validator.validate(&mut third).is_empty());
    assert_eq!(third.get("soc"), Some(&Value::Float(54.0)));
}

#[tokio::test(start_paused = true)]
async fn poller_publishes_decoded_reading_over_mock_session() {
    let fixture = BatteryFixture::default();
    let transport = MockBleTransport::with_script(fixture.cycle_responses());

    let session = Arc::new(AdapterSession::new("bt2", Box::new(transport)));
    session.connect().await.unwrap();

    let bus = Arc::new(DataBus::new(32));
    let mut events = bus.subscribe();

    let poller = DevicePoller::new(
        DeviceSpec {
            device_id: DeviceId::new("batt-1"),
            kind: DeviceKind::Battery,
            unit_id: fixture.unit_id,
        },
        PollerConfig {
            request_timeout: Duration::from_millis(500),
            ..Default::default()
        },
        session,
        Validator::new(DeviceId::new("batt-1"), soc_limits()),
        bus,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let task = tokio::spawn(poller.run(shutdown_rx));

    let mut reading = None;
    let mut online = None;
    for _ in 0..2 {
        match tokio::time::timeout(Duration::from_secs(120), events.recv())
            .await
            .expect("poller should publish")
            .expect("bus open")
        {
            BusEvent::Reading(r) => reading = Some(r),
            BusEvent::Availability { online: o, .. } => online = Some(o),
            BusEvent::Rejections { .. } => {}
        }
    }

    let reading = reading.expect("reading published");
    assert_eq!(
        reading.get("soc"),
        Some(&Value::Float(fixture.expected_soc()))
    );
    assert_eq!(online, Some(true));

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn exception_block_is_skipped_without_losing_the_cycle() {
    use sunbridge_tests::common::builders::exception_frame;

    let fixture = BatteryFixture::default();
    let mut responses = fixture.cycle_responses();
    // First block (cell info) answers with "illegal data address".
    responses[0] = vec![exception_frame(fixture.unit_id, 0x02)];

    let transport = MockBleTransport::with_script(responses);
    let session = Arc::new(AdapterSession::new("bt2", Box::new(transport)));
    session.connect().await.unwrap();

    let bus = Arc::new(DataBus::new(32));
    let mut events = bus.subscribe();

    let poller = DevicePoller::new(
        DeviceSpec {
            device_id: DeviceId::new("batt-1"),
            kind: DeviceKind::Battery,
            unit_id: fixture.unit_id,
        },
        PollerConfig {
            request_timeout: Duration::from_millis(500),
            ..Default::default()
        },
        session,
        Validator::passthrough(DeviceId::new("batt-1")),
        bus,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let task = tokio::spawn(poller.run(shutdown_rx));

    let reading = loop {
        match tokio::time::timeout(Duration::from_secs(120), events.recv())
            .await
            .expect("poller should publish")
            .expect("bus open")
        {
            BusEvent::Reading(r) => break r,
            _ => continue,
        }
    };

    // The rejected block's fields are absent; the rest of the cycle made it.
    assert_eq!(reading.get("cell_voltages"), None);
    assert_eq!(reading.get("voltage"), Some(&Value::Float(13.2)));

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
}
