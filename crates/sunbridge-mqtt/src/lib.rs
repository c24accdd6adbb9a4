// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # sunbridge-mqtt
//!
//! The broker side of the gateway: client wrapper, topic layout,
//! auto-discovery registration, and the bus-to-broker forwarding sink.

pub mod client;
pub mod discovery;
pub mod sink;
pub mod topics;

pub use client::{MqttPublisher, MqttSettings};
pub use discovery::{binary_sensors_for, publish_discovery, sensors_for, SensorMeta};
pub use sink::{publish_all_offline, PublishSink};
pub use topics::TopicScheme;
