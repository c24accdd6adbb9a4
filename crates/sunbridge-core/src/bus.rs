// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Broadcast bus connecting the device pollers to the publish sink.
//!
//! The pollers produce [`BusEvent`]s; the sink (and any future consumer)
//! subscribes. `tokio::sync::broadcast` gives fan-out without the pollers
//! ever waiting on a consumer: a slow subscriber lags and drops messages
//! rather than backpressuring the radio schedule.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::{BusError, BusResult};
use crate::types::{DeviceId, Reading};
use crate::validator::RejectionStats;

// =============================================================================
// BusEvent
// =============================================================================

/// An event broadcast from the pollers.
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// A validated reading, ready for publishing.
    Reading(Arc<Reading>),

    /// A device's availability changed.
    ///
    /// Derived from the poller's connection tracking, not from reading
    /// content.
    Availability {
        /// The device whose availability changed.
        device_id: DeviceId,
        /// `true` when the device came (back) online.
        online: bool,
    },

    /// The validator rejected values this cycle; updated diagnostics.
    Rejections {
        /// The device whose validator rejected values.
        device_id: DeviceId,
        /// Aggregated rejection statistics.
        stats: Arc<RejectionStats>,
    },
}

impl BusEvent {
    /// Wraps a reading.
    pub fn reading(reading: Reading) -> Self {
        Self::Reading(Arc::new(reading))
    }

    /// Creates an availability event.
    pub fn availability(device_id: DeviceId, online: bool) -> Self {
        Self::Availability { device_id, online }
    }

    /// Creates a rejection-diagnostics event.
    pub fn rejections(device_id: DeviceId, stats: RejectionStats) -> Self {
        Self::Rejections {
            device_id,
            stats: Arc::new(stats),
        }
    }

    /// Returns the device this event concerns.
    pub fn device_id(&self) -> &DeviceId {
        match self {
            BusEvent::Reading(reading) => &reading.device_id,
            BusEvent::Availability { device_id, .. } => device_id,
            BusEvent::Rejections { device_id, .. } => device_id,
        }
    }
}

// =============================================================================
// DataBus
// =============================================================================

/// Broadcast channel for poller output.
#[derive(Debug)]
pub struct DataBus {
    sender: broadcast::Sender<BusEvent>,
    published: AtomicU64,
}

impl DataBus {
    /// Creates a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers the event was delivered to.
    pub fn publish(&self, event: BusEvent) -> BusResult<usize> {
        match self.sender.send(event) {
            Ok(receivers) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                Ok(receivers)
            }
            Err(_) => Err(BusError::NoReceivers),
        }
    }

    /// Subscribes to the bus.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Returns how many events have been published.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for DataBus {
    fn default() -> Self {
        Self::new(256)
    }
}

// =============================================================================
// Tests
// =============================================================================
