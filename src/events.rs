// src/events.rs
//! Change notifications for the UI and storage layers
//!
//! Every subscriber owns an unbounded crossbeam receiver. Events are
//! published from whichever thread caused the change, so consumers must not
//! assume a particular thread or an ordering between event kinds.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::acquisition::AcquisitionState;
use crate::channels::Colour;
use crate::data::AnalogSignal;

/// Notification emitted by a device or one of its channels
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// Fired once per distinct channel name, after registration
    ChannelAdded { device: String, channel: String },
    SignalAdded {
        channel: String,
        signal: Arc<AnalogSignal>,
    },
    /// The active signal of a channel switched
    SignalChanged {
        channel: String,
        signal: Arc<AnalogSignal>,
    },
    EnabledChanged { channel: String, enabled: bool },
    NameChanged { channel: String, name: String },
    ColourChanged { channel: String, colour: Colour },
    StartTimestampChanged { timestamp: f64 },
    AcquisitionStateChanged { state: AcquisitionState },
}

impl DeviceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceEvent::ChannelAdded { .. } => "channel_added",
            DeviceEvent::SignalAdded { .. } => "signal_added",
            DeviceEvent::SignalChanged { .. } => "signal_changed",
            DeviceEvent::EnabledChanged { .. } => "enabled_changed",
            DeviceEvent::NameChanged { .. } => "name_changed",
            DeviceEvent::ColourChanged { .. } => "colour_changed",
            DeviceEvent::StartTimestampChanged { .. } => "start_timestamp_changed",
            DeviceEvent::AcquisitionStateChanged { .. } => "acquisition_state_changed",
        }
    }
}

/// Fan-out of device events to any number of subscribers.
///
/// Cloning yields a handle to the same subscriber list.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<DeviceEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<DeviceEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber; dropped receivers are pruned
    pub fn publish(&self, event: DeviceEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        tracing::trace!(kind = event.kind(), "publishing device event");
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
