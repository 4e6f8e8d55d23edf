// src/channels/mod.rs
//! Named data sources of a device and their per-quantity signals

use std::collections::{BTreeMap, BTreeSet, TryReserveError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::data::{AnalogSignal, InterleavedSamples, Quantity, QuantityFlag, QuantityKey, Unit};
use crate::events::{DeviceEvent, EventBus};
use crate::hal::{AnalogPayload, DriverChannel};

/// Kind of data a channel carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    /// Analog data from power supplies, loads and meters
    AnalogChannel,
    /// Virtual channel fed by math operations
    MathChannel,
}

/// Where a channel comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelSource {
    /// Reported by the driver; `index` is the driver-assigned ID
    Hardware { index: u32 },
    /// Created programmatically
    User,
}

/// RGB display colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Colour {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Default colour of the channel with driver index `index`
    pub fn for_index(index: u32) -> Self {
        PALETTE[index as usize % PALETTE.len()]
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

const PALETTE: [Colour; 8] = [
    Colour::rgb(0xef, 0x29, 0x29),
    Colour::rgb(0x72, 0x9f, 0xcf),
    Colour::rgb(0x73, 0xd2, 0x16),
    Colour::rgb(0xed, 0xd4, 0x00),
    Colour::rgb(0xad, 0x7f, 0xa8),
    Colour::rgb(0xfc, 0xaf, 0x3e),
    Colour::rgb(0x34, 0xe2, 0xe2),
    Colour::rgb(0xc1, 0x7d, 0x11),
];

/// Non-owning view of the device a channel belongs to
pub trait ChannelParent: Send + Sync {
    fn device_name(&self) -> String;
}

#[derive(Debug, Default)]
struct SignalRegistry {
    map: BTreeMap<QuantityKey, Arc<AnalogSignal>>,
    actual: Option<Arc<AnalogSignal>>,
}

/// A named data source of a device.
///
/// A channel owns one signal per (quantity, flags) pair it has seen and
/// appends to exactly one of them, the actual signal, at a time.
pub struct Channel {
    name: String,
    channel_type: ChannelType,
    source: ChannelSource,
    fixed_signal: bool,
    display_name: RwLock<String>,
    group_names: RwLock<Vec<String>>,
    enabled: AtomicBool,
    colour: RwLock<Colour>,
    start_timestamp: RwLock<f64>,
    signals: RwLock<SignalRegistry>,
    parent: Option<Weak<dyn ChannelParent>>,
    events: EventBus,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("channel_type", &self.channel_type)
            .field("source", &self.source)
            .field("fixed_signal", &self.fixed_signal)
            .field("group_names", &*self.group_names.read())
            .finish()
    }
}

impl Channel {
    /// Create a channel from driver-reported metadata
    pub fn hardware(
        channel: &DriverChannel,
        group_name: &str,
        fixed_signal: bool,
        start_timestamp: f64,
        events: EventBus,
    ) -> Self {
        Self {
            name: channel.name.clone(),
            channel_type: ChannelType::AnalogChannel,
            source: ChannelSource::Hardware { index: channel.index },
            fixed_signal,
            display_name: RwLock::new(channel.name.clone()),
            group_names: RwLock::new(vec![group_name.to_string()]),
            enabled: AtomicBool::new(channel.enabled),
            colour: RwLock::new(Colour::for_index(channel.index)),
            start_timestamp: RwLock::new(start_timestamp),
            signals: RwLock::new(SignalRegistry::default()),
            parent: None,
            events,
        }
    }

    /// Create a virtual channel with a fixed quantity and its initial signal
    pub fn user(
        name: &str,
        group_name: &str,
        quantity: Quantity,
        quantity_flags: BTreeSet<QuantityFlag>,
        unit: Unit,
        start_timestamp: f64,
        events: EventBus,
    ) -> Self {
        let channel = Self {
            name: name.to_string(),
            channel_type: ChannelType::MathChannel,
            source: ChannelSource::User,
            fixed_signal: true,
            display_name: RwLock::new(name.to_string()),
            group_names: RwLock::new(vec![group_name.to_string()]),
            enabled: AtomicBool::new(true),
            colour: RwLock::new(Colour::for_index(0)),
            start_timestamp: RwLock::new(start_timestamp),
            signals: RwLock::new(SignalRegistry::default()),
            parent: None,
            events,
        };
        channel.init_signal(quantity, quantity_flags, unit);
        channel
    }

    pub fn with_parent(mut self, parent: Weak<dyn ChannelParent>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    pub fn source(&self) -> ChannelSource {
        self.source
    }

    /// Driver index, `None` for user channels
    pub fn index(&self) -> Option<u32> {
        match self.source {
            ChannelSource::Hardware { index } => Some(index),
            ChannelSource::User => None,
        }
    }

    /// True if the quantity of this channel never changes
    pub fn has_fixed_signal(&self) -> bool {
        self.fixed_signal
    }

    /// Name of the owning device, if it is still alive
    pub fn parent_device_name(&self) -> Option<String> {
        self.parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|parent| parent.device_name())
    }

    pub fn group_names(&self) -> Vec<String> {
        self.group_names.read().clone()
    }

    /// Record a group membership; returns false if it was already known
    pub fn add_group_name(&self, group_name: &str) -> bool {
        let mut groups = self.group_names.write();
        if groups.iter().any(|g| g == group_name) {
            return false;
        }
        groups.push(group_name.to_string());
        true
    }

    pub fn display_name(&self) -> String {
        self.display_name.read().clone()
    }

    pub fn set_display_name(&self, name: &str) {
        *self.display_name.write() = name.to_string();
        self.events.publish(DeviceEvent::NameChanged {
            channel: self.name.clone(),
            name: name.to_string(),
        });
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::AcqRel) != enabled {
            self.events.publish(DeviceEvent::EnabledChanged {
                channel: self.name.clone(),
                enabled,
            });
        }
    }

    pub fn colour(&self) -> Colour {
        *self.colour.read()
    }

    pub fn set_colour(&self, colour: Colour) {
        *self.colour.write() = colour;
        self.events.publish(DeviceEvent::ColourChanged {
            channel: self.name.clone(),
            colour,
        });
    }

    pub fn start_timestamp(&self) -> f64 {
        *self.start_timestamp.read()
    }

    /// Move the session baseline of this channel and all of its signals
    pub fn set_start_timestamp(&self, timestamp: f64) {
        *self.start_timestamp.write() = timestamp;
        for signal in self.signals.read().map.values() {
            signal.set_signal_start_timestamp(timestamp);
        }
    }

    pub fn actual_signal(&self) -> Option<Arc<AnalogSignal>> {
        self.signals.read().actual.clone()
    }

    pub fn signal_map(&self) -> BTreeMap<QuantityKey, Arc<AnalogSignal>> {
        self.signals.read().map.clone()
    }

    pub fn signals(&self) -> Vec<Arc<AnalogSignal>> {
        self.signals.read().map.values().cloned().collect()
    }

    /// Make the signal for `quantity`/`flags` the actual one, creating it if
    /// this channel has not seen the pair before.
    pub fn init_signal(
        &self,
        quantity: Quantity,
        quantity_flags: BTreeSet<QuantityFlag>,
        unit: Unit,
    ) -> Arc<AnalogSignal> {
        let key: QuantityKey = (quantity, quantity_flags);
        let (signal, added, changed) = {
            let mut registry = self.signals.write();
            let (signal, added) = match registry.map.get(&key) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let signal = Arc::new(AnalogSignal::new(
                        self.name.clone(),
                        quantity,
                        key.1.clone(),
                        unit,
                        self.start_timestamp(),
                    ));
                    registry.map.insert(key, Arc::clone(&signal));
                    (signal, true)
                }
            };
            let changed = !registry
                .actual
                .as_ref()
                .is_some_and(|actual| Arc::ptr_eq(actual, &signal));
            registry.actual = Some(Arc::clone(&signal));
            (signal, added, changed)
        };

        if added {
            tracing::debug!(channel = %self.name, signal = %signal.display_name(), "signal added");
            self.events.publish(DeviceEvent::SignalAdded {
                channel: self.name.clone(),
                signal: Arc::clone(&signal),
            });
        }
        if changed {
            self.events.publish(DeviceEvent::SignalChanged {
                channel: self.name.clone(),
                signal: Arc::clone(&signal),
            });
        }
        signal
    }

    /// Signal the next samples of `quantity`/`flags` go to
    fn signal_for(
        &self,
        quantity: Quantity,
        quantity_flags: &BTreeSet<QuantityFlag>,
        unit: Unit,
    ) -> Arc<AnalogSignal> {
        if let Some(actual) = self.actual_signal() {
            if self.fixed_signal
                || (actual.quantity() == quantity && actual.quantity_flags() == quantity_flags)
            {
                return actual;
            }
        }
        self.init_signal(quantity, quantity_flags.clone(), unit)
    }

    /// Append this channel's strided slice of an analog packet
    pub fn push_interleaved_samples(
        &self,
        samples: &InterleavedSamples<'_>,
        timestamp: f64,
        samplerate: u64,
        payload: &AnalogPayload,
    ) -> Result<usize, TryReserveError> {
        let signal = self.signal_for(payload.quantity, &payload.quantity_flags, payload.unit);
        signal.push_interleaved(samples, timestamp, samplerate, payload.digits)
    }

    /// Append a single value, e.g. a math result
    pub fn push_sample(
        &self,
        timestamp: f64,
        value: f64,
        quantity: Quantity,
        quantity_flags: &BTreeSet<QuantityFlag>,
        unit: Unit,
    ) {
        self.signal_for(quantity, quantity_flags, unit)
            .push_sample(timestamp, value);
    }
}
