// src/hal/types.rs
//! Core types exchanged with the instrument driver

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::data::{Quantity, QuantityFlag, Unit};
use crate::hal::HalError;

/// Configuration key reported by a driver
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfigKey {
    // Device classes
    PowerSupply,
    ElectronicLoad,
    Multimeter,
    SoundLevelMeter,
    Thermometer,
    Hygrometer,
    EnergyMeter,
    LcrMeter,
    Scale,
    SignalGenerator,
    PowerMeter,
    Multiplexer,
    DemoDevice,

    // Acquisition control
    Continuous,
    LimitSamples,
    LimitMsec,

    // Configuration
    Samplerate,
    Enabled,
    Regulation,
    VoltageTarget,
    CurrentLimit,
    OverVoltageProtectionEnabled,
    OverVoltageProtectionThreshold,
    OverCurrentProtectionEnabled,
    OverCurrentProtectionThreshold,
    MeasuredQuantity,
    Range,
    Amplitude,
    Offset,
    OutputFrequency,

    /// Key without a meaning in this crate
    Other(String),
}

impl ConfigKey {
    /// Keys naming the kind of instrument rather than a setting
    pub fn is_device_class(&self) -> bool {
        matches!(
            self,
            ConfigKey::PowerSupply
                | ConfigKey::ElectronicLoad
                | ConfigKey::Multimeter
                | ConfigKey::SoundLevelMeter
                | ConfigKey::Thermometer
                | ConfigKey::Hygrometer
                | ConfigKey::EnergyMeter
                | ConfigKey::LcrMeter
                | ConfigKey::Scale
                | ConfigKey::SignalGenerator
                | ConfigKey::PowerMeter
                | ConfigKey::Multiplexer
                | ConfigKey::DemoDevice
        )
    }

    /// Continuous mode, sample count limit and time limit
    pub fn is_acquisition_control(&self) -> bool {
        matches!(
            self,
            ConfigKey::Continuous | ConfigKey::LimitSamples | ConfigKey::LimitMsec
        )
    }

    /// True if the key is a user-facing setting that gets a property
    pub fn is_configuration(&self) -> bool {
        !matches!(self, ConfigKey::Other(_))
            && !self.is_device_class()
            && !self.is_acquisition_control()
    }
}

/// Value of a configuration key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    Bool(bool),
    UInt64(u64),
    Double(f64),
    String(String),
    Quantity {
        quantity: Quantity,
        flags: BTreeSet<QuantityFlag>,
    },
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ConfigValue::UInt64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Double(value) => Some(*value),
            ConfigValue::UInt64(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(value) => Some(value),
            _ => None,
        }
    }
}

/// Which operations the driver allows on a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigCapabilities {
    pub get: bool,
    pub set: bool,
    pub list: bool,
}

impl ConfigCapabilities {
    pub const ALL: Self = Self { get: true, set: true, list: true };
    pub const GET_SET: Self = Self { get: true, set: true, list: false };
    pub const READ_ONLY: Self = Self { get: true, set: false, list: false };
}

impl Default for ConfigCapabilities {
    fn default() -> Self {
        Self::GET_SET
    }
}

/// A configuration key together with its capabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigKeyInfo {
    pub key: ConfigKey,
    pub capabilities: ConfigCapabilities,
}

impl ConfigKeyInfo {
    pub fn new(key: ConfigKey, capabilities: ConfigCapabilities) -> Self {
        Self { key, capabilities }
    }
}

impl From<ConfigKey> for ConfigKeyInfo {
    fn from(key: ConfigKey) -> Self {
        Self::new(key, ConfigCapabilities::default())
    }
}

/// Where a config get/set is addressed
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigTarget {
    Device,
    ChannelGroup(String),
}

/// Channel as reported by the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverChannel {
    pub name: String,
    /// Unique ID assigned by the driver
    pub index: u32,
    pub enabled: bool,
}

impl DriverChannel {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
            enabled: true,
        }
    }
}

/// Channel group as reported by the driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverChannelGroup {
    pub name: String,
    pub channels: Vec<DriverChannel>,
    pub config_keys: Vec<ConfigKeyInfo>,
}

/// Configuration change reported by the device
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaPayload {
    pub config: Vec<(ConfigKey, ConfigValue)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogicPayload {
    pub unit_size: usize,
    pub data: Vec<u8>,
}

/// Raw analog sample storage, interleaved across the payload channels
#[derive(Debug, Clone, PartialEq)]
pub enum AnalogData {
    Float(Vec<f32>),
    Double(Vec<f64>),
    Scaled { raw: Vec<i32>, scale: f32, offset: f32 },
}

impl AnalogData {
    pub fn len(&self) -> usize {
        match self {
            AnalogData::Float(data) => data.len(),
            AnalogData::Double(data) => data.len(),
            AnalogData::Scaled { raw, .. } => raw.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Analog samples for a set of channels
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogPayload {
    pub channels: Vec<DriverChannel>,
    pub num_samples: usize,
    pub quantity: Quantity,
    pub quantity_flags: BTreeSet<QuantityFlag>,
    pub unit: Unit,
    pub digits: i32,
    pub data: AnalogData,
}

impl AnalogPayload {
    /// Payload of `f32` values interleaved as `[s0_ch0, s0_ch1, .., s1_ch0, ..]`
    pub fn interleaved(
        channels: Vec<DriverChannel>,
        quantity: Quantity,
        quantity_flags: BTreeSet<QuantityFlag>,
        unit: Unit,
        data: Vec<f32>,
    ) -> Self {
        let num_samples = if channels.is_empty() { 0 } else { data.len() / channels.len() };
        Self {
            channels,
            num_samples,
            quantity,
            quantity_flags,
            unit,
            digits: 3,
            data: AnalogData::Float(data),
        }
    }

    /// Number of interleaved values the payload must hold
    pub fn value_count(&self) -> Option<usize> {
        self.num_samples.checked_mul(self.channels.len())
    }

    /// [`value_count`](Self::value_count), checked against the data actually
    /// carried. Needs no allocation.
    pub fn checked_value_count(&self) -> Result<usize, HalError> {
        let count = self
            .value_count()
            .ok_or_else(|| HalError::MalformedPacket("sample count overflow".to_string()))?;
        if self.data.len() < count {
            return Err(HalError::MalformedPacket(format!(
                "analog payload holds {} values, expected {}",
                self.data.len(),
                count
            )));
        }
        Ok(count)
    }

    /// Append the interleaved payload to `out` as `f32` values.
    ///
    /// `out` must already have room for `value_count()` values.
    pub fn decode_into(&self, out: &mut Vec<f32>) -> Result<(), HalError> {
        let count = self.checked_value_count()?;

        match &self.data {
            AnalogData::Float(data) => out.extend_from_slice(&data[..count]),
            AnalogData::Double(data) => out.extend(data[..count].iter().map(|&v| v as f32)),
            AnalogData::Scaled { raw, scale, offset } => {
                out.extend(raw[..count].iter().map(|&v| v as f32 * scale + offset))
            }
        }
        Ok(())
    }
}

/// One unit of the acquisition data feed
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Header,
    Meta(MetaPayload),
    Trigger,
    Logic(LogicPayload),
    Analog(AnalogPayload),
    FrameBegin,
    FrameEnd,
    End,
    /// Driver-defined kind this crate does not handle
    Unknown(u16),
}

impl Packet {
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Header => "header",
            Packet::Meta(_) => "meta",
            Packet::Trigger => "trigger",
            Packet::Logic(_) => "logic",
            Packet::Analog(_) => "analog",
            Packet::FrameBegin => "frame_begin",
            Packet::FrameEnd => "frame_end",
            Packet::End => "end",
            Packet::Unknown(_) => "unknown",
        }
    }
}
