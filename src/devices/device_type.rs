// src/devices/device_type.rs
//! Instrument classes and their detection from driver capability keys

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hal::ConfigKey;

/// Kind of instrument, decided once when the device is constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
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
    /// Only used for display; construction never yields it
    Unknown,
}

impl DeviceType {
    /// Device class named by a capability key
    pub fn from_config_key(key: &ConfigKey) -> Option<Self> {
        let device_type = match key {
            ConfigKey::PowerSupply => DeviceType::PowerSupply,
            ConfigKey::ElectronicLoad => DeviceType::ElectronicLoad,
            ConfigKey::Multimeter => DeviceType::Multimeter,
            ConfigKey::SoundLevelMeter => DeviceType::SoundLevelMeter,
            ConfigKey::Thermometer => DeviceType::Thermometer,
            ConfigKey::Hygrometer => DeviceType::Hygrometer,
            ConfigKey::EnergyMeter => DeviceType::EnergyMeter,
            ConfigKey::LcrMeter => DeviceType::LcrMeter,
            ConfigKey::Scale => DeviceType::Scale,
            ConfigKey::SignalGenerator => DeviceType::SignalGenerator,
            ConfigKey::PowerMeter => DeviceType::PowerMeter,
            ConfigKey::Multiplexer => DeviceType::Multiplexer,
            ConfigKey::DemoDevice => DeviceType::DemoDevice,
            _ => return None,
        };
        Some(device_type)
    }

    /// First recognized capability key wins
    pub fn detect(driver_keys: &[ConfigKey]) -> Option<Self> {
        driver_keys.iter().find_map(Self::from_config_key)
    }

    /// Devices whose channels may switch quantity while running
    pub fn has_reconfigurable_quantity(&self) -> bool {
        matches!(
            self,
            DeviceType::Multimeter | DeviceType::LcrMeter | DeviceType::DemoDevice
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceType::PowerSupply => "Power Supply",
            DeviceType::ElectronicLoad => "Electronic Load",
            DeviceType::Multimeter => "Multimeter",
            DeviceType::SoundLevelMeter => "Sound Level Meter",
            DeviceType::Thermometer => "Thermometer",
            DeviceType::Hygrometer => "Hygrometer",
            DeviceType::EnergyMeter => "Energy Meter",
            DeviceType::LcrMeter => "LCR Meter",
            DeviceType::Scale => "Scale",
            DeviceType::SignalGenerator => "Signal Generator",
            DeviceType::PowerMeter => "Power Meter",
            DeviceType::Multiplexer => "Multiplexer",
            DeviceType::DemoDevice => "Demo Device",
            DeviceType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
