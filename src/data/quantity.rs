// src/data/quantity.rs
//! Physical quantities, quantity flags and units with their display strings

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical measurement type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quantity {
    Voltage,
    Current,
    Power,
    Resistance,
    Capacitance,
    Inductance,
    Frequency,
    Temperature,
    RelativeHumidity,
    SoundPressureLevel,
    Energy,
    Mass,
    Time,
    PowerFactor,
    Unknown,
}

impl Quantity {
    pub fn name(&self) -> &'static str {
        match self {
            Quantity::Voltage => "Voltage",
            Quantity::Current => "Current",
            Quantity::Power => "Power",
            Quantity::Resistance => "Resistance",
            Quantity::Capacitance => "Capacitance",
            Quantity::Inductance => "Inductance",
            Quantity::Frequency => "Frequency",
            Quantity::Temperature => "Temperature",
            Quantity::RelativeHumidity => "Relative Humidity",
            Quantity::SoundPressureLevel => "Sound Pressure Level",
            Quantity::Energy => "Energy",
            Quantity::Mass => "Mass",
            Quantity::Time => "Time",
            Quantity::PowerFactor => "Power Factor",
            Quantity::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Modifier of a quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QuantityFlag {
    Ac,
    Dc,
    Rms,
    Min,
    Max,
    Avg,
    Hold,
    Relative,
    AutoRange,
}

impl QuantityFlag {
    pub fn name(&self) -> &'static str {
        match self {
            QuantityFlag::Ac => "AC",
            QuantityFlag::Dc => "DC",
            QuantityFlag::Rms => "RMS",
            QuantityFlag::Min => "Min",
            QuantityFlag::Max => "Max",
            QuantityFlag::Avg => "Avg",
            QuantityFlag::Hold => "Hold",
            QuantityFlag::Relative => "Rel",
            QuantityFlag::AutoRange => "Auto",
        }
    }
}

/// Unit of measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Unit {
    Volt,
    Ampere,
    Watt,
    Ohm,
    Farad,
    Henry,
    Hertz,
    Celsius,
    Percentage,
    DecibelSpl,
    WattHour,
    Gram,
    Second,
    Unitless,
    Unknown,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Volt => "V",
            Unit::Ampere => "A",
            Unit::Watt => "W",
            Unit::Ohm => "\u{2126}",
            Unit::Farad => "F",
            Unit::Henry => "H",
            Unit::Hertz => "Hz",
            Unit::Celsius => "\u{00B0}C",
            Unit::Percentage => "%",
            Unit::DecibelSpl => "dB",
            Unit::WattHour => "Wh",
            Unit::Gram => "g",
            Unit::Second => "s",
            Unit::Unitless | Unit::Unknown => "",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Space separated flag names in flag order, e.g. `"AC RMS"`
pub fn format_quantity_flags(flags: &BTreeSet<QuantityFlag>) -> String {
    flags.iter().map(QuantityFlag::name).collect::<Vec<_>>().join(" ")
}

/// Unit symbol followed by the flags, e.g. `"V DC"`
pub fn format_unit(unit: Unit, flags: &BTreeSet<QuantityFlag>) -> String {
    let mut parts = Vec::with_capacity(flags.len() + 1);
    if !unit.symbol().is_empty() {
        parts.push(unit.symbol());
    }
    parts.extend(flags.iter().map(QuantityFlag::name));
    parts.join(" ")
}
