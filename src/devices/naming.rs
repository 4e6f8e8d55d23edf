// src/devices/naming.rs
//! Human-readable device names

use serde::{Deserialize, Serialize};

use crate::hal::DriverDevice;

/// Identity strings reported by the driver; empty strings are stored as `None`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub serial_number: Option<String>,
    pub connection_id: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl DeviceIdentity {
    pub fn from_driver(device: &dyn DriverDevice) -> Self {
        Self {
            vendor: non_empty(device.vendor()),
            model: non_empty(device.model()),
            version: non_empty(device.version()),
            serial_number: non_empty(device.serial_number()),
            connection_id: non_empty(device.connection_id()),
        }
    }

    /// Same vendor and model, i.e. names need disambiguation
    pub fn same_model(&self, other: &DeviceIdentity) -> bool {
        self.vendor == other.vendor && self.model == other.model
    }

    fn vendor_model(&self) -> Vec<&str> {
        [&self.vendor, &self.model]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .collect()
    }

    /// `vendor model (connection id)`
    pub fn name(&self) -> String {
        let conn = self.connection_id.as_ref().map(|c| format!("({c})"));
        let mut parts = self.vendor_model();
        parts.extend(conn.as_deref());
        parts.join(" ")
    }

    /// Every known part: `vendor model version serial (connection id)`
    pub fn full_name(&self) -> String {
        let conn = self.connection_id.as_ref().map(|c| format!("({c})"));
        let mut parts = self.vendor_model();
        parts.extend(self.version.as_deref());
        parts.extend(self.serial_number.as_deref());
        parts.extend(conn.as_deref());
        parts.join(" ")
    }

    /// `vendor model`
    pub fn short_name(&self) -> String {
        self.vendor_model().join(" ")
    }

    /// Label for the UI.
    ///
    /// With `multiple` set, another known device shares vendor and model, so
    /// the version and `[S/N: serial]` (or `(connection id)` when there is no
    /// serial number) are appended.
    pub fn display_name(&self, multiple: bool) -> String {
        let mut parts: Vec<String> = self.vendor_model().into_iter().map(str::to_string).collect();
        if multiple {
            parts.extend(self.version.clone());
            if let Some(serial) = &self.serial_number {
                parts.push(format!("[S/N: {serial}]"));
            } else if let Some(conn) = &self.connection_id {
                parts.push(format!("({conn})"));
            }
        }
        parts.join(" ")
    }

    /// [`display_name`](Self::display_name) given the other known devices
    pub fn display_name_among<'a, I>(&self, others: I) -> String
    where
        I: IntoIterator<Item = &'a DeviceIdentity>,
    {
        let multiple = others.into_iter().any(|other| self.same_model(other));
        self.display_name(multiple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(serial: Option<&str>, conn: Option<&str>) -> DeviceIdentity {
        DeviceIdentity {
            vendor: Some("Acme".to_string()),
            model: Some("X1".to_string()),
            version: Some("1.2".to_string()),
            serial_number: serial.map(str::to_string),
            connection_id: conn.map(str::to_string),
        }
    }

    #[test]
    fn test_names() {
        let id = identity(Some("SN1"), Some("/dev/ttyUSB0"));
        assert_eq!(id.name(), "Acme X1 (/dev/ttyUSB0)");
        assert_eq!(id.full_name(), "Acme X1 1.2 SN1 (/dev/ttyUSB0)");
        assert_eq!(id.short_name(), "Acme X1");
    }

    #[test]
    fn test_lone_device_omits_suffix() {
        let id = identity(Some("SN1"), None);
        let other = DeviceIdentity {
            model: Some("X2".to_string()),
            ..identity(Some("SN9"), None)
        };
        assert_eq!(id.display_name_among([&other]), "Acme X1");
    }

    #[test]
    fn test_identical_models_are_disambiguated() {
        let a = identity(Some("SN1"), Some("usb/1"));
        let b = identity(Some("SN2"), Some("usb/2"));
        assert_eq!(a.display_name_among([&b]), "Acme X1 1.2 [S/N: SN1]");
        assert_eq!(b.display_name_among([&a]), "Acme X1 1.2 [S/N: SN2]");
    }

    #[test]
    fn test_connection_id_used_without_serial() {
        let a = identity(None, Some("tcp/10.0.0.5"));
        assert_eq!(a.display_name(true), "Acme X1 1.2 (tcp/10.0.0.5)");
    }

    #[test]
    fn test_missing_parts_are_skipped() {
        let id = DeviceIdentity {
            model: Some("Bare".to_string()),
            ..Default::default()
        };
        assert_eq!(id.name(), "Bare");
        assert_eq!(id.full_name(), "Bare");
        assert_eq!(id.display_name(true), "Bare");
    }
}
