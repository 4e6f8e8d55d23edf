//! Labmeter-Core: device acquisition core for laboratory instruments
//!
//! This library turns the packet stream of an instrument driver into named
//! channels and time series. It features:
//!
//! - A device lifecycle with one dedicated acquisition thread per open device
//! - Packet demultiplexing into per-channel, per-quantity signals
//! - Channel and configurable registries built from the driver topology
//! - Change notifications over crossbeam channels
//! - An in-process simulator driver
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use labmeter_core::hal::simulator::{SimulatedContext, SimulatorConfig};
//! use labmeter_core::{Device, SessionContext};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = SimulatedContext::new(vec![SimulatorConfig::demo(2)]);
//!     let hw = Arc::clone(&driver.devices()[0]);
//!     let session = driver.generating_session(&hw);
//!
//!     let device = Device::new(hw, session, SessionContext::default())?;
//!     device.with_open(|e| eprintln!("acquisition failed: {e}"), |device| {
//!         std::thread::sleep(std::time::Duration::from_millis(500));
//!         for signal in device.all_signals() {
//!             println!("{}: {} samples", signal.display_name(), signal.sample_count());
//!         }
//!     })?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod acquisition;
pub mod channels;
pub mod config;
pub mod data;
pub mod devices;
pub mod error;
pub mod events;
pub mod hal;
pub mod session;
pub mod utils;

// Re-export commonly used types for convenience
pub use acquisition::AcquisitionState;
pub use channels::{Channel, ChannelType, Colour};
pub use config::{ConfigLoader, CoreConfig};
pub use data::{AnalogSignal, Quantity, QuantityFlag, Sample, Unit};
pub use devices::{Configurable, Device, DeviceIdentity, DeviceType, PacketHooks, Property};
pub use error::{CoreError, CoreResult};
pub use events::{DeviceEvent, EventBus};
pub use hal::{HalError, Packet};
pub use session::SessionContext;
pub use utils::{init_tracing, TimeProvider};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Device acquisition core for laboratory instruments".to_string(),
        features: vec![
            "Device lifecycle with dedicated acquisition threads".to_string(),
            "Packet demultiplexing into channel signals".to_string(),
            "Channel and configurable registries".to_string(),
            "Simulator driver".to_string(),
        ],
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}
