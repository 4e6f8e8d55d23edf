// src/hal/traits.rs
//! Capability contract of the instrument driver library

use std::sync::Arc;

use thiserror::Error;

use crate::hal::types::{
    ConfigKey, ConfigKeyInfo, ConfigTarget, ConfigValue, DriverChannel, DriverChannelGroup, Packet,
};

/// Errors reported by a driver
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HalError {
    #[error("device not found: {0}")]
    NotFound(String),

    #[error("open failed: {0}")]
    OpenFailed(String),

    #[error("device is closed")]
    Closed,

    #[error("config key {0:?} is not supported")]
    UnsupportedKey(ConfigKey),

    #[error("invalid value for {key:?}: {reason}")]
    InvalidValue { key: ConfigKey, reason: String },

    #[error("session error: {0}")]
    Session(String),

    #[error("malformed packet: {0}")]
    MalformedPacket(String),
}

/// Result type alias for driver calls
pub type HalResult<T> = Result<T, HalError>;

/// Callback invoked synchronously for every packet of a running session
pub type DatafeedCallback = Box<dyn FnMut(&Packet) + Send>;

/// Entry point of a driver library
pub trait DriverContext: Send + Sync {
    /// List the devices the driver can reach
    fn scan(&self) -> HalResult<Vec<Arc<dyn DriverDevice>>>;

    /// Create an empty session
    fn create_session(&self) -> Arc<dyn DriverSession>;
}

/// A physical or virtual instrument as seen by the driver
pub trait DriverDevice: Send + Sync {
    fn driver_name(&self) -> &str;

    /// Capability keys of the driver, used to classify the device
    fn driver_config_keys(&self) -> Vec<ConfigKey>;

    fn vendor(&self) -> &str;
    fn model(&self) -> &str;
    fn version(&self) -> &str;
    fn serial_number(&self) -> &str;
    fn connection_id(&self) -> &str;

    fn open(&self) -> HalResult<()>;
    fn close(&self) -> HalResult<()>;

    /// All channels of the device, grouped or not
    fn channels(&self) -> Vec<DriverChannel>;

    /// Channel groups ordered by name
    fn channel_groups(&self) -> Vec<DriverChannelGroup>;

    fn config_keys(&self, target: &ConfigTarget) -> Vec<ConfigKeyInfo>;
    fn config_get(&self, target: &ConfigTarget, key: &ConfigKey) -> HalResult<ConfigValue>;
    fn config_set(&self, target: &ConfigTarget, key: &ConfigKey, value: ConfigValue) -> HalResult<()>;
}

/// Live streaming context between the application and its devices.
///
/// `run` blocks the calling thread and invokes the datafeed callbacks on it
/// until `stop` is called from another thread or the driver fails.
pub trait DriverSession: Send + Sync {
    fn add_device(&self, device: Arc<dyn DriverDevice>) -> HalResult<()>;
    fn remove_devices(&self);

    fn add_datafeed_callback(&self, callback: DatafeedCallback);
    fn remove_datafeed_callbacks(&self);

    fn start(&self) -> HalResult<()>;
    fn run(&self) -> HalResult<()>;
    fn stop(&self) -> HalResult<()>;
    fn is_running(&self) -> bool;
}
