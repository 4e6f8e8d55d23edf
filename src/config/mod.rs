// src/config/mod.rs
//! Runtime configuration of the acquisition core

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::ConfigLoader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Complete configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CoreConfig {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub devices: DeviceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AcquisitionConfig {
    /// Deadline for joining the acquisition thread on close, 0 waits forever
    #[serde(default = "defaults::join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Consecutive analog allocation failures before the session is stopped
    #[serde(default = "defaults::max_consecutive_alloc_failures")]
    pub max_consecutive_alloc_failures: u32,

    /// Largest decode buffer one analog packet may claim, in values; a larger
    /// packet counts as an allocation failure. 0 means no bound
    #[serde(default = "defaults::max_packet_values")]
    pub max_packet_values: u64,

    #[serde(default = "defaults::thread_name_prefix")]
    pub thread_name_prefix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "defaults::demo_driver_name")]
    pub demo_driver_name: String,

    #[serde(default = "defaults::demo_initial_samplerate_hz")]
    pub demo_initial_samplerate_hz: u64,

    /// Panic on analog packets for unregistered channels instead of dropping them
    #[serde(default = "defaults::strict_channel_registry")]
    pub strict_channel_registry: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence
    #[serde(default = "defaults::log_filter")]
    pub filter: String,

    #[serde(default)]
    pub format: LogFormat,
}

/// Default value providers using constants
mod defaults {
    use crate::config::constants::*;

    pub fn join_timeout_ms() -> u64 { acquisition::DEFAULT_JOIN_TIMEOUT_MS }
    pub fn max_consecutive_alloc_failures() -> u32 { acquisition::DEFAULT_MAX_CONSECUTIVE_ALLOC_FAILURES }
    pub fn max_packet_values() -> u64 { acquisition::DEFAULT_MAX_PACKET_VALUES }
    pub fn thread_name_prefix() -> String { acquisition::DEFAULT_THREAD_NAME_PREFIX.to_string() }

    pub fn demo_driver_name() -> String { devices::DEMO_DRIVER_NAME.to_string() }
    pub fn demo_initial_samplerate_hz() -> u64 { devices::DEMO_INITIAL_SAMPLERATE_HZ }
    pub fn strict_channel_registry() -> bool { devices::DEFAULT_STRICT_CHANNEL_REGISTRY }

    pub fn log_filter() -> String { logging::DEFAULT_FILTER.to_string() }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: defaults::join_timeout_ms(),
            max_consecutive_alloc_failures: defaults::max_consecutive_alloc_failures(),
            max_packet_values: defaults::max_packet_values(),
            thread_name_prefix: defaults::thread_name_prefix(),
        }
    }
}

impl AcquisitionConfig {
    /// `None` when the join has no deadline
    pub fn join_timeout(&self) -> Option<Duration> {
        (self.join_timeout_ms > 0).then(|| Duration::from_millis(self.join_timeout_ms))
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            demo_driver_name: defaults::demo_driver_name(),
            demo_initial_samplerate_hz: defaults::demo_initial_samplerate_hz(),
            strict_channel_registry: defaults::strict_channel_registry(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: defaults::log_filter(),
            format: LogFormat::default(),
        }
    }
}

impl CoreConfig {
    /// Check value ranges; every problem found is reported
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.acquisition.join_timeout_ms > acquisition::MAX_JOIN_TIMEOUT_MS {
            errors.push(format!(
                "acquisition.join_timeout_ms ({}) exceeds {}",
                self.acquisition.join_timeout_ms,
                acquisition::MAX_JOIN_TIMEOUT_MS
            ));
        }

        let prefix = &self.acquisition.thread_name_prefix;
        if prefix.is_empty() || prefix.len() > acquisition::MAX_THREAD_NAME_PREFIX_LEN {
            errors.push(format!(
                "acquisition.thread_name_prefix must have 1 to {} characters",
                acquisition::MAX_THREAD_NAME_PREFIX_LEN
            ));
        }
        if prefix.contains('\0') {
            errors.push("acquisition.thread_name_prefix contains a NUL byte".to_string());
        }

        if self.devices.demo_initial_samplerate_hz == 0 {
            errors.push("devices.demo_initial_samplerate_hz must be positive".to_string());
        }

        if self.logging.filter.trim().is_empty() {
            errors.push("logging.filter is empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = CoreConfig::default();
        assert_eq!(config.acquisition.join_timeout_ms, 0);
        assert_eq!(config.acquisition.join_timeout(), None);
        assert_eq!(config.acquisition.max_consecutive_alloc_failures, 8);
        assert_eq!(config.acquisition.max_packet_values, 0);
        assert_eq!(config.devices.demo_initial_samplerate_hz, 5);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = CoreConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: CoreConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CoreConfig = toml::from_str(
            r#"
[acquisition]
join_timeout_ms = 250

[logging]
format = "json"
"#,
        )
        .unwrap();

        assert_eq!(config.acquisition.join_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.acquisition.thread_name_prefix, "acq");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.devices, DeviceConfig::default());
    }

    #[test]
    fn test_config_validation_collects_all_errors() {
        let mut config = CoreConfig::default();
        config.acquisition.thread_name_prefix = String::new();
        config.devices.demo_initial_samplerate_hz = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
