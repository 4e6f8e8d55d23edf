// src/error.rs
//! Unified error handling for the acquisition core
//!
//! Only failures a caller can act on cross the public boundary: opening a
//! device, acquisition failures reported through the error handler, and
//! configuration errors. Errors raised while demultiplexing a packet are
//! logged on the acquisition thread and never propagated.

use std::time::SystemTime;

use thiserror::Error;

use crate::acquisition::AcquisitionState;
use crate::hal::{ConfigKey, HalError};

/// Where an error was raised
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    pub thread_id: Option<String>,
    pub component: String,
    pub operation: String,
    pub file: Option<&'static str>,
    pub line: Option<u32>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            timestamp: SystemTime::now(),
            thread_id: std::thread::current().name().map(|s| s.to_string()),
            component: component.to_string(),
            operation: operation.to_string(),
            file: None,
            line: None,
        }
    }

    /// Create error context with file and line information
    pub fn with_location(component: &str, operation: &str, file: &'static str, line: u32) -> Self {
        let mut context = Self::new(component, operation);
        context.file = Some(file);
        context.line = Some(line);
        context
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.component, self.operation)?;
        if let (Some(file), Some(line)) = (self.file, self.line) {
            write!(f, " at {}:{}", file, line)?;
        }
        Ok(())
    }
}

/// Macro for creating error context with file and line info
#[macro_export]
macro_rules! error_context {
    ($component:expr, $operation:expr) => {
        $crate::error::ErrorContext::with_location($component, $operation, file!(), line!())
    };
}

/// Error type for every fallible operation of the crate
#[derive(Debug, Error)]
pub enum CoreError {
    /// The driver could not open the hardware
    #[error("failed to open device {device} ({context}): {source}")]
    Open {
        device: String,
        #[source]
        source: HalError,
        context: ErrorContext,
    },

    /// None of the driver capability keys names a supported device class
    #[error("driver {driver} reports no supported device class ({context})")]
    UnknownDeviceType { driver: String, context: ErrorContext },

    #[error("device {0} is not open")]
    NotOpen(String),

    #[error("invalid acquisition state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: AcquisitionState,
        to: AcquisitionState,
    },

    /// The session failed to start on the acquisition thread
    #[error("failed to start acquisition: {0}")]
    AcquisitionStart(#[source] HalError),

    /// The session receive loop ended with a driver error
    #[error("acquisition aborted: {0}")]
    AcquisitionRun(#[source] HalError),

    #[error("failed to spawn acquisition thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    #[error("acquisition thread did not stop within {timeout_ms} ms")]
    JoinTimeout { timeout_ms: u64 },

    #[error("acquisition thread panicked: {0}")]
    ThreadPanicked(String),

    /// An analog packet names a channel that is not in the registry
    #[error("analog packet references unregistered channel {0}")]
    UnknownChannel(String),

    #[error("could not allocate {requested} values for an analog packet")]
    Allocation { requested: usize },

    #[error("stopped acquisition after {failures} consecutive allocation failures")]
    AllocationLimit { failures: u32 },

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("channel {0} already exists")]
    ChannelExists(String),

    #[error("config key {key:?} is not {access}")]
    PropertyAccess { key: ConfigKey, access: &'static str },

    #[error(transparent)]
    Hal(#[from] HalError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("device", "open");
        assert_eq!(context.component, "device");
        assert_eq!(context.operation, "open");
        assert!(context.timestamp <= SystemTime::now());
        assert_eq!(context.to_string(), "device::open");
    }

    #[test]
    fn test_error_context_macro_records_location() {
        let context = error_context!("device", "open");
        assert_eq!(context.file, Some(file!()));
        assert!(context.line.is_some());
        assert!(context.to_string().contains("error.rs"));
    }

    #[test]
    fn test_open_error_chains_driver_error() {
        let err = CoreError::Open {
            device: "Acme X1".to_string(),
            source: HalError::OpenFailed("port busy".to_string()),
            context: ErrorContext::new("device", "open"),
        };

        let display = err.to_string();
        assert!(display.contains("Acme X1"));
        assert!(display.contains("port busy"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_invalid_config_joins_messages() {
        let err = CoreError::InvalidConfig(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "invalid configuration: a; b");
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CoreError>();
    }
}
