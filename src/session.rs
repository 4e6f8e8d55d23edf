// src/session.rs
//! State shared by every device of one application session

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::CoreConfig;
use crate::utils::time::{MonotonicTimeProvider, TimeProvider};

/// Session-wide clock, configuration and start timestamp.
///
/// All devices created from one context stamp their samples with the same
/// clock and share the same start timestamp, so plots of different devices
/// align on a common relative time axis.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: CoreConfig,
    clock: Arc<dyn TimeProvider>,
    start_timestamp: RwLock<f64>,
}

impl SessionContext {
    pub fn new(config: CoreConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicTimeProvider::new()))
    }

    /// Context with an injected clock, e.g. a `MockTimeProvider` in tests
    pub fn with_clock(config: CoreConfig, clock: Arc<dyn TimeProvider>) -> Self {
        let start_timestamp = clock.now_secs();
        Self {
            inner: Arc::new(SessionInner {
                config,
                clock,
                start_timestamp: RwLock::new(start_timestamp),
            }),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &Arc<dyn TimeProvider> {
        &self.inner.clock
    }

    /// Current time in seconds since the epoch
    pub fn now(&self) -> f64 {
        self.inner.clock.now_secs()
    }

    pub fn start_timestamp(&self) -> f64 {
        *self.inner.start_timestamp.read()
    }

    /// Move the session baseline. Devices already open keep their value
    /// until `Device::set_acquisition_start_timestamp` is called.
    pub fn set_start_timestamp(&self, timestamp: f64) {
        *self.inner.start_timestamp.write() = timestamp;
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("config", &self.inner.config)
            .field("start_timestamp", &self.start_timestamp())
            .finish()
    }
}
