// src/config/constants.rs
//! Crate-wide configuration constants

/// Acquisition thread and packet feed
pub mod acquisition {
    /// 0 waits for the acquisition thread without a deadline
    pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 0;
    pub const MAX_JOIN_TIMEOUT_MS: u64 = 600_000;

    /// 0 disables stopping the session on allocation failures
    pub const DEFAULT_MAX_CONSECUTIVE_ALLOC_FAILURES: u32 = 8;

    /// 0 leaves the decode buffer of one analog packet unbounded
    pub const DEFAULT_MAX_PACKET_VALUES: u64 = 0;

    pub const DEFAULT_THREAD_NAME_PREFIX: &str = "acq";
    pub const MAX_THREAD_NAME_PREFIX_LEN: usize = 8;
}

/// Device specific overrides
pub mod devices {
    pub const DEMO_DRIVER_NAME: &str = "demo";

    /// Sample rate pushed to demo sources on open, in Hz
    pub const DEMO_INITIAL_SAMPLERATE_HZ: u64 = 5;

    pub const DEFAULT_STRICT_CHANNEL_REGISTRY: bool = cfg!(debug_assertions);
}

pub mod logging {
    pub const DEFAULT_FILTER: &str = "info";
}

/// Configuration sources
pub mod paths {
    pub const DEFAULT_CONFIG_FILE: &str = "labmeter.toml";
    pub const ENV_PREFIX: &str = "LABMETER";
    pub const ENV_SEPARATOR: &str = "__";
}

/// In-process simulator driver
pub mod simulator {
    pub const DRIVER_NAME: &str = "demo";
    pub const DEFAULT_SAMPLERATE_HZ: u64 = 10;
    pub const DEFAULT_AMPLITUDE: f32 = 10.0;
    pub const DEFAULT_SIGNAL_FREQUENCY_HZ: f32 = 0.5;

    /// Longest sleep of the generator between two packets
    pub const MAX_GENERATOR_PERIOD_MS: u64 = 100;
    pub const MAX_SAMPLES_PER_PACKET: usize = 64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_prefix_fits_limit() {
        assert!(acquisition::DEFAULT_THREAD_NAME_PREFIX.len() <= acquisition::MAX_THREAD_NAME_PREFIX_LEN);
    }

    #[test]
    fn test_demo_driver_names_agree() {
        assert_eq!(devices::DEMO_DRIVER_NAME, simulator::DRIVER_NAME);
        assert!(devices::DEMO_INITIAL_SAMPLERATE_HZ > 0);
    }
}
