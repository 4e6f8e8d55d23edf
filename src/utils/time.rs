// src/utils/time.rs
//! Wall-clock sources and timestamp formatting
//!
//! Timestamps exchanged by the acquisition core are `f64` seconds since the
//! Unix epoch, so signals of different devices share one time axis.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local};

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Time provider trait for dependency injection and testing
pub trait TimeProvider: Send + Sync {
    fn now_nanos(&self) -> u64;

    fn now_secs(&self) -> f64 {
        self.now_nanos() as f64 / NANOS_PER_SECOND
    }
}

/// System time provider using actual system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_nanos(&self) -> u64 {
        current_timestamp_nanos()
    }
}

/// Wall-clock anchored once, then advanced by a monotonic clock.
///
/// Never goes backwards when the system clock is adjusted.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimeProvider {
    anchor_nanos: u64,
    anchor: Instant,
}

impl MonotonicTimeProvider {
    pub fn new() -> Self {
        Self {
            anchor_nanos: current_timestamp_nanos(),
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for MonotonicTimeProvider {
    fn now_nanos(&self) -> u64 {
        self.anchor_nanos
            .saturating_add(self.anchor.elapsed().as_nanos() as u64)
    }
}

/// Mock time provider for deterministic testing
#[derive(Debug, Default)]
pub struct MockTimeProvider {
    current_time: AtomicU64,
}

impl MockTimeProvider {
    pub fn new(initial_time_nanos: u64) -> Self {
        Self {
            current_time: AtomicU64::new(initial_time_nanos),
        }
    }

    pub fn from_secs(secs: f64) -> Self {
        Self::new((secs * NANOS_PER_SECOND) as u64)
    }

    pub fn advance_by(&self, nanos: u64) {
        self.current_time.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance_by((secs * NANOS_PER_SECOND) as u64);
    }

    pub fn set_time(&self, nanos: u64) {
        self.current_time.store(nanos, Ordering::Relaxed);
    }
}

impl TimeProvider for MockTimeProvider {
    fn now_nanos(&self) -> u64 {
        self.current_time.load(Ordering::Relaxed)
    }
}

pub fn current_timestamp_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

pub fn current_timestamp_secs() -> f64 {
    current_timestamp_nanos() as f64 / NANOS_PER_SECOND
}

/// Local date and time of `timestamp` (seconds since the epoch), e.g.
/// `"2024-03-01 14:22:05.123"`
pub fn format_time_date(timestamp: f64) -> String {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * NANOS_PER_SECOND) as u32;
    match DateTime::from_timestamp(secs as i64, nanos.min(999_999_999)) {
        Some(utc) => utc
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string(),
        None => format!("{timestamp:.3}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_time_provider() {
        let clock = MockTimeProvider::from_secs(100.0);
        assert_eq!(clock.now_secs(), 100.0);

        clock.advance_secs(0.5);
        assert_eq!(clock.now_secs(), 100.5);

        clock.set_time(2_000_000_000);
        assert_eq!(clock.now_secs(), 2.0);
    }

    #[test]
    fn test_monotonic_provider_never_goes_back() {
        let clock = MonotonicTimeProvider::new();
        let mut last = clock.now_nanos();
        for _ in 0..1000 {
            let now = clock.now_nanos();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_system_time_is_after_2020() {
        assert!(SystemTimeProvider.now_secs() > 1_577_836_800.0);
    }

    #[test]
    fn test_format_time_date_shape() {
        let formatted = format_time_date(1_700_000_000.25);
        assert_eq!(formatted.len(), "2023-11-14 22:13:20.250".len());
        assert!(formatted.ends_with(".250"));
    }

    #[test]
    fn test_format_time_date_out_of_range() {
        assert_eq!(format_time_date(f64::MAX), format!("{:.3}", f64::MAX));
    }
}
