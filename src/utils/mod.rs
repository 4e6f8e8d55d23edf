// src/utils/mod.rs
//! Time sources, timestamp formatting and logging setup

pub mod logging;
pub mod time;

pub use logging::init_tracing;
pub use time::{
    current_timestamp_nanos,
    current_timestamp_secs,
    format_time_date,
    MockTimeProvider,
    MonotonicTimeProvider,
    SystemTimeProvider,
    TimeProvider,
};
