// src/acquisition/mod.rs
//! Acquisition state and the per-device acquisition thread

pub mod state;
pub mod worker;

pub use state::*;
pub use worker::*;
