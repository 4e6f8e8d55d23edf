// src/data/mod.rs
//! Measurement data model: quantities, units and signals

pub mod quantity;
pub mod signal;

pub use quantity::*;
pub use signal::*;
