// src/hal/mod.rs
//! Hardware Abstraction Layer: the driver contract consumed by the core

pub mod traits;
pub mod types;
pub mod simulator;


pub use traits::*;
pub use types::*;
