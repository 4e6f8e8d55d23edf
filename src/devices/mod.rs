// src/devices/mod.rs
//! Devices, their registries and the packet feed

pub mod configurable;
pub mod device;
pub mod device_type;
pub mod feed;
pub mod naming;
pub mod registry;

pub use configurable::{build_configurables, route_meta, Configurable, Property};
pub use device::Device;
pub use device_type::DeviceType;
pub use feed::{NoopHooks, PacketHooks};
pub use naming::DeviceIdentity;
pub use registry::ChannelRegistry;
