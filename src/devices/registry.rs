// src/devices/registry.rs
//! Channel registry of a device, indexed by name and by channel group

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::channels::Channel;
use crate::data::AnalogSignal;
use crate::hal::{DriverChannel, DriverChannelGroup};

/// Channels of one device.
///
/// Each name maps to exactly one channel. A channel listed in several
/// driver groups appears once in `by_name` and once per group in
/// `by_group`; ungrouped channels live under the group `""`.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    by_name: BTreeMap<String, Arc<Channel>>,
    by_group: BTreeMap<String, Vec<Arc<Channel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel` under `group`.
    ///
    /// Returns true if the name was not known yet. An already registered
    /// channel of the same name keeps its identity and only gains the group.
    pub fn add(&mut self, channel: Arc<Channel>, group: &str) -> bool {
        let (channel, added) = match self.by_name.get(channel.name()) {
            Some(existing) => (Arc::clone(existing), false),
            None => {
                self.by_name
                    .insert(channel.name().to_string(), Arc::clone(&channel));
                (channel, true)
            }
        };

        let members = self.by_group.entry(group.to_string()).or_default();
        if !members.iter().any(|c| Arc::ptr_eq(c, &channel)) {
            members.push(Arc::clone(&channel));
        }
        channel.add_group_name(group);
        added
    }

    /// Register the driver channels, creating each distinct name once.
    ///
    /// Grouped channels are visited first, group by group; the remaining
    /// device channels go to the group `""`. Returns the channels created,
    /// in registration order.
    pub fn populate_hardware_channels<F>(
        &mut self,
        groups: &[DriverChannelGroup],
        channels: &[DriverChannel],
        mut create: F,
    ) -> Vec<Arc<Channel>>
    where
        F: FnMut(&DriverChannel, &str) -> Arc<Channel>,
    {
        let mut created = Vec::new();

        for group in groups {
            for driver_channel in &group.channels {
                let channel = self
                    .get(&driver_channel.name)
                    .unwrap_or_else(|| create(driver_channel, &group.name));
                if self.add(Arc::clone(&channel), &group.name) {
                    created.push(channel);
                }
            }
        }

        for driver_channel in channels {
            if self.contains(&driver_channel.name) {
                continue;
            }
            let channel = create(driver_channel, "");
            if self.add(Arc::clone(&channel), "") {
                created.push(channel);
            }
        }

        created
    }

    pub fn get(&self, name: &str) -> Option<Arc<Channel>> {
        self.by_name.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Channels ordered by name
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.by_name.values().cloned().collect()
    }

    pub fn channels_by_group(&self) -> BTreeMap<String, Vec<Arc<Channel>>> {
        self.by_group.clone()
    }

    pub fn group(&self, group: &str) -> Vec<Arc<Channel>> {
        self.by_group.get(group).cloned().unwrap_or_default()
    }

    /// Every signal of every channel
    pub fn all_signals(&self) -> Vec<Arc<AnalogSignal>> {
        self.by_name.values().flat_map(|c| c.signals()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_name.clear();
        self.by_group.clear();
    }
}
