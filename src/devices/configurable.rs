// src/devices/configurable.rs
//! Typed configuration properties of a device or one of its channel groups

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::devices::DeviceType;
use crate::error::{CoreError, CoreResult};
use crate::hal::{
    ConfigCapabilities, ConfigKey, ConfigKeyInfo, ConfigTarget, ConfigValue, DriverDevice, HalError,
    MetaPayload,
};

/// One configuration key with its last known value.
///
/// The value is refreshed on every successful get or set and when the
/// device reports a change through a meta packet.
pub struct Property {
    key: ConfigKey,
    capabilities: ConfigCapabilities,
    target: ConfigTarget,
    driver: Arc<dyn DriverDevice>,
    value: RwLock<Option<ConfigValue>>,
}

impl Property {
    fn new(
        driver: Arc<dyn DriverDevice>,
        target: ConfigTarget,
        info: &ConfigKeyInfo,
    ) -> Self {
        let property = Self {
            key: info.key.clone(),
            capabilities: info.capabilities,
            target,
            driver,
            value: RwLock::new(None),
        };
        if property.capabilities.get {
            if let Err(e) = property.refresh() {
                tracing::debug!(key = ?property.key, error = %e, "initial config read failed");
            }
        }
        property
    }

    pub fn key(&self) -> &ConfigKey {
        &self.key
    }

    pub fn capabilities(&self) -> ConfigCapabilities {
        self.capabilities
    }

    pub fn target(&self) -> &ConfigTarget {
        &self.target
    }

    /// Cached value, without asking the driver
    pub fn value(&self) -> Option<ConfigValue> {
        self.value.read().clone()
    }

    pub fn uint64_value(&self) -> Option<u64> {
        self.value.read().as_ref().and_then(ConfigValue::as_u64)
    }

    pub fn double_value(&self) -> Option<f64> {
        self.value.read().as_ref().and_then(ConfigValue::as_f64)
    }

    pub fn bool_value(&self) -> Option<bool> {
        self.value.read().as_ref().and_then(ConfigValue::as_bool)
    }

    /// Read the value from the driver and cache it
    pub fn refresh(&self) -> CoreResult<ConfigValue> {
        if !self.capabilities.get {
            return Err(CoreError::PropertyAccess {
                key: self.key.clone(),
                access: "readable",
            });
        }
        let value = self.driver.config_get(&self.target, &self.key)?;
        *self.value.write() = Some(value.clone());
        Ok(value)
    }

    /// Write the value to the driver
    pub fn set(&self, value: ConfigValue) -> CoreResult<()> {
        if !self.capabilities.set {
            return Err(CoreError::PropertyAccess {
                key: self.key.clone(),
                access: "writable",
            });
        }
        self.driver.config_set(&self.target, &self.key, value.clone())?;
        *self.value.write() = Some(value);
        Ok(())
    }

    pub(crate) fn update_from_meta(&self, value: ConfigValue) {
        *self.value.write() = Some(value);
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("key", &self.key)
            .field("capabilities", &self.capabilities)
            .field("target", &self.target)
            .field("value", &*self.value.read())
            .finish()
    }
}

/// The device or one of its channel groups, as a set of properties.
///
/// Only keys with a meaning in this crate get a property; acquisition
/// control keys and unmapped keys are skipped.
pub struct Configurable {
    name: String,
    target: ConfigTarget,
    device_name: String,
    device_type: DeviceType,
    properties: BTreeMap<ConfigKey, Arc<Property>>,
}

impl Configurable {
    /// Create a configurable for `target` from the keys the driver reports
    pub fn new(
        driver: Arc<dyn DriverDevice>,
        target: ConfigTarget,
        keys: &[ConfigKeyInfo],
        device_name: &str,
        device_type: DeviceType,
    ) -> Self {
        let name = match &target {
            ConfigTarget::Device => String::new(),
            ConfigTarget::ChannelGroup(group) => group.clone(),
        };

        let properties = keys
            .iter()
            .filter(|info| info.key.is_configuration())
            .map(|info| {
                let property = Property::new(Arc::clone(&driver), target.clone(), info);
                (info.key.clone(), Arc::new(property))
            })
            .collect();

        Self {
            name,
            target,
            device_name: device_name.to_string(),
            device_type,
            properties,
        }
    }

    /// Channel group name, `""` for the device itself
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &ConfigTarget {
        &self.target
    }

    pub fn is_device(&self) -> bool {
        self.target == ConfigTarget::Device
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// E.g. `"Acme PS-3005 - CH1"`
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.device_name.clone()
        } else {
            format!("{} - {}", self.device_name, self.name)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ConfigKey> {
        self.properties.keys()
    }

    pub fn properties(&self) -> &BTreeMap<ConfigKey, Arc<Property>> {
        &self.properties
    }

    pub fn property(&self, key: &ConfigKey) -> Option<&Arc<Property>> {
        self.properties.get(key)
    }

    pub fn has_get_config(&self, key: &ConfigKey) -> bool {
        self.property(key).is_some_and(|p| p.capabilities().get)
    }

    pub fn has_set_config(&self, key: &ConfigKey) -> bool {
        self.property(key).is_some_and(|p| p.capabilities().set)
    }

    pub fn get_config(&self, key: &ConfigKey) -> CoreResult<ConfigValue> {
        self.require(key)?.refresh()
    }

    pub fn set_config(&self, key: &ConfigKey, value: ConfigValue) -> CoreResult<()> {
        self.require(key)?.set(value)
    }

    fn require(&self, key: &ConfigKey) -> CoreResult<&Arc<Property>> {
        self.property(key)
            .ok_or_else(|| CoreError::Hal(HalError::UnsupportedKey(key.clone())))
    }

    /// Apply a device-reported configuration change; returns the number of
    /// properties updated
    pub fn feed_in_meta(&self, meta: &MetaPayload) -> usize {
        let mut updated = 0;
        for (key, value) in &meta.config {
            match self.properties.get(key) {
                Some(property) => {
                    property.update_from_meta(value.clone());
                    updated += 1;
                }
                None => tracing::trace!(configurable = %self.display_name(), ?key, "meta key ignored"),
            }
        }
        updated
    }
}

impl fmt::Debug for Configurable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configurable")
            .field("name", &self.name)
            .field("device_name", &self.device_name)
            .field("keys", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Build the configurables of an open device, keyed by channel group name
/// with `""` for the device-level one.
///
/// Channel groups without config keys get none. The device-level
/// configurable exists only if at least one of its keys is a user-facing
/// setting.
pub fn build_configurables(
    driver: &Arc<dyn DriverDevice>,
    device_name: &str,
    device_type: DeviceType,
) -> BTreeMap<String, Arc<Configurable>> {
    let mut configurables = BTreeMap::new();

    for group in driver.channel_groups() {
        if group.config_keys.is_empty() {
            continue;
        }
        let configurable = Configurable::new(
            Arc::clone(driver),
            ConfigTarget::ChannelGroup(group.name.clone()),
            &group.config_keys,
            device_name,
            device_type,
        );
        configurables.insert(group.name, Arc::new(configurable));
    }

    let device_keys = driver.config_keys(&ConfigTarget::Device);
    if device_keys.iter().any(|info| info.key.is_configuration()) {
        let configurable = Configurable::new(
            Arc::clone(driver),
            ConfigTarget::Device,
            &device_keys,
            device_name,
            device_type,
        );
        configurables.insert(String::new(), Arc::new(configurable));
    }

    tracing::debug!(device = device_name, count = configurables.len(), "configurables built");
    configurables
}

/// Pick the configurable a meta packet belongs to.
///
/// Meta packets do not say which channel group they concern. The first
/// channel-group configurable in name order is used; the device-level one
/// only when it is the sole configurable. With several channel groups the
/// choice may be wrong.
pub fn route_meta(configurables: &BTreeMap<String, Arc<Configurable>>) -> Option<&Arc<Configurable>> {
    let total = configurables.len();
    let chosen = configurables
        .iter()
        .find(|(name, _)| !(name.is_empty() && total > 1))
        .map(|(_, configurable)| configurable);

    let groups = configurables.keys().filter(|name| !name.is_empty()).count();
    if groups > 1 {
        if let Some(configurable) = chosen {
            tracing::debug!(
                chosen = configurable.name(),
                groups,
                "meta packet routed to first of several channel groups"
            );
        }
    }
    chosen
}
