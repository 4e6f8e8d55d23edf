// src/devices/device.rs
//! Device lifecycle: open, acquisition thread, close

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam::channel::Receiver;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};

use crate::acquisition::{run_session, AcquisitionState, AcquisitionThread, AtomicAcquisitionState, ErrorHandler};
use crate::channels::{Channel, ChannelParent};
use crate::data::{AnalogSignal, Quantity, QuantityFlag, Unit};
use crate::devices::configurable::{build_configurables, Configurable, Property};
use crate::devices::feed::{FeedState, NoopHooks, PacketHooks};
use crate::devices::registry::ChannelRegistry;
use crate::devices::{DeviceIdentity, DeviceType};
use crate::error::{CoreError, CoreResult};
use crate::error_context;
use crate::events::{DeviceEvent, EventBus};
use crate::hal::{ConfigKey, ConfigTarget, ConfigValue, DriverContext, DriverDevice, DriverSession, Packet};
use crate::session::SessionContext;

/// State reachable from the acquisition thread
pub(crate) struct DeviceShared {
    pub(crate) driver: Arc<dyn DriverDevice>,
    pub(crate) session: Arc<dyn DriverSession>,
    pub(crate) identity: DeviceIdentity,
    pub(crate) device_type: DeviceType,
    pub(crate) context: SessionContext,
    pub(crate) state: AtomicAcquisitionState,
    pub(crate) start_timestamp: RwLock<f64>,
    pub(crate) channels: RwLock<ChannelRegistry>,
    pub(crate) configurables: RwLock<BTreeMap<String, Arc<Configurable>>>,
    /// Device-level sample rate property, if the driver has one
    pub(crate) samplerate: RwLock<Option<Arc<Property>>>,
    /// Held while an analog packet is distributed
    pub(crate) data_mutex: ReentrantMutex<()>,
    pub(crate) feed: Mutex<FeedState>,
    pub(crate) hooks: RwLock<Arc<dyn PacketHooks>>,
    pub(crate) error_handler: RwLock<Option<ErrorHandler>>,
    pub(crate) events: EventBus,
}

impl ChannelParent for DeviceShared {
    fn device_name(&self) -> String {
        self.identity.short_name()
    }
}

impl DeviceShared {
    pub(crate) fn current_samplerate(&self) -> u64 {
        self.samplerate
            .read()
            .as_ref()
            .and_then(|property| property.uint64_value())
            .unwrap_or(0)
    }

    pub(crate) fn report_error(&self, error: CoreError) {
        match self.error_handler.read().clone() {
            Some(handler) => handler(error),
            None => tracing::error!(device = %self.identity.short_name(), %error, "unhandled device error"),
        }
    }

    fn set_state(&self, state: AcquisitionState) -> AcquisitionState {
        let previous = self.state.swap(state);
        if previous != state {
            self.events
                .publish(DeviceEvent::AcquisitionStateChanged { state });
        }
        previous
    }

    fn init_channels(self: &Arc<Self>) {
        let fixed_signal = !self.device_type.has_reconfigurable_quantity();
        let start_timestamp = *self.start_timestamp.read();
        let parent: Weak<dyn ChannelParent> = Arc::downgrade(self) as Weak<DeviceShared>;

        let groups = self.driver.channel_groups();
        let driver_channels = self.driver.channels();

        let created = self.channels.write().populate_hardware_channels(
            &groups,
            &driver_channels,
            |driver_channel, group| {
                Arc::new(
                    Channel::hardware(
                        driver_channel,
                        group,
                        fixed_signal,
                        start_timestamp,
                        self.events.clone(),
                    )
                    .with_parent(parent.clone()),
                )
            },
        );

        let device = self.identity.short_name();
        for channel in &created {
            self.events.publish(DeviceEvent::ChannelAdded {
                device: device.clone(),
                channel: channel.name().to_string(),
            });
        }
        tracing::debug!(
            device = %device,
            created = created.len(),
            total = self.channels.read().len(),
            "channel registry built"
        );
    }

    fn init_configurables(&self) {
        let configurables =
            build_configurables(&self.driver, &self.identity.short_name(), self.device_type);
        let samplerate = configurables
            .get("")
            .and_then(|c| c.property(&ConfigKey::Samplerate))
            .cloned();

        *self.configurables.write() = configurables;
        *self.samplerate.write() = samplerate;
    }

    /// Push a conservative initial configuration to slow demo sources
    fn apply_open_overrides(&self) {
        let devices = &self.context.config().devices;
        if self.driver.driver_name() != devices.demo_driver_name {
            return;
        }

        let value = ConfigValue::UInt64(devices.demo_initial_samplerate_hz);
        let result = match self.samplerate.read().clone() {
            Some(property) => property.set(value),
            None => self
                .driver
                .config_set(&ConfigTarget::Device, &ConfigKey::Samplerate, value)
                .map_err(CoreError::from),
        };

        match result {
            Ok(()) => tracing::debug!(
                device = %self.identity.short_name(),
                samplerate = devices.demo_initial_samplerate_hz,
                "initial sample rate applied"
            ),
            Err(e) => tracing::warn!(device = %self.identity.short_name(), error = %e, "could not apply initial sample rate"),
        }
    }

    fn install_callback(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.session.add_datafeed_callback(Box::new(move |packet: &Packet| {
            if let Some(shared) = weak.upgrade() {
                shared.data_feed_in(packet);
            }
        }));
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    thread: Option<AcquisitionThread>,
    open: bool,
}

/// An instrument: identity, channels, configurables and the acquisition
/// session.
///
/// `open` spawns one acquisition thread that blocks in the driver receive
/// loop and feeds every packet through the demultiplexer. The owner must
/// call [`close`](Device::close) or use [`with_open`](Device::with_open);
/// dropping an open device closes it as a last resort.
pub struct Device {
    shared: Arc<DeviceShared>,
    lifecycle: Mutex<Lifecycle>,
    /// Held by `open` and by the teardown half of `close`
    transition: Mutex<()>,
}

impl Device {
    /// Wrap a driver device. Fails if no capability key names a supported
    /// device class.
    pub fn new(
        driver: Arc<dyn DriverDevice>,
        session: Arc<dyn DriverSession>,
        context: SessionContext,
    ) -> CoreResult<Self> {
        let device_type = DeviceType::detect(&driver.driver_config_keys()).ok_or_else(|| {
            CoreError::UnknownDeviceType {
                driver: driver.driver_name().to_string(),
                context: error_context!("device", "new"),
            }
        })?;

        let identity = DeviceIdentity::from_driver(driver.as_ref());
        tracing::debug!(device = %identity.full_name(), %device_type, "device created");

        let start_timestamp = context.start_timestamp();
        let shared = DeviceShared {
            driver,
            session,
            identity,
            device_type,
            context,
            state: AtomicAcquisitionState::default(),
            start_timestamp: RwLock::new(start_timestamp),
            channels: RwLock::new(ChannelRegistry::new()),
            configurables: RwLock::new(BTreeMap::new()),
            samplerate: RwLock::new(None),
            data_mutex: ReentrantMutex::new(()),
            feed: Mutex::new(FeedState::default()),
            hooks: RwLock::new(Arc::new(NoopHooks)),
            error_handler: RwLock::new(None),
            events: EventBus::new(),
        };

        Ok(Self {
            shared: Arc::new(shared),
            lifecycle: Mutex::new(Lifecycle::default()),
            transition: Mutex::new(()),
        })
    }

    /// Wrap a driver device with a fresh session of `driver_context`
    pub fn from_context(
        driver_context: &dyn DriverContext,
        driver: Arc<dyn DriverDevice>,
        context: SessionContext,
    ) -> CoreResult<Self> {
        Self::new(driver, driver_context.create_session(), context)
    }

    /// Open the hardware, build the registries and start acquisition.
    ///
    /// Failures after this returns go to `error_handler`, called on the
    /// acquisition thread. Opening an open device closes it first.
    pub fn open<F>(&self, error_handler: F) -> CoreResult<()>
    where
        F: Fn(CoreError) + Send + Sync + 'static,
    {
        if self.is_open() {
            self.close();
        }

        let _transition = self.transition.lock();
        let shared = &self.shared;
        let handler: ErrorHandler = Arc::new(error_handler);
        *shared.error_handler.write() = Some(Arc::clone(&handler));

        let mut lifecycle = self.lifecycle.lock();
        let device = shared.identity.name();

        if let Err(source) = shared.driver.open() {
            tracing::error!(device = %device, error = %source, "failed to open device");
            return Err(CoreError::Open {
                device,
                source,
                context: error_context!("device", "open"),
            });
        }

        if let Err(source) = shared.session.add_device(Arc::clone(&shared.driver)) {
            tracing::error!(device = %device, error = %source, "failed to attach device to session");
            if let Err(e) = shared.driver.close() {
                tracing::warn!(device = %device, error = %e, "device close failed");
            }
            return Err(CoreError::Open {
                device,
                source,
                context: error_context!("device", "open"),
            });
        }

        shared.init_channels();
        shared.init_configurables();
        shared.apply_open_overrides();

        shared.install_callback();
        shared.feed.lock().reset();
        shared.set_state(AcquisitionState::Running);

        let thread_name = format!(
            "{}-{}",
            shared.context.config().acquisition.thread_name_prefix,
            self.thread_label()
        );
        let body_shared = Arc::clone(shared);
        let spawned = AcquisitionThread::spawn(thread_name, move || {
            let start_timestamp = *body_shared.start_timestamp.read();
            run_session(
                body_shared.session.as_ref(),
                &body_shared.state,
                &handler,
                &body_shared.identity.short_name(),
                start_timestamp,
            );
            if let Some(error) = body_shared.take_deferred_error() {
                handler(error);
            }
            body_shared
                .events
                .publish(DeviceEvent::AcquisitionStateChanged {
                    state: AcquisitionState::Stopped,
                });
        });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                tracing::error!(device = %device, error = %e, "failed to spawn acquisition thread");
                shared.session.remove_datafeed_callbacks();
                shared.set_state(AcquisitionState::Stopped);
                if let Err(e) = shared.driver.close() {
                    tracing::warn!(device = %device, error = %e, "device close failed");
                }
                shared.session.remove_devices();
                return Err(e);
            }
        };

        lifecycle.thread = Some(thread);
        lifecycle.open = true;
        tracing::info!(
            device = %device,
            device_type = %shared.device_type,
            channels = shared.channels.read().len(),
            "device opened"
        );
        Ok(())
    }

    /// Stop the session, join the acquisition thread and release the
    /// hardware. Does nothing if the device is not open or already closing.
    ///
    /// May be called from the error handler; on the acquisition thread the
    /// join is skipped.
    pub fn close(&self) {
        let thread = {
            let mut lifecycle = self.lifecycle.lock();
            if !lifecycle.open {
                return;
            }
            lifecycle.open = false;
            lifecycle.thread.take()
        };
        let _transition = self.transition.lock();
        let shared = &self.shared;
        let device = shared.identity.name();

        if let Err(e) = shared.session.stop() {
            tracing::warn!(device = %device, error = %e, "session stop failed");
        }

        if let Some(thread) = thread {
            if thread.thread_id() == thread::current().id() {
                tracing::warn!(device = %device, "close called on the acquisition thread, not joining");
            } else if let Err(e) = thread.join(shared.context.config().acquisition.join_timeout()) {
                tracing::error!(device = %device, error = %e, "acquisition thread did not stop cleanly");
                shared.report_error(e);
            }
        }

        // Raised after the acquisition thread was gone
        if let Some(error) = shared.take_deferred_error() {
            shared.report_error(error);
        }

        shared.session.remove_datafeed_callbacks();
        shared.set_state(AcquisitionState::Stopped);

        // The driver may already have closed the device when the session stopped
        if let Err(e) = shared.driver.close() {
            tracing::debug!(device = %device, error = %e, "device close failed, ignored");
        }
        shared.session.remove_devices();

        tracing::info!(device = %device, "device closed");
    }

    /// Open, run `f`, then close on every exit path
    pub fn with_open<H, F, R>(&self, error_handler: H, f: F) -> CoreResult<R>
    where
        H: Fn(CoreError) + Send + Sync + 'static,
        F: FnOnce(&Device) -> R,
    {
        self.open(error_handler)?;
        let _guard = CloseGuard(self);
        Ok(f(self))
    }

    /// Resume ingesting analog packets
    pub fn start_acquisition(&self) -> CoreResult<()> {
        if !self.is_open() {
            return Err(CoreError::NotOpen(self.name()));
        }
        self.shared.set_state(AcquisitionState::Running);
        Ok(())
    }

    /// Drop analog packets until acquisition is started again. The session
    /// keeps running.
    pub fn pause_acquisition(&self) -> CoreResult<()> {
        self.shared
            .state
            .compare_exchange(AcquisitionState::Running, AcquisitionState::Paused)
            .map_err(|from| CoreError::InvalidTransition {
                from,
                to: AcquisitionState::Paused,
            })?;
        self.shared.events.publish(DeviceEvent::AcquisitionStateChanged {
            state: AcquisitionState::Paused,
        });
        Ok(())
    }

    pub fn acquisition_state(&self) -> AcquisitionState {
        self.shared.state.load()
    }

    pub fn is_open(&self) -> bool {
        self.lifecycle.lock().open
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.shared.identity
    }

    pub fn name(&self) -> String {
        self.shared.identity.name()
    }

    pub fn full_name(&self) -> String {
        self.shared.identity.full_name()
    }

    pub fn short_name(&self) -> String {
        self.shared.identity.short_name()
    }

    pub fn display_name(&self, multiple: bool) -> String {
        self.shared.identity.display_name(multiple)
    }

    /// Display name given the other known devices; `self` may be among them
    pub fn display_name_among(&self, devices: &[&Device]) -> String {
        let others = devices
            .iter()
            .filter(|other| !Arc::ptr_eq(&other.shared, &self.shared))
            .map(|other| other.identity());
        self.shared.identity.display_name_among(others)
    }

    pub fn device_type(&self) -> DeviceType {
        self.shared.device_type
    }

    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.shared.channels.read().channels()
    }

    pub fn channel(&self, name: &str) -> Option<Arc<Channel>> {
        self.shared.channels.read().get(name)
    }

    pub fn channels_by_group(&self) -> BTreeMap<String, Vec<Arc<Channel>>> {
        self.shared.channels.read().channels_by_group()
    }

    pub fn configurables(&self) -> BTreeMap<String, Arc<Configurable>> {
        self.shared.configurables.read().clone()
    }

    /// Configurable of a channel group, `""` for the device
    pub fn configurable(&self, name: &str) -> Option<Arc<Configurable>> {
        self.shared.configurables.read().get(name).cloned()
    }

    pub fn all_signals(&self) -> Vec<Arc<AnalogSignal>> {
        self.shared.channels.read().all_signals()
    }

    /// Last known sample rate in Hz, 0 if unknown
    pub fn samplerate(&self) -> u64 {
        self.shared.current_samplerate()
    }

    pub fn subscribe(&self) -> Receiver<DeviceEvent> {
        self.shared.events.subscribe()
    }

    pub fn set_packet_hooks(&self, hooks: Arc<dyn PacketHooks>) {
        *self.shared.hooks.write() = hooks;
    }

    pub fn acquisition_start_timestamp(&self) -> f64 {
        *self.shared.start_timestamp.read()
    }

    /// Move the relative-time baseline of every channel and signal
    pub fn set_acquisition_start_timestamp(&self, timestamp: f64) {
        *self.shared.start_timestamp.write() = timestamp;
        for channel in self.channels() {
            channel.set_start_timestamp(timestamp);
        }
        self.shared
            .events
            .publish(DeviceEvent::StartTimestampChanged { timestamp });
    }

    /// Block analog ingestion while the guard is alive, e.g. to read
    /// several signals consistently
    pub fn lock_data(&self) -> ReentrantMutexGuard<'_, ()> {
        self.shared.data_mutex.lock()
    }

    /// Dispatch a packet as if the session had delivered it
    pub fn data_feed_in(&self, packet: &Packet) {
        self.shared.data_feed_in(packet);
    }

    /// Add a virtual channel with a fixed quantity
    pub fn add_user_channel(
        &self,
        name: &str,
        group: &str,
        quantity: Quantity,
        quantity_flags: BTreeSet<QuantityFlag>,
        unit: Unit,
    ) -> CoreResult<Arc<Channel>> {
        let shared = &self.shared;
        let channel = {
            let mut registry = shared.channels.write();
            if registry.contains(name) {
                return Err(CoreError::ChannelExists(name.to_string()));
            }
            let parent: Weak<dyn ChannelParent> = Arc::downgrade(shared) as Weak<DeviceShared>;
            let channel = Arc::new(
                Channel::user(
                    name,
                    group,
                    quantity,
                    quantity_flags,
                    unit,
                    *shared.start_timestamp.read(),
                    shared.events.clone(),
                )
                .with_parent(parent),
            );
            registry.add(Arc::clone(&channel), group);
            channel
        };

        shared.events.publish(DeviceEvent::ChannelAdded {
            device: shared.identity.short_name(),
            channel: name.to_string(),
        });
        Ok(channel)
    }

    pub fn driver(&self) -> &Arc<dyn DriverDevice> {
        &self.shared.driver
    }

    pub fn session(&self) -> &Arc<dyn DriverSession> {
        &self.shared.session
    }

    fn thread_label(&self) -> String {
        let short_name = self.shared.identity.short_name();
        if short_name.is_empty() {
            self.shared.driver.driver_name().to_string()
        } else {
            short_name
        }
    }
}

struct CloseGuard<'a>(&'a Device);

impl Drop for CloseGuard<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.lifecycle.get_mut().open {
            tracing::warn!(device = %self.shared.identity.name(), "device dropped while open, closing");
            self.close();
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.shared.identity.full_name())
            .field("device_type", &self.shared.device_type)
            .field("state", &self.acquisition_state())
            .field("open", &self.is_open())
            .finish()
    }
}
