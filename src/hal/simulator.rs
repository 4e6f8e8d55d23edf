// src/hal/simulator.rs
//! In-process driver: simulated devices, sessions and a waveform generator
//!
//! The simulator implements the full driver contract so the core can be
//! exercised without hardware. Packets reach the session either from a
//! [`PacketInjector`] (scripted tests) or from a [`WaveformGenerator`]
//! producing framed sine data at the device sample rate.

use std::collections::{BTreeSet, HashMap};
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::constants::simulator as defaults;
use crate::data::{Quantity, QuantityFlag, Unit};
use crate::hal::{
    AnalogPayload, ConfigCapabilities, ConfigKey, ConfigKeyInfo, ConfigTarget, ConfigValue,
    DatafeedCallback, DriverChannel, DriverChannelGroup, DriverContext, DriverDevice, DriverSession,
    HalError, HalResult, Packet,
};

/// Description of one simulated instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub driver_name: String,
    /// Capability keys used for device type detection
    pub driver_config_keys: Vec<ConfigKey>,
    pub vendor: String,
    pub model: String,
    pub version: String,
    pub serial_number: String,
    pub connection_id: String,
    pub channels: Vec<DriverChannel>,
    #[serde(default)]
    pub channel_groups: Vec<DriverChannelGroup>,
    #[serde(default)]
    pub device_config_keys: Vec<ConfigKeyInfo>,
    #[serde(default = "default_samplerate")]
    pub samplerate_hz: u64,
    /// Make `open` fail
    #[serde(default)]
    pub fail_open: bool,
}

fn default_samplerate() -> u64 {
    defaults::DEFAULT_SAMPLERATE_HZ
}

impl SimulatorConfig {
    /// Demo source with `channel_count` ungrouped analog channels `A0..`
    pub fn demo(channel_count: u32) -> Self {
        Self {
            driver_name: defaults::DRIVER_NAME.to_string(),
            driver_config_keys: vec![ConfigKey::DemoDevice],
            vendor: "Labmeter".to_string(),
            model: "Demo".to_string(),
            version: "1.0".to_string(),
            serial_number: String::new(),
            connection_id: String::new(),
            channels: (0..channel_count)
                .map(|i| DriverChannel::new(format!("A{i}"), i))
                .collect(),
            channel_groups: Vec::new(),
            device_config_keys: vec![
                ConfigKeyInfo::new(ConfigKey::Samplerate, ConfigCapabilities::ALL),
                ConfigKey::Continuous.into(),
                ConfigKey::LimitSamples.into(),
                ConfigKey::LimitMsec.into(),
            ],
            samplerate_hz: defaults::DEFAULT_SAMPLERATE_HZ,
            fail_open: false,
        }
    }

    /// Single-output power supply with a voltage, current and power channel
    /// in the group `"1"`
    pub fn power_supply() -> Self {
        let channels = vec![
            DriverChannel::new("V1", 0),
            DriverChannel::new("I1", 1),
            DriverChannel::new("P1", 2),
        ];
        Self {
            driver_name: "labps".to_string(),
            driver_config_keys: vec![ConfigKey::PowerSupply],
            vendor: "Acme".to_string(),
            model: "PS-3005".to_string(),
            version: "2.1".to_string(),
            serial_number: "PS300512345".to_string(),
            connection_id: "/dev/ttyUSB0".to_string(),
            channels: channels.clone(),
            channel_groups: vec![DriverChannelGroup {
                name: "1".to_string(),
                channels,
                config_keys: vec![
                    ConfigKey::Enabled.into(),
                    ConfigKey::VoltageTarget.into(),
                    ConfigKey::CurrentLimit.into(),
                    ConfigKeyInfo::new(ConfigKey::Regulation, ConfigCapabilities::READ_ONLY),
                    ConfigKey::OverVoltageProtectionEnabled.into(),
                ],
            }],
            device_config_keys: vec![ConfigKey::Continuous.into(), ConfigKey::LimitSamples.into()],
            samplerate_hz: 0,
            fail_open: false,
        }
    }
}

/// Simulated instrument; config values are kept per target
#[derive(Debug)]
pub struct SimulatedDevice {
    config: SimulatorConfig,
    open: AtomicBool,
    values: Mutex<HashMap<(ConfigTarget, ConfigKey), ConfigValue>>,
}

impl SimulatedDevice {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            open: AtomicBool::new(false),
            values: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Current device-level sample rate in Hz
    pub fn samplerate(&self) -> u64 {
        self.values
            .lock()
            .get(&(ConfigTarget::Device, ConfigKey::Samplerate))
            .and_then(ConfigValue::as_u64)
            .unwrap_or(self.config.samplerate_hz)
    }

    fn key_info(&self, target: &ConfigTarget, key: &ConfigKey) -> HalResult<ConfigKeyInfo> {
        self.config_keys(target)
            .into_iter()
            .find(|info| &info.key == key)
            .ok_or_else(|| HalError::UnsupportedKey(key.clone()))
    }

    fn default_value(&self, key: &ConfigKey) -> Option<ConfigValue> {
        let value = match key {
            ConfigKey::Samplerate => ConfigValue::UInt64(self.config.samplerate_hz),
            ConfigKey::Continuous | ConfigKey::Enabled => ConfigValue::Bool(true),
            ConfigKey::LimitSamples | ConfigKey::LimitMsec => ConfigValue::UInt64(0),
            ConfigKey::Regulation => ConfigValue::String("CV".to_string()),
            ConfigKey::VoltageTarget
            | ConfigKey::OverVoltageProtectionThreshold
            | ConfigKey::OverCurrentProtectionThreshold
            | ConfigKey::Offset => ConfigValue::Double(0.0),
            ConfigKey::CurrentLimit => ConfigValue::Double(1.0),
            ConfigKey::OverVoltageProtectionEnabled | ConfigKey::OverCurrentProtectionEnabled => {
                ConfigValue::Bool(false)
            }
            ConfigKey::MeasuredQuantity => ConfigValue::Quantity {
                quantity: Quantity::Voltage,
                flags: BTreeSet::from([QuantityFlag::Dc]),
            },
            ConfigKey::Range => ConfigValue::String("Auto".to_string()),
            ConfigKey::Amplitude => ConfigValue::Double(f64::from(defaults::DEFAULT_AMPLITUDE)),
            ConfigKey::OutputFrequency => {
                ConfigValue::Double(f64::from(defaults::DEFAULT_SIGNAL_FREQUENCY_HZ))
            }
            _ => return None,
        };
        Some(value)
    }
}

impl DriverDevice for SimulatedDevice {
    fn driver_name(&self) -> &str {
        &self.config.driver_name
    }

    fn driver_config_keys(&self) -> Vec<ConfigKey> {
        self.config.driver_config_keys.clone()
    }

    fn vendor(&self) -> &str {
        &self.config.vendor
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn version(&self) -> &str {
        &self.config.version
    }

    fn serial_number(&self) -> &str {
        &self.config.serial_number
    }

    fn connection_id(&self) -> &str {
        &self.config.connection_id
    }

    fn open(&self) -> HalResult<()> {
        if self.config.fail_open {
            return Err(HalError::OpenFailed(format!(
                "{} {} does not respond",
                self.config.vendor, self.config.model
            )));
        }
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&self) -> HalResult<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Err(HalError::Closed);
        }
        Ok(())
    }

    fn channels(&self) -> Vec<DriverChannel> {
        self.config.channels.clone()
    }

    fn channel_groups(&self) -> Vec<DriverChannelGroup> {
        let mut groups = self.config.channel_groups.clone();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    fn config_keys(&self, target: &ConfigTarget) -> Vec<ConfigKeyInfo> {
        match target {
            ConfigTarget::Device => self.config.device_config_keys.clone(),
            ConfigTarget::ChannelGroup(name) => self
                .config
                .channel_groups
                .iter()
                .find(|group| &group.name == name)
                .map(|group| group.config_keys.clone())
                .unwrap_or_default(),
        }
    }

    fn config_get(&self, target: &ConfigTarget, key: &ConfigKey) -> HalResult<ConfigValue> {
        let info = self.key_info(target, key)?;
        if !info.capabilities.get {
            return Err(HalError::UnsupportedKey(key.clone()));
        }
        let stored = self.values.lock().get(&(target.clone(), key.clone())).cloned();
        stored
            .or_else(|| self.default_value(key))
            .ok_or_else(|| HalError::UnsupportedKey(key.clone()))
    }

    fn config_set(&self, target: &ConfigTarget, key: &ConfigKey, value: ConfigValue) -> HalResult<()> {
        let info = self.key_info(target, key)?;
        if !info.capabilities.set {
            return Err(HalError::UnsupportedKey(key.clone()));
        }
        if *key == ConfigKey::Samplerate && value.as_u64().is_none() {
            return Err(HalError::InvalidValue {
                key: key.clone(),
                reason: "expected an unsigned integer".to_string(),
            });
        }
        self.values.lock().insert((target.clone(), key.clone()), value);
        Ok(())
    }
}

/// Failure switches of a [`SimulatedSession`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionBehaviour {
    /// Make `start` fail
    pub fail_start: bool,
    /// Make `run` fail once this many packets were delivered
    pub fail_run_after: Option<u64>,
}

/// Sender half for scripting packets into a running session
#[derive(Debug, Clone)]
pub struct PacketInjector {
    tx: Sender<Packet>,
}

impl PacketInjector {
    /// Queue a packet; it is delivered on the session thread
    pub fn send(&self, packet: Packet) -> HalResult<()> {
        self.tx
            .send(packet)
            .map_err(|_| HalError::Session("session dropped".to_string()))
    }
}

/// Sine generator emitting one frame per period
#[derive(Debug)]
pub struct WaveformGenerator {
    device: Arc<SimulatedDevice>,
    amplitude: f32,
    frequency_hz: f32,
    noise: f32,
    sample_index: u64,
}

impl WaveformGenerator {
    pub fn new(device: Arc<SimulatedDevice>) -> Self {
        Self {
            device,
            amplitude: defaults::DEFAULT_AMPLITUDE,
            frequency_hz: defaults::DEFAULT_SIGNAL_FREQUENCY_HZ,
            noise: defaults::DEFAULT_AMPLITUDE * 0.01,
            sample_index: 0,
        }
    }

    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise;
        self
    }

    /// Time between two frames at the current sample rate
    pub fn period(&self) -> Duration {
        let max = Duration::from_millis(defaults::MAX_GENERATOR_PERIOD_MS);
        match self.device.samplerate() {
            0 => max,
            rate => Duration::from_secs_f64(1.0 / rate as f64).min(max),
        }
    }

    /// Packets of the next frame: FrameBegin, Analog, FrameEnd
    pub fn next_frame(&mut self) -> Vec<Packet> {
        let rate = self.device.samplerate().max(1) as f64;
        let num_samples = ((self.period().as_secs_f64() * rate).round() as usize)
            .clamp(1, defaults::MAX_SAMPLES_PER_PACKET);
        let channels = self.device.channels();

        let mut rng = rand::thread_rng();
        let mut data = Vec::with_capacity(num_samples * channels.len());
        for _ in 0..num_samples {
            let t = self.sample_index as f64 / rate;
            for (c, _) in channels.iter().enumerate() {
                let phase = c as f32 * TAU / 4.0;
                let value = self.amplitude * (TAU * self.frequency_hz * t as f32 + phase).sin();
                let noise = if self.noise > 0.0 {
                    rng.gen_range(-self.noise..self.noise)
                } else {
                    0.0
                };
                data.push(value + noise);
            }
            self.sample_index += 1;
        }

        let payload = AnalogPayload::interleaved(
            channels,
            Quantity::Voltage,
            BTreeSet::from([QuantityFlag::Dc]),
            Unit::Volt,
            data,
        );
        vec![Packet::FrameBegin, Packet::Analog(payload), Packet::FrameEnd]
    }
}

/// Session delivering injected and generated packets on the thread that
/// calls `run`
pub struct SimulatedSession {
    devices: Mutex<Vec<Arc<dyn DriverDevice>>>,
    /// Each callback sits behind its own lock so dispatch can run them
    /// without holding the list
    callbacks: Mutex<Vec<Arc<Mutex<DatafeedCallback>>>>,
    packets_tx: Sender<Packet>,
    packets_rx: Receiver<Packet>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    stop_requested: AtomicBool,
    running: AtomicBool,
    delivered: AtomicU64,
    behaviour: SessionBehaviour,
    generator: Option<Mutex<WaveformGenerator>>,
}

impl SimulatedSession {
    pub fn new() -> Self {
        let (packets_tx, packets_rx) = channel::unbounded();
        let (stop_tx, stop_rx) = channel::bounded(1);
        Self {
            devices: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            packets_tx,
            packets_rx,
            stop_tx,
            stop_rx,
            stop_requested: AtomicBool::new(false),
            running: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            behaviour: SessionBehaviour::default(),
            generator: None,
        }
    }

    pub fn with_behaviour(mut self, behaviour: SessionBehaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    /// Generate framed sine data for `device` while running
    pub fn with_generator(mut self, device: Arc<SimulatedDevice>) -> Self {
        self.generator = Some(Mutex::new(WaveformGenerator::new(device)));
        self
    }

    pub fn injector(&self) -> PacketInjector {
        PacketInjector {
            tx: self.packets_tx.clone(),
        }
    }

    /// Packets handed to the callbacks so far
    pub fn packets_delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// Poll until at least `count` packets were delivered
    pub fn wait_for_delivered(&self, count: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.packets_delivered() < count {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }

    fn dispatch(&self, packet: &Packet) {
        // A callback may add or remove callbacks, e.g. by closing its device
        let callbacks = self.callbacks.lock().clone();
        for callback in &callbacks {
            let mut callback = callback.lock();
            (*callback)(packet);
        }
        self.delivered.fetch_add(1, Ordering::AcqRel);
    }

    fn generate(&self) {
        if let Some(generator) = &self.generator {
            let frame = generator.lock().next_frame();
            for packet in &frame {
                self.dispatch(packet);
            }
        }
    }

    fn receive_loop(&self) -> HalResult<()> {
        if self.generator.is_some() {
            self.dispatch(&Packet::Header);
        }

        while !self.stop_requested.load(Ordering::Acquire) {
            if let Some(limit) = self.behaviour.fail_run_after {
                if self.packets_delivered() >= limit {
                    return Err(HalError::Session("connection to device lost".to_string()));
                }
            }

            match &self.generator {
                Some(generator) => {
                    let period = generator.lock().period();
                    crossbeam::select! {
                        recv(self.stop_rx) -> _ => break,
                        recv(self.packets_rx) -> packet => {
                            if let Ok(packet) = packet {
                                self.dispatch(&packet);
                            }
                        }
                        default(period) => self.generate(),
                    }
                }
                None => crossbeam::select! {
                    recv(self.stop_rx) -> _ => break,
                    recv(self.packets_rx) -> packet => {
                        if let Ok(packet) = packet {
                            self.dispatch(&packet);
                        }
                    }
                },
            }
        }

        if self.generator.is_some() {
            self.dispatch(&Packet::End);
        }
        Ok(())
    }
}

/// Clears the running flag even if a callback panics
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for SimulatedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverSession for SimulatedSession {
    fn add_device(&self, device: Arc<dyn DriverDevice>) -> HalResult<()> {
        self.devices.lock().push(device);
        Ok(())
    }

    fn remove_devices(&self) {
        self.devices.lock().clear();
        // Ready for the next open
        self.stop_requested.store(false, Ordering::Release);
        while self.stop_rx.try_recv().is_ok() {}
    }

    fn add_datafeed_callback(&self, callback: DatafeedCallback) {
        self.callbacks.lock().push(Arc::new(Mutex::new(callback)));
    }

    fn remove_datafeed_callbacks(&self) {
        self.callbacks.lock().clear();
    }

    fn start(&self) -> HalResult<()> {
        if self.behaviour.fail_start {
            return Err(HalError::Session("device refused to start".to_string()));
        }
        if self.devices.lock().is_empty() {
            return Err(HalError::Session("no devices in session".to_string()));
        }
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn run(&self) -> HalResult<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(HalError::Session("session not started".to_string()));
        }
        let _running = RunningGuard(&self.running);
        self.receive_loop()
    }

    fn stop(&self) -> HalResult<()> {
        self.stop_requested.store(true, Ordering::Release);
        let _ = self.stop_tx.try_send(());
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Driver context over a fixed set of simulated devices
#[derive(Debug)]
pub struct SimulatedContext {
    devices: Vec<Arc<SimulatedDevice>>,
}

impl SimulatedContext {
    pub fn new(configs: Vec<SimulatorConfig>) -> Self {
        Self {
            devices: configs
                .into_iter()
                .map(|config| Arc::new(SimulatedDevice::new(config)))
                .collect(),
        }
    }

    pub fn devices(&self) -> &[Arc<SimulatedDevice>] {
        &self.devices
    }

    /// Session with a waveform generator bound to `device`
    pub fn generating_session(&self, device: &Arc<SimulatedDevice>) -> Arc<SimulatedSession> {
        Arc::new(SimulatedSession::new().with_generator(Arc::clone(device)))
    }
}

impl DriverContext for SimulatedContext {
    fn scan(&self) -> HalResult<Vec<Arc<dyn DriverDevice>>> {
        Ok(self
            .devices
            .iter()
            .map(|device| Arc::clone(device) as Arc<dyn DriverDevice>)
            .collect())
    }

    fn create_session(&self) -> Arc<dyn DriverSession> {
        Arc::new(SimulatedSession::new())
    }
}
