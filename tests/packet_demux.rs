// tests/packet_demux.rs
//! Integration tests for packet demultiplexing

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver};
use proptest::prelude::*;

use labmeter_core::devices::{NoopHooks, PacketHooks};
use labmeter_core::hal::simulator::{SimulatedDevice, SimulatedSession, SimulatorConfig};
use labmeter_core::hal::{
    AnalogData, AnalogPayload, ConfigKey, ConfigKeyInfo, ConfigCapabilities, ConfigValue, DriverChannel,
    LogicPayload, MetaPayload, Packet,
};
use labmeter_core::utils::MockTimeProvider;
use labmeter_core::{AcquisitionState, CoreConfig, CoreError, Device, Quantity, QuantityFlag, SessionContext, Unit};

struct Bench {
    device: Device,
    hw: Arc<SimulatedDevice>,
    clock: Arc<MockTimeProvider>,
    errors: Receiver<CoreError>,
}

/// Open device fed directly from the test thread with a mock clock at t=100 s
fn open_bench(config: SimulatorConfig, core: CoreConfig) -> Bench {
    let clock = Arc::new(MockTimeProvider::from_secs(100.0));
    let context = SessionContext::with_clock(core, clock.clone());
    let hw = Arc::new(SimulatedDevice::new(config));
    let device = Device::new(hw.clone(), Arc::new(SimulatedSession::new()), context).unwrap();

    let (tx, errors) = channel::unbounded();
    device
        .open(move |e: CoreError| {
            let _ = tx.send(e);
        })
        .unwrap();
    Bench {
        device,
        hw,
        clock,
        errors,
    }
}

fn relaxed() -> CoreConfig {
    let mut core = CoreConfig::default();
    core.devices.strict_channel_registry = false;
    core
}

fn analog(names: &[&str], quantity: Quantity, unit: Unit, data: Vec<f32>) -> Packet {
    let channels = names
        .iter()
        .enumerate()
        .map(|(i, n)| DriverChannel::new(*n, i as u32))
        .collect();
    Packet::Analog(AnalogPayload::interleaved(channels, quantity, BTreeSet::new(), unit, data))
}

fn volts(names: &[&str], data: Vec<f32>) -> Packet {
    analog(names, Quantity::Voltage, Unit::Volt, data)
}

fn sample_count(device: &Device, channel: &str) -> usize {
    device
        .channel(channel)
        .and_then(|c| c.actual_signal())
        .map_or(0, |s| s.sample_count())
}

#[test]
fn test_ingestion_is_state_gated() {
    let bench = open_bench(SimulatorConfig::demo(2), CoreConfig::default());
    let device = &bench.device;
    let packet = volts(&["A0", "A1"], vec![0.0; 10]);

    device.pause_acquisition().unwrap();
    device.data_feed_in(&packet);
    assert_eq!(sample_count(device, "A0"), 0);
    assert!(device.all_signals().is_empty());

    device.start_acquisition().unwrap();
    device.data_feed_in(&packet);
    assert_eq!(sample_count(device, "A0"), 5);
    assert_eq!(sample_count(device, "A1"), 5);

    device.close();
    device.data_feed_in(&packet);
    assert_eq!(sample_count(device, "A0"), 5);
}

#[test]
fn test_channels_absent_from_payload_are_untouched() {
    let bench = open_bench(SimulatorConfig::demo(3), CoreConfig::default());
    bench.device.data_feed_in(&volts(&["A2"], vec![1.0, 2.0]));

    assert_eq!(sample_count(&bench.device, "A0"), 0);
    assert_eq!(sample_count(&bench.device, "A2"), 2);
}

#[test]
fn test_frame_shares_one_timestamp() {
    let bench = open_bench(SimulatorConfig::demo(2), CoreConfig::default());
    let device = &bench.device;
    let rate = device.samplerate() as f64;
    assert_eq!(rate, 5.0);

    device.data_feed_in(&Packet::FrameBegin);
    bench.clock.advance_secs(1.0);
    device.data_feed_in(&volts(&["A0", "A1"], vec![1.0, 2.0, 3.0, 4.0]));
    bench.clock.advance_secs(1.0);
    device.data_feed_in(&volts(&["A1"], vec![5.0, 6.0]));
    device.data_feed_in(&Packet::FrameEnd);

    bench.clock.advance_secs(1.0);
    device.data_feed_in(&volts(&["A0"], vec![7.0]));

    let a0 = device.channel("A0").unwrap().actual_signal().unwrap();
    let a1 = device.channel("A1").unwrap().actual_signal().unwrap();
    let a0_times: Vec<f64> = a0.samples().iter().map(|s| s.timestamp).collect();
    let a1_times: Vec<f64> = a1.samples().iter().map(|s| s.timestamp).collect();

    assert_eq!(a0_times, vec![100.0, 100.0 + 1.0 / rate, 103.0]);
    assert_eq!(
        a1_times,
        vec![100.0, 100.0 + 1.0 / rate, 100.0, 100.0 + 1.0 / rate]
    );
    assert_eq!(a0.relative_timestamp(2), Some(3.0));
}

#[test]
fn test_unframed_packets_use_receipt_time() {
    let bench = open_bench(SimulatorConfig::demo(1), CoreConfig::default());
    let device = &bench.device;

    let mut last = f64::MIN;
    for _ in 0..5 {
        bench.clock.advance_secs(0.5);
        device.data_feed_in(&volts(&["A0"], vec![1.0]));
        let ts = device.channel("A0").unwrap().actual_signal().unwrap().last_sample().unwrap().timestamp;
        assert!(ts >= last);
        last = ts;
    }
    assert_eq!(last, 102.5);
}

#[test]
fn test_end_closes_an_open_frame() {
    let bench = open_bench(SimulatorConfig::demo(1), CoreConfig::default());
    let device = &bench.device;

    device.data_feed_in(&Packet::FrameBegin);
    device.data_feed_in(&Packet::End);
    bench.clock.advance_secs(2.0);
    device.data_feed_in(&volts(&["A0"], vec![1.0]));

    let signal = device.channel("A0").unwrap().actual_signal().unwrap();
    assert_eq!(signal.get_sample(0).unwrap().timestamp, 102.0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_interleave_is_strided(
        channel_count in 1usize..5,
        values in prop::collection::vec(-1000.0f32..1000.0, 1..60),
    ) {
        let num_samples = values.len() / channel_count;
        prop_assume!(num_samples > 0);
        let data = values[..num_samples * channel_count].to_vec();

        let bench = open_bench(SimulatorConfig::demo(channel_count as u32), CoreConfig::default());
        let names: Vec<String> = (0..channel_count).map(|i| format!("A{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        bench.device.data_feed_in(&volts(&refs, data.clone()));

        for (offset, name) in names.iter().enumerate() {
            let signal = bench.device.channel(name).unwrap().actual_signal().unwrap();
            prop_assert_eq!(signal.sample_count(), num_samples);
            for k in 0..num_samples {
                let expected = f64::from(data[offset + k * channel_count]);
                prop_assert_eq!(signal.get_sample(k).unwrap().value, expected);
            }
        }
        bench.device.close();
    }
}

#[test]
fn test_meta_updates_device_sample_rate() {
    let bench = open_bench(SimulatorConfig::demo(1), CoreConfig::default());
    let device = &bench.device;
    assert_eq!(device.samplerate(), 5);

    device.data_feed_in(&Packet::Meta(MetaPayload {
        config: vec![(ConfigKey::Samplerate, ConfigValue::UInt64(20))],
    }));
    assert_eq!(device.samplerate(), 20);

    device.data_feed_in(&volts(&["A0"], vec![1.0, 2.0]));
    let signal = device.channel("A0").unwrap().actual_signal().unwrap();
    assert_eq!(signal.get_sample(1).unwrap().timestamp, 100.0 + 1.0 / 20.0);
}

#[test]
fn test_meta_goes_to_first_channel_group() {
    let mut config = SimulatorConfig::power_supply();
    let mut second = config.channel_groups[0].clone();
    second.name = "2".to_string();
    second.channels = vec![DriverChannel::new("V2", 3)];
    config.channels.push(DriverChannel::new("V2", 3));
    config.channel_groups.push(second);
    config
        .device_config_keys
        .push(ConfigKeyInfo::new(ConfigKey::Samplerate, ConfigCapabilities::ALL));

    let bench = open_bench(config, CoreConfig::default());
    let configurables = bench.device.configurables();
    assert_eq!(configurables.keys().collect::<Vec<_>>(), vec!["", "1", "2"]);

    bench.device.data_feed_in(&Packet::Meta(MetaPayload {
        config: vec![(ConfigKey::VoltageTarget, ConfigValue::Double(12.5))],
    }));

    let value = |group: &str| {
        configurables[group]
            .property(&ConfigKey::VoltageTarget)
            .and_then(|p| p.double_value())
    };
    assert_eq!(value("1"), Some(12.5));
    assert_eq!(value("2"), Some(0.0));
}

#[test]
fn test_unknown_channel_drops_whole_packet() {
    let bench = open_bench(SimulatorConfig::demo(1), relaxed());
    bench.device.data_feed_in(&volts(&["A0", "ghost"], vec![1.0, 2.0]));

    assert_eq!(sample_count(&bench.device, "A0"), 0);
    assert!(bench.device.channel("ghost").is_none());
}

#[test]
#[should_panic(expected = "unregistered channel ghost")]
fn test_unknown_channel_panics_in_strict_mode() {
    let mut core = CoreConfig::default();
    core.devices.strict_channel_registry = true;
    let bench = open_bench(SimulatorConfig::demo(1), core);
    bench.device.data_feed_in(&volts(&["ghost"], vec![1.0]));
}

/// Consistent payload of 8 values, over the 4-value decode budget
fn over_budget() -> Packet {
    volts(&["A0", "A1"], vec![0.5; 8])
}

fn budgeted(limit: u32) -> CoreConfig {
    let mut core = CoreConfig::default();
    core.acquisition.max_consecutive_alloc_failures = limit;
    core.acquisition.max_packet_values = 4;
    core
}

/// Claims far more samples than it carries
fn truncated() -> Packet {
    Packet::Analog(AnalogPayload {
        channels: vec![DriverChannel::new("A0", 0), DriverChannel::new("A1", 1)],
        num_samples: usize::MAX / 4,
        quantity: Quantity::Voltage,
        quantity_flags: BTreeSet::new(),
        unit: Unit::Volt,
        digits: 3,
        data: AnalogData::Float(Vec::new()),
    })
}

#[test]
fn test_repeated_allocation_failures_stop_acquisition() {
    let bench = open_bench(SimulatorConfig::demo(2), budgeted(3));
    let device = &bench.device;

    device.data_feed_in(&over_budget());
    device.data_feed_in(&over_budget());
    assert!(bench.errors.try_recv().is_err());

    device.data_feed_in(&over_budget());
    // Reported by the acquisition thread once the session has stopped
    assert!(matches!(
        bench.errors.recv_timeout(Duration::from_secs(5)),
        Ok(CoreError::AllocationLimit { failures: 3 })
    ));
    assert_eq!(device.acquisition_state(), AcquisitionState::Stopped);
    assert!(device.all_signals().is_empty());

    device.close();
    assert!(bench.errors.try_recv().is_err());
}

#[test]
fn test_successful_packet_resets_allocation_failures() {
    let bench = open_bench(SimulatorConfig::demo(2), budgeted(3));
    let device = &bench.device;

    device.data_feed_in(&over_budget());
    device.data_feed_in(&over_budget());
    device.data_feed_in(&volts(&["A0", "A1"], vec![1.0, 2.0]));
    device.data_feed_in(&over_budget());
    device.data_feed_in(&over_budget());

    assert!(bench.errors.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(device.acquisition_state(), AcquisitionState::Running);
    assert_eq!(sample_count(device, "A0"), 1);
}

#[test]
fn test_truncated_payloads_never_count_as_allocation_failures() {
    let bench = open_bench(SimulatorConfig::demo(2), budgeted(3));
    let device = &bench.device;

    for _ in 0..10 {
        device.data_feed_in(&truncated());
    }

    assert!(bench.errors.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(device.acquisition_state(), AcquisitionState::Running);
    assert!(device.all_signals().is_empty());

    device.data_feed_in(&volts(&["A0", "A1"], vec![1.0, 2.0]));
    assert_eq!(sample_count(device, "A0"), 1);
}

#[test]
fn test_malformed_payload_is_dropped() {
    let bench = open_bench(SimulatorConfig::demo(2), CoreConfig::default());
    let mut payload = AnalogPayload::interleaved(
        vec![DriverChannel::new("A0", 0), DriverChannel::new("A1", 1)],
        Quantity::Voltage,
        BTreeSet::new(),
        Unit::Volt,
        vec![1.0, 2.0, 3.0, 4.0],
    );
    payload.num_samples = 5;

    bench.device.data_feed_in(&Packet::Analog(payload));
    assert!(bench.device.all_signals().is_empty());
    assert!(bench.errors.try_recv().is_err());
}

#[test]
fn test_logic_and_unknown_packets_are_ignored() {
    let bench = open_bench(SimulatorConfig::demo(1), CoreConfig::default());
    bench.device.data_feed_in(&Packet::Logic(LogicPayload {
        unit_size: 1,
        data: vec![0xff; 16],
    }));
    bench.device.data_feed_in(&Packet::Unknown(0x4242));
    bench.device.data_feed_in(&Packet::Trigger);

    assert!(bench.device.all_signals().is_empty());
}

#[derive(Default)]
struct CountingHooks {
    headers: AtomicUsize,
    triggers: AtomicUsize,
}

impl PacketHooks for CountingHooks {
    fn on_header(&self, _device: &str) {
        self.headers.fetch_add(1, Ordering::SeqCst);
    }

    fn on_trigger(&self, _device: &str) {
        self.triggers.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_header_and_trigger_hooks() {
    let bench = open_bench(SimulatorConfig::demo(1), CoreConfig::default());
    let hooks = Arc::new(CountingHooks::default());
    bench.device.set_packet_hooks(hooks.clone());

    bench.device.data_feed_in(&Packet::Header);
    bench.device.data_feed_in(&Packet::Trigger);
    bench.device.data_feed_in(&Packet::Trigger);

    assert_eq!(hooks.headers.load(Ordering::SeqCst), 1);
    assert_eq!(hooks.triggers.load(Ordering::SeqCst), 2);
}

/// Swaps itself out for no-op hooks on the first header
struct OneShotHooks {
    device: Weak<Device>,
    headers: AtomicUsize,
}

impl PacketHooks for OneShotHooks {
    fn on_header(&self, _device: &str) {
        self.headers.fetch_add(1, Ordering::SeqCst);
        if let Some(device) = self.device.upgrade() {
            device.set_packet_hooks(Arc::new(NoopHooks));
        }
    }
}

#[test]
fn test_hook_may_replace_itself() {
    let device = Arc::new(open_bench(SimulatorConfig::demo(1), CoreConfig::default()).device);
    let hooks = Arc::new(OneShotHooks {
        device: Arc::downgrade(&device),
        headers: AtomicUsize::new(0),
    });
    device.set_packet_hooks(hooks.clone());

    let (done_tx, done_rx) = channel::bounded(1);
    let feeder = Arc::clone(&device);
    thread::spawn(move || {
        feeder.data_feed_in(&Packet::Header);
        feeder.data_feed_in(&Packet::Header);
        let _ = done_tx.send(());
    });

    assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok(), "hook dispatch did not return");
    assert_eq!(hooks.headers.load(Ordering::SeqCst), 1);
}

#[test]
fn test_reconfigurable_channel_switches_signal() {
    let bench = open_bench(SimulatorConfig::demo(1), CoreConfig::default());
    let device = &bench.device;

    device.data_feed_in(&volts(&["A0"], vec![1.0, 2.0]));
    device.data_feed_in(&analog(&["A0"], Quantity::Current, Unit::Ampere, vec![0.1]));
    device.data_feed_in(&volts(&["A0"], vec![3.0]));

    let channel = device.channel("A0").unwrap();
    assert_eq!(channel.signal_map().len(), 2);
    let actual = channel.actual_signal().unwrap();
    assert_eq!(actual.quantity(), Quantity::Voltage);
    assert_eq!(actual.sample_count(), 3);
    assert_eq!(device.all_signals().len(), 2);
}

#[test]
fn test_fixed_channel_keeps_first_signal() {
    let bench = open_bench(SimulatorConfig::power_supply(), CoreConfig::default());
    let device = &bench.device;

    device.data_feed_in(&volts(&["V1"], vec![5.0]));
    device.data_feed_in(&analog(&["V1"], Quantity::Current, Unit::Ampere, vec![0.2]));

    let channel = device.channel("V1").unwrap();
    assert_eq!(channel.signal_map().len(), 1);
    assert_eq!(channel.actual_signal().unwrap().sample_count(), 2);
}

#[test]
fn test_flags_are_part_of_the_signal_key() {
    let bench = open_bench(SimulatorConfig::demo(1), CoreConfig::default());
    let mut payload = AnalogPayload::interleaved(
        vec![DriverChannel::new("A0", 0)],
        Quantity::Voltage,
        BTreeSet::from([QuantityFlag::Ac, QuantityFlag::Rms]),
        Unit::Volt,
        vec![230.0],
    );
    bench.device.data_feed_in(&Packet::Analog(payload.clone()));
    payload.quantity_flags = BTreeSet::from([QuantityFlag::Dc]);
    bench.device.data_feed_in(&Packet::Analog(payload));

    let channel = bench.device.channel("A0").unwrap();
    assert_eq!(channel.signal_map().len(), 2);
    assert_eq!(channel.actual_signal().unwrap().display_name(), "A0 [V DC]");
}

#[test]
fn test_data_lock_is_reentrant() {
    let bench = open_bench(SimulatorConfig::demo(1), CoreConfig::default());
    let _guard = bench.device.lock_data();
    bench.device.data_feed_in(&volts(&["A0"], vec![1.0]));
    assert_eq!(sample_count(&bench.device, "A0"), 1);
    assert!(bench.hw.is_open());
}
