use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use labmeter_core::data::InterleavedSamples;
use labmeter_core::hal::simulator::{SimulatedDevice, SimulatedSession, SimulatorConfig};
use labmeter_core::hal::{AnalogPayload, DriverChannel, Packet};
use labmeter_core::{AnalogSignal, Device, Quantity, QuantityFlag, SessionContext, Unit};
use std::collections::BTreeSet;
use std::sync::Arc;

const CHANNEL_COUNTS: &[u32] = &[1, 4, 16];
const SAMPLES_PER_PACKET: &[usize] = &[1, 64, 1024];

fn open_demo_device(channel_count: u32) -> Device {
    let hw = Arc::new(SimulatedDevice::new(SimulatorConfig::demo(channel_count)));
    let device = Device::new(hw, Arc::new(SimulatedSession::new()), SessionContext::default())
        .expect("demo device");
    device.open(|e| eprintln!("acquisition error: {e}")).expect("open demo device");
    device
}

fn voltage_packet(channel_count: u32, num_samples: usize) -> Packet {
    let channels = (0..channel_count)
        .map(|i| DriverChannel::new(format!("A{i}"), i))
        .collect();
    let data = (0..num_samples * channel_count as usize)
        .map(|i| (i % 100) as f32 * 0.01)
        .collect();
    Packet::Analog(AnalogPayload::interleaved(
        channels,
        Quantity::Voltage,
        BTreeSet::from([QuantityFlag::Dc]),
        Unit::Volt,
        data,
    ))
}

fn benchmark_analog_demux(c: &mut Criterion) {
    let mut group = c.benchmark_group("analog_demux");

    for &channel_count in CHANNEL_COUNTS {
        for &num_samples in SAMPLES_PER_PACKET {
            group.throughput(Throughput::Elements((channel_count as usize * num_samples) as u64));
            group.bench_with_input(
                BenchmarkId::new("data_feed_in", format!("{}ch_{}samples", channel_count, num_samples)),
                &(channel_count, num_samples),
                |b, &(channels, samples)| {
                    let device = open_demo_device(channels);
                    let packet = voltage_packet(channels, samples);

                    b.iter(|| device.data_feed_in(black_box(&packet)));

                    // Keep signal storage bounded between runs
                    for signal in device.all_signals() {
                        signal.clear();
                    }
                    device.close();
                },
            );
        }
    }

    group.finish();
}

fn benchmark_framed_packets(c: &mut Criterion) {
    let device = open_demo_device(4);
    let packet = voltage_packet(4, 16);

    c.bench_function("framed_analog_packet", |b| {
        b.iter(|| {
            device.data_feed_in(&Packet::FrameBegin);
            device.data_feed_in(black_box(&packet));
            device.data_feed_in(&Packet::FrameEnd);
        });
    });

    device.close();
}

fn benchmark_signal_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal_push");

    for &stride in &[1usize, 4, 16] {
        let data = vec![1.5f32; 1024 * stride];
        group.throughput(Throughput::Elements(1024));
        group.bench_with_input(BenchmarkId::new("push_interleaved", stride), &stride, |b, &stride| {
            let signal = AnalogSignal::new("CH1", Quantity::Voltage, BTreeSet::new(), Unit::Volt, 0.0);
            b.iter(|| {
                let view = InterleavedSamples::new(&data, 0, stride, 1024);
                let _ = signal.push_interleaved(black_box(&view), 0.0, 1000, 3);
                signal.clear();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_analog_demux,
    benchmark_framed_packets,
    benchmark_signal_push
);
criterion_main!(benches);
