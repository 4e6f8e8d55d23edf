// demos/demo_session.rs
//! Acquire from a simulated demo device and print what arrived

use labmeter_core::config::ConfigLoader;
use labmeter_core::hal::simulator::{SimulatedContext, SimulatorConfig};
use labmeter_core::{init_tracing, Device, DeviceEvent, SessionContext};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Labmeter Core Demo Session");
    println!("==========================");

    // Defaults, then labmeter.toml if present, then LABMETER__* variables
    let config = ConfigLoader::new().load()?;
    init_tracing(&config.logging)?;
    println!("Configuration loaded");
    println!("  - Join timeout: {} ms", config.acquisition.join_timeout_ms);
    println!("  - Strict channel registry: {}", config.devices.strict_channel_registry);

    let driver = SimulatedContext::new(vec![SimulatorConfig::demo(2)]);
    let hw = Arc::clone(&driver.devices()[0]);
    let session = driver.generating_session(&hw);

    let device = Device::new(hw, session, SessionContext::new(config))?;
    let events = device.subscribe();
    println!("\nDevice: {} ({})", device.full_name(), device.device_type());

    device.with_open(
        |e| eprintln!("acquisition failed: {e}"),
        |device| {
            println!("Sample rate: {} Hz", device.samplerate());
            for channel in device.channels() {
                println!("Channel {} in groups {:?}", channel.name(), channel.group_names());
            }

            std::thread::sleep(Duration::from_secs(1));

            let _data = device.lock_data();
            println!("\nSignals after 1 s:");
            for signal in device.all_signals() {
                let last = signal.last_sample().map(|s| s.value).unwrap_or_default();
                println!(
                    "  {:<12} {:>4} samples, last {:.3}",
                    signal.display_name(),
                    signal.sample_count(),
                    last
                );
            }
        },
    )?;

    println!("\nEvents:");
    for event in events.try_iter() {
        match event {
            DeviceEvent::SignalAdded { channel, signal } => {
                println!("  signal added on {}: {}", channel, signal.display_name())
            }
            other => println!("  {}", other.kind()),
        }
    }

    println!("\nDevice closed, state {:?}", device.acquisition_state());
    Ok(())
}
