// STPM3x DAQ - Simulated Acquisition Example
//
// This example stands up the whole acquisition stack against the fake
// bus: descriptor files in a temporary directory, two mains phases on
// mux slots 1 and 2, a virtual imbalance channel, and five paced ticks
// published to stdout as JSON lines.
//
// Run with: cargo run --example simulated_acquisition

use std::time::Duration;

use stpm3x::testing::FakeSpi;
use stpm3x_daq::testing::{FakeDelay, FakeIo};
use stpm3x_daq::{
    discover, AcquisitionLoop, ChannelRegistry, ChannelSnapshot, LoopConfig, RegistryConfig,
    SensorBus, SnapshotSink,
};

/// Prints each snapshot as one JSON line.
struct StdoutSink;

impl SnapshotSink for StdoutSink {
    type Error = serde_json::Error;

    fn publish(&mut self, snapshot: &ChannelSnapshot) -> Result<(), Self::Error> {
        println!("{}", serde_json::to_string(snapshot)?);
        Ok(())
    }
}

fn phase_descriptor(device: u8) -> String {
    serde_json::json!({
        "_config": {
            "bus_type": "SPI",
            "bus_index": 0,
            "device_type": "STPM3X",
            "device_index": device
        },
        "sensors": [{
            "id": "voltage",
            "_config": {
                "type": "VAC",
                "units": "Vrms",
                "range": [0, 350],
                "register": "V1RMS",
                "scale": 0.035430
            }
        }]
    })
    .to_string()
}

fn imbalance_descriptor() -> String {
    serde_json::json!({
        "_config": {"bus_type": "VIRTUAL"},
        "sensors": [{
            "id": "imbalance",
            "_config": {
                "type": "PIB",
                "units": "%",
                "sources": ["ch0.voltage", "ch1.voltage"]
            }
        }]
    })
    .to_string()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("=== STPM3x DAQ Simulated Acquisition ===\n");

    // Descriptor files normally live in a site config directory.
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("ch0_config.json"), phase_descriptor(1))?;
    std::fs::write(dir.path().join("ch1_config.json"), phase_descriptor(2))?;
    std::fs::write(dir.path().join("ch8_config.json"), imbalance_descriptor())?;

    // A deployment wires real SPI and GPIO here.
    let spi = FakeSpi::new();
    let mut bus = SensorBus::new(spi.clone(), FakeIo::new(), FakeDelay::new());
    bus.start();

    let defs = discover(dir.path())?;
    println!("Discovered {} channel descriptors", defs.len());

    let config = RegistryConfig::new()
        .with_data_dir(dir.path())
        .with_log_capacity(60)
        .with_ring_points(10);
    let registry = ChannelRegistry::setup(&defs, &mut bus, &config);
    let ids: Vec<&str> = registry.channels().map(|c| c.id()).collect();
    println!("Registry holds {ids:?}\n");

    spi.clear();
    let mut acq = AcquisitionLoop::new(
        bus,
        registry,
        StdoutSink,
        LoopConfig::new().with_period(Duration::from_millis(100)),
    );

    println!("--- Five paced ticks ---");
    let mut ticks = 0u32;
    acq.run(|| {
        if ticks == 5 {
            return false;
        }
        // Two mains phases drifting apart a little each tick.
        spi.queue_raw(6490 + ticks * 6);
        spi.queue_raw(6460 - ticks * 8);
        ticks += 1;
        true
    });

    println!("\n--- After five ticks ---");
    for channel in acq.registry().channels() {
        let sensor = &channel.sensors()[0];
        println!(
            "{}.{}: {} points in memory, {} records on disk",
            channel.id(),
            sensor.id(),
            sensor.len(),
            channel.log().len()
        );
    }

    if let Some(sample) = acq
        .registry()
        .channel("ch8")
        .and_then(|c| c.sensors()[0].latest())
    {
        println!("\nLatest phase imbalance: {:.2} %", sample.value);
    }

    println!("\n=== Example complete ===");
    Ok(())
}
