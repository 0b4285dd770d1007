// STPM3x DAQ - Integration Tests
//
// End-to-end coverage for the acquisition stack, from descriptor files
// on disk to published snapshots. The tests are organized into categories:
// 1. Descriptor discovery
// 2. Acquisition ticks
// 3. Channel error lifecycle
// 4. Persisted history

use std::fs;
use std::path::Path;
use std::time::Duration;

use approx::assert_relative_eq;
use stpm3x::testing::FakeSpi;
use stpm3x_daq::testing::{FakeDelay, FakeIo, MemorySink};
use stpm3x_daq::{
    discover, AcquisitionLoop, ChannelRegistry, Level, Line, LoopConfig, RegistryConfig, SensorBus,
};

type TestLoop = AcquisitionLoop<FakeSpi, FakeIo, FakeDelay, MemorySink>;

fn voltage_channel(device: u8, scale: f64) -> String {
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
                "scale": scale
            }
        }]
    })
    .to_string()
}

fn metering_channel(device: u8) -> String {
    serde_json::json!({
        "_config": {
            "bus_type": "SPI",
            "bus_index": 0,
            "device_type": "STPM3X",
            "device_index": device
        },
        "sensors": [
            {
                "id": "voltage",
                "_config": {
                    "type": "VAC",
                    "units": "Vrms",
                    "range": [0, 350],
                    "register": "V1RMS",
                    "scale": 0.1
                }
            },
            {
                "id": "current",
                "_config": {
                    "type": "CAC",
                    "units": "Arms",
                    "range": [0, 16],
                    "register": "C1RMS",
                    "scale": 0.01,
                    "threshold": 7
                }
            }
        ]
    })
    .to_string()
}

fn imbalance_channel(sources: &[&str]) -> String {
    serde_json::json!({
        "_config": {"bus_type": "VIRTUAL"},
        "sensors": [{
            "id": "imbalance",
            "_config": {
                "type": "PIB",
                "units": "%",
                "sources": sources
            }
        }]
    })
    .to_string()
}

/// Discover the descriptors in `dir` and stand up a full fake stack.
fn boot(dir: &Path, log_capacity: usize) -> (FakeSpi, FakeIo, TestLoop) {
    let spi = FakeSpi::new();
    let io = FakeIo::new();
    let mut bus = SensorBus::new(spi.clone(), io.clone(), FakeDelay::new());
    bus.start();

    let defs = discover(dir).unwrap();
    let config = RegistryConfig::new()
        .with_data_dir(dir)
        .with_log_capacity(log_capacity)
        .with_ring_points(8);
    let registry = ChannelRegistry::setup(&defs, &mut bus, &config);

    spi.clear();
    io.clear_journal();
    let acq = AcquisitionLoop::new(
        bus,
        registry,
        MemorySink::new(),
        LoopConfig::new().with_period(Duration::from_millis(1)),
    );
    (spi, io, acq)
}

// ============================================================================
// Descriptor discovery
// ============================================================================

#[test]
fn test_discovery_orders_channels_by_filename() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ch2_config.json"), voltage_channel(3, 1.0)).unwrap();
    fs::write(dir.path().join("ch0_config.json"), voltage_channel(1, 1.0)).unwrap();
    fs::write(dir.path().join("ch1_config.json"), voltage_channel(2, 1.0)).unwrap();
    fs::write(dir.path().join("notes.txt"), "site wiring notes").unwrap();

    let defs = discover(dir.path()).unwrap();
    let ids: Vec<&str> = defs.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["ch0", "ch1", "ch2"]);
}

#[test]
fn test_discovery_survives_a_broken_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ch0_config.json"), voltage_channel(1, 1.0)).unwrap();
    fs::write(dir.path().join("ch1_config.json"), "{ not json").unwrap();

    let defs = discover(dir.path()).unwrap();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].0, "ch0");
}

// ============================================================================
// Acquisition ticks
// ============================================================================

#[test]
fn test_tick_publishes_scaled_snapshots_per_channel() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ch0_config.json"), metering_channel(1)).unwrap();
    fs::write(dir.path().join("ch1_config.json"), voltage_channel(2, 1.0)).unwrap();
    let (spi, _, mut acq) = boot(dir.path(), 16);

    spi.queue_raw(2300);
    spi.queue_raw(550 << 15);
    spi.queue_raw(231);
    let tick_ms = acq.tick();

    let published = acq.sink().published();
    assert_eq!(published.len(), 2);

    let ch0 = &published[0];
    assert_eq!(ch0.id, "ch0");
    assert!(!ch0.error);
    assert_eq!(ch0.tick_ms, tick_ms);
    assert_eq!(ch0.readings[0].id, "voltage");
    assert_eq!(ch0.readings[0].units, "Vrms");
    assert_relative_eq!(ch0.readings[0].latest.value, 230.0);
    assert_relative_eq!(ch0.readings[1].latest.value, 5.5);

    let ch1 = &published[1];
    assert_eq!(ch1.id, "ch1");
    assert_eq!(ch1.tick_ms, tick_ms);
    assert_relative_eq!(ch1.readings[0].latest.value, 231.0);
}

#[test]
fn test_tick_latches_sync_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ch0_config.json"), voltage_channel(1, 1.0)).unwrap();
    let (spi, io, mut acq) = boot(dir.path(), 16);

    spi.queue_raw(230);
    acq.tick();

    let journal = io.journal();
    assert_eq!(journal[0], (Line::Sync, Level::Low));
    assert_eq!(journal[1], (Line::Sync, Level::High));
    // Slot routing only happens after the latch.
    assert!(journal[2..].iter().all(|(line, _)| *line != Line::Sync));
}

#[test]
fn test_tick_noise_gate_zeroes_idle_current() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ch0_config.json"), metering_channel(1)).unwrap();
    let (spi, _, mut acq) = boot(dir.path(), 16);

    spi.queue_raw(2300);
    spi.queue_raw(50 << 15);
    acq.tick();

    let published = acq.sink().published();
    assert_eq!(published[0].readings[1].latest.value, 0.0);
}

#[test]
fn test_tick_derives_phase_imbalance_from_same_latch() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ch0_config.json"), voltage_channel(1, 1.0)).unwrap();
    fs::write(dir.path().join("ch1_config.json"), voltage_channel(2, 1.0)).unwrap();
    fs::write(
        dir.path().join("ch8_config.json"),
        imbalance_channel(&["ch0.voltage", "ch1.voltage"]),
    )
    .unwrap();
    let (spi, _, mut acq) = boot(dir.path(), 16);

    spi.queue_raw(120);
    spi.queue_raw(118);
    let tick_ms = acq.tick();

    let published = acq.sink().published();
    assert_eq!(published.len(), 3);
    let pib = published.iter().find(|s| s.id == "ch8").unwrap();
    assert!(!pib.error);
    assert_eq!(pib.readings[0].id, "imbalance");
    assert_relative_eq!(pib.readings[0].latest.value, 100.840336, max_relative = 1e-6);
    assert_eq!(pib.readings[0].latest.timestamp_ms, tick_ms);
}

// ============================================================================
// Channel error lifecycle
// ============================================================================

#[test]
fn test_transport_fault_latches_until_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ch0_config.json"), voltage_channel(1, 1.0)).unwrap();

    {
        let (spi, _, mut acq) = boot(dir.path(), 16);
        spi.queue_raw(230);
        acq.tick();
        assert!(!acq.sink().published()[0].error);

        // The bus dies: one error snapshot, then silence.
        spi.set_failing(true);
        acq.tick();
        assert_eq!(acq.sink().published().len(), 2);
        assert!(acq.sink().published()[1].error);

        spi.set_failing(false);
        spi.queue_raw(230);
        acq.tick();
        assert_eq!(acq.sink().published().len(), 2);
        assert!(acq.registry().channel("ch0").unwrap().error());
    }

    // A rebuild starts clean and the on-disk history is still there.
    let (spi, _, mut acq) = boot(dir.path(), 16);
    assert_eq!(acq.registry().channel("ch0").unwrap().log().len(), 1);

    spi.queue_raw(232);
    acq.tick();
    let published = acq.sink().published();
    assert!(!published[0].error);
    assert_relative_eq!(published[0].readings[0].latest.value, 232.0);
    assert_eq!(acq.registry().channel("ch0").unwrap().log().len(), 2);
}

#[test]
fn test_virtual_outage_reports_but_never_latches() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ch0_config.json"), voltage_channel(1, 1.0)).unwrap();
    fs::write(
        dir.path().join("ch8_config.json"),
        imbalance_channel(&["ch0.voltage"]),
    )
    .unwrap();
    let (spi, _, mut acq) = boot(dir.path(), 16);

    spi.queue_raw(120);
    acq.tick();
    let published = acq.sink().published();
    assert_eq!(published.len(), 2);
    assert!(!published[1].error);

    // Source channel dies: the virtual channel reports the outage.
    spi.set_failing(true);
    acq.tick();
    let published = acq.sink().published();
    assert_eq!(published.len(), 4);
    let pib = published.iter().rev().find(|s| s.id == "ch8").unwrap();
    assert!(pib.error);

    // Physical channel is now excluded; the virtual one keeps reporting.
    spi.set_failing(false);
    acq.tick();
    let published = acq.sink().published();
    assert_eq!(published.len(), 5);
    assert_eq!(published[4].id, "ch8");
    assert!(published[4].error);
    assert!(!acq.registry().channel("ch8").unwrap().error());
}

// ============================================================================
// Persisted history
// ============================================================================

#[test]
fn test_history_is_bounded_and_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ch0_config.json"), voltage_channel(1, 1.0)).unwrap();

    {
        let (spi, _, mut acq) = boot(dir.path(), 3);
        for raw in [1, 2, 3, 4, 5] {
            spi.queue_raw(raw);
            acq.tick();
        }
        let channel = acq.registry().channel("ch0").unwrap();
        assert_eq!(channel.log().len(), 3);
        assert_eq!(channel.log().peek().unwrap()[0].value, 3.0);
    }

    let (_, _, acq) = boot(dir.path(), 3);
    let channel = acq.registry().channel("ch0").unwrap();
    assert_eq!(channel.log().len(), 3);
    assert_eq!(channel.log().peek().unwrap()[0].value, 3.0);
}

#[test]
fn test_snapshot_oldest_spans_the_retained_window() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ch0_config.json"), voltage_channel(1, 1.0)).unwrap();
    let (spi, _, mut acq) = boot(dir.path(), 2);

    for raw in [10, 20, 30] {
        spi.queue_raw(raw);
        acq.tick();
    }

    let last = acq.sink().published().last().unwrap();
    assert_eq!(last.readings[0].latest.value, 30.0);
    assert_eq!(last.readings[0].oldest.value, 20.0);
}
