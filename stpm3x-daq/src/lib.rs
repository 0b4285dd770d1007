// STPM3x DAQ - Multiplexed metering acquisition layer
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # STPM3x DAQ - Multiplexed metering acquisition layer
//!
//! This crate turns the `stpm3x` register driver into a multi-channel
//! AC power monitor: four metering devices share one SPI bus through a
//! mux board, and a paced loop reads them all against one measurement
//! latch per tick.
//!
//! ## Overview
//!
//! A deployment is described by `chN_config.json` descriptor files.
//! Each file binds a channel to a mux slot (or marks it virtual) and
//! lists its sensors with their register, calibration scale and noise
//! gate. The registry builds live channels from the descriptors, the
//! acquisition loop reads them and publishes one snapshot per channel
//! per tick, and every channel keeps a bounded on-disk history that
//! survives restarts.
//!
//! ## Features
//!
//! - **Descriptor-driven wiring**: channels come from JSON files, not code
//! - **Slot multiplexing**: four STPM3x devices share one SPI bus
//! - **Synchronous latching**: one sync pulse stamps all channels per tick
//! - **Virtual channels**: phase imbalance derived from live channels
//! - **Bounded history**: persisted per-channel logs with strict caps
//!
//! ## Quick Start
//!
//! ```rust
//! use stpm3x::testing::FakeSpi;
//! use stpm3x_daq::testing::{FakeDelay, FakeIo, MemorySink};
//! use stpm3x_daq::{AcquisitionLoop, ChannelRegistry, LoopConfig, RegistryConfig, SensorBus};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Wiring descriptors live as chN_config.json files.
//! let dir = tempfile::tempdir()?;
//! std::fs::write(
//!     dir.path().join("ch0_config.json"),
//!     r#"{
//!         "_config": {"bus_type": "SPI", "bus_index": 0,
//!                     "device_type": "STPM3X", "device_index": 1},
//!         "sensors": [{
//!             "id": "voltage",
//!             "_config": {"type": "VAC", "units": "Vrms",
//!                         "register": "V1RMS", "scale": 0.035430}
//!         }]
//!     }"#,
//! )?;
//!
//! // A real deployment wires SPI and GPIO here; tests use the fakes.
//! let spi = FakeSpi::new();
//! let mut bus = SensorBus::new(spi.clone(), FakeIo::new(), FakeDelay::new());
//! bus.start();
//!
//! let defs = stpm3x_daq::discover(dir.path())?;
//! let config = RegistryConfig::new().with_data_dir(dir.path());
//! let registry = ChannelRegistry::setup(&defs, &mut bus, &config);
//!
//! let mut acq = AcquisitionLoop::new(bus, registry, MemorySink::new(), LoopConfig::new());
//! spi.queue_raw(6493);
//! acq.tick();
//!
//! let snapshot = &acq.sink().published()[0];
//! println!("{} = {:.1} V", snapshot.readings[0].id, snapshot.readings[0].latest.value);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Acquisition host                                         │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │  AcquisitionLoop (paced ticks)                      │  │
//! │  │        │                                            │  │
//! │  │        ▼                                            │  │
//! │  │  ChannelRegistry                                    │  │
//! │  │  ┌────────┐ ┌────────┐ ┌────────┐ ┌─────────────┐  │  │
//! │  │  │ ch0    │ │ ch1    │ │ ch2    │ │ ch8         │  │  │
//! │  │  │ slot 1 │ │ slot 2 │ │ slot 3 │ │ (virtual)   │  │  │
//! │  │  └───┬────┘ └───┬────┘ └───┬────┘ └─────────────┘  │  │
//! │  │      └──────────┼──────────┘                        │  │
//! │  │                 ▼                                   │  │
//! │  │  SensorBus ── BoardMux ──> 4x STPM3x on one SPI bus │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! │        snapshots ──> SnapshotSink (MQTT, files, ...)      │
//! └───────────────────────────────────────────────────────────┘
//! ```

mod acquisition;
mod bus;
mod channel;
mod datalog;
mod descriptor;
mod error;
mod io;
mod mux;
mod registry;
mod snapshot;

pub mod testing;

// Public API
pub use acquisition::{AcquisitionLoop, LoopConfig};
pub use bus::SensorBus;
pub use channel::{BusBinding, Channel, DerivedKind, Sample, Sensor, SensorRef, SensorSource};
pub use datalog::SampleLog;
pub use descriptor::{discover, BusConfig, ChannelDescriptor, SensorConfig, SensorDescriptor};
pub use error::{DaqError, Result};
pub use io::{DigitalIo, Level, Line, StdDelay};
pub use mux::{BoardMux, DEVICE_COUNT};
pub use registry::{ChannelRegistry, RegistryConfig};
pub use snapshot::{ChannelSnapshot, SensorReading, SnapshotSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
