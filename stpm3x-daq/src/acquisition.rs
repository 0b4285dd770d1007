// STPM3x DAQ - Multiplexed metering acquisition layer
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! The paced acquisition loop.
//!
//! Each tick latches a simultaneous measurement on every device, runs
//! the registry's update pass and publishes the resulting snapshots.
//! Publishing is best effort: a failing sink is logged per snapshot and
//! never slows acquisition down.

use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use log::warn;

use crate::bus::SensorBus;
use crate::io::DigitalIo;
use crate::registry::ChannelRegistry;
use crate::snapshot::SnapshotSink;

/// Loop pacing parameters.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Target interval between measurement latches.
    pub period: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
        }
    }
}

impl LoopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }
}

/// Owns the bus, the registry and the sink for the lifetime of a run.
pub struct AcquisitionLoop<SPI, IO, D, S> {
    bus: SensorBus<SPI, IO, D>,
    registry: ChannelRegistry,
    sink: S,
    config: LoopConfig,
}

impl<SPI, IO, D, S> AcquisitionLoop<SPI, IO, D, S>
where
    SPI: SpiDevice,
    IO: DigitalIo,
    D: DelayNs,
    S: SnapshotSink,
{
    pub fn new(
        bus: SensorBus<SPI, IO, D>,
        registry: ChannelRegistry,
        sink: S,
        config: LoopConfig,
    ) -> Self {
        Self {
            bus,
            registry,
            sink,
            config,
        }
    }

    /// Run one acquisition pass and return its timestamp.
    pub fn tick(&mut self) -> u64 {
        let tick_ms = self.bus.sync_tick();
        let snapshots = self.registry.update_all(&mut self.bus, tick_ms);
        for snapshot in &snapshots {
            if let Err(e) = self.sink.publish(snapshot) {
                warn!("publish failed for {}: {e}", snapshot.id);
            }
        }
        tick_ms
    }

    /// Tick until `running` returns false, holding the configured pace.
    ///
    /// Each tick is timed; the remainder of the period is slept off. An
    /// overrunning tick is logged and the next one starts immediately.
    pub fn run(&mut self, mut running: impl FnMut() -> bool) {
        while running() {
            let started = Instant::now();
            self.tick();
            match self.config.period.checked_sub(started.elapsed()) {
                Some(remaining) => thread::sleep(remaining),
                None => warn!("tick overran the {:?} period", self.config.period),
            }
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_parts(self) -> (SensorBus<SPI, IO, D>, ChannelRegistry, S) {
        (self.bus, self.registry, self.sink)
    }
}
