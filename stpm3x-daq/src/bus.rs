// STPM3x DAQ - Multiplexed metering acquisition layer
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! One SPI bus plus the mux that shares it between sensor slots.
//!
//! [`SensorBus`] owns the register driver and the board mux and keeps
//! their invariant: the mux routes to the right slot before any frame
//! goes out. Driver errors are flattened to [`DaqError::Transport`] at
//! this boundary so the layers above stay generic over the bus type.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use stpm3x::registers::RegisterField;
use stpm3x::{Stpm3x, WriteVerify};

use crate::error::{DaqError, Result};
use crate::io::DigitalIo;
use crate::mux::BoardMux;

/// A multiplexed STPM3x sensor bus.
pub struct SensorBus<SPI, IO, D> {
    driver: Stpm3x<SPI>,
    mux: BoardMux<IO, D>,
}

impl<SPI, IO, D> SensorBus<SPI, IO, D>
where
    SPI: SpiDevice,
    IO: DigitalIo,
    D: DelayNs,
{
    pub fn new(spi: SPI, io: IO, delay: D) -> Self {
        Self {
            driver: Stpm3x::new(spi),
            mux: BoardMux::new(io, delay),
        }
    }

    /// Power the boards and run the chip enable sequence.
    pub fn start(&mut self) {
        self.mux.power_on();
        self.mux.bring_up();
    }

    /// Latch a simultaneous measurement on every device.
    pub fn sync_tick(&mut self) -> u64 {
        self.mux.sync_tick()
    }

    /// Route the bus to a sensor slot.
    pub fn select(&mut self, device: u8) -> Result<()> {
        self.mux.select_sensor(device)
    }

    /// Read a field from one device, scaled to engineering units.
    ///
    /// `threshold` is the optional noise gate in bits; counts below
    /// `2^threshold` in magnitude read as zero.
    pub fn read_scaled(
        &mut self,
        device: u8,
        field: &RegisterField,
        threshold: Option<u8>,
        scale: f64,
    ) -> Result<f64> {
        self.mux.select_sensor(device)?;
        let counts = match threshold {
            Some(bits) => self.driver.read_gated(field, bits),
            None => self.driver.read(field),
        }
        .map_err(|e| DaqError::Transport(e.to_string()))?;
        Ok(counts as f64 * scale)
    }

    /// Write a field on one device, reporting the readback comparison.
    pub fn write_register(
        &mut self,
        device: u8,
        field: &RegisterField,
        value: u32,
    ) -> Result<WriteVerify> {
        self.mux.select_sensor(device)?;
        self.driver
            .write(field, value)
            .map_err(|e| DaqError::Transport(e.to_string()))
    }

    pub fn mux(&self) -> &BoardMux<IO, D> {
        &self.mux
    }

    pub fn mux_mut(&mut self) -> &mut BoardMux<IO, D> {
        &mut self.mux
    }
}
