// STPM3x DAQ - Multiplexed metering acquisition layer
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensor slot routing and board sequencing.
//!
//! One SPI bus serves up to four STPM34 boards. [`BoardMux`] steers chip
//! select and MISO to a slot, runs the power-up and enable sequences the
//! chips require, and strobes the shared sync line that latches a
//! simultaneous measurement on every device.

use std::time::{SystemTime, UNIX_EPOCH};

use embedded_hal::delay::DelayNs;
use log::debug;

use crate::error::{DaqError, Result};
use crate::io::{DigitalIo, Level, Line};

/// Number of sensor slots behind the mux.
pub const DEVICE_COUNT: u8 = 4;

/// Voltage banks feeding the two MISO gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bank {
    One,
    Two,
}

/// Routes the bus to one of four sensor slots and sequences the board.
pub struct BoardMux<IO, D> {
    io: IO,
    delay: D,
}

impl<IO: DigitalIo, D: DelayNs> BoardMux<IO, D> {
    pub fn new(io: IO, delay: D) -> Self {
        Self { io, delay }
    }

    /// Power the sensor boards up from a cold, isolated bus.
    ///
    /// Holds the rail off with the bus isolated long enough for the
    /// board capacitance to discharge, then powers up, lets the rail
    /// settle and reconnects the bus.
    pub fn power_on(&mut self) {
        debug!("sensor power: discharge, power up, settle");
        self.io.set_line(Line::SensorPower, Level::Low);
        self.io.set_line(Line::BusIsolate, Level::High);
        self.delay.delay_ms(10_000);
        self.io.set_line(Line::SensorPower, Level::High);
        self.delay.delay_ms(1_000);
        self.io.set_line(Line::BusIsolate, Level::Low);
    }

    /// Run the STPM3x enable sequence.
    ///
    /// The chips sample their select lines on the rising edge of the
    /// enable signal, so every select has to sit low before the enable
    /// transition. Ends with a global software reset (three sync pulses
    /// and a chip-select dip).
    pub fn bring_up(&mut self) {
        debug!("running STPM3x enable sequence");

        // All select lines low before the enable transition.
        self.io.set_line(Line::DeviceEnable, Level::Low);
        self.io.set_line(Line::MuxPull, Level::Low);
        self.io.set_line(Line::ChipEnable1, Level::Low);
        self.delay.delay_ms(500);

        self.io.set_line(Line::DeviceEnable, Level::High);
        self.delay.delay_ms(200);

        // Default line states: selects high, sync high.
        self.io.set_line(Line::Sync, Level::High);
        self.io.set_line(Line::MuxPull, Level::High);
        self.io.set_line(Line::ChipEnable1, Level::High);
        self.delay.delay_ms(100);

        // Global software reset: three sync pulses, then a select dip.
        self.sync_pulse();
        self.sync_pulse();
        self.sync_pulse();

        self.io.set_line(Line::ChipEnable1, Level::Low);
        self.io.set_line(Line::MuxPull, Level::Low);
        self.delay.delay_ms(1);
        self.io.set_line(Line::ChipEnable1, Level::High);
        self.io.set_line(Line::MuxPull, Level::High);
    }

    /// Route chip select and MISO to a sensor slot.
    ///
    /// Slots are numbered 1 to 4. The voltage bank gate always switches
    /// before the select bits.
    pub fn select_sensor(&mut self, device: u8) -> Result<()> {
        match device {
            1 => {
                self.select_bank(Bank::One);
                self.io.set_line(Line::MuxS0, Level::High);
                self.io.set_line(Line::MuxS1, Level::Low);
            }
            2 => {
                self.select_bank(Bank::One);
                self.io.set_line(Line::MuxS0, Level::Low);
                self.io.set_line(Line::MuxS1, Level::Low);
            }
            3 => {
                self.select_bank(Bank::Two);
                self.io.set_line(Line::MuxS0, Level::High);
                self.io.set_line(Line::MuxS1, Level::High);
            }
            4 => {
                self.select_bank(Bank::Two);
                self.io.set_line(Line::MuxS0, Level::Low);
                self.io.set_line(Line::MuxS1, Level::High);
            }
            other => return Err(DaqError::BadDeviceIndex(other)),
        }
        Ok(())
    }

    /// Strobe the shared sync line and timestamp the latched measurement.
    ///
    /// Every device latches its metering registers on the pulse, so one
    /// timestamp covers the whole board set. Returned as milliseconds
    /// since the Unix epoch.
    pub fn sync_tick(&mut self) -> u64 {
        self.sync_pulse();
        epoch_millis()
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    fn select_bank(&mut self, bank: Bank) {
        match bank {
            Bank::One => {
                self.io.set_line(Line::Bank1Miso, Level::High);
                self.io.set_line(Line::Bank2Miso, Level::Low);
            }
            Bank::Two => {
                self.io.set_line(Line::Bank1Miso, Level::Low);
                self.io.set_line(Line::Bank2Miso, Level::High);
            }
        }
    }

    fn sync_pulse(&mut self) {
        self.io.set_line(Line::Sync, Level::Low);
        self.delay.delay_ms(1);
        self.io.set_line(Line::Sync, Level::High);
        self.delay.delay_ms(1);
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
