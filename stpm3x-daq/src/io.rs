// STPM3x DAQ - Multiplexed metering acquisition layer
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Control-line abstraction for the metering carrier board.
//!
//! The carrier routes one SPI bus to four STPM34 sensor boards through
//! an analog mux and two MISO bank gates. [`DigitalIo`] names the lines
//! involved; implementations map them onto real GPIO pins. Levels are
//! logical. Polarity quirks of the hardware (the sensor power rail is
//! switched by a p-channel MOSFET, the bus isolator is active high)
//! belong in the implementation, not in callers.

use std::thread;
use std::time::Duration;

use embedded_hal::delay::DelayNs;

/// Logical level on a control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(&self) -> bool {
        matches!(self, Level::High)
    }
}

/// Control lines of the carrier board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    /// Sensor board power rail switch.
    SensorPower,
    /// Isolates the SPI bus from the sensor boards.
    BusIsolate,
    /// Master enable shared by all metering chips.
    DeviceEnable,
    /// Measurement latch strobe, wired to every device.
    Sync,
    /// Chip select for the muxed sensor slots.
    ChipEnable1,
    /// Spare chip select on the second SPI slave slot.
    ChipEnable2,
    /// Multiplexer select bit 0.
    MuxS0,
    /// Multiplexer select bit 1.
    MuxS1,
    /// MISO gate for the first voltage bank (slots 1 and 2).
    Bank1Miso,
    /// MISO gate for the second voltage bank (slots 3 and 4).
    Bank2Miso,
    /// Bias for the mux select lines during enable sequencing.
    MuxPull,
}

impl Line {
    pub const ALL: [Line; 11] = [
        Line::SensorPower,
        Line::BusIsolate,
        Line::DeviceEnable,
        Line::Sync,
        Line::ChipEnable1,
        Line::ChipEnable2,
        Line::MuxS0,
        Line::MuxS1,
        Line::Bank1Miso,
        Line::Bank2Miso,
        Line::MuxPull,
    ];
}

/// Board GPIO access.
///
/// Implementations are expected to be infallible: a board whose GPIO
/// controller cannot be opened should fail while the implementation is
/// being constructed, before any acquisition machinery exists.
pub trait DigitalIo {
    fn set_line(&mut self, line: Line, level: Level);
    fn line(&self, line: Line) -> Level;
}

/// [`DelayNs`] backed by [`std::thread::sleep`].
///
/// Overrides the millisecond path: the provided impl would chunk a
/// ten-second power-up wait into thousands of nanosecond sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns as u64));
    }

    fn delay_us(&mut self, us: u32) {
        thread::sleep(Duration::from_micros(us as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}
