// STPM3x - Energy metering front-end driver
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Integration tests for the STPM3x register driver
//!
//! These tests drive the public API end to end over the fake SPI
//! device and pin down the exact frames a real chip would see.

use stpm3x::protocol::{checksum, encode_field};
use stpm3x::registers;
use stpm3x::testing::{BusOp, FakeSpi};
use stpm3x::{DeviceConfig, Error, Stpm3x, WriteVerify};

#[test]
fn test_configuration_batch_applies_and_verifies_every_field() {
    let spi = FakeSpi::new();
    let mut chip = Stpm3x::new(spi.clone());

    let config = DeviceConfig::new();
    let writes = config.writes();
    assert_eq!(writes.len(), 9);
    assert_eq!(writes[0].0, "REF_FREQ");
    assert_eq!(writes[0].2, 1, "60 Hz grids are the default");

    for (_, field, value) in writes {
        // Current image reads as zero, readback returns the new image.
        spi.queue_raw(0);
        spi.queue_raw(encode_field(0, &field, value));
        let verify = chip.write(&field, value).unwrap();
        assert!(verify.is_verified());
    }

    // Each write is six frames: read, two halves, read again.
    assert_eq!(spi.ops().len(), 9 * 6);
    assert_eq!(spi.remaining_replies(), 0);
}

#[test]
fn test_write_emits_crc_framed_register_halves() {
    let spi = FakeSpi::new();
    spi.queue_raw(0);
    spi.queue_raw(0b11 << 26);
    let mut chip = Stpm3x::new(spi.clone());

    // Secondary channel gain field sits in the upper register half.
    let verify = chip.write(&registers::GAIN2, 0b11).unwrap();
    assert_eq!(verify, WriteVerify::Verified);

    let low = [0x00, 0x1A, 0x00, 0x00];
    let high = [0x00, 0x1B, 0x00, 0x0C];
    let ops = spi.ops();
    assert_eq!(ops[0], BusOp::Write(vec![0x1A, 0xFF, 0xFF, 0xFF, 0xFF]));
    assert_eq!(ops[1], BusOp::Read(5));
    assert_eq!(
        ops[2],
        BusOp::Write(vec![low[0], low[1], low[2], low[3], checksum(low)])
    );
    assert_eq!(
        ops[3],
        BusOp::Write(vec![high[0], high[1], high[2], high[3], checksum(high)])
    );
    assert_eq!(ops[4], BusOp::Write(vec![0x1A, 0xFF, 0xFF, 0xFF, 0xFF]));
    assert_eq!(ops[5], BusOp::Read(5));
}

#[test]
fn test_voltage_and_current_share_one_register() {
    let spi = FakeSpi::new();
    let raw = 6493 | (312 << 15);
    spi.queue_raw(raw);
    spi.queue_raw(raw);
    let mut chip = Stpm3x::new(spi.clone());

    assert_eq!(chip.read(&registers::V1_RMS).unwrap(), 6493);
    assert_eq!(chip.read(&registers::C1_RMS).unwrap(), 312);
}

#[test]
fn test_noise_gate_squelches_idle_current() {
    let spi = FakeSpi::new();
    spi.queue_raw(100 << 15);
    spi.queue_raw(200 << 15);
    let mut chip = Stpm3x::new(spi.clone());

    // Below 2^7 counts reads as zero, above passes through.
    assert_eq!(chip.read_gated(&registers::C1_RMS, 7).unwrap(), 0);
    assert_eq!(chip.read_gated(&registers::C1_RMS, 7).unwrap(), 200);
}

#[test]
fn test_bus_fault_is_an_error_not_a_mismatch() {
    let spi = FakeSpi::new();
    spi.set_failing(true);
    let mut chip = Stpm3x::new(spi.clone());

    let err = chip.write(&registers::GAIN1, 0b01).unwrap_err();
    assert!(matches!(err, Error::Spi(_)));
    assert!(err.to_string().contains("SPI transfer failed"));
}

#[test]
fn test_release_returns_the_bus_handle() {
    let spi = FakeSpi::new();
    let chip = Stpm3x::new(spi.clone());
    let handle = chip.release();

    spi.queue_raw(42);
    let mut chip = Stpm3x::new(handle);
    assert_eq!(chip.read_raw(&registers::V1_RMS).unwrap(), 42);
}
