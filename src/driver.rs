//! Register-level STPM3x driver over an [`SpiDevice`].
//!
//! The chip pipelines SPI traffic: a transaction names the register to
//! fetch, and the reply arrives during the *next* transaction. Reads are
//! therefore two chip-select frames, an address frame then a readback
//! frame. Writes address each 16-bit register half separately and carry
//! a CRC-8 over the frame payload.

use embedded_hal::spi::SpiDevice;

use crate::error::Error;
use crate::protocol;
use crate::registers::{self, RegisterField};

/// Every frame on the wire is five bytes.
const FRAME_LEN: usize = 5;

/// Metering quantity with a dedicated RMS register field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RmsKind {
    Voltage,
    Current,
}

/// One of the chip's two internal metering lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeteringLine {
    One,
    Two,
}

/// Outcome of a verified register write.
///
/// The chip acknowledges nothing on the write path, so the driver reads
/// the register back and compares it against the image it intended to
/// store. A mismatch is ordinary data, not a bus fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteVerify {
    /// Readback matched the intended register image.
    Verified,
    /// Readback differed from the intended register image.
    Mismatch { intended: u32, actual: u32 },
}

impl WriteVerify {
    pub fn is_verified(&self) -> bool {
        matches!(self, WriteVerify::Verified)
    }
}

/// Driver for one STPM3x device behind a chip select.
///
/// On multi-drop buses the caller routes chip select and MISO before
/// each call; the driver itself is stateless between transactions.
pub struct Stpm3x<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> Stpm3x<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Release the underlying bus handle.
    pub fn release(self) -> SPI {
        self.spi
    }

    /// Read the full 32-bit register containing `field`.
    ///
    /// The fifth reply byte is a frame checksum appended by the chip;
    /// it is not verified.
    pub fn read_raw(&mut self, field: &RegisterField) -> Result<u32, Error<SPI::Error>> {
        self.spi
            .write(&[field.addr, 0xFF, 0xFF, 0xFF, 0xFF])?;
        let mut reply = [0u8; FRAME_LEN];
        self.spi.read(&mut reply)?;
        Ok(u32::from_le_bytes([reply[0], reply[1], reply[2], reply[3]]))
    }

    /// Read `field` and sign-extend it from its packed width.
    pub fn read(&mut self, field: &RegisterField) -> Result<i64, Error<SPI::Error>> {
        let raw = self.read_raw(field)?;
        Ok(protocol::decode_signed(raw, field))
    }

    /// Read `field`, squelching magnitudes below `2^threshold_bits` to zero.
    ///
    /// Idle current channels float a few counts above zero; gating keeps
    /// that noise out of downstream averages.
    pub fn read_gated(
        &mut self,
        field: &RegisterField,
        threshold_bits: u8,
    ) -> Result<i64, Error<SPI::Error>> {
        let value = self.read(field)?;
        let floor = 1u64
            .checked_shl(threshold_bits as u32)
            .unwrap_or(u64::MAX);
        if value.unsigned_abs() < floor {
            Ok(0)
        } else {
            Ok(value)
        }
    }

    /// Read an RMS quantity in engineering units.
    ///
    /// Picks the register field for the quantity and line and applies
    /// the caller's calibration scale factor. Equivalent to [`read`]
    /// with the matching field constant; descriptor-driven callers use
    /// that path directly.
    ///
    /// [`read`]: Stpm3x::read
    pub fn read_rms(
        &mut self,
        kind: RmsKind,
        line: MeteringLine,
        scale: f64,
    ) -> Result<f64, Error<SPI::Error>> {
        let field = match (kind, line) {
            (RmsKind::Voltage, MeteringLine::One) => registers::V1_RMS,
            (RmsKind::Voltage, MeteringLine::Two) => registers::V2_RMS,
            (RmsKind::Current, MeteringLine::One) => registers::C1_RMS,
            (RmsKind::Current, MeteringLine::Two) => registers::C2_RMS,
        };
        Ok(self.read(&field)? as f64 * scale)
    }

    /// Write `value` into `field` and verify the readback.
    ///
    /// Performs a read-modify-write of the containing register so bits
    /// outside the field survive, then reads the register back and
    /// compares it with the intended image. Only bus faults are errors;
    /// a failed comparison comes back as [`WriteVerify::Mismatch`].
    pub fn write(
        &mut self,
        field: &RegisterField,
        value: u32,
    ) -> Result<WriteVerify, Error<SPI::Error>> {
        let current = self.read_raw(field)?;
        let intended = protocol::encode_field(current, field, value);

        self.write_half(field.addr, intended as u16)?;
        self.write_half(field.addr + 1, (intended >> 16) as u16)?;

        let actual = self.read_raw(field)?;
        if actual == intended {
            Ok(WriteVerify::Verified)
        } else {
            Ok(WriteVerify::Mismatch { intended, actual })
        }
    }

    fn write_half(&mut self, addr: u8, half: u16) -> Result<(), Error<SPI::Error>> {
        let payload = [0x00, addr, half as u8, (half >> 8) as u8];
        let mut frame = [0u8; FRAME_LEN];
        frame[..4].copy_from_slice(&payload);
        frame[4] = protocol::checksum(payload);
        self.spi.write(&frame)?;
        Ok(())
    }
}
