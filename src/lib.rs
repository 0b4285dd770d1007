//! # STPM3x - Energy metering front-end driver
//!
//! Register-level driver for the ST STPM32/STPM33/STPM34 family of
//! AC metering chips, speaking their CRC-framed SPI protocol through
//! any [`embedded-hal`] 1.0 [`SpiDevice`](embedded_hal::spi::SpiDevice).
//!
//! ## Key Features
//!
//! - **Pipelined reads**: address frame then readback frame, as the chip expects
//! - **Verified writes**: read-modify-write per 16-bit half, CRC-8 framing, readback compare
//! - **Packed fields**: datasheet bitfields decoded with correct sign extension
//! - **Noise gating**: optional squelch for idle current channels
//!
//! ## Quick Start
//!
//! ```rust
//! use stpm3x::{registers, DeviceConfig, Stpm3x};
//! # use stpm3x::testing::FakeSpi;
//!
//! # let spi = FakeSpi::new();
//! # spi.queue_raw(0);
//! let mut chip = Stpm3x::new(spi);
//!
//! // Read the channel 1 RMS voltage field, sign-extended.
//! let counts = chip.read(&registers::V1_RMS)?;
//!
//! // Program the analog front end, checking each readback.
//! for (name, field, value) in DeviceConfig::new().writes() {
//!     let verify = chip.write(&field, value)?;
//!     if !verify.is_verified() {
//!         eprintln!("{name} did not stick");
//!     }
//! }
//! # Ok::<(), stpm3x::Error<stpm3x::testing::FakeSpiError>>(())
//! ```
//!
//! ## Modules
//!
//! - [`registers`]: register map and packed-field descriptors
//! - [`protocol`]: CRC-8 checksums and field codecs
//! - [`driver`]: the [`Stpm3x`] driver itself
//! - [`config`]: analog front-end configuration image
//! - [`testing`]: in-memory bus double (std only)

#![cfg_attr(not(feature = "std"), no_std)]

// Modules
pub mod config;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod registers;
#[cfg(feature = "std")]
pub mod testing;

// Re-exports for convenient access
pub use config::{
    ApparentEnergyMode, ApparentPowerMode, CurrentGain, DeviceConfig, RefFrequency,
    TempCoefficient,
};
pub use driver::{MeteringLine, RmsKind, Stpm3x, WriteVerify};
pub use error::Error;
pub use registers::RegisterField;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
