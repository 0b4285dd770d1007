//! Analog front-end configuration.
//!
//! [`DeviceConfig`] captures the handful of control-register fields the
//! driver programs at bring-up. The enums mirror the datasheet encodings
//! for each field, so `variant as u32` is the exact value written to the
//! chip.

use crate::registers::{self, RegisterField};

/// Current channel PGA gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CurrentGain {
    /// Gain x2 (default for current transformers).
    #[default]
    X2 = 0b00,
    X4 = 0b01,
    X8 = 0b10,
    X16 = 0b11,
}

/// Crystal temperature compensation, in ppm/degC drift buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TempCoefficient {
    Neg50 = 0b000,
    Neg25 = 0b001,
    #[default]
    Zero = 0b010,
    Pos25 = 0b011,
    Pos50 = 0b100,
    Pos75 = 0b101,
    Pos100 = 0b110,
    Pos125 = 0b111,
}

/// Reference line frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RefFrequency {
    Hz50 = 0,
    #[default]
    Hz60 = 1,
}

/// Apparent energy computation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ApparentEnergyMode {
    /// Use apparent RMS power.
    #[default]
    RmsPower = 0,
    /// Use apparent vectorial power.
    VectorialPower = 1,
}

/// Apparent vectorial power computation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ApparentPowerMode {
    /// Use fundamental power.
    #[default]
    Fundamental = 0,
    /// Use active power.
    Active = 1,
}

/// Control-register image applied to a device at bring-up.
///
/// Defaults match a 60 Hz line with current transformers on both
/// channels and no crystal compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceConfig {
    pub ref_freq: RefFrequency,
    pub gain1: CurrentGain,
    pub gain2: CurrentGain,
    pub tc1: TempCoefficient,
    pub tc2: TempCoefficient,
    pub aem1: ApparentEnergyMode,
    pub aem2: ApparentEnergyMode,
    pub apm1: ApparentPowerMode,
    pub apm2: ApparentPowerMode,
}

impl DeviceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reference line frequency.
    pub fn with_ref_freq(mut self, freq: RefFrequency) -> Self {
        self.ref_freq = freq;
        self
    }

    /// Set the current gain on both channels.
    pub fn with_gain(mut self, gain: CurrentGain) -> Self {
        self.gain1 = gain;
        self.gain2 = gain;
        self
    }

    /// Set the temperature compensation on both channels.
    pub fn with_temp_coefficient(mut self, tc: TempCoefficient) -> Self {
        self.tc1 = tc;
        self.tc2 = tc;
        self
    }

    /// Set the apparent energy mode on both channels.
    pub fn with_energy_mode(mut self, aem: ApparentEnergyMode) -> Self {
        self.aem1 = aem;
        self.aem2 = aem;
        self
    }

    /// Set the apparent power mode on both channels.
    pub fn with_power_mode(mut self, apm: ApparentPowerMode) -> Self {
        self.apm1 = apm;
        self.apm2 = apm;
        self
    }

    /// The configuration as an ordered batch of named field writes.
    ///
    /// The reference frequency goes first, then the channel 1 fields,
    /// then channel 2. Names match [`registers::by_name`] mnemonics so
    /// callers can log exactly which write failed verification.
    pub fn writes(&self) -> [(&'static str, RegisterField, u32); 9] {
        [
            ("REF_FREQ", registers::REF_FREQ, self.ref_freq as u32),
            ("GAIN1", registers::GAIN1, self.gain1 as u32),
            ("TC1", registers::TC1, self.tc1 as u32),
            ("AEM1", registers::AEM1, self.aem1 as u32),
            ("APM1", registers::APM1, self.apm1 as u32),
            ("GAIN2", registers::GAIN2, self.gain2 as u32),
            ("TC2", registers::TC2, self.tc2 as u32),
            ("AEM2", registers::AEM2, self.aem2 as u32),
            ("APM2", registers::APM2, self.apm2 as u32),
        ]
    }
}
