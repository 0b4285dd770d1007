//! STPM3x register map and packed-field descriptors.
//!
//! The chip exposes its 32-bit registers at even byte addresses; a write
//! addresses each 16-bit half separately (low half at `addr`, high half at
//! `addr + 1`). Metering quantities and configuration switches are packed
//! bitfields inside those registers, described here as [`RegisterField`]
//! values taken from the STPM32/33/34 datasheet register tables.

/// A packed bitfield inside a 32-bit STPM3x register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterField {
    /// Byte address of the containing register.
    pub addr: u8,
    /// Field size in bits.
    pub width: u8,
    /// Bit offset of the field's least significant bit.
    pub position: u8,
}

impl RegisterField {
    pub const fn new(addr: u8, width: u8, position: u8) -> Self {
        Self {
            addr,
            width,
            position,
        }
    }

    /// Bit mask covering the field inside its register.
    pub const fn mask(&self) -> u32 {
        // u64 intermediate so a width-32 field does not overflow the shift.
        (((1u64 << self.width) - 1) << self.position) as u32
    }
}

/// Register byte addresses.
pub mod address {
    pub const DSP_CR1: u8 = 0x00;
    pub const DSP_CR2: u8 = 0x02;
    pub const DSP_CR3: u8 = 0x04;
    pub const DSP_CR4: u8 = 0x06;
    pub const DSP_CR5: u8 = 0x08;
    pub const DSP_CR6: u8 = 0x0A;
    pub const DSP_CR7: u8 = 0x0C;
    pub const DSP_CR8: u8 = 0x0E;
    pub const DSP_CR9: u8 = 0x10;
    pub const DSP_CR10: u8 = 0x12;
    pub const DSP_CR11: u8 = 0x14;
    pub const DSP_CR12: u8 = 0x16;
    pub const DFE_CR1: u8 = 0x18;
    pub const DFE_CR2: u8 = 0x1A;
    pub const DSP_IRQ1: u8 = 0x1C;
    pub const DSP_IRQ2: u8 = 0x1E;
    pub const DSP_SR1: u8 = 0x20;
    pub const DSP_SR2: u8 = 0x22;
    pub const US_REG1: u8 = 0x24;
    pub const US_REG2: u8 = 0x26;
    pub const US_REG3: u8 = 0x28;
    pub const DSP_EV1: u8 = 0x2A;
    pub const DSP_EV2: u8 = 0x2C;
    pub const DSP_REG1: u8 = 0x2E;
    pub const DSP_REG2: u8 = 0x30;
    pub const DSP_REG3: u8 = 0x32;
    pub const DSP_REG4: u8 = 0x34;
    pub const DSP_REG5: u8 = 0x36;
    pub const DSP_REG6: u8 = 0x38;
    pub const DSP_REG7: u8 = 0x3A;
    pub const DSP_REG8: u8 = 0x3C;
    pub const DSP_REG9: u8 = 0x3E;
    pub const DSP_REG10: u8 = 0x40;
    pub const DSP_REG11: u8 = 0x42;
    pub const DSP_REG12: u8 = 0x44;
    pub const DSP_REG13: u8 = 0x46;
    pub const DSP_REG14: u8 = 0x48;
    pub const DSP_REG15: u8 = 0x4A;
    pub const DSP_REG16: u8 = 0x4C;
    pub const DSP_REG17: u8 = 0x4E;
    pub const DSP_REG18: u8 = 0x50;
    pub const DSP_REG19: u8 = 0x52;
    pub const PH1_REG1: u8 = 0x54;
    pub const PH1_REG2: u8 = 0x56;
    pub const PH1_REG3: u8 = 0x58;
    pub const PH1_REG4: u8 = 0x5A;
    pub const PH1_REG5: u8 = 0x5C;
    pub const PH1_REG6: u8 = 0x5E;
    pub const PH1_REG7: u8 = 0x60;
    pub const PH1_REG8: u8 = 0x62;
    pub const PH1_REG9: u8 = 0x64;
    pub const PH1_REG10: u8 = 0x66;
    pub const PH1_REG11: u8 = 0x68;
    pub const PH1_REG12: u8 = 0x6A;
    pub const PH2_REG1: u8 = 0x6C;
    pub const PH2_REG2: u8 = 0x6E;
    pub const PH2_REG3: u8 = 0x70;
    pub const PH2_REG4: u8 = 0x72;
    pub const PH2_REG5: u8 = 0x74;
    pub const PH2_REG6: u8 = 0x76;
    pub const PH2_REG7: u8 = 0x78;
    pub const PH2_REG8: u8 = 0x7A;
    pub const PH2_REG9: u8 = 0x7C;
    pub const PH2_REG10: u8 = 0x7E;
    pub const PH2_REG11: u8 = 0x80;
    pub const PH2_REG12: u8 = 0x82;
    pub const TOT_REG1: u8 = 0x84;
    pub const TOT_REG2: u8 = 0x86;
    pub const TOT_REG3: u8 = 0x88;
    pub const TOT_REG4: u8 = 0x8A;
}

/// RMS voltage, channel 1 (signed, two's complement).
pub const V1_RMS: RegisterField = RegisterField::new(address::DSP_REG14, 15, 0);
/// RMS voltage, channel 2.
pub const V2_RMS: RegisterField = RegisterField::new(address::DSP_REG15, 15, 0);
/// RMS current, channel 1.
pub const C1_RMS: RegisterField = RegisterField::new(address::DSP_REG14, 17, 15);
/// RMS current, channel 2.
pub const C2_RMS: RegisterField = RegisterField::new(address::DSP_REG15, 17, 15);

/// Current-channel gain selector, channel 1.
pub const GAIN1: RegisterField = RegisterField::new(address::DFE_CR1, 2, 26);
/// Current-channel gain selector, channel 2.
pub const GAIN2: RegisterField = RegisterField::new(address::DFE_CR2, 2, 26);
/// Temperature compensation coefficient, channel 1.
pub const TC1: RegisterField = RegisterField::new(address::DFE_CR1, 3, 6);
/// Temperature compensation coefficient, channel 2.
pub const TC2: RegisterField = RegisterField::new(address::DFE_CR2, 3, 6);
/// Apparent energy mode, channel 1.
pub const AEM1: RegisterField = RegisterField::new(address::DSP_CR1, 1, 17);
/// Apparent energy mode, channel 2.
pub const AEM2: RegisterField = RegisterField::new(address::DSP_CR2, 1, 17);
/// Apparent power mode, channel 1.
pub const APM1: RegisterField = RegisterField::new(address::DSP_CR1, 1, 18);
/// Apparent power mode, channel 2.
pub const APM2: RegisterField = RegisterField::new(address::DSP_CR2, 1, 18);
/// Reference line frequency selector (50/60 Hz).
pub const REF_FREQ: RegisterField = RegisterField::new(address::DSP_CR3, 1, 27);

/// Look up a field by its datasheet mnemonic.
///
/// Accepts the spellings used in channel descriptor files ("V1RMS",
/// "C2RMS", "GAIN1", ...). Returns `None` for unknown names.
pub fn by_name(name: &str) -> Option<RegisterField> {
    match name {
        "V1RMS" => Some(V1_RMS),
        "V2RMS" => Some(V2_RMS),
        "C1RMS" => Some(C1_RMS),
        "C2RMS" => Some(C2_RMS),
        "GAIN1" => Some(GAIN1),
        "GAIN2" => Some(GAIN2),
        "TC1" => Some(TC1),
        "TC2" => Some(TC2),
        "AEM1" => Some(AEM1),
        "AEM2" => Some(AEM2),
        "APM1" => Some(APM1),
        "APM2" => Some(APM2),
        "REF_FREQ" => Some(REF_FREQ),
        _ => None,
    }
}
