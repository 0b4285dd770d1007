//! Wire-level helpers shared by reads and writes.
//!
//! Write frames carry a CRC-8 checksum over their four payload bytes
//! (polynomial 0x07, init 0x00, the SMBus PEC variant). Metering values
//! arrive as packed two's complement bitfields; [`decode_signed`] extracts
//! and sign-extends them, [`encode_field`] splices a new value into an
//! existing register image without touching neighbouring fields.

use crc::{Crc, CRC_8_SMBUS};

use crate::registers::RegisterField;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Checksum over the four payload bytes of a write frame, in wire order.
pub fn checksum(frame: [u8; 4]) -> u8 {
    CRC8.checksum(&frame)
}

/// Extract a field from a raw register image and sign-extend it.
pub fn decode_signed(raw: u32, field: &RegisterField) -> i64 {
    let masked = ((raw & field.mask()) >> field.position) as u64;
    let half = 1u64 << (field.width - 1);
    (masked ^ half) as i64 - half as i64
}

/// Splice `value` into `current` at the field's position.
///
/// Bits of `value` beyond the field width are discarded; all other bits
/// of `current` are preserved.
pub fn encode_field(current: u32, field: &RegisterField, value: u32) -> u32 {
    let mask = field.mask();
    (current & !mask) | ((value << field.position) & mask)
}
