//! CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection, no final XOR).

/// Initial register value.
pub const CRC16_INIT: u16 = 0xFFFF;

const POLY: u16 = 0x1021;

/// Checksum of `bytes`.
pub fn crc16_ccitt(bytes: &[u8]) -> u16 {
    crc16_ccitt_update(CRC16_INIT, bytes)
}

/// Continue a running checksum over `bytes`.
///
/// `crc16_ccitt_update(crc16_ccitt(a), b) == crc16_ccitt(a ++ b)`.
pub fn crc16_ccitt_update(mut crc: u16, bytes: &[u8]) -> u16 {
    for &b in bytes {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
