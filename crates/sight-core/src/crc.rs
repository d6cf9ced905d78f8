//! CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection, no xorout).

const POLY: u16 = 0x1021;
const INIT: u16 = 0xffff;

pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = INIT;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(crc16(b"123456789"), 0x29b1);
    }

    #[test]
    fn empty_input_is_init() {
        assert_eq!(crc16(&[]), 0xffff);
    }

    #[test]
    fn single_bit_flip_changes_crc() {
        let a = crc16(&[0x10, 0x20, 0x30]);
        let b = crc16(&[0x10, 0x21, 0x30]);
        assert_ne!(a, b);
    }
}
