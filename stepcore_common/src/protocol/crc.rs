//! CRC16 used by the mcu link.
//!
//! This is the CCITT polynomial processed in the byte-reordered form the
//! firmware uses (equivalent to the reflected 0x8408 polynomial with init
//! 0xFFFF and no final xor, a.k.a. CRC-16/MCRF4XX). The result is placed in
//! the frame big-endian: `crc_hi` then `crc_lo`.
//!
//! ```
//! use stepcore_common::protocol::crc::crc16_ccitt;
//!
//! assert_eq!(crc16_ccitt(b"123456789"), 0x6F91);
//! ```

/// Initial value for CRC calculation.
const INIT: u16 = 0xFFFF;

/// Calculate the link CRC over `data`.
#[inline]
#[must_use]
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    crc16_ccitt_update(INIT, data)
}

/// Continue a CRC calculation with more data.
#[inline]
#[must_use]
pub fn crc16_ccitt_update(mut crc: u16, data: &[u8]) -> u16 {
    for &byte in data {
        let mut d = byte ^ (crc & 0xff) as u8;
        d ^= d << 4;
        let d16 = u16::from(d);
        crc = ((d16 << 8) | (crc >> 8)) ^ u16::from(d >> 4) ^ (d16 << 3);
    }
    crc
}

/// Write the CRC of `buf[..data_len]` big-endian at `buf[data_len..data_len + 2]`.
#[inline]
pub fn append_crc16(buf: &mut [u8], data_len: usize) {
    let crc = crc16_ccitt(&buf[..data_len]);
    buf[data_len..data_len + 2].copy_from_slice(&crc.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(crc16_ccitt(b"123456789"), 0x6F91);
    }

    #[test]
    fn empty_input_returns_init() {
        assert_eq!(crc16_ccitt(&[]), INIT);
    }

    #[test]
    fn incremental_matches_single_shot() {
        let data = b"\x05\x10\x01\x02\x03\x04\x05\x06";
        let mut crc = INIT;
        for chunk in data.chunks(3) {
            crc = crc16_ccitt_update(crc, chunk);
        }
        assert_eq!(crc, crc16_ccitt(data));
    }

    #[test]
    fn append_writes_big_endian() {
        let mut buf = [0x05, 0x10, 0x00, 0x00];
        append_crc16(&mut buf, 2);
        let crc = crc16_ccitt(&[0x05, 0x10]);
        assert_eq!(buf[2], (crc >> 8) as u8);
        assert_eq!(buf[3], crc as u8);
    }

    #[test]
    fn detects_every_single_bit_flip() {
        let frame = [0x0a_u8, 0x13, 0x21, 0x05, 0x81, 0x40, 0x7f];
        let original = crc16_ccitt(&frame);
        let mut modified = frame;
        for i in 0..modified.len() {
            for bit in 0..8 {
                modified[i] ^= 1 << bit;
                assert_ne!(
                    crc16_ccitt(&modified),
                    original,
                    "bit flip at byte {i} bit {bit} went undetected"
                );
                modified[i] ^= 1 << bit;
            }
        }
    }
}
