//! CRC16 used by the space packet footer.
//!
//! Parameters (this is the catalogue's CRC-16/CMS):
//! - Poly:    0x8005
//! - Init:    0xFFFF
//! - RefIn:   false
//! - RefOut:  false
//! - XorOut:  0x0000
//!
//! The checksum is computed bit by bit, MSB first, which is what the radio hardware does. On the
//! wire the two checksum bytes are stored low byte first (see the space packet footer).

/// Generator polynomial, without the implicit x^16 term.
pub const CRC16_POLY: u16 = 0x8005;

/// Initial value of the accumulator.
pub const CRC16_SEED: u16 = 0xFFFF;

/// Computes the CRC16 of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(CRC16_SEED, data)
}

/// Continues a running CRC16 over `data`, so that non-contiguous spans can be checksummed as if
/// they were concatenated.
pub fn crc16_update(mut crc: u16, data: &[u8]) -> u16 {
    for &byte in data {
        let mut cur = byte;
        for _ in 0..8 {
            let branch = ((crc & 0x8000) >> 8) ^ u16::from(cur & 0x80);
            crc = if branch != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
            cur <<= 1;
        }
    }
    crc
}

#[test]
fn catalogue_check_value() {
    assert_eq!(crc16(b"123456789"), 0xAEE7);
}

#[test]
fn empty_input_is_the_seed() {
    assert_eq!(crc16(&[]), CRC16_SEED);
}

/// Cross-check against the table-driven implementation of the `crc` crate.
#[test]
fn matches_crc_catalogue() {
    use rand::{RngCore, SeedableRng};
    const CMS: ::crc::Crc<u16> = ::crc::Crc::<u16>::new(&::crc::CRC_16_CMS);
    // Note that we always use the same seed for reproducibility.
    let mut rng = rand::rngs::SmallRng::seed_from_u64(42);
    let mut buffer = [0u8; 256];
    for _ in 0..1000 {
        let length = (rng.next_u32() % buffer.len() as u32) as usize;
        rng.fill_bytes(&mut buffer[..length]);
        assert_eq!(crc16(&buffer[..length]), CMS.checksum(&buffer[..length]));
    }
}

#[test]
fn space_packet_header_and_payload() {
    let covered = [0x0D, 0x01, 0xA0, 0x0F, 0xFD, 0x38, 0x11, 0x22, 0x33];
    assert_eq!(crc16(&covered), 0xEBC9);
}

#[test]
fn split_spans_match_concatenation() {
    let data = b"0123456789abcdef";
    for split in 0..=data.len() {
        let (head, tail) = data.split_at(split);
        assert_eq!(crc16_update(crc16(head), tail), crc16(data));
    }
}

#[test]
fn repeated_calls_agree() {
    let data = b"telemetry beacon";
    assert_eq!(crc16(data), crc16(data));
}

/// Flipping any single bit of a short message must change the checksum.
#[test]
fn single_bit_flips_are_detected() {
    let data = *b"ihgfedcba";
    let reference = crc16(&data);
    for index in 0..data.len() {
        for bit in 0..8 {
            let mut flipped = data;
            flipped[index] ^= 1 << bit;
            assert_ne!(crc16(&flipped), reference, "flip of byte {index} bit {bit}");
        }
    }
}
