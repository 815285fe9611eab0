//! PN9 data whitening.
//!
//! Whitening XORs the outgoing bytes with a pseudo-random keystream so that long runs of identical
//! bits do not reach the modulator. The keystream comes from a 9-bit linear-feedback shift
//! register for x^9 + x^5 + 1, seeded with all ones. Each keystream byte is the low eight bits of
//! the register; the register is then clocked eight times, shifting right and inserting
//! `bit0 ^ bit5` at bit 8. This is the convention of the radio's whitening hardware, and it yields
//! the keystream `FF E1 1D 9A ED 85 ...`.
//!
//! Whitening and dewhitening are the same operation. Every call to [`whiten`] or
//! [`whiten_in_place`] starts from a fresh generator.

use alloc::vec::Vec;

/// Initial register state.
pub const PN9_SEED: u16 = 0x1FF;

/// Lazily generated, endless PN9 keystream.
#[derive(Clone, Debug)]
pub struct Pn9 {
    state: u16,
}

impl Pn9 {
    /// A generator positioned at the start of the keystream.
    pub fn new() -> Self {
        Self { state: PN9_SEED }
    }

    fn clock(&mut self) {
        let feedback = (self.state ^ (self.state >> 5)) & 0x01;
        self.state = (self.state >> 1) | (feedback << 8);
    }
}

impl Default for Pn9 {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for Pn9 {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let byte = (self.state & 0xFF) as u8;
        for _ in 0..8 {
            self.clock();
        }
        Some(byte)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

/// Returns `data` XORed with a fresh PN9 keystream.
pub fn whiten(data: &[u8]) -> Vec<u8> {
    data.iter().zip(Pn9::new()).map(|(byte, key)| byte ^ key).collect()
}

/// Whitens (or dewhitens) `data` in place, using a fresh PN9 keystream.
pub fn whiten_in_place(data: &mut [u8]) {
    for (byte, key) in data.iter_mut().zip(Pn9::new()) {
        *byte ^= key;
    }
}

#[test]
fn keystream_prefix() {
    let keystream: Vec<u8> = Pn9::new().take(8).collect();
    assert_eq!(keystream, [0xFF, 0xE1, 0x1D, 0x9A, 0xED, 0x85, 0x33, 0x24]);
}

#[test]
fn whitened_foobar() {
    assert_eq!(whiten(b"foobar"), [0x99, 0x8E, 0x72, 0xF8, 0x8C, 0xF7]);
}

/// The register has period 511, so the keystream repeats after 511 bytes.
#[test]
fn keystream_period() {
    let keystream: Vec<u8> = Pn9::new().take(1022).collect();
    assert_eq!(keystream[..511], keystream[511..]);
    assert_ne!(keystream[..255], keystream[256..511]);
}

/// Whitening twice restores the input, independent of its length.
#[test]
fn whitening_is_self_inverse() {
    use rand::{RngCore, SeedableRng};
    // Note that we always use the same seed for reproducibility.
    let mut rng = rand::rngs::SmallRng::seed_from_u64(42);
    let mut buffer = [0u8; 600];
    for _ in 0..1000 {
        let length = (rng.next_u32() % buffer.len() as u32) as usize;
        rng.fill_bytes(&mut buffer[..length]);
        let original = buffer[..length].to_vec();

        assert_eq!(whiten(&whiten(&original)), original);

        whiten_in_place(&mut buffer[..length]);
        assert_eq!(buffer[..length], whiten(&original)[..]);
        whiten_in_place(&mut buffer[..length]);
        assert_eq!(buffer[..length], original[..]);
    }
}

#[test]
fn empty_input() {
    assert!(whiten(&[]).is_empty());
}
