//! Fixed-width unsigned integer packing in explicit byte order.
//!
//! Thin wrappers around `zerocopy`'s byte-order-aware integers, so that every codec in this crate
//! states its byte order at the call site rather than relying on the host's native order.

use zerocopy::FromBytes;
use zerocopy::byteorder::{big_endian, little_endian};

use crate::error::FrameError;

pub fn pack_u8(value: u8) -> [u8; 1] {
    [value]
}

pub fn unpack_u8(bytes: &[u8]) -> Result<u8, FrameError> {
    FrameError::check_exact("u8", 1, bytes)?;
    Ok(bytes[0])
}

pub fn pack_u16_le(value: u16) -> [u8; 2] {
    little_endian::U16::new(value).to_bytes()
}

pub fn pack_u16_be(value: u16) -> [u8; 2] {
    big_endian::U16::new(value).to_bytes()
}

pub fn pack_u32_le(value: u32) -> [u8; 4] {
    little_endian::U32::new(value).to_bytes()
}

pub fn pack_u32_be(value: u32) -> [u8; 4] {
    big_endian::U32::new(value).to_bytes()
}

pub fn unpack_u16_le(bytes: &[u8]) -> Result<u16, FrameError> {
    little_endian::U16::read_from_bytes(bytes)
        .map(|value| value.get())
        .map_err(|_| FrameError::WrongLength {
            frame: "u16",
            expected: 2,
            actual: bytes.len(),
        })
}

pub fn unpack_u16_be(bytes: &[u8]) -> Result<u16, FrameError> {
    big_endian::U16::read_from_bytes(bytes)
        .map(|value| value.get())
        .map_err(|_| FrameError::WrongLength {
            frame: "u16",
            expected: 2,
            actual: bytes.len(),
        })
}

pub fn unpack_u32_le(bytes: &[u8]) -> Result<u32, FrameError> {
    little_endian::U32::read_from_bytes(bytes)
        .map(|value| value.get())
        .map_err(|_| FrameError::WrongLength {
            frame: "u32",
            expected: 4,
            actual: bytes.len(),
        })
}

pub fn unpack_u32_be(bytes: &[u8]) -> Result<u32, FrameError> {
    big_endian::U32::read_from_bytes(bytes)
        .map(|value| value.get())
        .map_err(|_| FrameError::WrongLength {
            frame: "u32",
            expected: 4,
            actual: bytes.len(),
        })
}

#[test]
fn little_endian_u16() {
    assert_eq!(pack_u16_le(4213), [0x75, 0x10]);
    assert_eq!(unpack_u16_le(&[0xFB, 0xCC]), Ok(52475));
}

#[test]
fn big_endian_u16() {
    assert_eq!(pack_u16_be(8642), [0x21, 0xC2]);
    assert_eq!(unpack_u16_be(&[0x21, 0xC2]), Ok(8642));
}

#[test]
fn big_endian_u32() {
    assert_eq!(pack_u32_be(193_854_756), [0x0B, 0x8D, 0xFD, 0x24]);
    assert_eq!(unpack_u32_be(&[0x0B, 0x8D, 0xFD, 0x24]), Ok(193_854_756));
}

#[test]
fn little_endian_u32() {
    assert_eq!(pack_u32_le(193_854_756), [0x24, 0xFD, 0x8D, 0x0B]);
    assert_eq!(unpack_u32_le(&[0x24, 0xFD, 0x8D, 0x0B]), Ok(193_854_756));
}

#[test]
fn single_byte() {
    assert_eq!(pack_u8(0x5A), [0x5A]);
    assert_eq!(unpack_u8(&[0x5A]), Ok(0x5A));
    assert!(unpack_u8(&[]).is_err());
}

/// Slices of the wrong width are rejected instead of being truncated or zero-extended.
#[test]
fn wrong_width_is_a_length_error() {
    assert_eq!(
        unpack_u16_le(&[0x01, 0x02, 0x03]),
        Err(FrameError::WrongLength {
            frame: "u16",
            expected: 2,
            actual: 3
        })
    );
    assert_eq!(
        unpack_u32_be(&[0x01]),
        Err(FrameError::WrongLength {
            frame: "u32",
            expected: 4,
            actual: 1
        })
    );
}
