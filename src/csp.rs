//! Cubesat Space Protocol (CSP) style addressed transport header.
//!
//! The header is a single big-endian 32-bit word holding, from the most significant bit down:
//!
//! | field            | bits |
//! |------------------|------|
//! | priority         | 2    |
//! | source           | 5    |
//! | destination      | 5    |
//! | destination port | 6    |
//! | source port      | 6    |
//! | flags (reserved) | 8    |
//!
//! The flags are always written as zero and ignored on receipt.

use alloc::vec::Vec;

use crate::bitfield::BitLayout;
use crate::endian::{pack_u32_be, unpack_u32_be};
use crate::error::FrameError;

/// CSP header size in bytes.
pub const CSP_HEADER_SIZE: usize = 4;

const HEADER_LAYOUT: BitLayout<6> = BitLayout::new([2, 5, 5, 6, 6, 8]);

const PRIORITY: usize = 0;
const SOURCE: usize = 1;
const DESTINATION: usize = 2;
const DESTINATION_PORT: usize = 3;
const SOURCE_PORT: usize = 4;

/// Largest CSP node address.
pub const MAX_ADDRESS: u8 = HEADER_LAYOUT.max_value(SOURCE) as u8;

/// Largest CSP port number.
pub const MAX_PORT: u8 = HEADER_LAYOUT.max_value(SOURCE_PORT) as u8;

/// CSP priority. Lower values are more urgent.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
#[cfg_attr(kani, derive(kani::Arbitrary))]
pub enum Priority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl TryFrom<u8> for Priority {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Priority::Critical),
            1 => Ok(Priority::High),
            2 => Ok(Priority::Normal),
            3 => Ok(Priority::Low),
            _ => Err(FrameError::OutOfRange {
                field: "priority",
                value: value.into(),
                min: 0,
                max: 3,
            }),
        }
    }
}

/// Decoded CSP header. Every field is guaranteed to fit its bit width.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CspHeader {
    priority: Priority,
    source: u8,
    destination: u8,
    destination_port: u8,
    source_port: u8,
}

impl CspHeader {
    /// Builds a header, rejecting any address or port that does not fit its field.
    pub fn new(
        priority: Priority,
        source: u8,
        destination: u8,
        destination_port: u8,
        source_port: u8,
    ) -> Result<Self, FrameError> {
        let header = Self {
            priority,
            source,
            destination,
            destination_port,
            source_port,
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<(), FrameError> {
        let max = u32::from(MAX_ADDRESS);
        FrameError::check_range("source", self.source.into(), 0, max)?;
        FrameError::check_range("destination", self.destination.into(), 0, max)?;
        let max = u32::from(MAX_PORT);
        FrameError::check_range("destination_port", self.destination_port.into(), 0, max)?;
        FrameError::check_range("source_port", self.source_port.into(), 0, max)?;
        Ok(())
    }

    /// Packs the header into its four-byte big-endian wire form.
    pub fn to_bytes(&self) -> [u8; CSP_HEADER_SIZE] {
        let word = HEADER_LAYOUT.pack([
            self.priority as u32,
            self.source.into(),
            self.destination.into(),
            self.destination_port.into(),
            self.source_port.into(),
            0,
        ]);
        pack_u32_be(word)
    }

    /// Parses a header from exactly four bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let word = unpack_u32_be(bytes).map_err(|_| FrameError::WrongLength {
            frame: "CSP header",
            expected: CSP_HEADER_SIZE,
            actual: bytes.len(),
        })?;
        let fields = HEADER_LAYOUT.unpack(word);
        Self::new(
            Priority::try_from(fields[PRIORITY] as u8)?,
            fields[SOURCE] as u8,
            fields[DESTINATION] as u8,
            fields[DESTINATION_PORT] as u8,
            fields[SOURCE_PORT] as u8,
        )
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn source(&self) -> u8 {
        self.source
    }

    pub fn destination(&self) -> u8 {
        self.destination
    }

    pub fn destination_port(&self) -> u8 {
        self.destination_port
    }

    pub fn source_port(&self) -> u8 {
        self.source_port
    }
}

/// CSP header followed by an owned payload.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct CspPacket {
    header: CspHeader,
    payload: Vec<u8>,
}

impl CspPacket {
    /// Copies `payload` into a new packet.
    pub fn new(header: CspHeader, payload: &[u8]) -> Self {
        Self {
            header,
            payload: payload.to_vec(),
        }
    }

    pub fn header(&self) -> &CspHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total encoded size in bytes.
    pub fn packet_length(&self) -> usize {
        CSP_HEADER_SIZE + self.payload.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.packet_length());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Parses a packet. The payload is copied, so the packet does not borrow from `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < CSP_HEADER_SIZE {
            return Err(FrameError::TooShort {
                frame: "CSP packet",
                minimum: CSP_HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let (header, payload) = bytes.split_at(CSP_HEADER_SIZE);
        Ok(Self::new(CspHeader::from_bytes(header)?, payload))
    }
}

#[test]
fn encode_header() {
    let header = CspHeader::new(Priority::Normal, 10, 24, 1, 63).unwrap();
    assert_eq!(header.to_bytes(), [0x95, 0x80, 0x7F, 0x00]);
}

#[test]
fn decode_header() {
    let header = CspHeader::from_bytes(&[0x95, 0x80, 0x5C, 0x00]).unwrap();
    assert_eq!(header.priority(), Priority::Normal);
    assert_eq!(header.source(), 10);
    assert_eq!(header.destination(), 24);
    assert_eq!(header.destination_port(), 1);
    assert_eq!(header.source_port(), 28);
}

/// Reserved flag bits are ignored when decoding and cleared when encoding.
#[test]
fn flags_are_ignored() {
    let header = CspHeader::from_bytes(&[0x95, 0x80, 0x5C, 0xA5]).unwrap();
    assert_eq!(header.source_port(), 28);
    assert_eq!(header.to_bytes(), [0x95, 0x80, 0x5C, 0x00]);
}

/// One past the upper bound of every field is rejected rather than wrapped into the next field.
#[test]
fn out_of_range_fields() {
    assert_eq!(
        Priority::try_from(4),
        Err(FrameError::OutOfRange {
            field: "priority",
            value: 4,
            min: 0,
            max: 3
        })
    );
    assert_eq!(
        CspHeader::new(Priority::Low, 32, 0, 0, 0),
        Err(FrameError::OutOfRange {
            field: "source",
            value: 32,
            min: 0,
            max: 31
        })
    );
    assert_eq!(
        CspHeader::new(Priority::Low, 0, 32, 0, 0),
        Err(FrameError::OutOfRange {
            field: "destination",
            value: 32,
            min: 0,
            max: 31
        })
    );
    assert_eq!(
        CspHeader::new(Priority::Low, 0, 0, 64, 0),
        Err(FrameError::OutOfRange {
            field: "destination_port",
            value: 64,
            min: 0,
            max: 63
        })
    );
    assert_eq!(
        CspHeader::new(Priority::Low, 0, 0, 0, 64),
        Err(FrameError::OutOfRange {
            field: "source_port",
            value: 64,
            min: 0,
            max: 63
        })
    );
    assert!(CspHeader::new(Priority::Low, 31, 31, 63, 63).is_ok());
}

#[test]
fn header_needs_exactly_four_bytes() {
    assert_eq!(
        CspHeader::from_bytes(&[0x95, 0x80, 0x5C]),
        Err(FrameError::WrongLength {
            frame: "CSP header",
            expected: 4,
            actual: 3
        })
    );
    assert!(CspHeader::from_bytes(&[0x95, 0x80, 0x5C, 0x00, 0x00]).is_err());
}

#[test]
fn packet_decode_and_encode() {
    let bytes = [0x48, 0x20, 0xC5, 0x00, 0x66, 0x6F, 0x6F, 0x62, 0x61, 0x72];
    let packet = CspPacket::from_bytes(&bytes).unwrap();
    assert_eq!(packet.payload(), b"foobar");
    assert_eq!(packet.header().priority(), Priority::High);
    assert_eq!(packet.to_bytes(), bytes);
}

#[test]
fn packet_too_short() {
    assert_eq!(
        CspPacket::from_bytes(&[0x48, 0x20]),
        Err(FrameError::TooShort {
            frame: "CSP packet",
            minimum: 4,
            actual: 2
        })
    );
}

/// Every valid header survives encoding followed by decoding.
#[test]
fn roundtrip() {
    use rand::{RngCore, SeedableRng};
    // Note that we always use the same seed for reproducibility.
    let mut rng = rand::rngs::SmallRng::seed_from_u64(42);
    for _ in 0..10_000 {
        let priority = Priority::try_from((rng.next_u32() & 0x03) as u8).unwrap();
        let source = (rng.next_u32() & u32::from(MAX_ADDRESS)) as u8;
        let destination = (rng.next_u32() & u32::from(MAX_ADDRESS)) as u8;
        let destination_port = (rng.next_u32() & u32::from(MAX_PORT)) as u8;
        let source_port = (rng.next_u32() & u32::from(MAX_PORT)) as u8;
        let header =
            CspHeader::new(priority, source, destination, destination_port, source_port).unwrap();
        assert_eq!(CspHeader::from_bytes(&header.to_bytes()), Ok(header));
    }
}
