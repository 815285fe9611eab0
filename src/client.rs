//! Client packets, the frames exchanged with the radio over its serial host link.
//!
//! A client packet is a fixed seven-byte header followed by the payload:
//!
//! | offset | field           | encoding |
//! |--------|-----------------|----------|
//! | 0      | length          | u8       |
//! | 1..3   | hardware id     | LE u16   |
//! | 3..5   | sequence number | LE u16   |
//! | 5      | destination     | u8       |
//! | 6      | command number  | u8       |
//!
//! The length field counts the header and payload minus one, i.e. it is `6 + payload length`.

use alloc::vec::Vec;

use zerocopy::byteorder::little_endian;
use zerocopy::{ByteEq, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::FrameError;
use crate::space::SpacePacket;

/// Client packet header size in bytes.
pub const CLIENT_HEADER_SIZE: usize = 7;

/// Smallest valid length field (empty payload).
pub const CLIENT_MIN_LENGTH: u8 = 6;

/// Largest valid length field.
pub const CLIENT_MAX_LENGTH: u8 = 251;

/// Largest payload a client packet can carry.
pub const CLIENT_MAX_PAYLOAD: usize = (CLIENT_MAX_LENGTH - CLIENT_MIN_LENGTH) as usize;

/// Length field value for a payload of `payload_len` bytes.
fn length_for(payload_len: usize) -> usize {
    CLIENT_HEADER_SIZE + payload_len - 1
}

/// Fixed-size client packet header, laid out exactly as on the wire.
#[repr(C)]
#[derive(Copy, Clone, ByteEq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Hash)]
pub struct ClientPacketHeader {
    length: u8,
    hardware_id: little_endian::U16,
    sequence_number: little_endian::U16,
    destination: u8,
    command_number: u8,
}

impl ClientPacketHeader {
    /// Builds a header from explicit field values. Only the length field has a range narrower
    /// than its type.
    pub fn new(
        length: u8,
        hardware_id: u16,
        sequence_number: u16,
        destination: u8,
        command_number: u8,
    ) -> Result<Self, FrameError> {
        let header = Self {
            length,
            hardware_id: little_endian::U16::new(hardware_id),
            sequence_number: little_endian::U16::new(sequence_number),
            destination,
            command_number,
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<(), FrameError> {
        FrameError::check_range(
            "length",
            self.length.into(),
            CLIENT_MIN_LENGTH.into(),
            CLIENT_MAX_LENGTH.into(),
        )
    }

    pub fn to_bytes(&self) -> [u8; CLIENT_HEADER_SIZE] {
        let mut bytes = [0u8; CLIENT_HEADER_SIZE];
        bytes.copy_from_slice(self.as_bytes());
        bytes
    }

    /// Parses a header from exactly seven bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let header = Self::read_from_bytes(bytes).map_err(|_| FrameError::WrongLength {
            frame: "client packet header",
            expected: CLIENT_HEADER_SIZE,
            actual: bytes.len(),
        })?;
        header.validate()?;
        Ok(header)
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn hardware_id(&self) -> u16 {
        self.hardware_id.get()
    }

    pub fn sequence_number(&self) -> u16 {
        self.sequence_number.get()
    }

    pub fn destination(&self) -> u8 {
        self.destination
    }

    pub fn command_number(&self) -> u8 {
        self.command_number
    }
}

impl core::fmt::Debug for ClientPacketHeader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClientPacketHeader")
            .field("length", &self.length())
            .field("hardware_id", &self.hardware_id())
            .field("sequence_number", &self.sequence_number())
            .field("destination", &self.destination())
            .field("command_number", &self.command_number())
            .finish()
    }
}

/// A client packet: header plus owned payload. The length field always matches the payload.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ClientPacket {
    header: ClientPacketHeader,
    payload: Vec<u8>,
}

impl ClientPacket {
    /// Builds a packet around a copy of `payload`, deriving the length field from its size.
    pub fn new(
        hardware_id: u16,
        sequence_number: u16,
        destination: u8,
        command_number: u8,
        payload: &[u8],
    ) -> Result<Self, FrameError> {
        if payload.len() > CLIENT_MAX_PAYLOAD {
            return Err(FrameError::OutOfRange {
                field: "length",
                value: u32::try_from(length_for(payload.len())).unwrap_or(u32::MAX),
                min: CLIENT_MIN_LENGTH.into(),
                max: CLIENT_MAX_LENGTH.into(),
            });
        }
        let header = ClientPacketHeader::new(
            length_for(payload.len()) as u8,
            hardware_id,
            sequence_number,
            destination,
            command_number,
        )?;
        Ok(Self {
            header,
            payload: payload.to_vec(),
        })
    }

    /// Converts a packet received over the air into the form forwarded to the host.
    pub fn from_space(packet: &SpacePacket) -> Result<Self, FrameError> {
        Self::new(
            packet.hardware_id(),
            packet.sequence_number(),
            packet.destination(),
            packet.command_number(),
            packet.payload(),
        )
    }

    pub fn header(&self) -> &ClientPacketHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn hardware_id(&self) -> u16 {
        self.header.hardware_id()
    }

    pub fn sequence_number(&self) -> u16 {
        self.header.sequence_number()
    }

    pub fn destination(&self) -> u8 {
        self.header.destination()
    }

    pub fn command_number(&self) -> u8 {
        self.header.command_number()
    }

    /// Total encoded size in bytes. Note the distinction from the length field, which is one
    /// less.
    pub fn packet_length(&self) -> usize {
        CLIENT_HEADER_SIZE + self.payload.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.packet_length());
        bytes.extend_from_slice(self.header.as_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Parses a packet and checks its length field against the number of bytes received. The
    /// payload is copied out of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < CLIENT_HEADER_SIZE {
            return Err(FrameError::TooShort {
                frame: "client packet",
                minimum: CLIENT_HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let (header, payload) = bytes.split_at(CLIENT_HEADER_SIZE);
        let header = ClientPacketHeader::from_bytes(header)?;

        let implied = length_for(payload.len());
        if usize::from(header.length()) != implied {
            tracing::debug!(
                declared = header.length(),
                implied,
                "client packet length field disagrees with frame size"
            );
            return Err(FrameError::LengthMismatch {
                frame: "client packet",
                declared: header.length().into(),
                actual: implied,
            });
        }

        Ok(Self {
            header,
            payload: payload.to_vec(),
        })
    }
}

#[test]
fn encode_header() {
    let header = ClientPacketHeader::new(10, 755, 12, 212, 57).unwrap();
    assert_eq!(header.to_bytes(), [0x0A, 0xF3, 0x02, 0x0C, 0x00, 0xD4, 0x39]);
}

#[test]
fn decode_header() {
    let header =
        ClientPacketHeader::from_bytes(&[0x0D, 0xFF, 0x03, 0x04, 0x00, 0xFD, 0x38]).unwrap();
    assert_eq!(header.length(), 13);
    assert_eq!(header.hardware_id(), 1023);
    assert_eq!(header.sequence_number(), 4);
    assert_eq!(header.destination(), 253);
    assert_eq!(header.command_number(), 56);
    assert_eq!(header, ClientPacketHeader::new(13, 1023, 4, 253, 56).unwrap());
}

#[test]
fn header_length_bounds() {
    assert!(ClientPacketHeader::new(CLIENT_MIN_LENGTH, 0, 0, 0, 0).is_ok());
    assert!(ClientPacketHeader::new(CLIENT_MAX_LENGTH, 0, 0, 0, 0).is_ok());
    assert_eq!(
        ClientPacketHeader::new(5, 0, 0, 0, 0),
        Err(FrameError::OutOfRange {
            field: "length",
            value: 5,
            min: 6,
            max: 251
        })
    );
    assert_eq!(
        ClientPacketHeader::new(252, 0, 0, 0, 0),
        Err(FrameError::OutOfRange {
            field: "length",
            value: 252,
            min: 6,
            max: 251
        })
    );
    assert!(ClientPacketHeader::from_bytes(&[0x05, 0, 0, 0, 0, 0, 0]).is_err());
}

#[test]
fn header_needs_exactly_seven_bytes() {
    assert_eq!(
        ClientPacketHeader::from_bytes(&[0x0D, 0xFF, 0x03, 0x04, 0x00, 0xFD]),
        Err(FrameError::WrongLength {
            frame: "client packet header",
            expected: 7,
            actual: 6
        })
    );
}

#[test]
fn packet_to_bytes_small_frame() {
    let packet = ClientPacket::new(1023, 1, 253, 56, &[0x0A, 0x0B, 0x0C, 0x0D]).unwrap();
    assert_eq!(packet.header().length(), 10);
    assert_eq!(
        packet.to_bytes(),
        [0x0A, 0xFF, 0x03, 0x01, 0x00, 0xFD, 0x38, 0x0A, 0x0B, 0x0C, 0x0D]
    );
}

#[test]
fn packet_with_too_much_data() {
    let payload = [0u8; 1024];
    assert_eq!(
        ClientPacket::new(1023, 1, 253, 56, &payload),
        Err(FrameError::OutOfRange {
            field: "length",
            value: 1030,
            min: 6,
            max: 251
        })
    );
    assert!(ClientPacket::new(1023, 1, 253, 56, &payload[..CLIENT_MAX_PAYLOAD]).is_ok());
    assert!(ClientPacket::new(1023, 1, 253, 56, &payload[..CLIENT_MAX_PAYLOAD + 1]).is_err());
}

#[test]
fn packet_from_bytes_small_frame() {
    let bytes = [0x09, 0xFF, 0x03, 0x04, 0x00, 0xFD, 0x38, 0x01, 0x02, 0x03];
    let packet = ClientPacket::from_bytes(&bytes).unwrap();
    assert_eq!(packet.payload(), [0x01, 0x02, 0x03]);
    assert_eq!(packet.hardware_id(), 1023);
    assert_eq!(packet.sequence_number(), 4);
    assert_eq!(packet.to_bytes(), bytes);
}

#[test]
fn packet_from_bytes_empty_frame() {
    let packet = ClientPacket::from_bytes(&[0x06, 0xFF, 0x03, 0x04, 0x00, 0xFD, 0x38]).unwrap();
    assert!(packet.payload().is_empty());
    assert_eq!(packet.packet_length(), CLIENT_HEADER_SIZE);
}

/// A length field that disagrees with the received size is an integrity error, in either
/// direction.
#[test]
fn packet_length_mismatch() {
    let bytes = [0x0A, 0xFF, 0x03, 0x04, 0x00, 0xFD, 0x38, 0x01, 0x02, 0x03];
    assert_eq!(
        ClientPacket::from_bytes(&bytes),
        Err(FrameError::LengthMismatch {
            frame: "client packet",
            declared: 10,
            actual: 9
        })
    );
    assert_eq!(
        ClientPacket::from_bytes(&bytes[..8]).unwrap_err().kind(),
        crate::error::ErrorKind::Integrity
    );
}

#[test]
fn packet_too_short() {
    assert_eq!(
        ClientPacket::from_bytes(&[0x06, 0xFF, 0x03]),
        Err(FrameError::TooShort {
            frame: "client packet",
            minimum: 7,
            actual: 3
        })
    );
}

/// The decoded payload is an owned copy: mutating the receive buffer afterwards leaves the
/// packet untouched.
#[test]
fn payload_does_not_alias_input() {
    let mut bytes = [0x07, 0xFF, 0x03, 0x04, 0x00, 0xFD, 0x38, 0x42];
    let packet = ClientPacket::from_bytes(&bytes).unwrap();
    bytes[7] = 0x00;
    assert_eq!(packet.payload(), [0x42]);
}

/// Roundtrip encoding and subsequent decoding of client packets shall result in identical
/// packets for any valid input.
#[test]
fn roundtrip() {
    use rand::{RngCore, SeedableRng};
    // Note that we always use the same seed for reproducibility.
    let mut rng = rand::rngs::SmallRng::seed_from_u64(42);
    let mut buffer = [0u8; CLIENT_MAX_PAYLOAD];
    for _ in 0..10_000 {
        let length = (rng.next_u32() as usize) % (CLIENT_MAX_PAYLOAD + 1);
        rng.fill_bytes(&mut buffer[..length]);
        let packet = ClientPacket::new(
            rng.next_u32() as u16,
            rng.next_u32() as u16,
            rng.next_u32() as u8,
            rng.next_u32() as u8,
            &buffer[..length],
        )
        .unwrap();

        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), packet.packet_length());
        assert_eq!(usize::from(bytes[0]), bytes.len() - 1);
        assert_eq!(
            ClientPacket::from_bytes(&bytes),
            Ok(packet.clone()),
            "roundtrip failed for {packet:?}"
        );
    }
}
