//! Space packets, the frames carried over the air interface.
//!
//! A space packet is a six-byte header, the payload, and a four-byte footer:
//!
//! | offset        | field           | encoding            |
//! |---------------|-----------------|---------------------|
//! | 0             | length          | u8                  |
//! | 1             | port            | u8, 0 or 1          |
//! | 2..4          | sequence number | LE u16              |
//! | 4             | destination     | u8                  |
//! | 5             | command number  | u8                  |
//! | 6..n-4        | payload         |                     |
//! | n-4..n-2      | hardware id     | LE u16              |
//! | n-2..n        | CRC16           | LE u16 (low first)  |
//!
//! Unlike the client packet, the length field counts every byte of the packet, footer included.
//! The CRC16 covers the header and payload; the footer itself is excluded.

use alloc::vec::Vec;

use zerocopy::byteorder::little_endian;
use zerocopy::{ByteEq, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::client::ClientPacket;
use crate::crc::{crc16, crc16_update};
use crate::error::FrameError;

/// Space packet header size in bytes.
pub const SPACE_HEADER_SIZE: usize = 6;

/// Space packet footer size in bytes.
pub const SPACE_FOOTER_SIZE: usize = 4;

/// Smallest valid length field (empty payload).
pub const SPACE_MIN_LENGTH: u8 = (SPACE_HEADER_SIZE + SPACE_FOOTER_SIZE) as u8;

/// Largest valid length field.
pub const SPACE_MAX_LENGTH: u8 = 251;

/// Largest payload a space packet can carry.
pub const SPACE_MAX_PAYLOAD: usize = (SPACE_MAX_LENGTH - SPACE_MIN_LENGTH) as usize;

/// Highest valid port number.
pub const SPACE_MAX_PORT: u8 = 1;

/// Fixed-size space packet header, laid out exactly as on the wire.
#[repr(C)]
#[derive(Copy, Clone, ByteEq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Hash)]
pub struct SpacePacketHeader {
    length: u8,
    port: u8,
    sequence_number: little_endian::U16,
    destination: u8,
    command_number: u8,
}

impl SpacePacketHeader {
    /// Builds a header from explicit field values, rejecting a length or port out of range.
    pub fn new(
        length: u8,
        port: u8,
        sequence_number: u16,
        destination: u8,
        command_number: u8,
    ) -> Result<Self, FrameError> {
        let header = Self {
            length,
            port,
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
            SPACE_MIN_LENGTH.into(),
            SPACE_MAX_LENGTH.into(),
        )?;
        FrameError::check_range("port", self.port.into(), 0, SPACE_MAX_PORT.into())
    }

    pub fn to_bytes(&self) -> [u8; SPACE_HEADER_SIZE] {
        let mut bytes = [0u8; SPACE_HEADER_SIZE];
        bytes.copy_from_slice(self.as_bytes());
        bytes
    }

    /// Parses a header from exactly six bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let header = Self::read_from_bytes(bytes).map_err(|_| FrameError::WrongLength {
            frame: "space packet header",
            expected: SPACE_HEADER_SIZE,
            actual: bytes.len(),
        })?;
        header.validate()?;
        Ok(header)
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn port(&self) -> u8 {
        self.port
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

impl core::fmt::Debug for SpacePacketHeader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpacePacketHeader")
            .field("length", &self.length())
            .field("port", &self.port())
            .field("sequence_number", &self.sequence_number())
            .field("destination", &self.destination())
            .field("command_number", &self.command_number())
            .finish()
    }
}

/// Fixed-size space packet footer. The checksum is stored low byte first, i.e. byte-swapped with
/// respect to its natural big-endian rendering.
#[repr(C)]
#[derive(Copy, Clone, ByteEq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Hash)]
pub struct SpacePacketFooter {
    hardware_id: little_endian::U16,
    crc16: little_endian::U16,
}

impl SpacePacketFooter {
    pub fn new(hardware_id: u16, crc16: u16) -> Self {
        Self {
            hardware_id: little_endian::U16::new(hardware_id),
            crc16: little_endian::U16::new(crc16),
        }
    }

    pub fn to_bytes(&self) -> [u8; SPACE_FOOTER_SIZE] {
        let mut bytes = [0u8; SPACE_FOOTER_SIZE];
        bytes.copy_from_slice(self.as_bytes());
        bytes
    }

    /// Parses a footer from exactly four bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        Self::read_from_bytes(bytes).map_err(|_| FrameError::WrongLength {
            frame: "space packet footer",
            expected: SPACE_FOOTER_SIZE,
            actual: bytes.len(),
        })
    }

    pub fn hardware_id(&self) -> u16 {
        self.hardware_id.get()
    }

    pub fn crc16(&self) -> u16 {
        self.crc16.get()
    }
}

impl core::fmt::Debug for SpacePacketFooter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpacePacketFooter")
            .field("hardware_id", &self.hardware_id())
            .field("crc16", &format_args!("{:#06x}", self.crc16()))
            .finish()
    }
}

/// A space packet: header, owned payload and footer, held as separate values.
///
/// Any means of constructing a `SpacePacket` in this crate checks that the length field matches
/// the payload and that the footer checksum matches the header and payload. Hence, any
/// `SpacePacket` value may be assumed to be a valid, consistent space packet.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct SpacePacket {
    header: SpacePacketHeader,
    payload: Vec<u8>,
    footer: SpacePacketFooter,
}

impl SpacePacket {
    /// Builds a packet around a copy of `payload`, deriving the length field and checksum.
    pub fn new(
        port: u8,
        sequence_number: u16,
        destination: u8,
        command_number: u8,
        hardware_id: u16,
        payload: &[u8],
    ) -> Result<Self, FrameError> {
        let length = SPACE_HEADER_SIZE + payload.len() + SPACE_FOOTER_SIZE;
        if payload.len() > SPACE_MAX_PAYLOAD {
            return Err(FrameError::OutOfRange {
                field: "length",
                value: u32::try_from(length).unwrap_or(u32::MAX),
                min: SPACE_MIN_LENGTH.into(),
                max: SPACE_MAX_LENGTH.into(),
            });
        }
        let header = SpacePacketHeader::new(
            length as u8,
            port,
            sequence_number,
            destination,
            command_number,
        )?;
        let footer = SpacePacketFooter::new(hardware_id, Self::checksum(&header, payload));
        Ok(Self {
            header,
            payload: payload.to_vec(),
            footer,
        })
    }

    /// Re-packages a packet received from the host for transmission over the air.
    pub fn from_client(packet: &ClientPacket, port: u8) -> Result<Self, FrameError> {
        Self::new(
            port,
            packet.sequence_number(),
            packet.destination(),
            packet.command_number(),
            packet.hardware_id(),
            packet.payload(),
        )
    }

    /// Assembles a packet from separately received parts, verifying the length field and the
    /// footer checksum.
    pub fn from_parts(
        header: SpacePacketHeader,
        payload: &[u8],
        footer: SpacePacketFooter,
    ) -> Result<Self, FrameError> {
        let actual = SPACE_HEADER_SIZE + payload.len() + SPACE_FOOTER_SIZE;
        if usize::from(header.length()) != actual {
            tracing::debug!(
                declared = header.length(),
                actual,
                "space packet length field disagrees with frame size"
            );
            return Err(FrameError::LengthMismatch {
                frame: "space packet",
                declared: header.length().into(),
                actual,
            });
        }

        let computed = Self::checksum(&header, payload);
        if computed != footer.crc16() {
            tracing::debug!(
                stored = footer.crc16(),
                computed,
                sequence_number = header.sequence_number(),
                "space packet checksum mismatch"
            );
            return Err(FrameError::ChecksumMismatch {
                stored: footer.crc16(),
                computed,
            });
        }

        Ok(Self {
            header,
            payload: payload.to_vec(),
            footer,
        })
    }

    /// CRC16 over the header bytes followed by the payload bytes.
    pub fn checksum(header: &SpacePacketHeader, payload: &[u8]) -> u16 {
        crc16_update(crc16(header.as_bytes()), payload)
    }

    pub fn header(&self) -> &SpacePacketHeader {
        &self.header
    }

    pub fn footer(&self) -> &SpacePacketFooter {
        &self.footer
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn port(&self) -> u8 {
        self.header.port()
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

    pub fn hardware_id(&self) -> u16 {
        self.footer.hardware_id()
    }

    /// Total encoded size in bytes, equal to the length field.
    pub fn packet_length(&self) -> usize {
        SPACE_HEADER_SIZE + self.payload.len() + SPACE_FOOTER_SIZE
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.packet_length());
        bytes.extend_from_slice(self.header.as_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes.extend_from_slice(self.footer.as_bytes());
        bytes
    }

    /// Parses a packet: header from the first six bytes, footer from the last four, payload from
    /// everything in between. Shall never panic: rather, an error is returned explaining why the
    /// given octet string is not a valid space packet.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let minimum = SPACE_HEADER_SIZE + SPACE_FOOTER_SIZE;
        if bytes.len() < minimum {
            return Err(FrameError::TooShort {
                frame: "space packet",
                minimum,
                actual: bytes.len(),
            });
        }
        let (header, rest) = bytes.split_at(SPACE_HEADER_SIZE);
        let (payload, footer) = rest.split_at(rest.len() - SPACE_FOOTER_SIZE);
        Self::from_parts(
            SpacePacketHeader::from_bytes(header)?,
            payload,
            SpacePacketFooter::from_bytes(footer)?,
        )
    }
}

/// Test harness for formal verification.
#[cfg(kani)]
mod kani_harness {
    use super::*;
    use ::kani;

    /// Parsing arbitrary bytes never panics, and anything accepted is internally consistent.
    #[kani::proof]
    #[kani::unwind(20)]
    fn packet_parsing() {
        let bytes: [u8; 16] = kani::any();
        let length: usize = kani::any();
        kani::assume(length <= bytes.len());

        if let Ok(packet) = SpacePacket::from_bytes(&bytes[..length]) {
            assert_eq!(packet.packet_length(), length);
            assert_eq!(usize::from(packet.header().length()), length);
            assert!(packet.port() <= SPACE_MAX_PORT);
        }
    }

    /// Header parsing accepts exactly the lengths and ports in range.
    #[kani::proof]
    fn header_parsing() {
        let bytes: [u8; SPACE_HEADER_SIZE] = kani::any();
        let valid = (SPACE_MIN_LENGTH..=SPACE_MAX_LENGTH).contains(&bytes[0])
            && bytes[1] <= SPACE_MAX_PORT;
        assert_eq!(SpacePacketHeader::from_bytes(&bytes).is_ok(), valid);
    }
}

#[test]
fn encode_header() {
    let header = SpacePacketHeader::new(27, 0, 1134, 23, 132).unwrap();
    assert_eq!(header.to_bytes(), [0x1B, 0x00, 0x6E, 0x04, 0x17, 0x84]);
}

#[test]
fn decode_header() {
    let header = SpacePacketHeader::from_bytes(&[0x0D, 0x01, 0x04, 0x00, 0xFD, 0x38]).unwrap();
    assert_eq!(header, SpacePacketHeader::new(13, 1, 4, 253, 56).unwrap());
    assert_eq!(header.length(), 13);
    assert_eq!(header.port(), 1);
    assert_eq!(header.sequence_number(), 4);
    assert_eq!(header.destination(), 253);
    assert_eq!(header.command_number(), 56);
}

#[test]
fn header_bounds() {
    assert_eq!(
        SpacePacketHeader::new(27, 2, 0, 0, 0),
        Err(FrameError::OutOfRange {
            field: "port",
            value: 2,
            min: 0,
            max: 1
        })
    );
    assert_eq!(
        SpacePacketHeader::new(9, 0, 0, 0, 0),
        Err(FrameError::OutOfRange {
            field: "length",
            value: 9,
            min: 10,
            max: 251
        })
    );
    assert_eq!(
        SpacePacketHeader::new(252, 0, 0, 0, 0),
        Err(FrameError::OutOfRange {
            field: "length",
            value: 252,
            min: 10,
            max: 251
        })
    );
    assert!(SpacePacketHeader::new(SPACE_MIN_LENGTH, 0, 0, 0, 0).is_ok());
    assert!(SpacePacketHeader::new(SPACE_MAX_LENGTH, 1, 0, 0, 0).is_ok());
    assert!(SpacePacketHeader::from_bytes(&[0x0D, 0xC0, 0x04, 0x00, 0xFD, 0x38]).is_err());
}

#[test]
fn encode_footer() {
    let footer = SpacePacketFooter::new(2047, 0x0102);
    assert_eq!(footer.to_bytes(), [0xFF, 0x07, 0x02, 0x01]);
}

#[test]
fn decode_footer() {
    let footer = SpacePacketFooter::from_bytes(&[0x0E, 0x01, 0x0B, 0x0A]).unwrap();
    assert_eq!(footer.hardware_id(), 270);
    assert_eq!(footer.crc16(), 0x0A0B);
    assert!(SpacePacketFooter::from_bytes(&[0x0E, 0x01, 0x0B]).is_err());
}

#[test]
fn packet_to_bytes() {
    let packet = SpacePacket::new(1, 4000, 253, 56, 12, &[0x11, 0x22, 0x33]).unwrap();
    assert_eq!(
        packet.to_bytes(),
        [
            0x0D, 0x01, 0xA0, 0x0F, 0xFD, 0x38, // header
            0x11, 0x22, 0x33, // payload
            0x0C, 0x00, 0xC9, 0xEB, // footer
        ]
    );
    assert_eq!(packet.footer().crc16(), 0xEBC9);
}

#[test]
fn packet_from_bytes() {
    let bytes = [
        0x0D, 0x01, 0xA0, 0x0F, 0xFD, 0x38, 0x11, 0x22, 0x33, 0x0C, 0x00, 0xC9, 0xEB,
    ];
    let packet = SpacePacket::from_bytes(&bytes).unwrap();
    assert_eq!(packet.payload(), [0x11, 0x22, 0x33]);
    assert_eq!(packet.port(), 1);
    assert_eq!(packet.sequence_number(), 4000);
    assert_eq!(packet.destination(), 253);
    assert_eq!(packet.command_number(), 56);
    assert_eq!(packet.hardware_id(), 12);
}

#[test]
fn packet_with_too_much_data() {
    let payload = [0u8; 1024];
    assert_eq!(
        SpacePacket::new(1, 4000, 253, 56, 12, &payload),
        Err(FrameError::OutOfRange {
            field: "length",
            value: 1034,
            min: 10,
            max: 251
        })
    );
    assert!(SpacePacket::new(1, 4000, 253, 56, 12, &payload[..SPACE_MAX_PAYLOAD]).is_ok());
}

#[test]
fn empty_payload() {
    let packet = SpacePacket::new(0, 1, 2, 3, 4, &[]).unwrap();
    let bytes = packet.to_bytes();
    assert_eq!(bytes.len(), 10);
    assert_eq!(bytes[0], SPACE_MIN_LENGTH);
    assert_eq!(SpacePacket::from_bytes(&bytes), Ok(packet));
}

/// Changing any payload byte after packing makes the original footer fail verification.
#[test]
fn payload_corruption_is_detected() {
    let packet = SpacePacket::new(0, 77, 1, 2, 3, b"housekeeping").unwrap();
    for index in 0..packet.payload().len() {
        let mut payload = packet.payload().to_vec();
        payload[index] ^= 0x01;
        let result = SpacePacket::from_parts(*packet.header(), &payload, *packet.footer());
        assert_eq!(
            result.unwrap_err().kind(),
            crate::error::ErrorKind::Checksum,
            "byte {index}"
        );
    }
}

#[test]
fn header_corruption_is_detected() {
    let mut bytes = SpacePacket::new(0, 77, 1, 2, 3, b"housekeeping")
        .unwrap()
        .to_bytes();
    bytes[4] ^= 0x80;
    assert!(matches!(
        SpacePacket::from_bytes(&bytes),
        Err(FrameError::ChecksumMismatch { .. })
    ));
}

/// The hardware id lives in the footer and is not covered by the checksum.
#[test]
fn hardware_id_is_not_covered() {
    let a = SpacePacket::new(0, 5, 6, 7, 0x0001, b"abc").unwrap();
    let b = SpacePacket::new(0, 5, 6, 7, 0xFFFF, b"abc").unwrap();
    assert_eq!(a.footer().crc16(), b.footer().crc16());
}

#[test]
fn length_mismatch() {
    let mut bytes = SpacePacket::new(1, 4000, 253, 56, 12, &[0x11, 0x22, 0x33])
        .unwrap()
        .to_bytes();
    bytes[0] = 0x0C;
    assert_eq!(
        SpacePacket::from_bytes(&bytes),
        Err(FrameError::LengthMismatch {
            frame: "space packet",
            declared: 12,
            actual: 13
        })
    );
}

#[test]
fn packet_too_short() {
    assert_eq!(
        SpacePacket::from_bytes(&[0x0A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
        Err(FrameError::TooShort {
            frame: "space packet",
            minimum: 10,
            actual: 9
        })
    );
}

#[test]
fn client_packet_relay() {
    let client = ClientPacket::new(1023, 9, 253, 56, b"ping").unwrap();
    let space = SpacePacket::from_client(&client, 1).unwrap();
    assert_eq!(space.hardware_id(), 1023);
    assert_eq!(space.sequence_number(), 9);
    assert_eq!(space.destination(), 253);
    assert_eq!(space.command_number(), 56);
    assert_eq!(space.payload(), b"ping");
    assert_eq!(ClientPacket::from_space(&space), Ok(client));

    let large = ClientPacket::new(1, 1, 1, 1, &[0u8; SPACE_MAX_PAYLOAD + 1]).unwrap();
    assert!(SpacePacket::from_client(&large, 0).is_err());
}

/// Roundtrip encoding and subsequent decoding of space packets shall result in identical
/// packets for any valid input.
#[test]
fn roundtrip() {
    use rand::{RngCore, SeedableRng};
    // Note that we always use the same seed for reproducibility.
    let mut rng = rand::rngs::SmallRng::seed_from_u64(42);
    let mut buffer = [0u8; SPACE_MAX_PAYLOAD];
    for _ in 0..10_000 {
        let length = (rng.next_u32() as usize) % (SPACE_MAX_PAYLOAD + 1);
        rng.fill_bytes(&mut buffer[..length]);
        let packet = SpacePacket::new(
            (rng.next_u32() & 1) as u8,
            rng.next_u32() as u16,
            rng.next_u32() as u8,
            rng.next_u32() as u8,
            rng.next_u32() as u16,
            &buffer[..length],
        )
        .unwrap();

        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), usize::from(bytes[0]));
        assert_eq!(
            SpacePacket::from_bytes(&bytes),
            Ok(packet.clone()),
            "roundtrip failed for {packet:?}"
        );
    }
}
