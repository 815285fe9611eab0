//! Framing at the two outer boundaries of the radio: the serial host link and the air interface.
//!
//! On the host link a client packet is preceded by a two-byte attached sync marker. On the air
//! interface the space packet is FEC encoded, then whitened, and finally preceded by the preamble
//! and sync word; none of these framing bytes are covered by the packet checksum. Receiving
//! reverses the chain, decoding the FEC stream chunk by chunk: the first decoded byte is the
//! space packet length field, which fixes how many encoded bytes the frame must contain.

use alloc::vec::Vec;

use crate::client::ClientPacket;
use crate::config::{LinkConfig, PREAMBLE_BYTE};
use crate::error::{DesyncError, FrameError};
use crate::fec::{self, CHUNK_SIZE, FecDecoder};
use crate::space::{SPACE_MIN_LENGTH, SpacePacket};
use crate::whitening::whiten_in_place;

/// Attached sync marker in front of every client packet on the host link.
pub const HOST_ASM: [u8; 2] = [0x22, 0x69];

/// Prefixes an encoded client packet with the host-link sync marker.
pub fn encode_host_frame(packet: &ClientPacket) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HOST_ASM.len() + packet.packet_length());
    frame.extend_from_slice(&HOST_ASM);
    frame.extend_from_slice(&packet.to_bytes());
    frame
}

/// Strips the host-link sync marker and decodes the client packet behind it.
pub fn decode_host_frame(frame: &[u8]) -> Result<ClientPacket, FrameError> {
    match frame.strip_prefix(&HOST_ASM[..]) {
        Some(packet) => ClientPacket::from_bytes(packet),
        None => {
            tracing::debug!(frame_len = frame.len(), "host frame without sync marker");
            Err(DesyncError::MissingAsm.into())
        }
    }
}

/// Produces the raw bytes handed to the RF front end for `packet`.
pub fn encode_air_frame(packet: &SpacePacket, config: &LinkConfig) -> Result<Vec<u8>, FrameError> {
    config.validate()?;

    let mut body = packet.to_bytes();
    if config.fec {
        body = fec::encode(&body);
    }
    if config.whitening {
        whiten_in_place(&mut body);
    }

    let mut frame = Vec::with_capacity(config.marker_len() + body.len());
    frame.resize(config.preamble_len, PREAMBLE_BYTE);
    frame.extend_from_slice(&config.sync_word);
    frame.extend_from_slice(&body);
    tracing::trace!(
        packet_len = packet.packet_length(),
        frame_len = frame.len(),
        "encoded air frame"
    );
    Ok(frame)
}

/// Recovers the space packet from raw bytes received from the RF front end.
pub fn decode_air_frame(frame: &[u8], config: &LinkConfig) -> Result<SpacePacket, FrameError> {
    config.validate()?;

    let body = strip_marker(frame, config)?;
    let mut body = body.to_vec();
    if config.whitening {
        whiten_in_place(&mut body);
    }

    let packet = if config.fec {
        decode_fec_stream(&body)?
    } else {
        body
    };
    SpacePacket::from_bytes(&packet)
}

fn strip_marker<'a>(frame: &'a [u8], config: &LinkConfig) -> Result<&'a [u8], FrameError> {
    let marker_len = config.marker_len();
    if frame.len() < marker_len {
        tracing::debug!(frame_len = frame.len(), "air frame shorter than its sync marker");
        return Err(DesyncError::MissingSyncWord.into());
    }
    let (marker, body) = frame.split_at(marker_len);
    let (preamble, sync_word) = marker.split_at(config.preamble_len);
    if preamble.iter().any(|&byte| byte != PREAMBLE_BYTE) || sync_word != config.sync_word {
        tracing::debug!(marker = ?marker, "air frame without preamble and sync word");
        return Err(DesyncError::MissingSyncWord.into());
    }
    Ok(body)
}

/// Streams `encoded` through a FEC decoder, using the first decoded byte (the space packet length
/// field) to check the frame size before the rest of it is decoded.
fn decode_fec_stream(encoded: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut decoder = FecDecoder::new();
    let mut decoded = decoder.prime()?;
    let mut packet_len = None;

    for chunk in encoded.chunks(CHUNK_SIZE) {
        decoded.extend(decoder.decode_chunk(chunk)?);
        if packet_len.is_none() {
            if let Some(&length) = decoded.first() {
                let expected = fec::encoded_len(length.into());
                if encoded.len() != expected {
                    tracing::debug!(
                        length,
                        expected,
                        actual = encoded.len(),
                        "encoded frame size disagrees with its length field"
                    );
                    return Err(DesyncError::EncodedLength {
                        expected,
                        actual: encoded.len(),
                    }
                    .into());
                }
                packet_len = Some(usize::from(length));
            }
        }
    }

    let Some(packet_len) = packet_len else {
        return Err(DesyncError::EncodedLength {
            expected: fec::encoded_len(SPACE_MIN_LENGTH.into()),
            actual: encoded.len(),
        }
        .into());
    };
    decoded.extend(decoder.finish());
    decoded.truncate(packet_len);
    Ok(decoded)
}

#[cfg(test)]
fn sample_packet() -> SpacePacket {
    SpacePacket::new(1, 4000, 253, 56, 12, &[0x11, 0x22, 0x33]).unwrap()
}

#[test]
fn host_frame() {
    let packet = ClientPacket::new(1023, 1, 253, 56, &[0x0A, 0x0B, 0x0C, 0x0D]).unwrap();
    let frame = encode_host_frame(&packet);
    assert_eq!(
        frame,
        [
            0x22, 0x69, 0x0A, 0xFF, 0x03, 0x01, 0x00, 0xFD, 0x38, 0x0A, 0x0B, 0x0C, 0x0D
        ]
    );
    assert_eq!(decode_host_frame(&frame), Ok(packet));
}

#[test]
fn host_frame_without_marker() {
    let packet = ClientPacket::new(1023, 1, 253, 56, &[]).unwrap();
    let frame = encode_host_frame(&packet);
    assert_eq!(
        decode_host_frame(&frame[1..]),
        Err(FrameError::Desync(DesyncError::MissingAsm))
    );
    assert_eq!(
        decode_host_frame(&[]),
        Err(FrameError::Desync(DesyncError::MissingAsm))
    );
}

#[test]
fn air_frame_layout() {
    let packet = sample_packet();
    let frame = encode_air_frame(&packet, &LinkConfig::default()).unwrap();
    assert_eq!(
        frame[..8],
        [0xAA, 0xAA, 0xAA, 0xAA, 0xD3, 0x91, 0xD3, 0x91]
    );
    assert_eq!(frame.len(), 8 + fec::encoded_len(packet.packet_length()));

    let mut body = frame[8..].to_vec();
    whiten_in_place(&mut body);
    assert_eq!(body, fec::encode(&packet.to_bytes()));
}

/// With coding disabled, the packet bytes appear verbatim behind the marker.
#[test]
fn uncoded_air_frame() {
    let config = LinkConfig {
        preamble_len: 2,
        fec: false,
        whitening: false,
        ..LinkConfig::default()
    };
    let packet = sample_packet();
    let frame = encode_air_frame(&packet, &config).unwrap();
    assert_eq!(frame[..6], [0xAA, 0xAA, 0xD3, 0x91, 0xD3, 0x91]);
    assert_eq!(frame[6..], packet.to_bytes()[..]);
    assert_eq!(decode_air_frame(&frame, &config), Ok(packet));
}

#[test]
fn air_frame_roundtrip_for_every_coding_choice() {
    let packet = sample_packet();
    for fec in [false, true] {
        for whitening in [false, true] {
            let config = LinkConfig {
                fec,
                whitening,
                ..LinkConfig::default()
            };
            let frame = encode_air_frame(&packet, &config).unwrap();
            assert_eq!(
                decode_air_frame(&frame, &config),
                Ok(packet.clone()),
                "fec {fec}, whitening {whitening}"
            );
        }
    }
}

/// Channel bit errors are corrected by the FEC before the checksum is verified.
#[test]
fn air_frame_bit_errors_are_corrected() {
    let config = LinkConfig::default();
    let packet = sample_packet();
    let frame = encode_air_frame(&packet, &config).unwrap();
    for index in config.marker_len()..frame.len() {
        let mut corrupted = frame.clone();
        corrupted[index] ^= 0x10;
        assert_eq!(
            decode_air_frame(&corrupted, &config),
            Ok(packet.clone()),
            "byte {index}"
        );
    }
}

#[test]
fn missing_sync_word() {
    let config = LinkConfig::default();
    let mut frame = encode_air_frame(&sample_packet(), &config).unwrap();
    frame[5] = 0x00;
    assert_eq!(
        decode_air_frame(&frame, &config),
        Err(FrameError::Desync(DesyncError::MissingSyncWord))
    );
    assert_eq!(
        decode_air_frame(&frame[..6], &config),
        Err(FrameError::Desync(DesyncError::MissingSyncWord))
    );

    let mut frame = encode_air_frame(&sample_packet(), &config).unwrap();
    frame[0] = 0x55;
    assert!(decode_air_frame(&frame, &config).is_err());
}

/// A frame cut short is reported as soon as the length field is known.
#[test]
fn truncated_air_frame() {
    let config = LinkConfig::default();
    let frame = encode_air_frame(&sample_packet(), &config).unwrap();
    let encoded_len = frame.len() - config.marker_len();

    for cut in [2, 4] {
        let truncated = &frame[..frame.len() - cut];
        let result = decode_air_frame(truncated, &config);
        assert_eq!(
            result,
            Err(FrameError::Desync(DesyncError::EncodedLength {
                expected: encoded_len,
                actual: encoded_len - cut
            }))
        );
        assert!(result.unwrap_err().kind().is_link_corruption());
    }

    // A single chunk is too little to recover the length field.
    assert_eq!(
        decode_air_frame(&frame[..config.marker_len() + 4], &config),
        Err(FrameError::Desync(DesyncError::EncodedLength {
            expected: fec::encoded_len(SPACE_MIN_LENGTH.into()),
            actual: 4
        }))
    );
}

/// A command travels from the host link over the air and back out of the receiving radio's host
/// link unchanged.
#[test]
fn relay_through_both_links() {
    let config = LinkConfig::default();
    let command = ClientPacket::new(0x0102, 77, 4, 18, b"set mode 3").unwrap();
    let host_frame = encode_host_frame(&command);

    let received = decode_host_frame(&host_frame).unwrap();
    let outbound = SpacePacket::from_client(&received, 0).unwrap();
    let air_frame = encode_air_frame(&outbound, &config).unwrap();

    let inbound = decode_air_frame(&air_frame, &config).unwrap();
    let delivered = ClientPacket::from_space(&inbound).unwrap();
    assert_eq!(encode_host_frame(&delivered), host_frame);
}

/// Roundtrip through the full air chain for random packets of every size.
#[test]
fn roundtrip() {
    use rand::{RngCore, SeedableRng};
    use crate::space::SPACE_MAX_PAYLOAD;
    // Note that we always use the same seed for reproducibility.
    let mut rng = rand::rngs::SmallRng::seed_from_u64(42);
    let config = LinkConfig::default();
    let mut buffer = [0u8; SPACE_MAX_PAYLOAD];
    for length in 0..=SPACE_MAX_PAYLOAD {
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
        let frame = encode_air_frame(&packet, &config).unwrap();
        assert_eq!(decode_air_frame(&frame, &config), Ok(packet));
    }
}
