#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
//! Packet framing for a small-satellite UHF radio link. Two packet formats are handled: the client
//! packet exchanged with the host computer over the serial link, and the space packet sent over
//! the air. Around the space packet sit the link-layer codings applied by the radio: a
//! convolutional forward error correction code with interleaving, and PN9 data whitening.
//!
//! Readers of the code are advised to start with the `framing` module, which chains all of these
//! steps together for both directions. The individual codecs are usable on their own: every
//! decoder validates its input and reports problems through the single `FrameError` type, whose
//! `kind` tells callers whether a frame was malformed on the wire or simply out of range.
//!
//! A CSP-style addressed header is also provided for payloads that carry Cubesat Space Protocol
//! routing information.

extern crate alloc;

pub mod bitfield;
pub mod client;
pub mod config;
pub mod crc;
pub mod csp;
pub mod endian;
pub mod error;
pub mod fec;
pub mod framing;
pub mod space;
pub mod whitening;

pub use client::{ClientPacket, ClientPacketHeader};
pub use config::LinkConfig;
pub use csp::{CspHeader, CspPacket, Priority};
pub use error::{DesyncError, ErrorKind, FrameError};
pub use fec::FecDecoder;
pub use framing::{decode_air_frame, decode_host_frame, encode_air_frame, encode_host_frame};
pub use space::{SpacePacket, SpacePacketFooter, SpacePacketHeader};
