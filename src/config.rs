//! Physical framing configuration of the radio link.

use crate::error::FrameError;

/// Value of every preamble byte (alternating ones and zeros on air).
pub const PREAMBLE_BYTE: u8 = 0xAA;

/// Number of preamble bytes sent by default.
pub const DEFAULT_PREAMBLE_LEN: usize = 4;

/// Sync word marking the start of an air-interface frame.
pub const DEFAULT_SYNC_WORD: [u8; 4] = [0xD3, 0x91, 0xD3, 0x91];

/// Settings shared by both ends of the air interface. Both radios must agree on every field, or
/// frames will not be recovered.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinkConfig {
    /// Number of [`PREAMBLE_BYTE`]s sent ahead of the sync word.
    pub preamble_len: usize,
    pub sync_word: [u8; 4],
    /// Whether frames are protected by forward error correction.
    pub fec: bool,
    /// Whether frames are whitened with the PN9 keystream.
    pub whitening: bool,
}

impl LinkConfig {
    /// Longest preamble the radio can be configured to send.
    pub const MAX_PREAMBLE_LEN: usize = 32;

    pub fn validate(&self) -> Result<(), FrameError> {
        FrameError::check_range(
            "preamble_len",
            u32::try_from(self.preamble_len).unwrap_or(u32::MAX),
            0,
            Self::MAX_PREAMBLE_LEN as u32,
        )
    }

    /// Number of bytes in front of the coded frame: preamble plus sync word.
    pub fn marker_len(&self) -> usize {
        self.preamble_len + self.sync_word.len()
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            preamble_len: DEFAULT_PREAMBLE_LEN,
            sync_word: DEFAULT_SYNC_WORD,
            fec: true,
            whitening: true,
        }
    }
}

#[test]
fn defaults() {
    let config = LinkConfig::default();
    assert_eq!(config.preamble_len, 4);
    assert_eq!(config.sync_word, [0xD3, 0x91, 0xD3, 0x91]);
    assert!(config.fec);
    assert!(config.whitening);
    assert_eq!(config.marker_len(), 8);
    assert_eq!(config.validate(), Ok(()));
}

#[test]
fn preamble_too_long() {
    let config = LinkConfig {
        preamble_len: 33,
        ..LinkConfig::default()
    };
    assert_eq!(
        config.validate(),
        Err(FrameError::OutOfRange {
            field: "preamble_len",
            value: 33,
            min: 0,
            max: 32
        })
    );
}
