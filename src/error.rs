//! Error taxonomy shared by every codec in this crate.
//!
//! All codec operations return a [`FrameError`] on failure. The variants are grouped into five
//! kinds (see [`ErrorKind`]) so that callers can tell apart input they may correct and retry
//! (range, length and integrity failures) from signs of a corrupted radio link (checksum and
//! desynchronisation failures), which are typically handled by link-level retransmission.

use thiserror::Error;

/// Representation of the set of errors that may be encountered while encoding or decoding any of
/// the frames in this crate. Marked as non-exhaustive to permit extension with additional semantic
/// errors in the future without breaking API.
#[non_exhaustive]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Error)]
pub enum FrameError {
    /// Returned when a field value lies outside of its declared bit or byte range. Values are
    /// never clamped or wrapped into range.
    #[error("{field} out of range ({value} not in {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    /// Returned when a fixed-size span does not have exactly the expected number of bytes.
    #[error("{frame} must be exactly {expected} bytes, got {actual}")]
    WrongLength {
        frame: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Returned when a variable-size span is smaller than the minimum its frame requires.
    #[error("{frame} requires at least {minimum} bytes, got {actual}")]
    TooShort {
        frame: &'static str,
        minimum: usize,
        actual: usize,
    },
    /// Returned when the length field stored in a decoded header disagrees with the number of
    /// bytes actually received.
    #[error("{frame} length field says {declared}, but the frame implies {actual}")]
    LengthMismatch {
        frame: &'static str,
        declared: usize,
        actual: usize,
    },
    /// Returned when the CRC16 stored in a space packet footer disagrees with the CRC16 computed
    /// over the received header and payload.
    #[error("checksum mismatch (stored {stored:#06x}, computed {computed:#06x})")]
    ChecksumMismatch { stored: u16, computed: u16 },
    /// Returned when the channel decoding chain loses track of the frame structure.
    #[error(transparent)]
    Desync(#[from] DesyncError),
}

/// Errors signalling that a receiver is out of step with the incoming byte stream.
#[non_exhaustive]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Error)]
pub enum DesyncError {
    /// The FEC decoder only accepts chunks of exactly one interleaver block.
    #[error("FEC chunk must be {expected} bytes, got {actual}")]
    ChunkSize { expected: usize, actual: usize },
    /// A chunk was submitted before the decoder handshake.
    #[error("FEC decoder received a chunk before it was primed")]
    NotPrimed,
    /// The decoder handshake may only be performed once per decoder.
    #[error("FEC decoder was already primed")]
    AlreadyPrimed,
    /// The encoded frame does not have the size implied by its decoded length.
    #[error("encoded frame is {actual} bytes, its length field implies {expected}")]
    EncodedLength { expected: usize, actual: usize },
    /// The preamble and sync word were not found at the start of an air-interface frame.
    #[error("air frame does not start with the preamble and sync word")]
    MissingSyncWord,
    /// The attached sync marker was not found at the start of a host-link frame.
    #[error("host frame does not start with the attached sync marker")]
    MissingAsm,
}

/// The five-way classification of [`FrameError`]s.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorKind {
    Range,
    Length,
    Integrity,
    Checksum,
    Desync,
}

impl ErrorKind {
    /// Checksum and desynchronisation failures indicate that bytes were damaged or lost between
    /// the two radios. All other kinds point at invalid input on the local side.
    pub fn is_link_corruption(&self) -> bool {
        matches!(self, ErrorKind::Checksum | ErrorKind::Desync)
    }
}

impl FrameError {
    /// Returns the kind of failure this error represents.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameError::OutOfRange { .. } => ErrorKind::Range,
            FrameError::WrongLength { .. } | FrameError::TooShort { .. } => ErrorKind::Length,
            FrameError::LengthMismatch { .. } => ErrorKind::Integrity,
            FrameError::ChecksumMismatch { .. } => ErrorKind::Checksum,
            FrameError::Desync(_) => ErrorKind::Desync,
        }
    }

    /// Shorthand used by the codecs for range validation of unsigned fields.
    pub(crate) fn check_range(
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    ) -> Result<(), FrameError> {
        if value < min || value > max {
            return Err(FrameError::OutOfRange {
                field,
                value,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Shorthand used by the codecs for fixed-size spans.
    pub(crate) fn check_exact(
        frame: &'static str,
        expected: usize,
        bytes: &[u8],
    ) -> Result<(), FrameError> {
        if bytes.len() != expected {
            return Err(FrameError::WrongLength {
                frame,
                expected,
                actual: bytes.len(),
            });
        }
        Ok(())
    }
}

#[test]
fn kinds_separate_local_from_link_failures() {
    let range = FrameError::OutOfRange {
        field: "priority",
        value: 4,
        min: 0,
        max: 3,
    };
    let checksum = FrameError::ChecksumMismatch {
        stored: 0x1234,
        computed: 0x4321,
    };
    let desync = FrameError::from(DesyncError::NotPrimed);

    assert_eq!(range.kind(), ErrorKind::Range);
    assert!(!range.kind().is_link_corruption());
    assert_eq!(checksum.kind(), ErrorKind::Checksum);
    assert!(checksum.kind().is_link_corruption());
    assert_eq!(desync.kind(), ErrorKind::Desync);
    assert!(desync.kind().is_link_corruption());
}

#[test]
fn range_check_is_inclusive() {
    assert!(FrameError::check_range("port", 1, 0, 1).is_ok());
    assert!(FrameError::check_range("length", 10, 10, 251).is_ok());
    assert_eq!(
        FrameError::check_range("length", 252, 10, 251),
        Err(FrameError::OutOfRange {
            field: "length",
            value: 252,
            min: 10,
            max: 251
        })
    );
    assert_eq!(
        FrameError::check_range("length", 9, 10, 251)
            .unwrap_err()
            .kind(),
        ErrorKind::Range
    );
}
