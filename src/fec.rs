//! Forward error correction as performed by the radio modem.
//!
//! The code is a rate-1/2 convolutional code with constraint length 4: every input bit produces a
//! two-bit symbol that depends on the bit itself and the three bits before it. Before encoding,
//! the two-byte trellis terminator `0B 0B` is appended to the data. The convolved stream is
//! zero-padded to a whole number of four-byte blocks, and every block is interleaved (its sixteen
//! symbols are transposed as a 4x4 matrix) to spread burst errors.
//!
//! Decoding uses a Viterbi decoder that consumes one interleaver block at a time. Each block
//! carries sixteen symbols, so sixteen decoded bits, but the decoder holds back the most recent 24
//! bits of its survivor path before committing to a byte. Hence the first two blocks of a frame
//! produce at most one byte between them, and the trailing bytes of a frame only appear once the
//! decoder is [finished](FecDecoder::finish).

use alloc::vec::Vec;

use crate::endian::{pack_u16_be, pack_u32_be, unpack_u32_be};
use crate::error::{DesyncError, FrameError};

/// Appended to the data before encoding to drive the encoder into a known state.
pub const TRELLIS_TERMINATOR: [u8; 2] = [0x0B, 0x0B];

/// Size of one interleaver block, and hence of every chunk submitted to the [`FecDecoder`].
pub const CHUNK_SIZE: usize = 4;

/// Output symbol for every combination of the three previous input bits (high) and the current
/// input bit (low).
const ENCODE_TABLE: [u8; 16] = [0, 3, 1, 2, 3, 0, 2, 1, 3, 0, 2, 1, 0, 3, 1, 2];

const NUM_STATES: usize = 8;

/// Number of survivor path bits accumulated before the oldest byte is emitted.
const PATH_BITS: u32 = 32;

/// Starting cost for every state except the all-zero state the encoder starts in.
const UNREACHED_COST: u16 = 100;

/// Number of bytes that [`encode`] produces for `data_len` bytes of input.
pub fn encoded_len(data_len: usize) -> usize {
    (2 * (data_len + TRELLIS_TERMINATOR.len())).div_ceil(CHUNK_SIZE) * CHUNK_SIZE
}

/// Convolutionally encodes and interleaves `data`.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(encoded_len(data.len()));
    let mut register: u16 = 0;
    for &byte in data.iter().chain(TRELLIS_TERMINATOR.iter()) {
        register = (register & 0x700) | u16::from(byte);
        let mut symbols: u16 = 0;
        for _ in 0..8 {
            symbols = (symbols << 2) | u16::from(ENCODE_TABLE[usize::from(register >> 7)]);
            register = (register << 1) & 0x7FF;
        }
        encoded.extend_from_slice(&pack_u16_be(symbols));
    }

    encoded.resize(encoded_len(data.len()), 0);
    for block in encoded.chunks_exact_mut(CHUNK_SIZE) {
        interleave(block);
    }
    encoded
}

/// Decodes a complete encoded frame of which the original length is known.
///
/// The length cannot be recovered from the encoded bytes alone: an odd number of data bytes is
/// padded with an extra zero byte, so `n` and `n + 1` data bytes encode to the same size.
pub fn decode(encoded: &[u8], data_len: usize) -> Result<Vec<u8>, FrameError> {
    let expected = encoded_len(data_len);
    if encoded.len() != expected {
        return Err(DesyncError::EncodedLength {
            expected,
            actual: encoded.len(),
        }
        .into());
    }

    let mut decoder = FecDecoder::new();
    let mut decoded = decoder.prime()?;
    for chunk in encoded.chunks_exact(CHUNK_SIZE) {
        decoded.extend(decoder.decode_chunk(chunk)?);
    }
    decoded.extend(decoder.finish());
    decoded.truncate(data_len);
    Ok(decoded)
}

fn interleave(block: &mut [u8]) {
    let mut word: u32 = 0;
    for j in 0..16 {
        let symbol = (block[3 - (j & 0x03)] >> (2 * (j >> 2))) & 0x03;
        word = (word << 2) | u32::from(symbol);
    }
    block.copy_from_slice(&pack_u32_be(word));
}

fn deinterleave(word: u32) -> [u8; CHUNK_SIZE] {
    let mut block = [0u8; CHUNK_SIZE];
    for j in 0..16 {
        let symbol = ((word >> (2 * (15 - j))) & 0x03) as u8;
        block[3 - (j & 0x03)] |= symbol << (2 * (j >> 2));
    }
    block
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
enum DecoderState {
    /// Constructed, handshake not yet performed.
    Unprimed,
    /// Handshake performed, no chunk seen yet.
    Primed,
    /// At least one chunk decoded.
    Accepting,
}

/// Incremental Viterbi decoder.
///
/// A decoder belongs to a single frame. It must be [primed](FecDecoder::prime) once, after which
/// it accepts chunks of exactly [`CHUNK_SIZE`] bytes for as long as the caller keeps supplying
/// them; it may be dropped at any point.
#[derive(Clone, Debug)]
pub struct FecDecoder {
    state: DecoderState,
    costs: [u16; NUM_STATES],
    paths: [u32; NUM_STATES],
    path_bits: u32,
}

impl FecDecoder {
    pub fn new() -> Self {
        let mut costs = [UNREACHED_COST; NUM_STATES];
        costs[0] = 0;
        Self {
            state: DecoderState::Unprimed,
            costs,
            paths: [0; NUM_STATES],
            path_bits: 0,
        }
    }

    /// Initial handshake. Never yields data; only the first call succeeds.
    pub fn prime(&mut self) -> Result<Vec<u8>, FrameError> {
        if self.state != DecoderState::Unprimed {
            return Err(DesyncError::AlreadyPrimed.into());
        }
        self.state = DecoderState::Primed;
        Ok(Vec::new())
    }

    pub fn is_primed(&self) -> bool {
        self.state != DecoderState::Unprimed
    }

    /// Number of decoded bits held back in the survivor path.
    pub fn pending_bits(&self) -> u32 {
        self.path_bits
    }

    /// Decodes one interleaver block and returns the bytes that became final, if any.
    pub fn decode_chunk(&mut self, chunk: &[u8]) -> Result<Vec<u8>, FrameError> {
        if self.state == DecoderState::Unprimed {
            return Err(DesyncError::NotPrimed.into());
        }
        let word = unpack_u32_be(chunk).map_err(|_| DesyncError::ChunkSize {
            expected: CHUNK_SIZE,
            actual: chunk.len(),
        })?;
        self.state = DecoderState::Accepting;

        let mut decoded = Vec::new();
        for byte in deinterleave(word) {
            for shift in [6, 4, 2, 0] {
                self.step((byte >> shift) & 0x03);
                if self.path_bits == PATH_BITS {
                    let best = self.best_state();
                    decoded.push((self.paths[best] >> 24) as u8);
                    self.path_bits -= 8;
                }
            }
        }

        let minimum = self.costs.iter().copied().min().unwrap_or(0);
        for cost in self.costs.iter_mut() {
            *cost -= minimum;
        }

        tracing::trace!(
            emitted = decoded.len(),
            pending_bits = self.path_bits,
            "decoded FEC chunk"
        );
        Ok(decoded)
    }

    /// Flushes the whole bytes still held in the survivor path. At the end of a frame these are
    /// the last data bytes followed by the trellis terminator and any padding.
    pub fn finish(self) -> Vec<u8> {
        let path = self.paths[self.best_state()];
        let mut remaining = self.path_bits;
        let mut flushed = Vec::with_capacity((remaining / 8) as usize);
        while remaining >= 8 {
            flushed.push((path >> (remaining - 8)) as u8);
            remaining -= 8;
        }
        flushed
    }

    /// One trellis step: extends the survivor of every state with the cheapest predecessor.
    fn step(&mut self, symbol: u8) {
        let mut costs = [0u16; NUM_STATES];
        let mut paths = [0u32; NUM_STATES];
        for next in 0..NUM_STATES {
            let bit = next & 0x01;
            let mut best: Option<(u16, usize)> = None;
            for previous in [next >> 1, (next >> 1) | 0x04] {
                let expected = ENCODE_TABLE[(previous << 1) | bit];
                let cost = self.costs[previous] + (symbol ^ expected).count_ones() as u16;
                if best.is_none_or(|(lowest, _)| cost < lowest) {
                    best = Some((cost, previous));
                }
            }
            if let Some((cost, previous)) = best {
                costs[next] = cost;
                paths[next] = (self.paths[previous] << 1) | bit as u32;
            }
        }
        self.costs = costs;
        self.paths = paths;
        self.path_bits += 1;
    }

    fn best_state(&self) -> usize {
        let mut best = 0;
        for state in 1..NUM_STATES {
            if self.costs[state] < self.costs[best] {
                best = state;
            }
        }
        best
    }
}

impl Default for FecDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[test]
fn encoded_sizes() {
    assert_eq!(encoded_len(0), 4);
    assert_eq!(encoded_len(1), 8);
    assert_eq!(encoded_len(2), 8);
    assert_eq!(encoded_len(3), 12);
    assert_eq!(encoded_len(4), 12);
    assert_eq!(encoded_len(9), 24);
    assert_eq!(encode(&[]).len(), 4);
}

#[test]
fn encode_reference_vector() {
    let encoded = encode(b"ihgfedcba");
    assert_eq!(
        encoded,
        [
            0xE2, 0xDE, 0x8B, 0xDC, 0xA6, 0x9A, 0x33, 0x10, 0xE2, 0x56, 0x00, 0x20, 0x6A, 0xDE,
            0xFF, 0x23, 0x4E, 0x32, 0x7C, 0xD3, 0x04, 0x03, 0x04, 0x0E,
        ]
    );
}

/// Chunk-by-chunk decoding of an encoded "fec": the first chunk only fills the survivor path.
#[test]
fn decode_reference_chunks() {
    let encoded = b"*j\x03\x00J=L\xe2\x04\x03\x04\x0e";
    assert_eq!(encode(b"fec"), encoded);

    let mut decoder = FecDecoder::new();
    assert_eq!(decoder.prime(), Ok(Vec::new()));
    let chunk0 = decoder.decode_chunk(&encoded[0..4]).unwrap();
    let chunk1 = decoder.decode_chunk(&encoded[4..8]).unwrap();
    let chunk2 = decoder.decode_chunk(&encoded[8..12]).unwrap();

    assert_eq!(chunk0, b"");
    assert_eq!(chunk1, b"f");
    assert_eq!(chunk2, b"ec");
    assert_eq!(decoder.pending_bits(), 24);
    let flushed = decoder.finish();
    assert_eq!(flushed.len(), 3);
    assert_eq!(flushed[0], TRELLIS_TERMINATOR[0]);
}

#[test]
fn interleaving_is_invertible() {
    use rand::{RngCore, SeedableRng};
    // Note that we always use the same seed for reproducibility.
    let mut rng = rand::rngs::SmallRng::seed_from_u64(42);
    for _ in 0..1000 {
        let mut block = [0u8; CHUNK_SIZE];
        rng.fill_bytes(&mut block);
        let original = block;
        interleave(&mut block);
        assert_eq!(deinterleave(u32::from_be_bytes(block)), original);
    }
}

/// Decoding an encoded buffer yields the original bytes for every length, including the even
/// lengths whose last byte is only released by `finish()`.
#[test]
fn roundtrip() {
    use rand::{RngCore, SeedableRng};
    // Note that we always use the same seed for reproducibility.
    let mut rng = rand::rngs::SmallRng::seed_from_u64(42);
    let mut buffer = [0u8; 300];
    for length in 0..buffer.len() {
        rng.fill_bytes(&mut buffer[..length]);
        let encoded = encode(&buffer[..length]);
        assert_eq!(encoded.len(), encoded_len(length));
        assert_eq!(
            decode(&encoded, length).as_deref(),
            Ok(&buffer[..length]),
            "length {length}"
        );
    }
}

/// The Viterbi decoder corrects any single flipped bit in these frames.
#[test]
fn single_bit_errors_are_corrected() {
    use rand::{RngCore, SeedableRng};
    // Note that we always use the same seed for reproducibility.
    let mut rng = rand::rngs::SmallRng::seed_from_u64(42);
    for length in [1usize, 2, 5, 10, 17, 32] {
        let mut data = alloc::vec![0u8; length];
        rng.fill_bytes(&mut data);
        let encoded = encode(&data);
        for index in 0..encoded.len() {
            for bit in 0..8 {
                let mut corrupted = encoded.clone();
                corrupted[index] ^= 1 << bit;
                assert_eq!(
                    decode(&corrupted, length),
                    Ok(data.clone()),
                    "length {length}, byte {index}, bit {bit}"
                );
            }
        }
    }
}

#[test]
fn chunks_before_priming_are_rejected() {
    let mut decoder = FecDecoder::new();
    assert!(!decoder.is_primed());
    assert_eq!(
        decoder.decode_chunk(&[0, 0, 0, 0]),
        Err(FrameError::Desync(DesyncError::NotPrimed))
    );
    decoder.prime().unwrap();
    assert_eq!(
        decoder.prime(),
        Err(FrameError::Desync(DesyncError::AlreadyPrimed))
    );
}

#[test]
fn short_chunks_are_rejected() {
    let mut decoder = FecDecoder::new();
    decoder.prime().unwrap();
    assert_eq!(
        decoder.decode_chunk(&[0x2A, 0x6A, 0x03]),
        Err(FrameError::Desync(DesyncError::ChunkSize {
            expected: CHUNK_SIZE,
            actual: 3
        }))
    );
    assert_eq!(decoder.pending_bits(), 0);
}

#[test]
fn wrong_encoded_length_is_rejected() {
    let encoded = encode(b"ihgfedcba");
    assert_eq!(
        decode(&encoded[..20], 9),
        Err(FrameError::Desync(DesyncError::EncodedLength {
            expected: 24,
            actual: 20
        }))
    );
}
