//! Packing of unsigned integer fields into a single big-endian 32-bit word.
//!
//! Fields are laid out MSB-first in declaration order: the first field occupies the most
//! significant bits of the word. A [`BitLayout`] fixes the widths once; because its constructor is
//! a `const fn`, declaring a layout whose widths do not add up to exactly 32 bits in a `const`
//! item is rejected at compile time.

/// Width of the word that fields are packed into, in bits.
pub const WORD_BITS: u32 = 32;

/// Ordered list of field widths that together span one 32-bit word.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct BitLayout<const N: usize> {
    widths: [u32; N],
}

impl<const N: usize> BitLayout<N> {
    /// Declares a layout. Panics (at compile time, when used in a `const` item) if any width is
    /// zero or if the widths do not sum to [`WORD_BITS`].
    pub const fn new(widths: [u32; N]) -> Self {
        let mut total = 0;
        let mut i = 0;
        while i < N {
            assert!(widths[i] > 0, "bit fields must be at least one bit wide");
            total += widths[i];
            i += 1;
        }
        assert!(total == WORD_BITS, "bit field widths must add up to 32");
        Self { widths }
    }

    /// Returns the width in bits of every field, in packing order.
    pub const fn widths(&self) -> [u32; N] {
        self.widths
    }

    /// Largest value that fits in field `index`.
    pub const fn max_value(&self, index: usize) -> u32 {
        ((1u64 << self.widths[index]) - 1) as u32
    }

    /// Packs `values` into one word. Every value is expected to fit its field; callers validate
    /// ranges beforehand, and any excess high bits are discarded here rather than bleeding into
    /// the neighbouring field.
    pub fn pack(&self, values: [u32; N]) -> u32 {
        let mut word = 0u64;
        let mut cursor = 0;
        for (value, width) in values.into_iter().zip(self.widths) {
            let mask = (1u64 << width) - 1;
            debug_assert!(u64::from(value) <= mask, "value {value} exceeds {width} bits");
            word |= (u64::from(value) & mask) << (WORD_BITS - cursor - width);
            cursor += width;
        }
        word as u32
    }

    /// Inverse of [`BitLayout::pack`]: isolates every field of `word`, in packing order.
    pub fn unpack(&self, word: u32) -> [u32; N] {
        let mut values = [0u32; N];
        let mut offset = 0;
        for (value, width) in values.iter_mut().zip(self.widths) {
            let shifted = (u64::from(word) << offset) & 0xFFFF_FFFF;
            *value = (shifted >> (WORD_BITS - width)) as u32;
            offset += width;
        }
        values
    }
}

#[test]
fn fields_are_packed_msb_first() {
    const LAYOUT: BitLayout<3> = BitLayout::new([4, 12, 16]);
    assert_eq!(LAYOUT.pack([0xA, 0x123, 0x4567]), 0xA123_4567);
    assert_eq!(LAYOUT.unpack(0xA123_4567), [0xA, 0x123, 0x4567]);
}

#[test]
fn single_field_spans_the_whole_word() {
    const LAYOUT: BitLayout<1> = BitLayout::new([32]);
    assert_eq!(LAYOUT.max_value(0), u32::MAX);
    assert_eq!(LAYOUT.pack([0xDEAD_BEEF]), 0xDEAD_BEEF);
    assert_eq!(LAYOUT.unpack(0xDEAD_BEEF), [0xDEAD_BEEF]);
}

#[test]
fn one_bit_fields() {
    const LAYOUT: BitLayout<3> = BitLayout::new([1, 30, 1]);
    assert_eq!(LAYOUT.pack([1, 0, 1]), 0x8000_0001);
    assert_eq!(LAYOUT.unpack(0x8000_0001), [1, 0, 1]);
    assert_eq!(LAYOUT.unpack(0x7FFF_FFFE), [0, LAYOUT.max_value(1), 0]);
}

#[test]
#[should_panic(expected = "bit field widths must add up to 32")]
fn short_layout_is_rejected() {
    let _ = BitLayout::new([8, 8, 8]);
}

/// Every word survives an unpack followed by a pack, for an uneven layout.
#[test]
fn unpack_then_pack_is_identity() {
    use rand::{RngCore, SeedableRng};
    // Note that we always use the same seed for reproducibility.
    let mut rng = rand::rngs::SmallRng::seed_from_u64(42);
    const LAYOUT: BitLayout<6> = BitLayout::new([2, 5, 5, 6, 6, 8]);
    for _ in 0..10_000 {
        let word = rng.next_u32();
        let fields = LAYOUT.unpack(word);
        for (index, field) in fields.iter().enumerate() {
            assert!(*field <= LAYOUT.max_value(index));
        }
        assert_eq!(LAYOUT.pack(fields), word);
    }
}
