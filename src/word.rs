use std::fmt;
use std::ops::{Add, BitAnd, BitOr, BitXor, Not, Sub};

use crate::error::EncodingError;

/// Widest word that can be represented.
pub const MAX_WIDTH: u32 = 64;

/// Fixed-width two's-complement bit vector.
///
/// Bit `i` of `bits` is bit `i` of the word, so storage is least-significant-bit-first while
/// every string conversion is most-significant-bit-first. All results are truncated to `len`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Word {
    bits: u64,
    len: u32,
}

impl Word {
    /// All-zero word of `len` bits.
    pub fn zero(len: u32) -> Self {
        assert!(
            (1..=MAX_WIDTH).contains(&len),
            "word width must be between 1 and {MAX_WIDTH} bits, got {len}"
        );
        Word { bits: 0, len }
    }

    /// Two's-complement encoding of `value`, keeping only the low `len` bits.
    pub fn from_signed(value: i64, len: u32) -> Self {
        let mut word = Word::zero(len);
        word.bits = value as u64 & word.mask();
        word
    }

    pub fn from_unsigned(value: u64, len: u32) -> Self {
        let mut word = Word::zero(len);
        word.bits = value & word.mask();
        word
    }

    /// Parse a most-significant-bit-first string of `0`/`1` characters, left-padded with zeros.
    ///
    /// Strings longer than `len` keep their low `len` bits.
    pub fn from_bit_str(bits: &str, len: u32) -> Result<Self, EncodingError> {
        let mut value = 0u64;
        for (position, character) in bits.chars().enumerate() {
            let bit = match character {
                '0' => 0,
                '1' => 1,
                _ => {
                    return Err(EncodingError {
                        input: bits.to_owned(),
                        position,
                        character,
                    })
                }
            };
            value = (value << 1) | bit;
        }
        Ok(Word::from_unsigned(value, len))
    }

    /// Build from a least-significant-bit-first slice. The slice length is the width.
    pub fn from_bits(bits: &[bool]) -> Self {
        let mut word = Word::zero(bits.len() as u32);
        for (i, bit) in bits.iter().enumerate() {
            if *bit {
                word.bits |= 1 << i;
            }
        }
        word
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_zero(&self) -> bool {
        self.bits == 0
    }

    /// Bit `i`, counted from the least-significant end.
    pub fn bit(&self, i: u32) -> bool {
        i < self.len && (self.bits >> i) & 1 == 1
    }

    pub fn to_unsigned(&self) -> u64 {
        self.bits
    }

    pub fn to_signed(&self) -> i64 {
        let unused = 64 - self.len;
        ((self.bits << unused) as i64) >> unused
    }

    /// Most-significant-bit-first string of exactly `len` characters.
    pub fn to_bit_string(&self) -> String {
        (0..self.len)
            .rev()
            .map(|i| if self.bit(i) { '1' } else { '0' })
            .collect()
    }

    /// Copy `other` into this word, truncated or sign-extended to this width.
    pub fn set(&mut self, other: Word) {
        self.bits = other.to_signed() as u64 & self.mask();
    }

    pub fn add(&self, other: Word) -> Word {
        self.with(self.bits.wrapping_add(self.operand(other)))
    }

    pub fn subtract(&self, other: Word) -> Word {
        self.with(self.bits.wrapping_sub(self.operand(other)))
    }

    pub fn invert(&self) -> Word {
        self.with(!self.bits)
    }

    pub fn and(&self, other: Word) -> Word {
        self.with(self.bits & self.operand(other))
    }

    pub fn or(&self, other: Word) -> Word {
        self.with(self.bits | self.operand(other))
    }

    pub fn xor(&self, other: Word) -> Word {
        self.with(self.bits ^ self.operand(other))
    }

    pub fn inc(&self) -> Word {
        self.with(self.bits.wrapping_add(1))
    }

    pub fn dec(&self) -> Word {
        self.with(self.bits.wrapping_sub(1))
    }

    /// Logical shift. Positive `n` moves bits toward the most-significant end, negative toward
    /// the least-significant end. Vacated bits are zero.
    pub fn shift(&self, n: i64) -> Word {
        if n.unsigned_abs() >= self.len as u64 {
            return Word::zero(self.len);
        }
        if n >= 0 {
            self.with(self.bits << n)
        } else {
            self.with(self.bits >> -n)
        }
    }

    /// Sign-preserving shift, computed on the signed value.
    pub fn arithmetic_shift(&self, n: i64) -> Word {
        let value = self.to_signed();
        let shifted = if n >= 0 {
            if n >= self.len as i64 {
                0
            } else {
                value << n
            }
        } else {
            // Shifting by 63 already saturates to the sign.
            value >> n.unsigned_abs().min(63)
        };
        Word::from_signed(shifted, self.len)
    }

    fn mask(&self) -> u64 {
        if self.len == MAX_WIDTH {
            u64::MAX
        } else {
            (1 << self.len) - 1
        }
    }

    fn with(&self, bits: u64) -> Word {
        Word {
            bits: bits & self.mask(),
            len: self.len,
        }
    }

    /// Right-hand operand resized to this width.
    fn operand(&self, other: Word) -> u64 {
        other.to_signed() as u64 & self.mask()
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bit_string())
    }
}

impl Add for Word {
    type Output = Word;
    fn add(self, rhs: Word) -> Word {
        Word::add(&self, rhs)
    }
}

impl Sub for Word {
    type Output = Word;
    fn sub(self, rhs: Word) -> Word {
        self.subtract(rhs)
    }
}

impl Not for Word {
    type Output = Word;
    fn not(self) -> Word {
        self.invert()
    }
}

impl BitAnd for Word {
    type Output = Word;
    fn bitand(self, rhs: Word) -> Word {
        self.and(rhs)
    }
}

impl BitOr for Word {
    type Output = Word;
    fn bitor(self, rhs: Word) -> Word {
        self.or(rhs)
    }
}

impl BitXor for Word {
    type Output = Word;
    fn bitxor(self, rhs: Word) -> Word {
        self.xor(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w16(value: i64) -> Word {
        Word::from_signed(value, 16)
    }

    #[test]
    fn from_signed_keeps_width() {
        #[rustfmt::skip]
        let cases: &[(i64, u32, &str)] = &[
            // (value, len, expected)
            (0,       3, "000"),
            (3,       3, "011"),
            (-1,      3, "111"),
            (-4,      3, "100"),
            (9,       3, "001"),
            (-1,      8, "11111111"),
            (300,     8, "00101100"),
            (-32768, 16, "1000000000000000"),
            (65536,  16, "0000000000000000"),
            (70000,  16, "0001000101110000"),
        ];
        for (value, len, expected) in cases {
            let word = Word::from_signed(*value, *len);
            assert_eq!(word.len(), *len);
            assert_eq!(word.to_bit_string(), *expected, "from_signed({value}, {len})");
        }
    }

    #[test]
    fn signed_and_unsigned_views() {
        let word = Word::from_bit_str("1111111111111110", 16).unwrap();
        assert_eq!(word.to_signed(), -2);
        assert_eq!(word.to_unsigned(), 0xfffe);
        assert_eq!(w16(i16::MAX as i64).to_signed(), 32767);
        assert_eq!(w16(i16::MIN as i64).to_signed(), -32768);
        assert_eq!(Word::from_signed(-1, 64).to_signed(), -1);
        assert_eq!(Word::from_signed(-1, 64).to_unsigned(), u64::MAX);
    }

    #[test]
    fn from_bit_str_pads_and_rejects() {
        assert_eq!(Word::from_bit_str("101", 8).unwrap().to_bit_string(), "00000101");
        assert_eq!(Word::from_bit_str("", 4).unwrap(), Word::zero(4));
        assert_eq!(Word::from_bit_str("110101", 4).unwrap().to_bit_string(), "0101");

        let error = Word::from_bit_str("10a1", 8).unwrap_err();
        assert_eq!(error.position, 2);
        assert_eq!(error.character, 'a');
    }

    #[test]
    fn from_bits_is_lsb_first() {
        let word = Word::from_bits(&[true, false, false, true, true]);
        assert_eq!(word.len(), 5);
        assert_eq!(word.to_bit_string(), "11001");
        assert!(word.bit(0));
        assert!(!word.bit(1));
        assert!(!word.bit(7));
    }

    #[test]
    fn invert_twice_is_identity() {
        for value in [0, 1, -1, 1234, -32768, 32767] {
            let word = w16(value);
            assert_eq!(word.invert().invert().to_bit_string(), word.to_bit_string());
        }
    }

    #[test]
    fn arithmetic_wraps() {
        let all_ones = Word::from_bit_str("1111111111111111", 16).unwrap();
        assert_eq!(all_ones.add(w16(1)), w16(0));
        assert_eq!(w16(i16::MAX as i64).inc(), w16(i16::MIN as i64));
        assert_eq!(w16(0).dec(), w16(-1));
        assert_eq!(w16(5).subtract(w16(7)).to_signed(), -2);
        assert_eq!(w16(234) + w16(67), w16(301));
        assert_eq!(w16(0b1100) & w16(0b1010), w16(0b1000));
        assert_eq!(w16(0b1100) | w16(0b1010), w16(0b1110));
        assert_eq!(w16(0b1100) ^ w16(0b1010), w16(0b0110));
        assert_eq!(!w16(0), w16(-1));
    }

    #[test]
    fn mixed_width_operands_are_resized() {
        let flags = Word::from_signed(-1, 3);
        assert_eq!(w16(10).add(flags).to_signed(), 9);
        assert_eq!(flags.add(w16(9)).to_bit_string(), "000");
    }

    #[test]
    fn shift_boundaries() {
        let word = w16(0b1011);
        assert_eq!(word.shift(0), word);
        assert_eq!(word.shift(16), w16(0));
        assert_eq!(word.shift(-16), w16(0));
        assert_eq!(word.shift(100), w16(0));
        assert_eq!(word.shift(2).to_unsigned(), 0b101100);
        assert_eq!(word.shift(-2).to_unsigned(), 0b10);
        assert_eq!(w16(-1).shift(15).to_bit_string(), "1000000000000000");
    }

    #[test]
    fn arithmetic_shift_keeps_sign() {
        assert_eq!(w16(-8).arithmetic_shift(-1).to_signed(), -4);
        assert_eq!(w16(-8).shift(-1).to_signed(), 0x7ffc);
        assert_eq!(w16(8).arithmetic_shift(-1), w16(8).shift(-1));
        assert_eq!(w16(3).arithmetic_shift(2), w16(3).shift(2));
        assert_eq!(w16(-8).arithmetic_shift(-40).to_signed(), -1);
        assert_eq!(w16(8).arithmetic_shift(-40), w16(0));
        assert_eq!(w16(1).arithmetic_shift(16), w16(0));
    }

    #[test]
    fn set_copies_into_own_width() {
        let mut flags = Word::zero(3);
        flags.set(w16(0b1101));
        assert_eq!(flags.len(), 3);
        assert_eq!(flags.to_bit_string(), "101");

        let mut register = w16(7);
        register.set(Word::from_signed(-1, 3));
        assert_eq!(register.to_signed(), -1);
    }
}
