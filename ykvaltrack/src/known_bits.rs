//! The known-bits lattice.

use crate::arbbitint::ArbBitInt;
use std::fmt;

/// Known bits for a single integer (or pointer) value.
///
/// In short:
/// | zeros | ones | knownbit |
/// |-------|------|----------|
/// | 0     | 0    | ?        |
/// | 1     | 0    | 0        |
/// | 0     | 1    | 1        |
/// | 1     | 1    | illegal  |
///
/// To ensure monotonicity, transitions from `?` to `0` or `1` are valid, but not the other way
/// around. `illegal` occurs when a bit is known to be both `0` and `1`, which is impossible in a
/// valid program: it indicates a bug in a transfer function.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KnownBits {
    /// Bits known to be zero.
    pub zeros: ArbBitInt,
    /// Bits known to be one.
    pub ones: ArbBitInt,
}

impl KnownBits {
    /// Constructs a `KnownBits` of `bitw` bits about which nothing is known.
    pub fn unknown(bitw: u32) -> Self {
        KnownBits {
            zeros: ArbBitInt::zero(bitw),
            ones: ArbBitInt::zero(bitw),
        }
    }

    /// Constructs a `KnownBits` where every bit is known and matches `num`.
    pub fn from_const(num: &ArbBitInt) -> Self {
        KnownBits {
            zeros: num.bitneg(),
            ones: num.clone(),
        }
    }

    /// Bitwidth of the underlying value.
    pub fn bitw(&self) -> u32 {
        debug_assert_eq!(self.zeros.bitw(), self.ones.bitw());
        self.ones.bitw()
    }

    /// Check that no bit is claimed to be both zero and one.
    pub(crate) fn assert_disjoint(&self) {
        debug_assert!(
            self.zeros.bitand(&self.ones).is_zero(),
            "Bits known to be zero and one: zeros={} ones={}",
            self.zeros,
            self.ones
        );
    }

    /// Keep only the facts which hold in both `self` and `other`: the result of merging two
    /// control flow paths.
    pub fn intersect(&self, other: &KnownBits) -> KnownBits {
        KnownBits {
            zeros: self.zeros.bitand(&other.zeros),
            ones: self.ones.bitand(&other.ones),
        }
    }

    /// Forget every fact outside of `mask`.
    pub fn restrict(&self, mask: &ArbBitInt) -> KnownBits {
        KnownBits {
            zeros: self.zeros.bitand(mask),
            ones: self.ones.bitand(mask),
        }
    }

    /// Return an integer with a bit set for every known bit.
    pub fn knowns(&self) -> ArbBitInt {
        self.zeros.bitor(&self.ones)
    }

    /// Returns true if all bits are known.
    pub fn all_known(&self) -> bool {
        self.knowns().is_all_ones()
    }

    /// If all bits are known, return the constant value.
    pub fn to_const(&self) -> Option<ArbBitInt> {
        self.all_known().then(|| self.ones.clone())
    }

    pub fn is_known_negative(&self) -> bool {
        self.ones.is_negative()
    }

    pub fn is_known_non_negative(&self) -> bool {
        self.zeros.is_negative()
    }

    /// How many of the low bits are known to be zero?
    pub fn known_trailing_zeros(&self) -> u32 {
        self.zeros.count_trailing_ones()
    }

    /// How many of the high bits are known to be zero?
    pub fn known_leading_zeros(&self) -> u32 {
        self.zeros.count_leading_ones()
    }

    /// Two `KnownBits` describe different values if the bits that are known in both differ.
    pub fn definitely_ne(&self, other: &Self) -> bool {
        debug_assert_eq!(self.bitw(), other.bitw());
        let knowns = self.knowns().bitand(&other.knowns());
        knowns.bitand(&self.ones) != knowns.bitand(&other.ones)
    }

    /// Does the concrete value `val` satisfy every fact in `self`?
    pub fn admits(&self, val: &ArbBitInt) -> bool {
        val.bitand(&self.zeros).is_zero() && val.bitand(&self.ones) == self.ones
    }
}

impl fmt::Display for KnownBits {
    /// Format as a binary string, most significant bit first, with `?` for unknown bits.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in (0..self.bitw()).rev() {
            let c = match (self.zeros.bit(i), self.ones.bit(i)) {
                (true, false) => '0',
                (false, true) => '1',
                (false, false) => '?',
                (true, true) => '!',
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// What is known about the sign bit of a value. At most one field can be true.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SignBit {
    pub non_negative: bool,
    pub negative: bool,
}
