//! An integer of an arbitrary, dynamic, bit width.
//!
//! This hides away the underlying representation, and forces the user to consider whether they
//! want to zero or sign extend the underlying the integer whenever they want access to a
//! Rust-level integer.
//!
//! Currently only bit widths from 1 to 64 (inclusive) are supported.

use std::{
    fmt,
    ops::{BitAnd, BitOr, BitXor},
};

/// Return a `u64` with the low `bitw` bits set.
fn mask(bitw: u32) -> u64 {
    debug_assert!(bitw > 0 && bitw <= 64);
    u64::MAX >> (64 - bitw)
}

/// An integer of an arbitrary, dynamic, bit width.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ArbBitInt {
    bitw: u32,
    /// The underlying value. Bits above `self.bitw` are always zero.
    val: u64,
}

impl ArbBitInt {
    /// Create a new `ArbBitInt` that is `width` bits wide and has a value `val`. Any bits above
    /// `width` bits are ignored (i.e. it is safe for those bits to be set or unset when calling
    /// this function).
    pub fn from_u64(bitw: u32, val: u64) -> Self {
        Self {
            bitw,
            val: val & mask(bitw),
        }
    }

    /// Create a new `ArbBitInt` that is `width` bits wide and has a value `val`. Any bits above
    /// `width` bits are ignored.
    pub fn from_i64(bitw: u32, val: i64) -> Self {
        Self::from_u64(bitw, val as u64)
    }

    /// Create a new `ArbBitInt` of `bitw` bits with no bits set.
    pub fn zero(bitw: u32) -> Self {
        Self::from_u64(bitw, 0)
    }

    /// Create a new `ArbBitInt` with all `bitw` bits set. This can be seen as equivalent to
    /// creating a value of `ubitw::MAX` (when `ubitw` is also a valid Rust type).
    pub fn all_bits_set(bitw: u32) -> Self {
        Self::from_u64(bitw, u64::MAX)
    }

    /// Create a new `ArbBitInt` with the low `n` bits set. If `n >= bitw` all bits are set.
    pub fn low_bits_set(bitw: u32, n: u32) -> Self {
        if n == 0 {
            Self::zero(bitw)
        } else if n >= bitw {
            Self::all_bits_set(bitw)
        } else {
            Self::from_u64(bitw, mask(n))
        }
    }

    /// Create a new `ArbBitInt` with the high `n` bits set. If `n >= bitw` all bits are set.
    pub fn high_bits_set(bitw: u32, n: u32) -> Self {
        Self::low_bits_set(bitw, bitw.saturating_sub(n)).bitneg()
    }

    /// Create a new `ArbBitInt` with only the sign (i.e. most significant) bit set.
    pub fn sign_bit(bitw: u32) -> Self {
        Self::from_u64(bitw, 1 << (bitw - 1))
    }

    /// How many bits wide is this `ArbBitInt`?
    pub fn bitw(&self) -> u32 {
        self.bitw
    }

    /// Sign extend this `ArbBitInt` to `to_bitw` bits.
    ///
    /// # Panics
    ///
    /// If `to_bitw` is smaller than `self.bitw()`.
    pub fn sign_extend(&self, to_bitw: u32) -> Self {
        debug_assert!(to_bitw >= self.bitw && to_bitw <= 64);
        Self::from_i64(to_bitw, self.to_sign_ext_i64())
    }

    /// Zero extend this `ArbBitInt` to `to_bitw` bits.
    ///
    /// # Panics
    ///
    /// If `to_bitw` is smaller than `self.bitw()`.
    pub fn zero_extend(&self, to_bitw: u32) -> Self {
        debug_assert!(to_bitw >= self.bitw && to_bitw <= 64);
        Self {
            bitw: to_bitw,
            val: self.val,
        }
    }

    /// Truncate this `ArbBitInt` to `to_bitw` bits.
    ///
    /// # Panics
    ///
    /// If `to_bitw` is larger than `self.bitw()`.
    pub fn truncate(&self, to_bitw: u32) -> Self {
        debug_assert!(to_bitw <= self.bitw);
        Self::from_u64(to_bitw, self.val)
    }

    /// Zero extend or truncate this `ArbBitInt` so that it is `to_bitw` bits wide.
    pub fn zext_or_trunc(&self, to_bitw: u32) -> Self {
        if to_bitw >= self.bitw {
            self.zero_extend(to_bitw)
        } else {
            self.truncate(to_bitw)
        }
    }

    /// Sign extend the underlying value and return it as an `i64`.
    pub fn to_sign_ext_i64(&self) -> i64 {
        let shift = 64 - self.bitw;
        ((self.val << shift) as i64) >> shift
    }

    /// Zero extend the underlying value and return it as a `u64`.
    pub fn to_zero_ext_u64(&self) -> u64 {
        self.val
    }

    /// zero extend the underlying value and, if it is representable as an `u32`, return it.
    pub fn to_zero_ext_u32(&self) -> Option<u32> {
        u32::try_from(self.val).ok()
    }

    /// Zero extend the underlying value, clamping it to `limit`.
    pub fn limited_value(&self, limit: u64) -> u64 {
        self.val.min(limit)
    }

    /// Is bit `n` set?
    pub fn bit(&self, n: u32) -> bool {
        debug_assert!(n < self.bitw);
        self.val & (1 << n) != 0
    }

    /// Return a copy of `self` with bit `n` set.
    pub fn with_bit_set(&self, n: u32) -> Self {
        debug_assert!(n < self.bitw);
        Self {
            bitw: self.bitw,
            val: self.val | (1 << n),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.val == 0
    }

    pub fn is_one(&self) -> bool {
        self.val == 1
    }

    pub fn is_all_ones(&self) -> bool {
        self.val == mask(self.bitw)
    }

    /// Is the sign bit set?
    pub fn is_negative(&self) -> bool {
        self.bit(self.bitw - 1)
    }

    /// Is exactly one bit set?
    pub fn is_power_of_two(&self) -> bool {
        self.val.is_power_of_two()
    }

    /// Is this the most negative signed value of this bit width?
    pub fn is_min_signed(&self) -> bool {
        self.val == 1 << (self.bitw - 1)
    }

    /// Return the floor of the base 2 logarithm or `None` if `self` is zero.
    pub fn log2(&self) -> Option<u32> {
        self.val.checked_ilog2()
    }

    pub fn count_ones(&self) -> u32 {
        self.val.count_ones()
    }

    pub fn count_leading_zeros(&self) -> u32 {
        self.val.leading_zeros() - (64 - self.bitw)
    }

    pub fn count_leading_ones(&self) -> u32 {
        (self.val << (64 - self.bitw)).leading_ones()
    }

    /// Count trailing zeros. An all-zero value has `self.bitw()` trailing zeros.
    pub fn count_trailing_zeros(&self) -> u32 {
        self.val.trailing_zeros().min(self.bitw)
    }

    pub fn count_trailing_ones(&self) -> u32 {
        self.val.trailing_ones()
    }

    /// Return a new [ArbBitInt] that performs two's complement wrapping addition on `self` and
    /// `other`.
    ///
    /// # Panics
    ///
    /// If `self` and `other` are not the same bit width.
    pub fn wrapping_add(&self, other: &Self) -> Self {
        debug_assert_eq!(self.bitw, other.bitw);
        Self::from_u64(self.bitw, self.val.wrapping_add(other.val))
    }

    /// Return a new [ArbBitInt] that performs two's complement wrapping multiplication on `self`
    /// and `other`.
    ///
    /// # Panics
    ///
    /// If `self` and `other` are not the same bit width.
    pub fn wrapping_mul(&self, other: &Self) -> Self {
        debug_assert_eq!(self.bitw, other.bitw);
        Self::from_u64(self.bitw, self.val.wrapping_mul(other.val))
    }

    /// Return a new [ArbBitInt] that performs two's complement wrapping subtraction on `self` and
    /// `other`.
    ///
    /// # Panics
    ///
    /// If `self` and `other` are not the same bit width.
    pub fn wrapping_sub(&self, other: &Self) -> Self {
        debug_assert_eq!(self.bitw, other.bitw);
        Self::from_u64(self.bitw, self.val.wrapping_sub(other.val))
    }

    pub fn wrapping_neg(&self) -> Self {
        Self::from_u64(self.bitw, self.val.wrapping_neg())
    }

    /// Return the absolute value of `self` interpreted as a signed integer. The most negative
    /// value is returned unchanged.
    pub fn wrapping_abs(&self) -> Self {
        if self.is_negative() {
            self.wrapping_neg()
        } else {
            self.clone()
        }
    }

    /// Unsigned division, or `None` if `other` is zero.
    pub fn checked_udiv(&self, other: &Self) -> Option<Self> {
        debug_assert_eq!(self.bitw, other.bitw);
        self.val
            .checked_div(other.val)
            .map(|x| Self::from_u64(self.bitw, x))
    }

    /// Unsigned remainder, or `None` if `other` is zero.
    pub fn checked_urem(&self, other: &Self) -> Option<Self> {
        debug_assert_eq!(self.bitw, other.bitw);
        self.val
            .checked_rem(other.val)
            .map(|x| Self::from_u64(self.bitw, x))
    }

    /// Signed division, or `None` if `other` is zero or the division overflows.
    pub fn checked_sdiv(&self, other: &Self) -> Option<Self> {
        debug_assert_eq!(self.bitw, other.bitw);
        if other.is_zero() || (self.is_min_signed() && other.is_all_ones()) {
            return None;
        }
        Some(Self::from_i64(
            self.bitw,
            self.to_sign_ext_i64().wrapping_div(other.to_sign_ext_i64()),
        ))
    }

    /// Signed remainder, or `None` if `other` is zero or the corresponding division overflows.
    pub fn checked_srem(&self, other: &Self) -> Option<Self> {
        debug_assert_eq!(self.bitw, other.bitw);
        if other.is_zero() || (self.is_min_signed() && other.is_all_ones()) {
            return None;
        }
        Some(Self::from_i64(
            self.bitw,
            self.to_sign_ext_i64().wrapping_rem(other.to_sign_ext_i64()),
        ))
    }

    /// Left shift `self` by `bits`. If `bits >= self.bitw()` the result is zero.
    pub fn shl(&self, bits: u32) -> Self {
        self.checked_shl(bits)
            .unwrap_or_else(|| Self::zero(self.bitw))
    }

    /// Logical right shift `self` by `bits`. If `bits >= self.bitw()` the result is zero.
    pub fn lshr(&self, bits: u32) -> Self {
        self.checked_lshr(bits)
            .unwrap_or_else(|| Self::zero(self.bitw))
    }

    /// Return a new [ArbBitInt] that left shifts `self` by `bits`s or `None` if `bits >=
    /// self.bitw()`.
    pub fn checked_shl(&self, bits: u32) -> Option<Self> {
        if bits < self.bitw {
            Some(Self::from_u64(self.bitw, self.val << bits))
        } else {
            None
        }
    }

    /// Return a new [ArbBitInt] that arithmetic-right shifts `self` by `bits` or `None` if `bits
    /// >= self.bitw()`.
    pub fn checked_ashr(&self, bits: u32) -> Option<Self> {
        if bits < self.bitw {
            Some(Self::from_i64(self.bitw, self.to_sign_ext_i64() >> bits))
        } else {
            None
        }
    }

    /// Return a new [ArbBitInt] that logic-right shifts `self` by `bits` or `None` if `bits >=
    /// self.bitw()`.
    pub fn checked_lshr(&self, bits: u32) -> Option<Self> {
        if bits < self.bitw {
            Some(Self::from_u64(self.bitw, self.val >> bits))
        } else {
            None
        }
    }

    /// Return a new [ArbBitInt] that performs bitwise `AND` on `self` and `other`.
    ///
    /// # Panics
    ///
    /// If `self` and `other` are not the same bit width.
    pub fn bitand(&self, other: &Self) -> Self {
        debug_assert_eq!(self.bitw, other.bitw);
        Self {
            bitw: self.bitw,
            val: self.val.bitand(other.val),
        }
    }

    /// Return a new [ArbBitInt] that performs bitwise `OR` on `self` and `other`.
    ///
    /// # Panics
    ///
    /// If `self` and `other` are not the same bit width.
    pub fn bitor(&self, other: &Self) -> Self {
        debug_assert_eq!(self.bitw, other.bitw);
        Self {
            bitw: self.bitw,
            val: self.val.bitor(other.val),
        }
    }

    /// Return a new [ArbBitInt] that performs bitwise `XOR` on `self` and `other`.
    ///
    /// # Panics
    ///
    /// If `self` and `other` are not the same bit width.
    pub fn bitxor(&self, other: &Self) -> Self {
        debug_assert_eq!(self.bitw, other.bitw);
        Self {
            bitw: self.bitw,
            val: self.val.bitxor(other.val),
        }
    }

    /// Return a new [ArbBitInt] with every bit of `self` inverted.
    pub fn bitneg(&self) -> Self {
        Self::from_u64(self.bitw, !self.val)
    }
}

impl fmt::Display for ArbBitInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.val)
    }
}
