//! Queries derived from known bits and from the structure of the operand graph.

use super::{ValueTracker, patterns};
use crate::{
    arbbitint::ArbBitInt,
    ir::{
        BinOp, BinOpKind, Call, Callee, Cast, CastKind, Const, ConstKind, Inst, InstIdx,
        Intrinsic, Phi, Select,
    },
    known_bits::SignBit,
};

/// `v == base * multiple`: the result of [ValueTracker::compute_multiple].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Multiple {
    /// An existing value.
    Val(InstIdx),
    /// A constant which need not exist in the module.
    Const(ArbBitInt),
}

impl ValueTracker<'_> {
    /// Determine whether the sign bit of `v` is known to be zero or one. If `v`'s bit width is
    /// not known, nothing is known.
    pub fn compute_sign_bit(&self, v: InstIdx, depth: u32) -> SignBit {
        let Some(bitw) = self.inst_bitw(v) else {
            return SignBit::default();
        };
        let kb = self.compute_known_bits(v, &ArbBitInt::sign_bit(bitw), depth);
        SignBit {
            non_negative: kb.zeros.bit(bitw - 1),
            negative: kb.ones.bit(bitw - 1),
        }
    }

    /// Is `v` known to have exactly one bit set (or, if `or_zero` is true, at most one bit set)
    /// whenever it is defined? Vectors are powers of two if every element is.
    ///
    /// This only recognises specific patterns: `false` means "not proven".
    pub fn is_power_of_two(&self, v: InstIdx, or_zero: bool, depth: u32) -> bool {
        let r = self.is_power_of_two_inner(v, or_zero, depth);
        if depth == 0 {
            self.log_query("is_power_of_two", v, &r);
        }
        r
    }

    fn is_power_of_two_inner(&self, v: InstIdx, or_zero: bool, depth: u32) -> bool {
        let m = self.m;
        if m.is_constant(v) {
            if m.is_null_value(v) {
                return or_zero;
            }
            if let Some(c) = m.const_int(v) {
                return c.is_power_of_two();
            }
        }

        // `1 << x` is a power of two if the one is not shifted off the end, and undefined
        // otherwise. Similarly for `signbit >>u x`.
        if let Some(x) = patterns::binop(m, v, BinOpKind::Shl)
            && patterns::is_one(m, x.lhs)
        {
            return true;
        }
        if let Some(x) = patterns::binop(m, v, BinOpKind::LShr)
            && patterns::is_sign_bit(m, x.lhs)
        {
            return true;
        }

        if depth >= self.max_depth {
            return false;
        }
        let depth = depth + 1;

        match m.inst(v) {
            // A shift of a power of two is a power of two or zero.
            Inst::BinOp(BinOp {
                kind: BinOpKind::Shl | BinOpKind::LShr | BinOpKind::AShr,
                lhs,
                ..
            }) if or_zero => self.is_power_of_two_inner(*lhs, true, depth),
            Inst::Cast(Cast {
                kind: CastKind::ZExt,
                val,
                ..
            }) => self.is_power_of_two_inner(*val, or_zero, depth),
            Inst::Select(Select {
                trueval, falseval, ..
            }) => {
                self.is_power_of_two_inner(*trueval, or_zero, depth)
                    && self.is_power_of_two_inner(*falseval, or_zero, depth)
            }
            Inst::BinOp(BinOp {
                kind: BinOpKind::And,
                lhs,
                rhs,
                ..
            }) if or_zero => {
                // A power of two and'd with anything is a power of two or zero. `x & -x` always
                // is.
                self.is_power_of_two_inner(*lhs, true, depth)
                    || self.is_power_of_two_inner(*rhs, true, depth)
                    || patterns::neg(m, *lhs) == Some(*rhs)
                    || patterns::neg(m, *rhs) == Some(*lhs)
            }
            // An exact division or right shift only shifts out zero bits.
            Inst::BinOp(
                x @ BinOp {
                    kind: BinOpKind::LShr | BinOpKind::UDiv,
                    ..
                },
            ) if x.exact() => self.is_power_of_two_inner(x.lhs, or_zero, depth),
            _ => false,
        }
    }

    /// Is `v` known to be non-zero whenever it is defined? Vectors are non-zero if every element
    /// is.
    pub fn is_known_non_zero(&self, v: InstIdx, depth: u32) -> bool {
        let r = self.is_known_non_zero_inner(v, depth);
        if depth == 0 {
            self.log_query("is_known_non_zero", v, &r);
        }
        r
    }

    fn is_known_non_zero_inner(&self, v: InstIdx, depth: u32) -> bool {
        let m = self.m;
        if m.is_constant(v) {
            // Only integer constants are handled: the address of a global may be null if the
            // global is weak.
            return !m.is_null_value(v) && m.const_int(v).is_some();
        }

        if depth >= self.max_depth {
            return false;
        }
        let depth = depth + 1;
        let bitw = self.inst_bitw(v);

        match m.inst(v) {
            Inst::BinOp(x) => match x.kind {
                BinOpKind::Or => {
                    return self.is_known_non_zero_inner(x.lhs, depth)
                        || self.is_known_non_zero_inner(x.rhs, depth);
                }
                // `shl x, y` is non-zero if `x` is odd: shifting the low bit off the end is
                // undefined.
                BinOpKind::Shl => {
                    if let Some(bitw) = bitw {
                        if x.nuw() {
                            return self.is_known_non_zero_inner(x.lhs, depth);
                        }
                        let lhs =
                            self.compute_known_bits(x.lhs, &ArbBitInt::from_u64(bitw, 1), depth);
                        if lhs.ones.bit(0) {
                            return true;
                        }
                    }
                }
                // `shr x, y` is non-zero if `x` is negative: shifting the sign bit off the end
                // is undefined.
                BinOpKind::LShr | BinOpKind::AShr => {
                    if x.exact() {
                        return self.is_known_non_zero_inner(x.lhs, depth);
                    }
                    if self.compute_sign_bit(x.lhs, depth).negative {
                        return true;
                    }
                }
                // An exact division can only be zero if the dividend is.
                BinOpKind::UDiv | BinOpKind::SDiv if x.exact() => {
                    return self.is_known_non_zero_inner(x.lhs, depth);
                }
                BinOpKind::Add => {
                    if self.add_is_known_non_zero(x, bitw, depth) {
                        return true;
                    }
                }
                // A product of non-zero values is non-zero if the multiplication can't wrap.
                BinOpKind::Mul => {
                    if (x.nsw() || x.nuw())
                        && self.is_known_non_zero_inner(x.lhs, depth)
                        && self.is_known_non_zero_inner(x.rhs, depth)
                    {
                        return true;
                    }
                }
                _ => (),
            },
            Inst::Cast(Cast {
                kind: CastKind::SExt | CastKind::ZExt,
                val,
                ..
            }) => return self.is_known_non_zero_inner(*val, depth),
            Inst::Select(Select {
                trueval, falseval, ..
            }) => {
                if self.is_known_non_zero_inner(*trueval, depth)
                    && self.is_known_non_zero_inner(*falseval, depth)
                {
                    return true;
                }
            }
            _ => (),
        }

        let Some(bitw) = bitw else {
            return false;
        };
        !self
            .compute_known_bits(v, &ArbBitInt::all_bits_set(bitw), depth)
            .ones
            .is_zero()
    }

    fn add_is_known_non_zero(&self, x: &BinOp, bitw: Option<u32>, depth: u32) -> bool {
        let xs = self.compute_sign_bit(x.lhs, depth);
        let ys = self.compute_sign_bit(x.rhs, depth);

        // The sum of two non-negative numbers is zero only if both are.
        if xs.non_negative
            && ys.non_negative
            && (self.is_known_non_zero_inner(x.lhs, depth)
                || self.is_known_non_zero_inner(x.rhs, depth))
        {
            return true;
        }

        // The sum of two negative numbers is zero only if both are the minimum signed value.
        if let Some(bitw) = bitw
            && xs.negative
            && ys.negative
        {
            let mask = ArbBitInt::sign_bit(bitw).bitneg();
            for y in [x.lhs, x.rhs] {
                let kb = self.compute_known_bits(y, &mask, depth);
                if !kb.ones.bitand(&mask).is_zero() {
                    return true;
                }
            }
        }

        // The sum of a non-negative number and a power of two is not zero.
        (xs.non_negative && self.is_power_of_two_inner(x.rhs, false, depth))
            || (ys.non_negative && self.is_power_of_two_inner(x.lhs, false, depth))
    }

    /// Are all the bits of `v` in `mask` known to be zero?
    pub fn masked_value_is_zero(&self, v: InstIdx, mask: &ArbBitInt, depth: u32) -> bool {
        let kb = self.compute_known_bits(v, mask, depth);
        kb.zeros.bitand(mask) == *mask
    }

    /// Return how many of the high bits of `v` are known to be copies of the sign bit. This is
    /// always at least 1 (the sign bit itself). For example, `ashr x, 2` has at least 3 sign
    /// bits.
    pub fn compute_num_sign_bits(&self, v: InstIdx, depth: u32) -> u32 {
        let r = self.num_sign_bits(v, depth);
        debug_assert!(r >= 1);
        if depth == 0 {
            self.log_query("compute_num_sign_bits", v, &r);
        }
        r
    }

    fn num_sign_bits(&self, v: InstIdx, depth: u32) -> u32 {
        let m = self.m;
        let Some(tybits) = self.inst_bitw(v) else {
            return 1;
        };
        if depth >= self.max_depth {
            return 1;
        }
        let mut first_answer = 1;

        match m.inst(v) {
            Inst::Cast(Cast {
                kind: CastKind::SExt,
                val,
                ..
            }) => {
                let Some(src_bitw) = self.inst_bitw(*val) else {
                    return 1;
                };
                return self.num_sign_bits(*val, depth + 1) + tybits - src_bitw;
            }
            Inst::BinOp(x) => match x.kind {
                // `ashr x, c` adds `c` sign bits.
                BinOpKind::AShr => {
                    let mut tmp = self.num_sign_bits(x.lhs, depth + 1);
                    if let Some(c) = m.const_int_or_splat(x.rhs) {
                        tmp = u32::try_from(
                            (u64::from(tmp) + c.limited_value(u64::from(tybits)))
                                .min(u64::from(tybits)),
                        )
                        .unwrap_or(tybits);
                    }
                    return tmp;
                }
                // `shl` destroys sign bits.
                BinOpKind::Shl => {
                    if let Some(c) = m.const_int(x.rhs) {
                        let tmp = self.num_sign_bits(x.lhs, depth + 1);
                        let c = c.to_zero_ext_u64();
                        if c < u64::from(tybits) && c < u64::from(tmp) {
                            // `c < tmp` so this can't truncate.
                            return tmp - c as u32;
                        }
                    }
                }
                // Logical operations preserve the sign bits of the worse operand. Then see if
                // known bits can do better.
                BinOpKind::And | BinOpKind::Or | BinOpKind::Xor => {
                    let tmp = self.num_sign_bits(x.lhs, depth + 1);
                    if tmp != 1 {
                        first_answer = tmp.min(self.num_sign_bits(x.rhs, depth + 1));
                    }
                }
                // An addition has at most one carry bit.
                BinOpKind::Add => {
                    let tmp = self.num_sign_bits(x.lhs, depth + 1);
                    if tmp == 1 {
                        return 1;
                    }
                    if m.const_int(x.rhs).is_some_and(|c| c.is_all_ones()) {
                        // Decrementing a value known to be 0 or 1 gives 0 or -1. Decrementing a
                        // positive value can't carry.
                        if let Some(r) = self.neg_or_dec_sign_bits(x.lhs, tybits, tmp, depth) {
                            return r;
                        }
                    }
                    let tmp2 = self.num_sign_bits(x.rhs, depth + 1);
                    if tmp2 == 1 {
                        return 1;
                    }
                    return tmp.min(tmp2) - 1;
                }
                BinOpKind::Sub => {
                    let tmp2 = self.num_sign_bits(x.rhs, depth + 1);
                    if tmp2 == 1 {
                        return 1;
                    }
                    if m.const_int(x.lhs).is_some_and(|c| c.is_zero())
                        && let Some(r) = self.neg_or_dec_sign_bits(x.rhs, tybits, tmp2, depth)
                    {
                        return r;
                    }
                    let tmp = self.num_sign_bits(x.lhs, depth + 1);
                    if tmp == 1 {
                        return 1;
                    }
                    return tmp.min(tmp2) - 1;
                }
                _ => (),
            },
            Inst::Select(Select {
                trueval, falseval, ..
            }) => {
                let tmp = self.num_sign_bits(*trueval, depth + 1);
                if tmp == 1 {
                    return 1;
                }
                return tmp.min(self.num_sign_bits(*falseval, depth + 1));
            }
            // Take the minimum of all incoming values: the depth limit stops this looping.
            Inst::Phi(Phi { incoming, .. })
                if !incoming.is_empty()
                    && incoming.len() <= usize::try_from(self.phi_fan_in).unwrap_or(usize::MAX) =>
            {
                let mut tmp = tybits;
                for inc in incoming {
                    tmp = tmp.min(self.num_sign_bits(*inc, depth + 1));
                    if tmp == 1 {
                        break;
                    }
                }
                return tmp;
            }
            _ => (),
        }

        // See if the known bits prove the top bits to be zeros or ones.
        let kb = self.compute_known_bits(v, &ArbBitInt::all_bits_set(tybits), depth);
        let sign_copies = if kb.zeros.is_negative() {
            kb.zeros.count_leading_ones()
        } else if kb.ones.is_negative() {
            kb.ones.count_leading_ones()
        } else {
            return first_answer;
        };
        first_answer.max(sign_copies.min(tybits))
    }

    /// The sign bits of `x - 1` or `0 - x` when they can be found more precisely than by treating
    /// the operation as a general add or subtract.
    fn neg_or_dec_sign_bits(&self, x: InstIdx, tybits: u32, tmp: u32, depth: u32) -> Option<u32> {
        let all = ArbBitInt::all_bits_set(tybits);
        let kb = self.compute_known_bits(x, &all, depth + 1);
        // If the input is known to be 0 or 1, the output is 0 or -1: all sign bits.
        if kb.zeros.bitor(&ArbBitInt::from_u64(tybits, 1)) == all {
            return Some(tybits);
        }
        // If the input is known to be non-negative, there is no carry.
        if kb.zeros.is_negative() {
            return Some(tmp);
        }
        None
    }

    /// If `v` can be shown to be `base * x`, return `x`. Sign extensions are only looked
    /// through if `look_through_sext` is true. `v` must be an integer.
    pub fn compute_multiple(
        &self,
        v: InstIdx,
        base: u64,
        look_through_sext: bool,
        depth: u32,
    ) -> Option<Multiple> {
        debug_assert!(depth <= self.max_depth, "Limit search depth");
        if !self.m.inst_ty(v).is_int() {
            return None;
        }
        self.multiple(&Multiple::Val(v), base, look_through_sext, depth)
    }

    fn multiple(
        &self,
        v: &Multiple,
        base: u64,
        look_through_sext: bool,
        depth: u32,
    ) -> Option<Multiple> {
        if base == 0 {
            return None;
        }
        if base == 1 {
            return Some(v.clone());
        }
        if let Some(c) = self.multiple_const(v)
            && c.to_zero_ext_u64() % base == 0
        {
            return Some(Multiple::Const(ArbBitInt::from_u64(
                c.bitw(),
                c.to_zero_ext_u64() / base,
            )));
        }
        let Multiple::Val(v) = v else {
            return None;
        };
        if depth >= self.max_depth {
            return None;
        }

        let (op0, op1) = match self.m.inst(*v) {
            Inst::Cast(Cast {
                kind: CastKind::SExt,
                ..
            }) if !look_through_sext => return None,
            Inst::Cast(Cast {
                kind: CastKind::SExt | CastKind::ZExt,
                val,
                ..
            }) => {
                return self.multiple(&Multiple::Val(*val), base, look_through_sext, depth + 1);
            }
            Inst::BinOp(BinOp {
                kind: BinOpKind::Shl,
                lhs,
                rhs,
                ..
            }) => {
                // `x << c` is `x * 2^c`.
                let c = self.m.const_int(*rhs)?;
                let bit = c.limited_value(u64::from(c.bitw() - 1));
                let pow = ArbBitInt::zero(c.bitw()).with_bit_set(u32::try_from(bit).ok()?);
                (Multiple::Val(*lhs), Multiple::Const(pow))
            }
            Inst::BinOp(BinOp {
                kind: BinOpKind::Mul,
                lhs,
                rhs,
                ..
            }) => (Multiple::Val(*lhs), Multiple::Val(*rhs)),
            _ => return None,
        };

        // Try both operand orders: `v == base * (x * other)`.
        for (x, other) in [(&op0, &op1), (&op1, &op0)] {
            let Some(mul) = self.multiple(x, base, look_through_sext, depth + 1) else {
                continue;
            };
            if let Some(otherc) = self.multiple_const(other)
                && let Some(mulc) = self.multiple_const(&mul)
            {
                let bitw = otherc.bitw().max(mulc.bitw());
                return Some(Multiple::Const(
                    mulc.zero_extend(bitw).wrapping_mul(&otherc.zero_extend(bitw)),
                ));
            }
            if self.multiple_const(&mul).is_some_and(|c| c.is_one()) {
                return Some(other.clone());
            }
        }
        None
    }

    fn multiple_const(&self, x: &Multiple) -> Option<ArbBitInt> {
        match x {
            Multiple::Val(v) => self.m.const_int(*v).cloned(),
            Multiple::Const(c) => Some(c.clone()),
        }
    }

    /// Can the floating point value `v` be proven never to be `-0.0`?
    pub fn cannot_be_negative_zero(&self, v: InstIdx, depth: u32) -> bool {
        let m = self.m;
        match m.inst(v) {
            Inst::Const(Const {
                kind: ConstKind::Float(x),
                ..
            }) => return *x != 0x8000_0000,
            Inst::Const(Const {
                kind: ConstKind::Double(x),
                ..
            }) => return *x != 0x8000_0000_0000_0000,
            _ => (),
        }
        if depth >= self.max_depth {
            return true;
        }

        match m.inst(v) {
            // `x + 0.0` is never `-0.0`.
            Inst::BinOp(BinOp {
                kind: BinOpKind::FAdd,
                rhs,
                ..
            }) => {
                matches!(
                    m.inst(*rhs),
                    Inst::Const(Const {
                        kind: ConstKind::Float(_) | ConstKind::Double(_),
                        ..
                    })
                ) && m.is_null_value(*rhs)
            }
            // Integer zero converts to `+0.0`.
            Inst::Cast(Cast {
                kind: CastKind::SIToFP | CastKind::UIToFP,
                ..
            }) => true,
            // `sqrt(-0.0) == -0.0`, and no other negative results are possible.
            Inst::Call(Call {
                callee: Callee::Intrinsic(Intrinsic::Sqrt),
                args,
                ..
            }) => args
                .first()
                .is_some_and(|x| self.cannot_be_negative_zero(*x, depth + 1)),
            Inst::Call(Call {
                callee: Callee::Decl(name),
                args,
                ..
            }) => match name.as_str() {
                "abs" | "fabs" | "fabsf" | "fabsl" => true,
                "sqrt" | "sqrtf" | "sqrtl" => args
                    .first()
                    .is_some_and(|x| self.cannot_be_negative_zero(*x, depth + 1)),
                _ => false,
            },
            _ => false,
        }
    }
}
