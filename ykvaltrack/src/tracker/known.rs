//! Known bits: the core forward analysis.
//!
//! Every transfer function takes a `mask` of the bits the caller cares about. Implementations may
//! compute more bits than requested, but need not compute bits outside `mask`. Operand queries
//! are given narrowed masks wherever the operation makes some operand bits irrelevant.

use super::ValueTracker;
use crate::{
    arbbitint::ArbBitInt,
    ir::{
        Alloca, Arg, BinOp, BinOpKind, Call, Callee, Cast, CastKind, Const, ConstKind, Gep,
        GepStep, Global, Inst, InstIdx, Intrinsic, Phi, Select, Ty,
    },
    known_bits::KnownBits,
};

/// Return a `KnownBits` of `mask`'s width whose low bits are known zero if `align` is non-zero.
fn aligned(mask: &ArbBitInt, align: u32) -> KnownBits {
    let bitw = mask.bitw();
    let mut kb = KnownBits::unknown(bitw);
    if align > 0 {
        kb.zeros = mask.bitand(&ArbBitInt::low_bits_set(bitw, align.trailing_zeros()));
    }
    kb
}

impl ValueTracker<'_> {
    /// Determine which bits of `v` are known to be zero or one, considering only the bits in
    /// `mask`. `mask` must be as wide as `v`'s scalar type. `depth` is the current recursion
    /// depth: external callers should pass 0.
    ///
    /// # Panics
    ///
    /// If `depth` exceeds the maximum depth (in debug builds).
    pub fn compute_known_bits(&self, v: InstIdx, mask: &ArbBitInt, depth: u32) -> KnownBits {
        debug_assert!(depth <= self.max_depth, "Limit search depth");
        debug_assert!(
            self.inst_bitw(v).is_none_or(|x| x == mask.bitw()),
            "%{}: mask has the wrong bit width",
            usize::from(v)
        );
        let kb = self.known_bits_inner(v, mask, depth);
        kb.assert_disjoint();
        if depth == 0 {
            self.log_query("known_bits", v, &kb);
        }
        kb
    }

    fn known_bits_inner(&self, v: InstIdx, mask: &ArbBitInt, depth: u32) -> KnownBits {
        let bitw = mask.bitw();
        let inst = self.m.inst(v);
        match inst {
            Inst::Const(x) => return self.kb_const(x, mask, depth),
            Inst::Global(x) => return self.kb_global(x, mask),
            Inst::Alias(x) => {
                // An alias which may be overridden at link time could point anywhere.
                if x.linkage.may_be_overridden() || depth >= self.max_depth {
                    return KnownBits::unknown(bitw);
                }
                return self.compute_known_bits(x.aliasee, mask, depth + 1);
            }
            Inst::Arg(Arg { byval, align, .. }) => {
                return if *byval {
                    aligned(mask, *align)
                } else {
                    KnownBits::unknown(bitw)
                };
            }
            _ => (),
        }

        if depth == self.max_depth || mask.is_zero() {
            return KnownBits::unknown(bitw);
        }

        match inst {
            Inst::BinOp(x) => self.kb_binop(x, mask, depth),
            Inst::Cast(x) => self.kb_cast(v, x, mask, depth),
            Inst::Select(Select {
                trueval, falseval, ..
            }) => {
                let f = self.compute_known_bits(*falseval, mask, depth + 1);
                let t = self.compute_known_bits(*trueval, mask, depth + 1);
                // Only known if known in both arms.
                t.intersect(&f)
            }
            Inst::Alloca(Alloca {
                alloc_tyidx, align, ..
            }) => {
                let mut align = *align;
                if align == 0
                    && let Some(tl) = self.layout
                {
                    align = tl.abi_align(self.m, *alloc_tyidx);
                }
                aligned(mask, align)
            }
            Inst::Gep(x) => self.kb_gep(v, x, mask, depth),
            Inst::Phi(x) => self.kb_phi(v, x, mask, depth),
            Inst::Call(x) => self.kb_call(x, bitw),
            _ => KnownBits::unknown(bitw),
        }
    }

    fn kb_const(&self, x: &Const, mask: &ArbBitInt, depth: u32) -> KnownBits {
        let bitw = mask.bitw();
        match &x.kind {
            ConstKind::Int(c) => {
                let ones = c.bitand(mask);
                KnownBits {
                    zeros: ones.bitneg().bitand(mask),
                    ones,
                }
            }
            ConstKind::Null | ConstKind::Zero => KnownBits {
                zeros: mask.clone(),
                ones: ArbBitInt::zero(bitw),
            },
            ConstKind::Aggregate(elems) if matches!(self.m.ty(x.tyidx), Ty::Vector { .. }) => {
                // What is known about every element.
                let mut kb = KnownBits {
                    zeros: ArbBitInt::all_bits_set(bitw),
                    ones: ArbBitInt::all_bits_set(bitw),
                };
                for e in elems {
                    kb = kb.intersect(&self.compute_known_bits(*e, mask, depth));
                }
                kb
            }
            _ => KnownBits::unknown(bitw),
        }
    }

    /// The address of an aligned global has trailing zeros.
    fn kb_global(&self, x: &Global, mask: &ArbBitInt) -> KnownBits {
        let mut align = x.align;
        if align == 0
            && let Some(tl) = self.layout
            && self.m.is_sized(x.value_tyidx)
        {
            // A global defined in this module will be given its preferred alignment. Otherwise
            // only the minimum ABI alignment can be assumed.
            align = if !x.is_declaration() && !x.linkage.is_weak_for_linker() {
                tl.pref_global_align(self.m, x)
            } else {
                tl.abi_align(self.m, x.value_tyidx)
            };
        }
        aligned(mask, align)
    }

    fn kb_binop(&self, x: &BinOp, mask: &ArbBitInt, depth: u32) -> KnownBits {
        let bitw = mask.bitw();
        let all = ArbBitInt::all_bits_set(bitw);
        match x.kind {
            BinOpKind::And => {
                // If either the LHS or the RHS are zero, the result is zero.
                let r = self.compute_known_bits(x.rhs, mask, depth + 1);
                let mask2 = mask.bitand(&r.zeros.bitneg());
                let l = self.compute_known_bits(x.lhs, &mask2, depth + 1);
                KnownBits {
                    zeros: r.zeros.bitor(&l.zeros),
                    ones: r.ones.bitand(&l.ones),
                }
            }
            BinOpKind::Or => {
                let r = self.compute_known_bits(x.rhs, mask, depth + 1);
                let mask2 = mask.bitand(&r.ones.bitneg());
                let l = self.compute_known_bits(x.lhs, &mask2, depth + 1);
                KnownBits {
                    zeros: r.zeros.bitand(&l.zeros),
                    ones: r.ones.bitor(&l.ones),
                }
            }
            BinOpKind::Xor => {
                let r = self.compute_known_bits(x.rhs, mask, depth + 1);
                let l = self.compute_known_bits(x.lhs, mask, depth + 1);
                KnownBits {
                    zeros: r.zeros.bitand(&l.zeros).bitor(&r.ones.bitand(&l.ones)),
                    ones: r.zeros.bitand(&l.ones).bitor(&r.ones.bitand(&l.zeros)),
                }
            }
            BinOpKind::Mul => self.kb_mul(x, mask, depth),
            BinOpKind::UDiv => {
                // Treat the division as a logical right shift by the largest power of two known
                // to be no greater than the divisor.
                let l = self.compute_known_bits(x.lhs, &all, depth + 1);
                let mut lead_zeros = l.known_leading_zeros();
                let r = self.compute_known_bits(x.rhs, &all, depth + 1);
                let rhs_unknown_leading_ones = r.ones.count_leading_zeros();
                if rhs_unknown_leading_ones != bitw {
                    lead_zeros = bitw.min(lead_zeros + bitw - rhs_unknown_leading_ones - 1);
                }
                KnownBits {
                    zeros: ArbBitInt::high_bits_set(bitw, lead_zeros).bitand(mask),
                    ones: ArbBitInt::zero(bitw),
                }
            }
            BinOpKind::Shl => {
                let Some(c) = self.m.const_int(x.rhs) else {
                    return KnownBits::unknown(bitw);
                };
                // (shl X, C1) & C2 == 0 iff (X & C2 >>u C1) == 0
                let shift = shift_amount(c, bitw);
                let l = self.compute_known_bits(x.lhs, &mask.lshr(shift), depth + 1);
                KnownBits {
                    zeros: l.zeros.shl(shift).bitor(&ArbBitInt::low_bits_set(bitw, shift)),
                    ones: l.ones.shl(shift),
                }
            }
            BinOpKind::LShr => {
                let Some(c) = self.m.const_int(x.rhs) else {
                    return KnownBits::unknown(bitw);
                };
                let shift = shift_amount(c, bitw);
                let l = self.compute_known_bits(x.lhs, &mask.shl(shift), depth + 1);
                KnownBits {
                    zeros: l
                        .zeros
                        .lshr(shift)
                        .bitor(&ArbBitInt::high_bits_set(bitw, shift)),
                    ones: l.ones.lshr(shift),
                }
            }
            BinOpKind::AShr => {
                let Some(c) = self.m.const_int(x.rhs) else {
                    return KnownBits::unknown(bitw);
                };
                let shift = shift_amount(c, bitw - 1);
                let l = self.compute_known_bits(x.lhs, &mask.shl(shift), depth + 1);
                let mut kb = KnownBits {
                    zeros: l.zeros.lshr(shift),
                    ones: l.ones.lshr(shift),
                };
                // The vacated high bits are copies of the operand's sign bit.
                let high = ArbBitInt::high_bits_set(bitw, shift);
                if kb.zeros.bit(bitw - shift - 1) {
                    kb.zeros = kb.zeros.bitor(&high);
                } else if kb.ones.bit(bitw - shift - 1) {
                    kb.ones = kb.ones.bitor(&high);
                }
                kb
            }
            BinOpKind::Sub | BinOpKind::Add => self.kb_add_sub(x, mask, depth),
            BinOpKind::SRem => self.kb_srem(x, mask, depth),
            BinOpKind::URem => {
                if let Some(c) = self.m.const_int(x.rhs)
                    && c.is_power_of_two()
                {
                    // The result is the low bits of the dividend.
                    let low = c.wrapping_sub(&ArbBitInt::from_u64(bitw, 1));
                    let l = self.compute_known_bits(x.lhs, &low.bitand(mask), depth + 1);
                    return KnownBits {
                        zeros: l.zeros.bitand(&low).bitor(&low.bitneg().bitand(mask)),
                        ones: l.ones.bitand(&low),
                    };
                }
                // The result is no greater than either operand, so leading zeros in either
                // operand are leading zeros in the result.
                let l = self.compute_known_bits(x.lhs, &all, depth + 1);
                let r = self.compute_known_bits(x.rhs, &all, depth + 1);
                let leaders = l.known_leading_zeros().max(r.known_leading_zeros());
                KnownBits {
                    zeros: ArbBitInt::high_bits_set(bitw, leaders).bitand(mask),
                    ones: ArbBitInt::zero(bitw),
                }
            }
            BinOpKind::SDiv | BinOpKind::FAdd => KnownBits::unknown(bitw),
        }
    }

    fn kb_mul(&self, x: &BinOp, mask: &ArbBitInt, depth: u32) -> KnownBits {
        let bitw = mask.bitw();
        let all = ArbBitInt::all_bits_set(bitw);
        let r = self.compute_known_bits(x.rhs, &all, depth + 1);
        let l = self.compute_known_bits(x.lhs, &all, depth + 1);

        let mut known_non_negative = false;
        let mut known_negative = false;
        // If the multiplication cannot overflow, the sign of the result follows from the signs of
        // the operands.
        if mask.is_negative() && x.nsw() {
            if x.lhs == x.rhs {
                known_non_negative = true;
            } else {
                let (rnn, lnn) = (r.is_known_non_negative(), l.is_known_non_negative());
                let (rn, ln) = (r.is_known_negative(), l.is_known_negative());
                known_non_negative = (rn && ln) || (rnn && lnn);
                // A negative number times a non-negative number is negative or zero.
                if !known_non_negative {
                    known_negative = (rn && lnn && self.is_known_non_zero(x.lhs, depth))
                        || (ln && rnn && self.is_known_non_zero(x.rhs, depth));
                }
            }
        }

        // Low zero bits in either operand are low zero bits in the result. The estimate of high
        // zero bits is conservative.
        let trail_zeros = (r.known_trailing_zeros() + l.known_trailing_zeros()).min(bitw);
        let lead_zeros = ((r.known_leading_zeros() + l.known_leading_zeros()).max(bitw) - bitw)
            .min(bitw);
        let mut kb = KnownBits {
            zeros: ArbBitInt::low_bits_set(bitw, trail_zeros)
                .bitor(&ArbBitInt::high_bits_set(bitw, lead_zeros))
                .bitand(mask),
            ones: ArbBitInt::zero(bitw),
        };
        // Only use the no-wrap flag if the sign bit was not computed directly.
        if known_non_negative && !kb.ones.is_negative() {
            kb.zeros = kb.zeros.with_bit_set(bitw - 1);
        } else if known_negative && !kb.zeros.is_negative() {
            kb.ones = kb.ones.with_bit_set(bitw - 1);
        }
        kb
    }

    fn kb_add_sub(&self, x: &BinOp, mask: &ArbBitInt, depth: u32) -> KnownBits {
        let bitw = mask.bitw();
        let mut kb = KnownBits::unknown(bitw);

        if x.kind == BinOpKind::Sub
            && let Some(c) = self.m.const_int(x.lhs)
            && !c.is_negative()
        {
            // The top bits of C-X are clear if X has fewer bits than C (i.e. no wrap-around can
            // happen). For example, 20-X is positive if X is >= 0 and < 16.
            let nlz = c.wrapping_add(&ArbBitInt::from_u64(bitw, 1)).count_leading_zeros();
            let maskv = ArbBitInt::high_bits_set(bitw, nlz + 1);
            let r = self.compute_known_bits(x.rhs, &maskv, depth + 1);
            if r.zeros.bitand(&maskv) == maskv {
                kb.zeros = ArbBitInt::high_bits_set(bitw, c.count_leading_zeros()).bitand(mask);
            }
        }

        // If one operand has trailing zeros, the other operand's bits in those positions are
        // preserved in the result. For an add, this works with either operand. For a subtract,
        // it only works if the known zeros are in the right operand.
        let mask2 = ArbBitInt::low_bits_set(bitw, bitw - mask.count_leading_zeros());
        let l = self.compute_known_bits(x.lhs, &mask2, depth + 1);
        let l_trail = l.known_trailing_zeros();
        let r = self.compute_known_bits(x.rhs, &mask2, depth + 1);
        let r_trail = r.known_trailing_zeros();

        if l_trail > r_trail {
            if x.kind == BinOpKind::Add {
                let low = ArbBitInt::low_bits_set(bitw, l_trail);
                kb.zeros = kb.zeros.bitor(&r.zeros.bitand(&low));
                kb.ones = kb.ones.bitor(&r.ones.bitand(&low));
            } else {
                kb.zeros = kb.zeros.bitor(&ArbBitInt::low_bits_set(bitw, r_trail));
            }
        } else {
            let low = ArbBitInt::low_bits_set(bitw, r_trail);
            kb.zeros = kb.zeros.bitor(&l.zeros.bitand(&low));
            kb.ones = kb.ones.bitor(&l.ones.bitand(&low));
        }

        // Are we still trying to solve for the sign bit?
        if mask.is_negative() && !kb.zeros.is_negative() && !kb.ones.is_negative() && x.nsw() {
            let sign = ArbBitInt::sign_bit(bitw);
            let (lnn, ln) = (l.zeros.is_negative(), l.ones.is_negative());
            let (rnn, rn) = (r.zeros.is_negative(), r.ones.is_negative());
            let (non_negative, negative) = if x.kind == BinOpKind::Add {
                // Adding two non-negative numbers can't wrap into negative, and adding two
                // negative numbers can't wrap into non-negative.
                (lnn && rnn, ln && rn)
            } else {
                // Subtracting a negative number from a non-negative one can't wrap, nor can
                // subtracting a non-negative number from a negative one.
                (lnn && rn, ln && rnn)
            };
            if non_negative {
                kb.zeros = kb.zeros.bitor(&sign);
            } else if negative {
                kb.ones = kb.ones.bitor(&sign);
            }
        }
        kb
    }

    fn kb_srem(&self, x: &BinOp, mask: &ArbBitInt, depth: u32) -> KnownBits {
        let bitw = mask.bitw();
        let mut kb = KnownBits::unknown(bitw);
        if let Some(c) = self.m.const_int(x.rhs) {
            let ra = c.wrapping_abs();
            if ra.is_power_of_two() {
                let low = ra.wrapping_sub(&ArbBitInt::from_u64(bitw, 1));
                let mask2 = low.bitor(&ArbBitInt::sign_bit(bitw));
                let l = self.compute_known_bits(x.lhs, &mask2, depth + 1);
                // The low bits of the dividend are unchanged.
                kb.zeros = l.zeros.bitand(&low);
                kb.ones = l.ones.bitand(&low);
                // A non-negative dividend, or one with all low bits zero, gives zero upper bits.
                if l.zeros.is_negative() || l.zeros.bitand(&low) == low {
                    kb.zeros = kb.zeros.bitor(&low.bitneg());
                }
                // A negative dividend with some low bit set gives all-one upper bits.
                if l.ones.is_negative() && !l.ones.bitand(&low).is_zero() {
                    kb.ones = kb.ones.bitor(&low.bitneg());
                }
                kb = kb.restrict(mask);
            }
        }

        // The sign bit is the dividend's sign bit, except when the remainder is zero: so only a
        // known-zero sign bit carries over.
        if mask.is_negative() && !kb.zeros.is_negative() {
            let l = self.compute_known_bits(x.lhs, &ArbBitInt::sign_bit(bitw), depth + 1);
            if l.zeros.is_negative() && !kb.ones.is_negative() {
                kb.zeros = kb.zeros.with_bit_set(bitw - 1);
            }
        }
        kb
    }

    fn kb_cast(&self, v: InstIdx, x: &Cast, mask: &ArbBitInt, depth: u32) -> KnownBits {
        let bitw = mask.bitw();
        match x.kind {
            // Floating point values are not tracked.
            CastKind::FPTrunc
            | CastKind::FPExt
            | CastKind::FPToUI
            | CastKind::FPToSI
            | CastKind::SIToFP
            | CastKind::UIToFP => KnownBits::unknown(bitw),
            CastKind::PtrToInt | CastKind::IntToPtr if self.layout.is_none() => {
                self.warn_no_layout(v, "pointer width");
                KnownBits::unknown(bitw)
            }
            CastKind::PtrToInt | CastKind::IntToPtr | CastKind::ZExt | CastKind::Trunc => {
                let Some(src_bitw) = self.inst_bitw(x.val) else {
                    return KnownBits::unknown(bitw);
                };
                let l = self.compute_known_bits(x.val, &mask.zext_or_trunc(src_bitw), depth + 1);
                let mut kb = KnownBits {
                    zeros: l.zeros.zext_or_trunc(bitw),
                    ones: l.ones.zext_or_trunc(bitw),
                };
                // Any new top bits are zero.
                if bitw > src_bitw {
                    kb.zeros = kb
                        .zeros
                        .bitor(&ArbBitInt::high_bits_set(bitw, bitw - src_bitw));
                }
                kb
            }
            CastKind::BitCast => {
                let src = self.m.inst_ty(x.val);
                // Casts to or from vectors would reorder bits.
                if (src.is_int() || src.is_ptr())
                    && !matches!(self.m.ty(x.tyidx), Ty::Vector { .. })
                    && self.inst_bitw(x.val) == Some(bitw)
                {
                    self.compute_known_bits(x.val, mask, depth + 1)
                } else {
                    KnownBits::unknown(bitw)
                }
            }
            CastKind::SExt => {
                let Some(src_bitw) = self.inst_bitw(x.val) else {
                    return KnownBits::unknown(bitw);
                };
                // Only the demanded low bits are asked of the operand. Its sign bit is not added
                // to the mask, so demanding only the new top bits learns nothing about them.
                let l = self.compute_known_bits(x.val, &mask.truncate(src_bitw), depth + 1);
                let mut kb = KnownBits {
                    zeros: l.zeros.zero_extend(bitw),
                    ones: l.ones.zero_extend(bitw),
                };
                // If the input's sign bit is known, so are the new top bits.
                let high = ArbBitInt::high_bits_set(bitw, bitw - src_bitw);
                if l.zeros.bit(src_bitw - 1) {
                    kb.zeros = kb.zeros.bitor(&high);
                } else if l.ones.bit(src_bitw - 1) {
                    kb.ones = kb.ones.bitor(&high);
                }
                kb
            }
        }
    }

    /// A pointer computed by a `getelementptr` inherits the known trailing zeros of its base,
    /// weakened by each index's contribution.
    fn kb_gep(&self, v: InstIdx, x: &Gep, mask: &ArbBitInt, depth: u32) -> KnownBits {
        let bitw = mask.bitw();
        let unknown = KnownBits::unknown(bitw);
        let base = self.compute_known_bits(x.ptr, &ArbBitInt::all_bits_set(bitw), depth + 1);
        let mut trail_zeros = base.known_trailing_zeros();
        let Some(steps) = self.m.gep_steps(x) else {
            return unknown;
        };
        for (idx, step) in steps {
            match step {
                GepStep::Field { sty, field } => {
                    let Some(tl) = self.layout else {
                        self.warn_no_layout(v, "struct field offset");
                        return unknown;
                    };
                    let sl = tl.struct_layout(self.m, sty);
                    let Some(offset) = usize::try_from(field).ok().and_then(|i| sl.offsets.get(i))
                    else {
                        return unknown;
                    };
                    trail_zeros = trail_zeros.min(offset.trailing_zeros());
                }
                GepStep::Seq { elem } => {
                    if !self.m.is_sized(elem) {
                        return unknown;
                    }
                    let Some(idx_bitw) = self.inst_bitw(idx) else {
                        return unknown;
                    };
                    let size = self.layout.map_or(1, |tl| tl.alloc_size(self.m, elem));
                    let idx_kb =
                        self.compute_known_bits(idx, &ArbBitInt::all_bits_set(idx_bitw), depth + 1);
                    trail_zeros =
                        trail_zeros.min(size.trailing_zeros() + idx_kb.known_trailing_zeros());
                }
            }
        }
        KnownBits {
            zeros: ArbBitInt::low_bits_set(bitw, trail_zeros).bitand(mask),
            ones: ArbBitInt::zero(bitw),
        }
    }

    fn kb_phi(&self, v: InstIdx, x: &Phi, mask: &ArbBitInt, depth: u32) -> KnownBits {
        let bitw = mask.bitw();
        let all = ArbBitInt::all_bits_set(bitw);
        let mut kb = KnownBits::unknown(bitw);

        // A simple two-input recurrence `phi [start, phi op step]` where `op` preserves low zero
        // bits if both operands have them.
        if let &[a, b] = &x.incoming[..] {
            for (l, start) in [(a, b), (b, a)] {
                let Inst::BinOp(BinOp {
                    kind:
                        BinOpKind::Add | BinOpKind::Sub | BinOpKind::And | BinOpKind::Or | BinOpKind::Mul,
                    lhs,
                    rhs,
                    ..
                }) = self.m.inst(l)
                else {
                    continue;
                };
                let step = if *lhs == v {
                    *rhs
                } else if *rhs == v {
                    *lhs
                } else {
                    break;
                };
                let s = self.compute_known_bits(start, &all, depth + 1);
                let s_trail = s.known_trailing_zeros();
                let mask2 = ArbBitInt::low_bits_set(bitw, s_trail);
                let t = self.compute_known_bits(step, &mask2, depth + 1);
                let trail_zeros = s_trail.min(t.known_trailing_zeros());
                kb.zeros = mask.bitand(&ArbBitInt::low_bits_set(bitw, trail_zeros));
                break;
            }
        }

        // Unreachable blocks may have phis with no incoming values, and a phi whose incoming
        // values are all itself has no defined value.
        if x.incoming.iter().all(|y| *y == v) {
            return KnownBits::unknown(bitw);
        }

        // Otherwise intersect the known bits of the incoming values, capping the recursion so
        // as not to spin around loops.
        if depth < self.max_depth - 1 && kb.zeros.is_zero() && kb.ones.is_zero() {
            kb = KnownBits {
                zeros: all.clone(),
                ones: all,
            };
            for inc in &x.incoming {
                if *inc == v {
                    continue;
                }
                let inc_mask = mask.bitand(&kb.knowns());
                let inc_kb = self.compute_known_bits(*inc, &inc_mask, self.max_depth - 1);
                kb = kb.intersect(&inc_kb);
                if kb.zeros.is_zero() && kb.ones.is_zero() {
                    break;
                }
            }
        }
        kb
    }

    fn kb_call(&self, x: &Call, bitw: u32) -> KnownBits {
        let mut kb = KnownBits::unknown(bitw);
        let Callee::Intrinsic(intr) = x.callee else {
            return kb;
        };
        // Bit counts are no greater than the bit width, so their high bits are zero.
        let count_bits = log2(bitw) + 1;
        match intr {
            Intrinsic::Ctlz | Intrinsic::Cttz => {
                let mut low_bits = count_bits;
                // If the count of a zero input is undefined, the result is less than `bitw`.
                if x.args.get(1).is_some_and(|y| {
                    self.m.const_int(*y).is_some_and(|c| c.bitw() == 1 && c.is_one())
                }) {
                    low_bits -= 1;
                }
                kb.zeros = ArbBitInt::high_bits_set(bitw, bitw - low_bits);
            }
            Intrinsic::Ctpop => {
                kb.zeros = ArbBitInt::high_bits_set(bitw, bitw - count_bits);
            }
            Intrinsic::X86Sse42Crc32_64_8 | Intrinsic::X86Sse42Crc32_64_64 if bitw == 64 => {
                kb.zeros = ArbBitInt::high_bits_set(64, 32);
            }
            _ => (),
        }
        kb
    }
}

/// Convert the shift amount `c` into a `u32` no greater than `limit`.
fn shift_amount(c: &ArbBitInt, limit: u32) -> u32 {
    // `limit` always fits in a `u32`.
    u32::try_from(c.limited_value(u64::from(limit))).unwrap_or(limit)
}

fn log2(x: u32) -> u32 {
    x.checked_ilog2().unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        ir::{BinOpFlags, CastKind, Linkage, Module},
        layout::TargetLayout,
    };
    use proptest::prelude::*;
    use smallvec::{SmallVec, smallvec};

    fn kb_str(vt: &ValueTracker, v: InstIdx) -> String {
        vt.known_bits(v).unwrap().to_string()
    }

    #[test]
    fn and_or_xor() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let x = m.push_arg(i8_tyidx).unwrap();
        let c1 = m.push_int(8, 0x0F).unwrap();
        let c2 = m.push_int(8, 0x81).unwrap();
        let and = m.push_binop(BinOpKind::And, x, c1, BinOpFlags::empty()).unwrap();
        let or = m.push_binop(BinOpKind::Or, and, c2, BinOpFlags::empty()).unwrap();
        let xor = m.push_binop(BinOpKind::Xor, or, c1, BinOpFlags::empty()).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(kb_str(&vt, and), "0000????");
        assert_eq!(kb_str(&vt, or), "1000???1");
        assert_eq!(kb_str(&vt, xor), "1000???0");
    }

    #[test]
    fn shifts() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let x = m.push_arg(i8_tyidx).unwrap();
        let c1 = m.push_int(8, 0x81).unwrap();
        let c3 = m.push_int(8, 3).unwrap();
        let c9 = m.push_int(8, 9).unwrap();
        let or = m.push_binop(BinOpKind::Or, x, c1, BinOpFlags::empty()).unwrap();
        let shl = m.push_binop(BinOpKind::Shl, or, c3, BinOpFlags::empty()).unwrap();
        let lshr = m.push_binop(BinOpKind::LShr, or, c3, BinOpFlags::empty()).unwrap();
        let ashr = m.push_binop(BinOpKind::AShr, or, c3, BinOpFlags::empty()).unwrap();
        let shl_big = m.push_binop(BinOpKind::Shl, or, c9, BinOpFlags::empty()).unwrap();
        let shl_var = m.push_binop(BinOpKind::Shl, or, x, BinOpFlags::empty()).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(kb_str(&vt, shl), "????1000");
        assert_eq!(kb_str(&vt, lshr), "0001????");
        assert_eq!(kb_str(&vt, ashr), "1111????");
        assert_eq!(kb_str(&vt, shl_big), "00000000");
        assert_eq!(kb_str(&vt, shl_var), "????????");
    }

    #[test]
    fn casts() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let i16_tyidx = m.int_ty(16).unwrap();
        let i4_tyidx = m.int_ty(4).unwrap();
        let x = m.push_arg(i8_tyidx).unwrap();
        let c = m.push_int(8, 0x80).unwrap();
        let or = m.push_binop(BinOpKind::Or, x, c, BinOpFlags::empty()).unwrap();
        let zext = m.push_cast(CastKind::ZExt, or, i16_tyidx).unwrap();
        let sext = m.push_cast(CastKind::SExt, or, i16_tyidx).unwrap();
        let sext_x = m.push_cast(CastKind::SExt, x, i16_tyidx).unwrap();
        let trunc = m.push_cast(CastKind::Trunc, zext, i4_tyidx).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(kb_str(&vt, zext), "000000001???????");
        assert_eq!(kb_str(&vt, sext), "111111111???????");
        assert_eq!(kb_str(&vt, sext_x), "????????????????");
        assert_eq!(kb_str(&vt, trunc), "????");
    }

    #[test]
    fn ptr_casts_need_layout() {
        let mut m = Module::new();
        let i64_tyidx = m.int_ty(64).unwrap();
        let i8_tyidx = m.int_ty(8).unwrap();
        let a = m.push_alloca(i8_tyidx, 8).unwrap();
        let p2i = m.push_cast(CastKind::PtrToInt, a, i64_tyidx).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(vt.known_bits(p2i).unwrap().known_trailing_zeros(), 0);
        let tl = TargetLayout::default();
        let vt = ValueTracker::new(&m, Some(&tl));
        assert_eq!(vt.known_bits(p2i).unwrap().known_trailing_zeros(), 3);
    }

    #[test]
    fn sext_narrowed_mask() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let i16_tyidx = m.int_ty(16).unwrap();
        let x = m.push_arg(i8_tyidx).unwrap();
        let c = m.push_int(8, 0x80).unwrap();
        let or = m.push_binop(BinOpKind::Or, x, c, BinOpFlags::empty()).unwrap();
        let sext = m.push_cast(CastKind::SExt, or, i16_tyidx).unwrap();
        let vt = ValueTracker::new(&m, None);
        let high = ArbBitInt::high_bits_set(16, 8);
        let kb = vt.compute_known_bits(sext, &high, 0);
        assert!(kb.zeros.is_zero() && kb.ones.is_zero());
        let with_sign = high.with_bit_set(7);
        let kb = vt.compute_known_bits(sext, &with_sign, 0);
        assert_eq!(kb.ones.to_zero_ext_u64(), 0xFF80);
    }

    #[test]
    fn int_to_ptr() {
        let mut m = Module::new();
        let i64_tyidx = m.int_ty(64).unwrap();
        let i32_tyidx = m.int_ty(32).unwrap();
        let ptr = m.ptr_ty();
        let x = m.push_arg(i64_tyidx).unwrap();
        let y = m.push_arg(i32_tyidx).unwrap();
        let c = m.push_int(64, 0xFFFF_FFFF_FFFF_FFF8).unwrap();
        let one = m.push_int(32, 1).unwrap();
        let and = m.push_binop(BinOpKind::And, x, c, BinOpFlags::empty()).unwrap();
        let or = m.push_binop(BinOpKind::Or, y, one, BinOpFlags::empty()).unwrap();
        let p = m.push_cast(CastKind::IntToPtr, and, ptr).unwrap();
        let q = m.push_cast(CastKind::IntToPtr, or, ptr).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(vt.known_bits(p), None);
        let tl = TargetLayout::default();
        let vt = ValueTracker::new(&m, Some(&tl));
        assert_eq!(vt.known_bits(p).unwrap().known_trailing_zeros(), 3);
        let kb = vt.known_bits(q).unwrap();
        assert_eq!(kb.known_leading_zeros(), 32);
        assert_eq!(kb.ones.to_zero_ext_u64(), 1);
    }

    #[test]
    fn bitcast_pass_through() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let i32_tyidx = m.int_ty(32).unwrap();
        let ptr = m.ptr_ty();
        let float = m.push_ty(Ty::Float).unwrap();
        let a = m.push_alloca(i8_tyidx, 16).unwrap();
        let cast = m.push_cast(CastKind::BitCast, a, ptr).unwrap();
        let f = m.push_arg(float).unwrap();
        let fcast = m.push_cast(CastKind::BitCast, f, i32_tyidx).unwrap();
        let tl = TargetLayout::default();
        let vt = ValueTracker::new(&m, Some(&tl));
        assert_eq!(vt.known_bits(cast).unwrap().known_trailing_zeros(), 4);
        assert_eq!(vt.known_bits(fcast), Some(KnownBits::unknown(32)));
    }

    #[test]
    fn alloca_alignment() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let i32_tyidx = m.int_ty(32).unwrap();
        let arr = m
            .push_ty(Ty::Array {
                elem: i8_tyidx,
                len: 4,
            })
            .unwrap();
        let a16 = m.push_alloca(arr, 16).unwrap();
        let a0 = m.push_alloca(i32_tyidx, 0).unwrap();
        let tl = TargetLayout::default();
        let vt = ValueTracker::new(&m, Some(&tl));
        let kb = vt.known_bits(a16).unwrap();
        assert_eq!(kb.bitw(), 64);
        assert_eq!(kb.zeros.to_zero_ext_u64(), 0b1111);
        assert!(kb.ones.is_zero());
        assert_eq!(vt.known_bits(a0).unwrap().known_trailing_zeros(), 2);
        // Without a layout, nothing can be said about pointer widths.
        let vt = ValueTracker::new(&m, None);
        assert_eq!(vt.known_bits(a16), None);
    }

    #[test]
    fn globals_and_aliases() {
        let mut m = Module::new();
        let ptr = m.ptr_ty();
        let i32_tyidx = m.int_ty(32).unwrap();
        let init = m.push_int(32, 7).unwrap();
        let g = |name: &str, align, linkage, init| Global {
            tyidx: ptr,
            name: name.to_string(),
            value_tyidx: i32_tyidx,
            align,
            linkage,
            constant: false,
            init,
        };
        let explicit = m
            .push_inst(g("a", 64, Linkage::External, Some(init)).into())
            .unwrap();
        let pref = m
            .push_inst(g("b", 0, Linkage::Internal, Some(init)).into())
            .unwrap();
        let decl = m.push_inst(g("c", 0, Linkage::External, None).into()).unwrap();
        let alias = m
            .push_inst(
                crate::ir::Alias {
                    tyidx: ptr,
                    name: "d".to_string(),
                    aliasee: explicit,
                    linkage: Linkage::External,
                }
                .into(),
            )
            .unwrap();
        let weak_alias = m
            .push_inst(
                crate::ir::Alias {
                    tyidx: ptr,
                    name: "e".to_string(),
                    aliasee: explicit,
                    linkage: Linkage::WeakAny,
                }
                .into(),
            )
            .unwrap();
        let tl = TargetLayout::default();
        let vt = ValueTracker::new(&m, Some(&tl));
        let tz = |v| vt.known_bits(v).unwrap().known_trailing_zeros();
        assert_eq!(tz(explicit), 6);
        assert_eq!(tz(pref), 2);
        assert_eq!(tz(decl), 2);
        assert_eq!(tz(alias), 6);
        assert_eq!(tz(weak_alias), 0);
    }

    #[test]
    fn byval_args() {
        let mut m = Module::new();
        let ptr = m.ptr_ty();
        let a = m
            .push_inst(
                Arg {
                    tyidx: ptr,
                    byval: true,
                    align: 32,
                }
                .into(),
            )
            .unwrap();
        let tl = TargetLayout::default();
        let vt = ValueTracker::new(&m, Some(&tl));
        assert_eq!(vt.known_bits(a).unwrap().known_trailing_zeros(), 5);
    }

    #[test]
    fn gep() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let i32_tyidx = m.int_ty(32).unwrap();
        let i64_tyidx = m.int_ty(64).unwrap();
        let st = m
            .push_ty(Ty::Struct {
                fields: SmallVec::from_slice(&[i8_tyidx, i32_tyidx]),
                packed: false,
            })
            .unwrap();
        let base = m.push_alloca(st, 16).unwrap();
        let i = m.push_arg(i64_tyidx).unwrap();
        let zero64 = m.push_int(64, 0).unwrap();
        let zero32 = m.push_int(32, 0).unwrap();
        let one32 = m.push_int(32, 1).unwrap();
        let field0 = m.push_gep(st, base, &[zero64, zero32], true).unwrap();
        let field1 = m.push_gep(st, base, &[zero64, one32], true).unwrap();
        let elem = m.push_gep(i32_tyidx, base, &[i], false).unwrap();
        let tl = TargetLayout::default();
        let vt = ValueTracker::new(&m, Some(&tl));
        let tz = |v| vt.known_bits(v).unwrap().known_trailing_zeros();
        assert_eq!(tz(field0), 4);
        assert_eq!(tz(field1), 2);
        assert_eq!(tz(elem), 2);
    }

    #[test]
    fn udiv_urem_srem() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let x = m.push_arg(i8_tyidx).unwrap();
        let c16 = m.push_int(8, 16).unwrap();
        let c5 = m.push_int(8, 5).unwrap();
        let c0f = m.push_int(8, 0x0F).unwrap();
        let neg8 = m.push_int(8, 0xF8).unwrap();
        let udiv = m.push_binop(BinOpKind::UDiv, x, c16, BinOpFlags::empty()).unwrap();
        let urem = m.push_binop(BinOpKind::URem, x, c16, BinOpFlags::empty()).unwrap();
        let and = m.push_binop(BinOpKind::And, x, c0f, BinOpFlags::empty()).unwrap();
        let urem5 = m.push_binop(BinOpKind::URem, and, c5, BinOpFlags::empty()).unwrap();
        let srem = m.push_binop(BinOpKind::SRem, and, neg8, BinOpFlags::empty()).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(kb_str(&vt, udiv), "0000????");
        assert_eq!(kb_str(&vt, urem), "0000????");
        assert_eq!(kb_str(&vt, urem5), "00000???");
        assert_eq!(kb_str(&vt, srem), "00000???");
    }

    #[test]
    fn sub_from_constant() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let x = m.push_arg(i8_tyidx).unwrap();
        let c15 = m.push_int(8, 15).unwrap();
        let c20 = m.push_int(8, 20).unwrap();
        let and = m.push_binop(BinOpKind::And, x, c15, BinOpFlags::empty()).unwrap();
        let sub = m.push_binop(BinOpKind::Sub, c20, and, BinOpFlags::empty()).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(vt.known_bits(sub).unwrap().known_leading_zeros(), 3);
    }

    #[test]
    fn mul() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let x = m.push_arg(i8_tyidx).unwrap();
        let y = m.push_arg(i8_tyidx).unwrap();
        let c4 = m.push_int(8, 4).unwrap();
        let c2 = m.push_int(8, 2).unwrap();
        let shl_x = m.push_binop(BinOpKind::Shl, x, c2, BinOpFlags::empty()).unwrap();
        let mul = m.push_binop(BinOpKind::Mul, shl_x, c4, BinOpFlags::empty()).unwrap();
        let sq = m.push_binop(BinOpKind::Mul, y, y, BinOpFlags::NSW).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(vt.known_bits(mul).unwrap().known_trailing_zeros(), 4);
        assert!(vt.known_bits(sq).unwrap().is_known_non_negative());
    }

    #[test]
    fn srem_negative_dividend() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let x = m.push_arg(i8_tyidx).unwrap();
        let c81 = m.push_int(8, 0x81).unwrap();
        let c8 = m.push_int(8, 8).unwrap();
        let or = m.push_binop(BinOpKind::Or, x, c81, BinOpFlags::empty()).unwrap();
        let srem = m.push_binop(BinOpKind::SRem, or, c8, BinOpFlags::empty()).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(kb_str(&vt, srem), "11111??1");
    }

    #[test]
    fn mul_nsw_negative() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let x = m.push_arg(i8_tyidx).unwrap();
        let c7f = m.push_int(8, 0x7F).unwrap();
        let c81 = m.push_int(8, 0x81).unwrap();
        let one = m.push_int(8, 1).unwrap();
        let nonneg = m.push_binop(BinOpKind::And, x, c7f, BinOpFlags::empty()).unwrap();
        let pos = m.push_binop(BinOpKind::Or, nonneg, one, BinOpFlags::empty()).unwrap();
        let neg = m.push_binop(BinOpKind::Or, x, c81, BinOpFlags::empty()).unwrap();
        let mul = m.push_binop(BinOpKind::Mul, pos, neg, BinOpFlags::NSW).unwrap();
        // Zero times a negative number is zero, so the sign is unknown.
        let mul_zero = m.push_binop(BinOpKind::Mul, nonneg, neg, BinOpFlags::NSW).unwrap();
        let mul_wrap = m.push_binop(BinOpKind::Mul, pos, neg, BinOpFlags::empty()).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(kb_str(&vt, mul), "1???????");
        assert_eq!(kb_str(&vt, mul_zero), "????????");
        assert_eq!(kb_str(&vt, mul_wrap), "????????");
    }

    #[test]
    fn add_nsw_sign() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let x = m.push_arg(i8_tyidx).unwrap();
        let y = m.push_arg(i8_tyidx).unwrap();
        let c = m.push_int(8, 0x7F).unwrap();
        let a = m.push_binop(BinOpKind::And, x, c, BinOpFlags::empty()).unwrap();
        let b = m.push_binop(BinOpKind::And, y, c, BinOpFlags::empty()).unwrap();
        let add = m.push_binop(BinOpKind::Add, a, b, BinOpFlags::NSW).unwrap();
        let add_wrap = m.push_binop(BinOpKind::Add, a, b, BinOpFlags::empty()).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert!(vt.known_bits(add).unwrap().is_known_non_negative());
        assert!(!vt.known_bits(add_wrap).unwrap().is_known_non_negative());
    }

    #[test]
    fn phis() {
        let mut m = Module::new();
        let i32_tyidx = m.int_ty(32).unwrap();
        let zero = m.push_int(32, 0).unwrap();
        let four = m.push_int(32, 4).unwrap();
        let eight = m.push_int(32, 8).unwrap();
        let i = m.push_phi(i32_tyidx).unwrap();
        let next = m.push_binop(BinOpKind::Add, i, four, BinOpFlags::empty()).unwrap();
        m.set_phi_incoming(i, &[zero, next]).unwrap();
        let p = m.push_phi(i32_tyidx).unwrap();
        m.set_phi_incoming(p, &[four, eight, p]).unwrap();
        let selfish = m.push_phi(i32_tyidx).unwrap();
        m.set_phi_incoming(selfish, &[selfish]).unwrap();
        let empty = m.push_phi(i32_tyidx).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(vt.known_bits(next).unwrap().known_trailing_zeros(), 2);
        assert_eq!(vt.known_bits(i).unwrap().known_trailing_zeros(), 2);
        let kb = vt.known_bits(p).unwrap();
        assert_eq!(kb.known_trailing_zeros(), 2);
        assert_eq!(kb.known_leading_zeros(), 28);
        assert_eq!(vt.known_bits(selfish), Some(KnownBits::unknown(32)));
        assert_eq!(vt.known_bits(empty), Some(KnownBits::unknown(32)));
    }

    #[test]
    fn phi_recurrences() {
        let mut m = Module::new();
        let i32_tyidx = m.int_ty(32).unwrap();
        let mut phis = Vec::new();
        for (kind, start, step, trail) in [
            (BinOpKind::Sub, 8, 4, 2),
            (BinOpKind::Mul, 4, 8, 2),
            (BinOpKind::And, 12, 0xFC, 2),
            (BinOpKind::Or, 16, 32, 4),
        ] {
            let start = m.push_int(32, start).unwrap();
            let step = m.push_int(32, step).unwrap();
            let phi = m.push_phi(i32_tyidx).unwrap();
            let next = m.push_binop(kind, phi, step, BinOpFlags::empty()).unwrap();
            m.set_phi_incoming(phi, &[start, next]).unwrap();
            phis.push((phi, trail));
        }
        let vt = ValueTracker::new(&m, None);
        for (phi, trail) in phis {
            assert_eq!(vt.known_bits(phi).unwrap().known_trailing_zeros(), trail);
        }
    }

    #[test]
    fn intrinsics() {
        let mut m = Module::new();
        let i32_tyidx = m.int_ty(32).unwrap();
        let i64_tyidx = m.int_ty(64).unwrap();
        let x = m.push_arg(i32_tyidx).unwrap();
        let y = m.push_arg(i64_tyidx).unwrap();
        let t = m.push_int(1, 1).unwrap();
        let f = m.push_int(1, 0).unwrap();
        let ctlz = m
            .push_call(Callee::Intrinsic(Intrinsic::Ctlz), &[x, f], i32_tyidx)
            .unwrap();
        let cttz = m
            .push_call(Callee::Intrinsic(Intrinsic::Cttz), &[x, t], i32_tyidx)
            .unwrap();
        let ctpop = m
            .push_call(Callee::Intrinsic(Intrinsic::Ctpop), &[x], i32_tyidx)
            .unwrap();
        let crc = m
            .push_call(
                Callee::Intrinsic(Intrinsic::X86Sse42Crc32_64_64),
                &[y, y],
                i64_tyidx,
            )
            .unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(vt.known_bits(ctlz).unwrap().known_leading_zeros(), 26);
        assert_eq!(vt.known_bits(cttz).unwrap().known_leading_zeros(), 27);
        assert_eq!(vt.known_bits(ctpop).unwrap().known_leading_zeros(), 26);
        assert_eq!(vt.known_bits(crc).unwrap().known_leading_zeros(), 32);
    }

    #[test]
    fn const_vectors() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let v2 = m
            .push_ty(Ty::Vector {
                elem: i8_tyidx,
                len: 2,
            })
            .unwrap();
        let a = m.push_int(8, 0b1100).unwrap();
        let b = m.push_int(8, 0b1000).unwrap();
        let vec = m.push_const(v2, ConstKind::Aggregate(smallvec![a, b])).unwrap();
        let zero = m.push_null_value(v2).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(kb_str(&vt, vec), "00001?00");
        assert_eq!(kb_str(&vt, zero), "00000000");
    }

    #[test]
    fn depth_limit() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let c = m.push_int(8, 0xF0).unwrap();
        let x = m.push_arg(i8_tyidx).unwrap();
        let mut v = m.push_binop(BinOpKind::And, x, c, BinOpFlags::empty()).unwrap();
        for _ in 0..8 {
            v = m.push_binop(BinOpKind::Or, v, x, BinOpFlags::empty()).unwrap();
            v = m.push_binop(BinOpKind::And, v, c, BinOpFlags::empty()).unwrap();
        }
        let vt = ValueTracker::new(&m, None);
        // The outermost `and` still sees its constant operand.
        assert_eq!(vt.known_bits(v).unwrap().known_trailing_zeros(), 4);
        let mask = ArbBitInt::all_bits_set(8);
        assert_eq!(
            vt.compute_known_bits(v, &mask, vt.max_depth()),
            KnownBits::unknown(8)
        );
    }

    /// The operations whose known bits are checked against concrete evaluation.
    #[derive(Clone, Copy, Debug)]
    enum Op {
        Bin(BinOpKind),
        ShiftConst(BinOpKind, u32),
        ZExt,
        SExt,
        Trunc,
        Select(bool),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::sample::select(vec![
                BinOpKind::Add,
                BinOpKind::Sub,
                BinOpKind::Mul,
                BinOpKind::And,
                BinOpKind::Or,
                BinOpKind::Xor,
                BinOpKind::UDiv,
                BinOpKind::URem,
                BinOpKind::SRem,
            ])
            .prop_map(Op::Bin),
            (
                prop::sample::select(vec![BinOpKind::Shl, BinOpKind::LShr, BinOpKind::AShr]),
                0u32..8
            )
                .prop_map(|(k, s)| Op::ShiftConst(k, s)),
            Just(Op::ZExt),
            Just(Op::SExt),
            Just(Op::Trunc),
            any::<bool>().prop_map(Op::Select),
        ]
    }

    /// Build a value whose bits in `known` are those of `val` and whose other bits are unknown:
    /// `(arg & !known) | (val & known)`.
    fn partially_known(m: &mut Module, val: u64, known: u64) -> InstIdx {
        let i8_tyidx = m.int_ty(8).unwrap();
        let arg = m.push_arg(i8_tyidx).unwrap();
        let unknown_mask = m.push_int(8, !known).unwrap();
        let known_val = m.push_int(8, val & known).unwrap();
        let a = m
            .push_binop(BinOpKind::And, arg, unknown_mask, BinOpFlags::empty())
            .unwrap();
        m.push_binop(BinOpKind::Or, a, known_val, BinOpFlags::empty())
            .unwrap()
    }

    proptest! {
        /// Every bit the analysis claims to know must agree with concrete evaluation.
        #[test]
        fn known_bits_are_sound(
            op in op_strategy(),
            a in any::<u8>(),
            b in any::<u8>(),
            ka in any::<u8>(),
            kb in any::<u8>(),
        ) {
            let (a, b) = (ArbBitInt::from_u64(8, u64::from(a)), ArbBitInt::from_u64(8, u64::from(b)));
            let mut m = Module::new();
            let x = partially_known(&mut m, a.to_zero_ext_u64(), u64::from(ka));
            let y = partially_known(&mut m, b.to_zero_ext_u64(), u64::from(kb));
            let (v, expected) = match op {
                Op::Bin(kind) => {
                    let expected = match kind {
                        BinOpKind::Add => Some(a.wrapping_add(&b)),
                        BinOpKind::Sub => Some(a.wrapping_sub(&b)),
                        BinOpKind::Mul => Some(a.wrapping_mul(&b)),
                        BinOpKind::And => Some(a.bitand(&b)),
                        BinOpKind::Or => Some(a.bitor(&b)),
                        BinOpKind::Xor => Some(a.bitxor(&b)),
                        BinOpKind::UDiv => a.checked_udiv(&b),
                        BinOpKind::URem => a.checked_urem(&b),
                        BinOpKind::SRem => a.checked_srem(&b),
                        _ => unreachable!(),
                    };
                    // Division by zero (or signed overflow) has no defined result.
                    prop_assume!(expected.is_some());
                    (m.push_binop(kind, x, y, BinOpFlags::empty()).unwrap(), expected.unwrap())
                }
                Op::ShiftConst(kind, s) => {
                    let c = m.push_int(8, u64::from(s)).unwrap();
                    let expected = match kind {
                        BinOpKind::Shl => a.shl(s),
                        BinOpKind::LShr => a.lshr(s),
                        _ => a.checked_ashr(s).unwrap(),
                    };
                    (m.push_binop(kind, x, c, BinOpFlags::empty()).unwrap(), expected)
                }
                Op::ZExt => {
                    let i16_tyidx = m.int_ty(16).unwrap();
                    (m.push_cast(CastKind::ZExt, x, i16_tyidx).unwrap(), a.zero_extend(16))
                }
                Op::SExt => {
                    let i16_tyidx = m.int_ty(16).unwrap();
                    (m.push_cast(CastKind::SExt, x, i16_tyidx).unwrap(), a.sign_extend(16))
                }
                Op::Trunc => {
                    let i4_tyidx = m.int_ty(4).unwrap();
                    (m.push_cast(CastKind::Trunc, x, i4_tyidx).unwrap(), a.truncate(4))
                }
                Op::Select(cond) => {
                    let i1_tyidx = m.int_ty(1).unwrap();
                    let c = m.push_arg(i1_tyidx).unwrap();
                    let expected = if cond { a.clone() } else { b.clone() };
                    (m.push_select(c, x, y).unwrap(), expected)
                }
            };
            let vt = ValueTracker::new(&m, None);
            let known = vt.known_bits(v).unwrap();
            known.assert_disjoint();
            prop_assert!(known.admits(&expected), "{op:?}: {known} does not admit {expected}");
        }

        /// Narrowing the mask never invents facts that the full mask refutes.
        #[test]
        fn masks_are_consistent(a in any::<u8>(), ka in any::<u8>(), mask in any::<u8>(), s in 0u64..8) {
            let mut m = Module::new();
            let x = partially_known(&mut m, u64::from(a), u64::from(ka));
            let c = m.push_int(8, s).unwrap();
            let v = m.push_binop(BinOpKind::AShr, x, c, BinOpFlags::empty()).unwrap();
            let vt = ValueTracker::new(&m, None);
            let mask = ArbBitInt::from_u64(8, u64::from(mask));
            let narrow = vt.compute_known_bits(v, &mask, 0);
            let full = vt.known_bits(v).unwrap();
            prop_assert!(!narrow.restrict(&mask).definitely_ne(&full));
        }
    }
}
