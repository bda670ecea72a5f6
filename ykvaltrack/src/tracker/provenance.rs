//! Where pointers come from, and what can safely be done with them.

use super::{ValueTracker, patterns};
use crate::ir::{
    BinOp, BinOpKind, Call, Callee, Cast, CastKind, Gep, GepStep, Inst, InstIdx, Intrinsic,
    Linkage, Load, Module, Ty,
};
use std::collections::HashSet;

impl ValueTracker<'_> {
    /// Strip bitcasts and constant-index `getelementptr`s from `ptr`, returning the pointer
    /// reached and the byte offset accumulated on the way. The offset is wrapped to the pointer
    /// width.
    ///
    /// Without a target layout, a `getelementptr` is only looked through if all its indices are
    /// zero.
    pub fn pointer_base_with_constant_offset(&self, ptr: InstIdx) -> (InstIdx, i64) {
        let mut v = ptr;
        let mut offset = 0i64;
        loop {
            if matches!(self.m.inst_ty(v), Ty::Vector { .. }) {
                break;
            }
            if let Some(val) = patterns::cast(self.m, v, CastKind::BitCast) {
                v = val;
                continue;
            }
            match self.m.inst(v) {
                Inst::Gep(x) => {
                    let Some(gep_off) = self.constant_gep_offset(v, x) else {
                        break;
                    };
                    offset = offset.wrapping_add(gep_off);
                    if let Some(tl) = self.layout
                        && tl.ptr_bitw() < 64
                    {
                        // Sign extend from the pointer width so that overflow wraps correctly.
                        let shift = 64 - tl.ptr_bitw();
                        offset = (offset << shift) >> shift;
                    }
                    v = x.ptr;
                }
                _ => break,
            }
        }
        self.log_query(
            "pointer_base_with_constant_offset",
            ptr,
            &format_args!("%{} + {offset}", usize::from(v)),
        );
        (v, offset)
    }

    /// The byte offset `gep` adds to its pointer, if all its indices are constants.
    fn constant_gep_offset(&self, v: InstIdx, gep: &Gep) -> Option<i64> {
        let steps = self.m.gep_steps(gep)?;
        let mut offset = 0i64;
        for (idx, step) in steps {
            let c = self.m.const_int(idx)?;
            if c.is_zero() {
                continue;
            }
            let Some(tl) = self.layout else {
                self.warn_no_layout(v, "getelementptr offset");
                return None;
            };
            let delta = match step {
                GepStep::Field { sty, field } => {
                    let sl = tl.struct_layout(self.m, sty);
                    i64::try_from(*sl.offsets.get(usize::try_from(field).ok()?)?).ok()?
                }
                GepStep::Seq { elem } => {
                    let size = i64::try_from(tl.alloc_size(self.m, elem)).ok()?;
                    c.to_sign_ext_i64().wrapping_mul(size)
                }
            };
            offset = offset.wrapping_add(delta);
        }
        Some(offset)
    }

    /// Strip `getelementptr`s, bitcasts, and aliases that cannot be overridden from `v`, taking
    /// at most `max_lookup` steps (0 means no limit). Non-pointer values are returned unchanged.
    pub fn underlying_object(&self, v: InstIdx, max_lookup: u32) -> InstIdx {
        if !self.m.inst_ty(v).is_ptr() {
            return v;
        }
        let mut v = v;
        let mut count = 0;
        while max_lookup == 0 || count < max_lookup {
            v = match self.m.inst(v) {
                Inst::Gep(Gep { ptr, .. }) => *ptr,
                Inst::Alias(x) if !x.linkage.may_be_overridden() => x.aliasee,
                _ => match patterns::cast(self.m, v, CastKind::BitCast) {
                    Some(val) => val,
                    None => return v,
                },
            };
            count += 1;
        }
        v
    }

    /// Can `ptr` be dereferenced without trapping?
    pub fn is_dereferenceable_pointer(&self, ptr: InstIdx) -> bool {
        self.is_dereferenceable(ptr, &mut HashSet::new())
    }

    fn is_dereferenceable(&self, v: InstIdx, visited: &mut HashSet<InstIdx>) -> bool {
        match self.m.inst(v) {
            Inst::Alloca(_) => true,
            // Extern weak globals may resolve to null.
            Inst::Global(x) => x.linkage != Linkage::ExternalWeak,
            Inst::Arg(x) => x.byval,
            Inst::Cast(Cast {
                kind: CastKind::BitCast,
                val,
                ..
            }) => visited.insert(*val) && self.is_dereferenceable(*val, visited),
            Inst::Gep(x) => {
                // The base pointer must be dereferenceable and the indices must stay within the
                // allocated object.
                visited.insert(x.ptr)
                    && self.is_dereferenceable(x.ptr, visited)
                    && gep_in_bounds(self.m, x)
            }
            _ => false,
        }
    }

    /// Can `iidx` be executed even if it would not have been executed in the original program?
    /// That requires it to have no side effects and to be unable to trap.
    pub fn is_safe_to_speculatively_execute(&self, iidx: InstIdx) -> bool {
        match self.m.inst(iidx) {
            Inst::BinOp(BinOp {
                kind: BinOpKind::UDiv | BinOpKind::URem,
                rhs,
                ..
            }) => self.is_known_non_zero(*rhs, 0),
            Inst::BinOp(BinOp {
                kind: BinOpKind::SDiv | BinOpKind::SRem,
                rhs,
                ..
            }) => {
                // `x / 0` is undefined, as is `INT_MIN / -1`: a known zero bit rules out -1.
                if !self.is_known_non_zero(*rhs, 0) {
                    return false;
                }
                self.known_bits(*rhs).is_some_and(|x| !x.zeros.is_zero())
            }
            Inst::Load(Load { ptr, volatile, .. }) => {
                !*volatile && self.is_dereferenceable_pointer(*ptr)
            }
            Inst::Call(Call { callee, .. }) => matches!(
                callee,
                Callee::Intrinsic(
                    Intrinsic::Bswap
                        | Intrinsic::Ctlz
                        | Intrinsic::Ctpop
                        | Intrinsic::Cttz
                        | Intrinsic::ObjectSize
                        | Intrinsic::SAddWithOverflow
                        | Intrinsic::SMulWithOverflow
                        | Intrinsic::SSubWithOverflow
                        | Intrinsic::UAddWithOverflow
                        | Intrinsic::UMulWithOverflow
                        | Intrinsic::USubWithOverflow
                )
            ),
            Inst::Alloca(_) | Inst::Phi(_) | Inst::Store(_) => false,
            _ => true,
        }
    }
}

/// Do `gep`'s indices stay within the object its base pointer points to? Struct fields always
/// do. Other indices must be zero, or constants in range of an array.
fn gep_in_bounds(m: &Module, gep: &Gep) -> bool {
    let Some((first, rest)) = gep.idxs.split_first() else {
        return true;
    };
    // The first index steps over whole objects.
    if !m.const_int(*first).is_some_and(|x| x.is_zero()) {
        return false;
    }
    let mut cur = gep.src_tyidx;
    for idx in rest {
        cur = match m.ty(cur) {
            Ty::Struct { fields, .. } => {
                let Some(next) = m
                    .const_int(*idx)
                    .and_then(|x| x.to_zero_ext_u32())
                    .and_then(|x| usize::try_from(x).ok())
                    .and_then(|x| fields.get(x))
                else {
                    return false;
                };
                *next
            }
            Ty::Array { elem, len } => {
                match m.const_int(*idx) {
                    Some(c) if c.to_zero_ext_u64() < *len => (),
                    _ => return false,
                }
                *elem
            }
            Ty::Vector { elem, .. } => {
                if !m.const_int(*idx).is_some_and(|x| x.is_zero()) {
                    return false;
                }
                *elem
            }
            _ => return false,
        };
    }
    true
}

/// Are all the users of `v` calls to the `lifetime.start` or `lifetime.end` intrinsics?
pub fn only_used_by_lifetime_markers(m: &Module, v: InstIdx) -> bool {
    m.users(v).all(|x| {
        matches!(
            m.inst(x),
            Inst::Call(Call {
                callee: Callee::Intrinsic(Intrinsic::LifetimeStart | Intrinsic::LifetimeEnd),
                ..
            })
        )
    })
}
