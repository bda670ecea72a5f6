//! Structural pattern matching on instructions.

use crate::ir::{BinOp, BinOpKind, Cast, CastKind, Inst, InstIdx, Module};

/// If `v` is a binary operator of kind `kind`, return it.
pub(super) fn binop(m: &Module, v: InstIdx, kind: BinOpKind) -> Option<&BinOp> {
    match m.inst(v) {
        Inst::BinOp(x) if x.kind == kind => Some(x),
        _ => None,
    }
}

/// If `v` is a cast of kind `kind`, return the value being cast.
pub(super) fn cast(m: &Module, v: InstIdx, kind: CastKind) -> Option<InstIdx> {
    match m.inst(v) {
        Inst::Cast(Cast { kind: k, val, .. }) if *k == kind => Some(*val),
        _ => None,
    }
}

/// Is `v` the integer (or splatted integer) 1?
pub(super) fn is_one(m: &Module, v: InstIdx) -> bool {
    m.const_int_or_splat(v).is_some_and(|x| x.is_one())
}

/// Is `v` an integer (or splatted integer) with only the sign bit set?
pub(super) fn is_sign_bit(m: &Module, v: InstIdx) -> bool {
    m.const_int_or_splat(v).is_some_and(|x| x.is_min_signed())
}

/// If `v` is `sub 0, x`, return `x`.
pub(super) fn neg(m: &Module, v: InstIdx) -> Option<InstIdx> {
    let x = binop(m, v, BinOpKind::Sub)?;
    let zero = m.is_null_value(x.lhs) || m.const_int_or_splat(x.lhs).is_some_and(|c| c.is_zero());
    zero.then_some(x.rhs)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{BinOpFlags, ConstKind, Ty};
    use smallvec::smallvec;

    #[test]
    fn matchers() {
        let mut m = Module::new();
        let i8_tyidx = m.int_ty(8).unwrap();
        let v2 = m
            .push_ty(Ty::Vector {
                elem: i8_tyidx,
                len: 2,
            })
            .unwrap();
        let one = m.push_int(8, 1).unwrap();
        let min = m.push_int(8, 0x80).unwrap();
        let zero = m.push_int(8, 0).unwrap();
        let splat = m
            .push_const(v2, ConstKind::Aggregate(smallvec![one, one]))
            .unwrap();
        let mixed = m
            .push_const(v2, ConstKind::Aggregate(smallvec![one, min]))
            .unwrap();
        let x = m.push_arg(i8_tyidx).unwrap();
        let n = m
            .push_binop(BinOpKind::Sub, zero, x, BinOpFlags::empty())
            .unwrap();
        assert!(is_one(&m, one));
        assert!(is_one(&m, splat));
        assert!(!is_one(&m, mixed));
        assert!(is_sign_bit(&m, min));
        assert!(!is_sign_bit(&m, one));
        assert_eq!(neg(&m, n), Some(x));
        assert_eq!(neg(&m, x), None);
        assert!(binop(&m, n, BinOpKind::Sub).is_some());
        assert!(binop(&m, n, BinOpKind::Add).is_none());
    }
}
