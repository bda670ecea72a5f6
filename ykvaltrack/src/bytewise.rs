//! Values that can be stored by repeating a single byte, e.g. so that a store loop can become a
//! `memset`.

use crate::{
    arbbitint::ArbBitInt,
    ir::{Const, ConstKind, Inst, InstIdx, Module, Ty},
    log::{Verbosity, log, should_log},
};

/// If every byte of `v` is the same, return that byte as an `i8` value (which may be `v` itself,
/// or a newly interned constant). Returns `None` if `v` isn't known to be bytewise.
pub fn is_bytewise_value(m: &mut Module, v: InstIdx) -> Option<InstIdx> {
    let r = match bytewise(m, v) {
        Some(Byte::Val(x)) => Some(x),
        Some(Byte::Const(x)) => m.push_int(8, u64::from(x)).ok(),
        None => None,
    };
    if should_log(Verbosity::Query) {
        let r = r.map_or_else(|| "none".to_string(), |x| format!("%{}", usize::from(x)));
        log(
            Verbosity::Query,
            &format!("is_bytewise_value %{}: {r}", usize::from(v)),
        );
    }
    r
}

enum Byte {
    /// An existing `i8` value.
    Val(InstIdx),
    /// A constant byte that may not yet exist in the module.
    Const(u8),
}

fn bytewise(m: &Module, v: InstIdx) -> Option<Byte> {
    if let Ty::Int(8) = m.inst_ty(v) {
        return Some(Byte::Val(v));
    }
    if m.is_null_value(v) {
        return Some(Byte::Const(0));
    }
    let Inst::Const(Const { tyidx, kind }) = m.inst(v) else {
        return None;
    };
    match kind {
        ConstKind::Int(x) => splat_byte(x.clone()).map(Byte::Const),
        ConstKind::Float(x) => splat_byte(ArbBitInt::from_u64(32, u64::from(*x))).map(Byte::Const),
        ConstKind::Double(x) => splat_byte(ArbBitInt::from_u64(64, *x)).map(Byte::Const),
        ConstKind::Aggregate(elems) if matches!(m.ty(*tyidx), Ty::Array { .. }) => {
            // Constants are interned, so equal elements have equal indices.
            let (first, rest) = elems.split_first()?;
            if rest.iter().any(|x| x != first) {
                return None;
            }
            bytewise(m, *first)
        }
        _ => None,
    }
}

/// If `x` is a power-of-two number of bits wide and consists of one byte repeated, return that
/// byte.
fn splat_byte(mut x: ArbBitInt) -> Option<u8> {
    if !x.bitw().is_power_of_two() || x.bitw() < 8 {
        return None;
    }
    while x.bitw() > 8 {
        let half = x.bitw() / 2;
        let hi = x.lshr(half).truncate(half);
        let lo = x.truncate(half);
        if hi != lo {
            return None;
        }
        x = lo;
    }
    u8::try_from(x.to_zero_ext_u64()).ok()
}
