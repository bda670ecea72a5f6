//! Constant C strings.

use super::ValueTracker;
use crate::ir::{Cast, CastKind, Const, ConstKind, Gep, Global, Inst, InstIdx, Phi, Select, Ty};
use std::collections::HashSet;

/// The length of a string found by [ValueTracker::string_length]'s walk.
#[derive(Clone, Copy, Debug, PartialEq)]
enum StrLen {
    Unknown,
    /// A phi already being examined: its length is whatever the other paths say.
    Cycle,
    /// The length plus one.
    Known(u64),
}

impl ValueTracker<'_> {
    /// If `ptr` points into a constant global byte array, return the bytes from that point to
    /// the end of the array or, if `stop_at_nul` is true, to the first NUL byte (exclusive).
    pub fn constant_string_info(&self, ptr: InstIdx, stop_at_nul: bool) -> Option<Vec<u8>> {
        let mut v = ptr;
        let mut offset = 0u64;
        loop {
            match self.m.inst(v) {
                Inst::Cast(Cast {
                    kind: CastKind::BitCast,
                    val,
                    ..
                }) => v = *val,
                Inst::Gep(x) => {
                    // Only `getelementptr [N x i8], ptr, 0, C` is understood.
                    let Ty::Array { elem, .. } = self.m.ty(x.src_tyidx) else {
                        return None;
                    };
                    if !matches!(self.m.ty(*elem), Ty::Int(8)) {
                        return None;
                    }
                    offset = offset.checked_add(self.array_gep_start(x)?)?;
                    v = x.ptr;
                }
                Inst::Global(g) => return self.global_bytes(g, offset, stop_at_nul),
                _ => return None,
            }
        }
    }

    /// If `gep` is of the form `getelementptr T, ptr, 0, C`, return `C`.
    fn array_gep_start(&self, gep: &Gep) -> Option<u64> {
        let [first, second] = gep.idxs[..] else {
            return None;
        };
        if !self.m.const_int(first)?.is_zero() {
            return None;
        }
        Some(self.m.const_int(second)?.to_zero_ext_u64())
    }

    fn global_bytes(&self, g: &Global, offset: u64, stop_at_nul: bool) -> Option<Vec<u8>> {
        if !g.constant || !g.has_definitive_initializer() {
            return None;
        }
        let init = g.init?;
        if self.m.is_null_value(init) {
            return Some(Vec::new());
        }
        let elems = self.byte_array_elems(init)?;
        let start = usize::try_from(offset).ok()?;
        if start > elems.len() {
            return None;
        }
        let mut bytes = Vec::with_capacity(elems.len() - start);
        for e in &elems[start..] {
            let c = self.m.const_int(*e)?;
            if stop_at_nul && c.is_zero() {
                break;
            }
            bytes.push(u8::try_from(c.to_zero_ext_u64()).ok()?);
        }
        Some(bytes)
    }

    /// If `init` is a constant `[N x i8]` array, return its elements.
    fn byte_array_elems(&self, init: InstIdx) -> Option<&[InstIdx]> {
        let Inst::Const(Const {
            tyidx,
            kind: ConstKind::Aggregate(elems),
        }) = self.m.inst(init)
        else {
            return None;
        };
        match self.m.ty(*tyidx) {
            Ty::Array { elem, .. } if matches!(self.m.ty(*elem), Ty::Int(8)) => Some(elems),
            _ => None,
        }
    }

    /// If the length of the NUL-terminated string `ptr` points to can be determined, return the
    /// length plus one; otherwise return 0. Unlike [Self::constant_string_info], this looks
    /// through selects and phis.
    pub fn string_length(&self, ptr: InstIdx) -> u64 {
        if !self.m.inst_ty(ptr).is_ptr() {
            return 0;
        }
        let len = match self.string_length_inner(ptr, &mut HashSet::new()) {
            StrLen::Unknown => 0,
            // Only reachable through a cycle of phis: dead code, so any length will do.
            StrLen::Cycle => 1,
            StrLen::Known(x) => x,
        };
        self.log_query("string_length", ptr, &len);
        len
    }

    fn string_length_inner(&self, v: InstIdx, phis: &mut HashSet<InstIdx>) -> StrLen {
        match self.m.inst(v) {
            Inst::Cast(Cast {
                kind: CastKind::BitCast,
                val,
                ..
            }) => self.string_length_inner(*val, phis),
            Inst::Phi(Phi { incoming, .. }) => {
                if !phis.insert(v) {
                    return StrLen::Cycle;
                }
                // Every incoming string must have the same length.
                let mut len = StrLen::Cycle;
                for inc in incoming {
                    match self.string_length_inner(*inc, phis) {
                        StrLen::Unknown => return StrLen::Unknown,
                        StrLen::Cycle => (),
                        StrLen::Known(x) => {
                            if let StrLen::Known(y) = len
                                && x != y
                            {
                                return StrLen::Unknown;
                            }
                            len = StrLen::Known(x);
                        }
                    }
                }
                len
            }
            Inst::Select(Select {
                trueval, falseval, ..
            }) => {
                let t = self.string_length_inner(*trueval, phis);
                if t == StrLen::Unknown {
                    return StrLen::Unknown;
                }
                let f = self.string_length_inner(*falseval, phis);
                match (t, f) {
                    (_, StrLen::Unknown) => StrLen::Unknown,
                    (StrLen::Cycle, x) | (x, StrLen::Cycle) => x,
                    (x, y) if x == y => x,
                    _ => StrLen::Unknown,
                }
            }
            // A constant global `i8 0` is an empty string.
            Inst::Global(g) => {
                if g.constant
                    && g.has_definitive_initializer()
                    && g.init.is_some_and(|x| self.m.is_null_value(x))
                {
                    StrLen::Known(1)
                } else {
                    StrLen::Unknown
                }
            }
            Inst::Gep(x) => self.gep_string_length(x),
            _ => StrLen::Unknown,
        }
    }

    fn gep_string_length(&self, gep: &Gep) -> StrLen {
        let Some(start) = self.array_gep_start(gep) else {
            return StrLen::Unknown;
        };
        let Inst::Global(g) = self.m.inst(gep.ptr) else {
            return StrLen::Unknown;
        };
        if !g.constant || g.linkage.may_be_overridden() {
            return StrLen::Unknown;
        }
        let Some(init) = g.init else {
            return StrLen::Unknown;
        };
        if matches!(
            self.m.inst(init),
            Inst::Const(Const {
                kind: ConstKind::Zero,
                ..
            })
        ) {
            return StrLen::Known(1);
        }
        let Some(elems) = self.byte_array_elems(init) else {
            return StrLen::Unknown;
        };
        let Ok(start) = usize::try_from(start) else {
            return StrLen::Unknown;
        };
        for (i, e) in elems.iter().enumerate().skip(start) {
            match self.m.const_int(*e) {
                Some(c) if c.is_zero() => {
                    return u64::try_from(i - start + 1).map_or(StrLen::Unknown, StrLen::Known);
                }
                Some(_) => (),
                None => return StrLen::Unknown,
            }
        }
        // Not NUL terminated.
        StrLen::Unknown
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{Linkage, Module, TyIdx};

    /// Add a constant global `[N x i8]` initialised to `bytes`.
    fn string_global(m: &mut Module, name: &str, bytes: &[u8], linkage: Linkage) -> InstIdx {
        let i8_tyidx = m.int_ty(8).unwrap();
        let arr = m
            .push_ty(Ty::Array {
                elem: i8_tyidx,
                len: u64::try_from(bytes.len()).unwrap(),
            })
            .unwrap();
        let elems = bytes
            .iter()
            .map(|x| m.push_int(8, u64::from(*x)).unwrap())
            .collect();
        let init = m.push_const(arr, ConstKind::Aggregate(elems)).unwrap();
        global_with_init(m, name, arr, Some(init), linkage)
    }

    fn global_with_init(
        m: &mut Module,
        name: &str,
        value_tyidx: TyIdx,
        init: Option<InstIdx>,
        linkage: Linkage,
    ) -> InstIdx {
        let ptr = m.ptr_ty();
        m.push_inst(
            Global {
                tyidx: ptr,
                name: name.to_string(),
                value_tyidx,
                align: 0,
                linkage,
                constant: true,
                init,
            }
            .into(),
        )
        .unwrap()
    }

    fn array_gep(m: &mut Module, g: InstIdx, start: u64) -> InstIdx {
        let Inst::Global(x) = m.inst(g) else { panic!() };
        let arr = x.value_tyidx;
        let zero = m.push_int(64, 0).unwrap();
        let start = m.push_int(64, start).unwrap();
        m.push_gep(arr, g, &[zero, start], true).unwrap()
    }

    #[test]
    fn string_info() {
        let mut m = Module::new();
        let ptr = m.ptr_ty();
        let g = string_global(&mut m, "s", b"hello\0world\0", Linkage::Private);
        let weak = string_global(&mut m, "w", b"hi\0", Linkage::WeakAny);
        let i8_tyidx = m.int_ty(8).unwrap();
        let arr4 = m
            .push_ty(Ty::Array {
                elem: i8_tyidx,
                len: 4,
            })
            .unwrap();
        let zero_init = m.push_null_value(arr4).unwrap();
        let z = global_with_init(&mut m, "z", arr4, Some(zero_init), Linkage::Internal);
        let p0 = array_gep(&mut m, g, 0);
        let p6 = array_gep(&mut m, g, 6);
        let p12 = array_gep(&mut m, g, 12);
        let p13 = array_gep(&mut m, g, 13);
        let cast = m.push_cast(CastKind::BitCast, p6, ptr).unwrap();
        let pw = array_gep(&mut m, weak, 0);
        let vt = ValueTracker::new(&m, None);
        assert_eq!(vt.constant_string_info(p0, true), Some(b"hello".to_vec()));
        assert_eq!(
            vt.constant_string_info(p0, false),
            Some(b"hello\0world\0".to_vec())
        );
        assert_eq!(vt.constant_string_info(p6, true), Some(b"world".to_vec()));
        assert_eq!(vt.constant_string_info(cast, true), Some(b"world".to_vec()));
        assert_eq!(vt.constant_string_info(g, true), Some(b"hello".to_vec()));
        assert_eq!(vt.constant_string_info(p12, true), Some(Vec::new()));
        assert_eq!(vt.constant_string_info(p13, true), None);
        assert_eq!(vt.constant_string_info(pw, true), None);
        assert_eq!(vt.constant_string_info(z, true), Some(Vec::new()));
    }

    #[test]
    fn nested_offsets() {
        let mut m = Module::new();
        let g = string_global(&mut m, "s", b"abcdef\0", Linkage::Private);
        let p2 = array_gep(&mut m, g, 2);
        let Inst::Global(x) = m.inst(g) else { panic!() };
        let arr = x.value_tyidx;
        let zero = m.push_int(64, 0).unwrap();
        let one = m.push_int(64, 1).unwrap();
        let p3 = m.push_gep(arr, p2, &[zero, one], true).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(vt.constant_string_info(p3, true), Some(b"def".to_vec()));
    }

    #[test]
    fn lengths() {
        let mut m = Module::new();
        let i1_tyidx = m.int_ty(1).unwrap();
        let ptr = m.ptr_ty();
        let a = string_global(&mut m, "a", b"abc\0", Linkage::Private);
        let b = string_global(&mut m, "b", b"xyz\0", Linkage::Private);
        let c = string_global(&mut m, "c", b"hello\0", Linkage::Private);
        let unterminated = string_global(&mut m, "u", b"abc", Linkage::Private);
        let pa = array_gep(&mut m, a, 0);
        let pa1 = array_gep(&mut m, a, 1);
        let pb = array_gep(&mut m, b, 0);
        let pc = array_gep(&mut m, c, 0);
        let pu = array_gep(&mut m, unterminated, 0);
        let cond = m.push_arg(i1_tyidx).unwrap();
        let same = m.push_select(cond, pa, pb).unwrap();
        let differ = m.push_select(cond, pa, pc).unwrap();
        let loop_phi = m.push_phi(ptr).unwrap();
        m.set_phi_incoming(loop_phi, &[pa, loop_phi, pb]).unwrap();
        let bad_phi = m.push_phi(ptr).unwrap();
        m.set_phi_incoming(bad_phi, &[pa, pc]).unwrap();
        let dead = m.push_phi(ptr).unwrap();
        m.set_phi_incoming(dead, &[dead]).unwrap();
        let p = m.push_arg(ptr).unwrap();
        let vt = ValueTracker::new(&m, None);
        assert_eq!(vt.string_length(pa), 4);
        assert_eq!(vt.string_length(pa1), 3);
        assert_eq!(vt.string_length(pu), 0);
        assert_eq!(vt.string_length(same), 4);
        assert_eq!(vt.string_length(differ), 0);
        assert_eq!(vt.string_length(loop_phi), 4);
        assert_eq!(vt.string_length(bad_phi), 0);
        assert_eq!(vt.string_length(dead), 1);
        assert_eq!(vt.string_length(p), 0);
        assert_eq!(vt.string_length(cond), 0);
    }
}
