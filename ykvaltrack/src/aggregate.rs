//! Find the scalar (or sub-aggregate) value that was inserted into an aggregate at a given index
//! path.
//!
//! The search itself never modifies the module. Only once a result is known to exist are any
//! constants interned or `insertvalue` instructions appended, so a failed search leaves the
//! module exactly as it was.

use crate::{
    ir::{Const, ConstKind, ExtractValue, Inst, InsertValue, InstIdx, Module, Ty, TyIdx},
    log::{Verbosity, log, should_log},
};
use smallvec::SmallVec;

type Idxs = SmallVec<[u32; 4]>;

/// What a search found, before anything has been added to the module.
#[derive(Debug)]
enum Found {
    /// An existing value.
    Inst(InstIdx),
    /// `undef` of the given type.
    Undef(TyIdx),
    /// The all-zero value of the given type.
    Null(TyIdx),
    /// The aggregate at `idxs` within `from` has to be rebuilt from its individually inserted
    /// leaves.
    SubAgg { from: InstIdx, idxs: Idxs },
}

/// Return the value that ends up at `idxs` within the aggregate `agg`, or `None` if it can't be
/// found.
///
/// If `synthesise` is true and `idxs` names a nested struct whose fields were inserted one by
/// one, a fresh chain of `insertvalue` instructions building that struct is appended to `m`.
pub fn find_inserted_value(
    m: &mut Module,
    agg: InstIdx,
    idxs: &[u32],
    synthesise: bool,
) -> Option<InstIdx> {
    let r = search(m, agg, idxs, synthesise).and_then(|x| materialise(m, x));
    if should_log(Verbosity::Query) {
        let r = r.map_or_else(|| "none".to_string(), |x| format!("%{}", usize::from(x)));
        log(
            Verbosity::Query,
            &format!("find_inserted_value %{} {idxs:?}: {r}", usize::from(agg)),
        );
    }
    r
}

fn search(m: &Module, v: InstIdx, idxs: &[u32], synthesise: bool) -> Option<Found> {
    let Some((first, rest)) = idxs.split_first() else {
        return Some(Found::Inst(v));
    };
    match m.inst(v) {
        Inst::Const(Const { tyidx, kind }) => match kind {
            ConstKind::Undef => m.indexed_ty(*tyidx, idxs).map(Found::Undef),
            ConstKind::Zero => m.indexed_ty(*tyidx, idxs).map(Found::Null),
            ConstKind::Aggregate(elems) if m.ty(*tyidx).is_aggregate() => {
                let elem = *elems.get(usize::try_from(*first).ok()?)?;
                search(m, elem, rest, synthesise)
            }
            _ => None,
        },
        Inst::InsertValue(InsertValue {
            agg,
            val,
            idxs: ins_idxs,
            ..
        }) => {
            for (i, ins) in ins_idxs.iter().enumerate() {
                match idxs.get(i) {
                    // `idxs` names an aggregate containing the inserted value.
                    None => {
                        return synthesise.then(|| Found::SubAgg {
                            from: v,
                            idxs: SmallVec::from_slice(idxs),
                        });
                    }
                    // The insertion is elsewhere: keep looking further up the chain.
                    Some(x) if x != ins => return search(m, *agg, idxs, synthesise),
                    Some(_) => (),
                }
            }
            search(m, *val, &idxs[ins_idxs.len()..], synthesise)
        }
        Inst::ExtractValue(ExtractValue {
            agg, idxs: ext_idxs, ..
        }) => {
            let mut full = ext_idxs.clone();
            full.extend_from_slice(idxs);
            search(m, *agg, &full, synthesise)
        }
        _ => None,
    }
}

fn materialise(m: &mut Module, found: Found) -> Option<InstIdx> {
    match found {
        Found::Inst(x) => Some(x),
        Found::Undef(tyidx) => m.push_undef(tyidx).ok(),
        Found::Null(tyidx) => m.push_null_value(tyidx).ok(),
        Found::SubAgg { from, idxs } => build_sub_aggregate(m, from, idxs),
    }
}

/// Build the aggregate at `idxs` within `from` by inserting each of its leaves into `undef`.
///
/// Nothing is pushed until [plan_sub_aggregate] has succeeded. Every leaf in the plan was found
/// inserted at its path in `from`, so it has the type `push_insertvalue` checks for, and an
/// `Undef` or `Null` leaf has a type taken from an existing value. The pushes below therefore
/// cannot fail part way and leave a partial `insertvalue` chain behind.
fn build_sub_aggregate(m: &mut Module, from: InstIdx, mut idxs: Idxs) -> Option<InstIdx> {
    let tyidx = m.indexed_ty(m.inst_tyidx(from), &idxs)?;
    let skip = idxs.len();
    let mut plan = Vec::new();
    if !plan_sub_aggregate(m, from, &mut idxs, skip, &mut plan) {
        return None;
    }
    let mut to = m.push_undef(tyidx).ok()?;
    for (leaf, path) in plan {
        let val = materialise(m, leaf)?;
        to = m.push_insertvalue(to, val, &path).ok()?;
    }
    Some(to)
}

/// Work out which leaves need inserting (and where) to rebuild the aggregate at `idxs` within
/// `from`, appending them to `plan`. Structs are rebuilt field by field; if any field can't be
/// found, the struct as a whole is looked up instead. Returns false if neither works.
fn plan_sub_aggregate(
    m: &Module,
    from: InstIdx,
    idxs: &mut Idxs,
    skip: usize,
    plan: &mut Vec<(Found, Idxs)>,
) -> bool {
    let Some(tyidx) = m.indexed_ty(m.inst_tyidx(from), idxs) else {
        return false;
    };
    if let Ty::Struct { fields, .. } = m.ty(tyidx) {
        let mark = plan.len();
        let mut complete = true;
        for i in 0..fields.len() {
            let Ok(i) = u32::try_from(i) else {
                complete = false;
                break;
            };
            idxs.push(i);
            complete = plan_sub_aggregate(m, from, idxs, skip, plan);
            idxs.pop();
            if !complete {
                break;
            }
        }
        if complete {
            return true;
        }
        plan.truncate(mark);
    }
    match search(m, from, idxs, false) {
        Some(found) => {
            plan.push((found, SmallVec::from_slice(&idxs[skip..])));
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use fm::FMBuilder;
    use smallvec::smallvec;

    fn assert_matches(m: &Module, ptn: &str) {
        let fm = FMBuilder::new(ptn).unwrap().build().unwrap();
        if let Err(e) = fm.matches(&m.to_string()) {
            panic!("{e}");
        }
    }

    fn struct_ty(m: &mut Module, fields: &[TyIdx]) -> TyIdx {
        m.push_ty(Ty::Struct {
            fields: SmallVec::from_slice(fields),
            packed: false,
        })
        .unwrap()
    }

    #[test]
    fn direct_insertions() {
        let mut m = Module::new();
        let i32_tyidx = m.int_ty(32).unwrap();
        let i8_tyidx = m.int_ty(8).unwrap();
        let sty = struct_ty(&mut m, &[i32_tyidx, i8_tyidx]);
        let a = m.push_arg(i32_tyidx).unwrap();
        let b = m.push_arg(i8_tyidx).unwrap();
        let u = m.push_undef(sty).unwrap();
        let i0 = m.push_insertvalue(u, a, &[0]).unwrap();
        let i1 = m.push_insertvalue(i0, b, &[1]).unwrap();
        let before = m.len();
        assert_eq!(find_inserted_value(&mut m, i1, &[0], false), Some(a));
        assert_eq!(find_inserted_value(&mut m, i1, &[1], false), Some(b));
        assert_eq!(find_inserted_value(&mut m, i1, &[], false), Some(i1));
        assert_eq!(find_inserted_value(&mut m, a, &[0], false), None);
        assert_eq!(m.len(), before);
        // Field 1 was never inserted into `i0`: it's still `undef`.
        let undef_i8 = find_inserted_value(&mut m, i0, &[1], false).unwrap();
        assert!(matches!(
            m.inst(undef_i8),
            Inst::Const(Const {
                kind: ConstKind::Undef,
                ..
            })
        ));
        assert_eq!(m.inst_tyidx(undef_i8), i8_tyidx);
    }

    #[test]
    fn constants() {
        let mut m = Module::new();
        let i16_tyidx = m.int_ty(16).unwrap();
        let arr = m
            .push_ty(Ty::Array {
                elem: i16_tyidx,
                len: 3,
            })
            .unwrap();
        let sty = struct_ty(&mut m, &[arr, i16_tyidx]);
        let c1 = m.push_int(16, 1).unwrap();
        let c2 = m.push_int(16, 2).unwrap();
        let c3 = m.push_int(16, 3).unwrap();
        let ca = m
            .push_const(arr, ConstKind::Aggregate(smallvec![c1, c2, c3]))
            .unwrap();
        let zero = m.push_null_value(arr).unwrap();
        let cs = m
            .push_const(sty, ConstKind::Aggregate(smallvec![ca, c3]))
            .unwrap();
        assert_eq!(find_inserted_value(&mut m, cs, &[0, 1], false), Some(c2));
        assert_eq!(find_inserted_value(&mut m, cs, &[1], false), Some(c3));
        assert_eq!(find_inserted_value(&mut m, cs, &[0], false), Some(ca));
        assert_eq!(find_inserted_value(&mut m, cs, &[0, 3], false), None);
        let z = find_inserted_value(&mut m, zero, &[2], false).unwrap();
        assert_eq!(m.const_int(z).map(|x| x.to_zero_ext_u64()), Some(0));
        assert_eq!(m.inst_tyidx(z), i16_tyidx);
    }

    #[test]
    fn through_extracts() {
        let mut m = Module::new();
        let i32_tyidx = m.int_ty(32).unwrap();
        let inner = struct_ty(&mut m, &[i32_tyidx, i32_tyidx]);
        let outer = struct_ty(&mut m, &[i32_tyidx, inner]);
        let a = m.push_arg(i32_tyidx).unwrap();
        let u = m.push_undef(outer).unwrap();
        let ins = m.push_insertvalue(u, a, &[1, 0]).unwrap();
        let ext = m.push_extractvalue(ins, &[1]).unwrap();
        assert_eq!(find_inserted_value(&mut m, ext, &[0], false), Some(a));
        // Skips over an unrelated insertion.
        let b = m.push_arg(i32_tyidx).unwrap();
        let ins2 = m.push_insertvalue(ins, b, &[0]).unwrap();
        assert_eq!(find_inserted_value(&mut m, ins2, &[1, 0], false), Some(a));
        assert_eq!(find_inserted_value(&mut m, ins2, &[0], false), Some(b));
        // The argument isn't known.
        let p = m.push_arg(outer).unwrap();
        assert_eq!(find_inserted_value(&mut m, p, &[0], false), None);
    }

    #[test]
    fn synthesis() {
        let mut m = Module::new();
        let i32_tyidx = m.int_ty(32).unwrap();
        let i64_tyidx = m.int_ty(64).unwrap();
        let inner = struct_ty(&mut m, &[i32_tyidx, i64_tyidx]);
        let outer = struct_ty(&mut m, &[i32_tyidx, inner]);
        let a = m.push_arg(i32_tyidx).unwrap();
        let b = m.push_arg(i64_tyidx).unwrap();
        let u = m.push_undef(outer).unwrap();
        let i0 = m.push_insertvalue(u, a, &[1, 0]).unwrap();
        let i1 = m.push_insertvalue(i0, b, &[1, 1]).unwrap();
        let before = m.len();
        assert_eq!(find_inserted_value(&mut m, i1, &[1], false), None);
        assert_eq!(m.len(), before);
        let r = find_inserted_value(&mut m, i1, &[1], true).unwrap();
        assert_eq!(m.inst_tyidx(r), inner);
        assert_matches(
            &m,
            "
          ...
          %4: {i32, {i32, i64}} = insertvalue %3, %1, 1, 1
          %5: {i32, i64} = undef
          %6: {i32, i64} = insertvalue %5, %0, 0
          %7: {i32, i64} = insertvalue %6, %1, 1
        ",
        );
        m.assert_well_formed();
    }

    #[test]
    fn partial_synthesis() {
        let mut m = Module::new();
        let i32_tyidx = m.int_ty(32).unwrap();
        let inner = struct_ty(&mut m, &[i32_tyidx, i32_tyidx]);
        let outer = struct_ty(&mut m, &[inner, i32_tyidx]);
        let a = m.push_arg(i32_tyidx).unwrap();
        let base = m.push_arg(outer).unwrap();
        // Only one leaf of the nested struct is known: nothing can be built.
        let ins = m.push_insertvalue(base, a, &[0, 1]).unwrap();
        let before = m.len();
        assert_eq!(find_inserted_value(&mut m, ins, &[0], true), None);
        assert_eq!(m.len(), before);
        // Both leaves known, one of them from an `undef` base.
        let u = m.push_undef(outer).unwrap();
        let ins2 = m.push_insertvalue(u, a, &[0, 1]).unwrap();
        let r = find_inserted_value(&mut m, ins2, &[0], true).unwrap();
        assert_matches(
            &m,
            "
          ...
          %4: {{i32, i32}, i32} = insertvalue %3, %0, 0, 1
          %5: {i32, i32} = undef
          %6: i32 = undef
          %7: {i32, i32} = insertvalue %5, %6, 0
          %8: {i32, i32} = insertvalue %7, %0, 1
        ",
        );
        assert_eq!(usize::from(r), 8);
        m.assert_well_formed();
    }
}
