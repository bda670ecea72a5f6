//! A small SSA IR that the value tracker analyses.
//!
//! The IR is a simplified version of LLVM IR: every value (constants and globals included) is an
//! instruction in a [Module]'s arena and is referenced by an [InstIdx]. Operands are always other
//! instructions, so pattern matching is simple and uniform. Roughly speaking this LLVM IR:
//!
//! ```text
//! %5 = add i32 %4, 8
//! ```
//!
//! is represented as:
//!
//! ```text
//! %4: i32 = arg
//! %5: i32 = 8
//! %6: i32 = add %4, %5
//! ```
//!
//! There are no basic blocks: the analyses in this crate never need control flow beyond what a
//! [Phi]'s incoming values tell them. A [Phi] is created empty and has its incoming values set
//! afterwards, which is how loops (i.e. cycles in the def-use graph) are built.
//!
//!
//! ## [TyIdx]s can be relied on for type comparisons
//!
//! A [Module] maps the same [Ty] to a single [TyIdx], so type comparisons are integer
//! comparisons.
//!
//!
//! ## Constants are interned
//!
//! A [Module] maps the same ([TyIdx], [ConstKind]) pair to a single [InstIdx]. Floating point
//! constants are stored as bit patterns so this is always safe. Thus two constant [InstIdx]s
//! compare equal if, and only if, the constants are identical. Globals and aliases are not
//! interned.
//!
//!
//! ## Well-formedness
//!
//! Every instruction is checked as it is pushed, so a [Module] built through the public API is
//! always well-formed. [Module::assert_well_formed] rechecks every instruction.

mod inst;

pub use inst::*;

use crate::arbbitint::ArbBitInt;
use index_vec::IndexVec;
use smallvec::SmallVec;
use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};
use thiserror::Error;

index_vec::define_index_type! {
    pub struct InstIdx = u32;
}

index_vec::define_index_type! {
    pub struct TyIdx = u32;
}

/// Errors from building a [Module].
#[derive(Debug, Error, PartialEq)]
pub enum IrError {
    /// An operand referenced an instruction that does not exist.
    #[error("%{0} does not exist")]
    NoSuchInst(usize),
    /// A type referenced a type index that does not exist.
    #[error("type #{0} does not exist")]
    NoSuchTy(usize),
    #[error("invalid type: {0}")]
    InvalidTy(String),
    /// An instruction's operands have types incompatible with its result type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("invalid constant: {0}")]
    InvalidConst(String),
    /// Aggregate or `getelementptr` indices do not fit the indexed type.
    #[error("invalid indices: {0}")]
    InvalidIndices(String),
    #[error("%{0} is not a phi")]
    NotAPhi(usize),
}

/// A type.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Ty {
    /// As in LLVM IR: a 64-bit floating-point value (IEEE-754 binary64).
    Double,
    /// As in LLVM IR: a 32-bit floating-point value (IEEE-754 binary32).
    Float,
    /// An integer `u32` bits wide, where `u > 0 && u <= 64`.
    Int(u32),
    /// A pointer. Its width is only known relative to a
    /// [TargetLayout](crate::layout::TargetLayout).
    Ptr,
    /// A SIMD vector of `len` scalar `elem`s.
    Vector { elem: TyIdx, len: u32 },
    Array { elem: TyIdx, len: u64 },
    Struct {
        fields: SmallVec<[TyIdx; 4]>,
        packed: bool,
    },
    /// A struct type with no body. Opaque types have no size.
    Opaque,
    Void,
}

impl Ty {
    /// If `self` is an integer, return its bit width.
    pub fn int_bitw(&self) -> Option<u32> {
        match self {
            Ty::Int(bitw) => Some(*bitw),
            _ => None,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Ty::Int(_))
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Ty::Ptr)
    }

    pub fn is_fp(&self) -> bool {
        matches!(self, Ty::Float | Ty::Double)
    }

    /// Is `self` a type that can be indexed by `insertvalue` / `extractvalue`?
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Ty::Array { .. } | Ty::Struct { .. })
    }

    pub fn to_string(&self, m: &Module) -> String {
        match self {
            Ty::Double => "double".to_string(),
            Ty::Float => "float".to_string(),
            Ty::Int(bitw) => format!("i{bitw}"),
            Ty::Ptr => "ptr".to_string(),
            Ty::Vector { elem, len } => format!("<{len} x {}>", m.ty(*elem).to_string(m)),
            Ty::Array { elem, len } => format!("[{len} x {}]", m.ty(*elem).to_string(m)),
            Ty::Struct { fields, packed } => {
                let fields = fields
                    .iter()
                    .map(|x| m.ty(*x).to_string(m))
                    .collect::<Vec<_>>()
                    .join(", ");
                if *packed {
                    format!("<{{{fields}}}>")
                } else {
                    format!("{{{fields}}}")
                }
            }
            Ty::Opaque => "opaque".to_string(),
            Ty::Void => "void".to_string(),
        }
    }
}

/// The linkage of a [Global] or [Alias].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
pub enum Linkage {
    #[strum(serialize = "external")]
    External,
    #[strum(serialize = "available_externally")]
    AvailableExternally,
    #[strum(serialize = "linkonce")]
    LinkOnceAny,
    #[strum(serialize = "linkonce_odr")]
    LinkOnceOdr,
    #[strum(serialize = "weak")]
    WeakAny,
    #[strum(serialize = "weak_odr")]
    WeakOdr,
    #[strum(serialize = "appending")]
    Appending,
    #[strum(serialize = "internal")]
    Internal,
    #[strum(serialize = "private")]
    Private,
    #[strum(serialize = "extern_weak")]
    ExternalWeak,
    #[strum(serialize = "common")]
    Common,
}

impl Linkage {
    /// Can the definition be replaced at link time by a definition with different contents?
    pub fn may_be_overridden(self) -> bool {
        matches!(
            self,
            Linkage::WeakAny | Linkage::LinkOnceAny | Linkage::Common | Linkage::ExternalWeak
        )
    }

    /// Can the definition be merged with, or discarded in favour of, another definition?
    pub fn is_weak_for_linker(self) -> bool {
        matches!(
            self,
            Linkage::LinkOnceAny
                | Linkage::LinkOnceOdr
                | Linkage::WeakAny
                | Linkage::WeakOdr
                | Linkage::Common
                | Linkage::ExternalWeak
        )
    }
}

/// One index of a `getelementptr`, annotated with how it moves the pointer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GepStep {
    /// Select field `field` of the struct type `sty`.
    Field { sty: TyIdx, field: u32 },
    /// Step over whole objects of type `elem`.
    Seq { elem: TyIdx },
}

/// A module: the types and the instruction arena.
#[derive(Debug, Default)]
pub struct Module {
    tys: IndexVec<TyIdx, Ty>,
    ty_map: HashMap<Ty, TyIdx>,
    insts: IndexVec<InstIdx, Inst>,
    const_map: HashMap<(TyIdx, ConstKind), InstIdx>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `ty` to the module, returning its [TyIdx]. Adding a type that is already present
    /// returns the existing [TyIdx].
    pub fn push_ty(&mut self, ty: Ty) -> Result<TyIdx, IrError> {
        if let Some(tyidx) = self.ty_map.get(&ty) {
            return Ok(*tyidx);
        }
        let check = |tyidx: TyIdx| {
            if usize::from(tyidx) < self.tys.len() {
                Ok(())
            } else {
                Err(IrError::NoSuchTy(usize::from(tyidx)))
            }
        };
        match &ty {
            Ty::Int(bitw) if *bitw == 0 || *bitw > 64 => {
                return Err(IrError::InvalidTy(format!("i{bitw}")));
            }
            Ty::Vector { elem, len } => {
                check(*elem)?;
                if *len == 0
                    || !matches!(self.tys[*elem], Ty::Int(_) | Ty::Float | Ty::Double | Ty::Ptr)
                {
                    return Err(IrError::InvalidTy(format!(
                        "<{len} x {}>",
                        self.tys[*elem].to_string(self)
                    )));
                }
            }
            Ty::Array { elem, .. } => check(*elem)?,
            Ty::Struct { fields, .. } => {
                for x in fields {
                    check(*x)?;
                }
            }
            _ => (),
        }
        let tyidx = self.tys.push(ty.clone());
        self.ty_map.insert(ty, tyidx);
        Ok(tyidx)
    }

    pub fn int_ty(&mut self, bitw: u32) -> Result<TyIdx, IrError> {
        self.push_ty(Ty::Int(bitw))
    }

    pub fn ptr_ty(&mut self) -> TyIdx {
        self.infallible_ty(Ty::Ptr)
    }

    pub fn void_ty(&mut self) -> TyIdx {
        self.infallible_ty(Ty::Void)
    }

    fn infallible_ty(&mut self, ty: Ty) -> TyIdx {
        if let Some(tyidx) = self.ty_map.get(&ty) {
            return *tyidx;
        }
        let tyidx = self.tys.push(ty.clone());
        self.ty_map.insert(ty, tyidx);
        tyidx
    }

    pub fn ty(&self, tyidx: TyIdx) -> &Ty {
        &self.tys[tyidx]
    }

    /// If `tyidx` is a vector, return its element type, otherwise return `tyidx`.
    pub fn scalar_tyidx(&self, tyidx: TyIdx) -> TyIdx {
        match self.tys[tyidx] {
            Ty::Vector { elem, .. } => elem,
            _ => tyidx,
        }
    }

    pub fn scalar_ty(&self, tyidx: TyIdx) -> &Ty {
        self.ty(self.scalar_tyidx(tyidx))
    }

    /// Does `tyidx` have a size?
    pub fn is_sized(&self, tyidx: TyIdx) -> bool {
        match self.ty(tyidx) {
            Ty::Double | Ty::Float | Ty::Int(_) | Ty::Ptr | Ty::Vector { .. } => true,
            Ty::Array { elem, .. } => self.is_sized(*elem),
            Ty::Struct { fields, .. } => fields.iter().all(|x| self.is_sized(*x)),
            Ty::Opaque | Ty::Void => false,
        }
    }

    /// The bit width of a non-pointer first class type, or `None` for any other type.
    pub fn primitive_bitw(&self, tyidx: TyIdx) -> Option<u32> {
        match self.ty(tyidx) {
            Ty::Double => Some(64),
            Ty::Float => Some(32),
            Ty::Int(bitw) => Some(*bitw),
            Ty::Vector { elem, len } => self.primitive_bitw(*elem).map(|x| x * len),
            _ => None,
        }
    }

    /// Follow `idxs` through the aggregate type `tyidx` as `extractvalue` would, returning the
    /// type reached or `None` if an index is out of range.
    pub fn indexed_ty(&self, tyidx: TyIdx, idxs: &[u32]) -> Option<TyIdx> {
        let mut cur = tyidx;
        for idx in idxs {
            cur = match self.ty(cur) {
                Ty::Struct { fields, .. } => *fields.get(usize::try_from(*idx).ok()?)?,
                Ty::Array { elem, len } if u64::from(*idx) < *len => *elem,
                _ => return None,
            };
        }
        Some(cur)
    }

    pub fn inst(&self, iidx: InstIdx) -> &Inst {
        &self.insts[iidx]
    }

    pub fn inst_tyidx(&self, iidx: InstIdx) -> TyIdx {
        self.insts[iidx].tyidx()
    }

    pub fn inst_ty(&self, iidx: InstIdx) -> &Ty {
        self.ty(self.inst_tyidx(iidx))
    }

    /// How many instructions does this module contain?
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn iter_insts(&self) -> impl Iterator<Item = (InstIdx, &Inst)> {
        self.insts.iter_enumerated()
    }

    /// Iterate over the instructions that use `iidx` as an operand.
    pub fn users(&self, iidx: InstIdx) -> impl Iterator<Item = InstIdx> + '_ {
        self.insts
            .iter_enumerated()
            .filter(move |(_, inst)| inst.operands().contains(&iidx))
            .map(|(x, _)| x)
    }

    fn checked_tyidx(&self, iidx: InstIdx) -> Result<TyIdx, IrError> {
        self.insts
            .get(iidx)
            .map(|x| x.tyidx())
            .ok_or(IrError::NoSuchInst(usize::from(iidx)))
    }

    /// Push `inst`, checking that it is well formed. Constants are interned: pushing a constant
    /// that already exists returns the existing [InstIdx].
    pub fn push_inst(&mut self, inst: Inst) -> Result<InstIdx, IrError> {
        if usize::from(inst.tyidx()) >= self.tys.len() {
            return Err(IrError::NoSuchTy(usize::from(inst.tyidx())));
        }
        for op in inst.operands() {
            self.checked_tyidx(op)?;
        }
        if let Inst::Const(Const { tyidx, kind }) = &inst
            && let Some(iidx) = self.const_map.get(&(*tyidx, kind.clone()))
        {
            return Ok(*iidx);
        }
        inst.verify(self)?;
        let key = match &inst {
            Inst::Const(Const { tyidx, kind }) => Some((*tyidx, kind.clone())),
            _ => None,
        };
        let iidx = self.insts.push(inst);
        if let Some(key) = key {
            self.const_map.insert(key, iidx);
        }
        Ok(iidx)
    }

    pub fn push_const(&mut self, tyidx: TyIdx, kind: ConstKind) -> Result<InstIdx, IrError> {
        self.push_inst(Const { tyidx, kind }.into())
    }

    /// Push an integer constant `val` of `bitw` bits. Bits of `val` above `bitw` are ignored.
    pub fn push_int(&mut self, bitw: u32, val: u64) -> Result<InstIdx, IrError> {
        let tyidx = self.int_ty(bitw)?;
        self.push_const(tyidx, ConstKind::Int(ArbBitInt::from_u64(bitw, val)))
    }

    pub fn push_undef(&mut self, tyidx: TyIdx) -> Result<InstIdx, IrError> {
        self.push_const(tyidx, ConstKind::Undef)
    }

    /// Push the all-zero value of type `tyidx`.
    pub fn push_null_value(&mut self, tyidx: TyIdx) -> Result<InstIdx, IrError> {
        let kind = match self.ty(tyidx) {
            Ty::Double => ConstKind::Double(0),
            Ty::Float => ConstKind::Float(0),
            Ty::Int(bitw) => ConstKind::Int(ArbBitInt::zero(*bitw)),
            Ty::Ptr => ConstKind::Null,
            Ty::Vector { .. } | Ty::Array { .. } | Ty::Struct { .. } => ConstKind::Zero,
            ty @ (Ty::Opaque | Ty::Void) => {
                return Err(IrError::InvalidConst(format!(
                    "{} has no null value",
                    ty.to_string(self)
                )));
            }
        };
        self.push_const(tyidx, kind)
    }

    /// Push an argument of type `tyidx`.
    pub fn push_arg(&mut self, tyidx: TyIdx) -> Result<InstIdx, IrError> {
        self.push_inst(
            Arg {
                tyidx,
                byval: false,
                align: 0,
            }
            .into(),
        )
    }

    pub fn push_binop(
        &mut self,
        kind: BinOpKind,
        lhs: InstIdx,
        rhs: InstIdx,
        flags: BinOpFlags,
    ) -> Result<InstIdx, IrError> {
        let tyidx = self.checked_tyidx(lhs)?;
        self.push_inst(
            BinOp {
                tyidx,
                kind,
                lhs,
                rhs,
                flags,
            }
            .into(),
        )
    }

    pub fn push_cast(
        &mut self,
        kind: CastKind,
        val: InstIdx,
        tyidx: TyIdx,
    ) -> Result<InstIdx, IrError> {
        self.push_inst(Cast { tyidx, kind, val }.into())
    }

    pub fn push_select(
        &mut self,
        cond: InstIdx,
        trueval: InstIdx,
        falseval: InstIdx,
    ) -> Result<InstIdx, IrError> {
        let tyidx = self.checked_tyidx(trueval)?;
        self.push_inst(
            Select {
                tyidx,
                cond,
                trueval,
                falseval,
            }
            .into(),
        )
    }

    /// Push a [Phi] with no incoming values: use [Module::set_phi_incoming] to add them.
    pub fn push_phi(&mut self, tyidx: TyIdx) -> Result<InstIdx, IrError> {
        self.push_inst(
            Phi {
                tyidx,
                incoming: SmallVec::new(),
            }
            .into(),
        )
    }

    /// Set the incoming values of the [Phi] `phi`.
    pub fn set_phi_incoming(&mut self, phi: InstIdx, incoming: &[InstIdx]) -> Result<(), IrError> {
        for x in incoming {
            self.checked_tyidx(*x)?;
        }
        let Some(Inst::Phi(x)) = self.insts.get(phi) else {
            return Err(IrError::NotAPhi(usize::from(phi)));
        };
        let new = Phi {
            tyidx: x.tyidx,
            incoming: SmallVec::from_slice(incoming),
        };
        new.verify(self)?;
        self.insts[phi] = new.into();
        Ok(())
    }

    pub fn push_gep(
        &mut self,
        src_tyidx: TyIdx,
        ptr: InstIdx,
        idxs: &[InstIdx],
        inbounds: bool,
    ) -> Result<InstIdx, IrError> {
        let tyidx = self.ptr_ty();
        self.push_inst(
            Gep {
                tyidx,
                src_tyidx,
                ptr,
                idxs: SmallVec::from_slice(idxs),
                inbounds,
            }
            .into(),
        )
    }

    pub fn push_alloca(&mut self, alloc_tyidx: TyIdx, align: u32) -> Result<InstIdx, IrError> {
        let tyidx = self.ptr_ty();
        self.push_inst(
            Alloca {
                tyidx,
                alloc_tyidx,
                align,
            }
            .into(),
        )
    }

    pub fn push_insertvalue(
        &mut self,
        agg: InstIdx,
        val: InstIdx,
        idxs: &[u32],
    ) -> Result<InstIdx, IrError> {
        let tyidx = self.checked_tyidx(agg)?;
        self.push_inst(
            InsertValue {
                tyidx,
                agg,
                val,
                idxs: SmallVec::from_slice(idxs),
            }
            .into(),
        )
    }

    pub fn push_extractvalue(&mut self, agg: InstIdx, idxs: &[u32]) -> Result<InstIdx, IrError> {
        let aggtyidx = self.checked_tyidx(agg)?;
        let tyidx = self
            .indexed_ty(aggtyidx, idxs)
            .ok_or_else(|| IrError::InvalidIndices(format!("{idxs:?}")))?;
        self.push_inst(
            ExtractValue {
                tyidx,
                agg,
                idxs: SmallVec::from_slice(idxs),
            }
            .into(),
        )
    }

    pub fn push_call(
        &mut self,
        callee: Callee,
        args: &[InstIdx],
        tyidx: TyIdx,
    ) -> Result<InstIdx, IrError> {
        self.push_inst(
            Call {
                tyidx,
                callee,
                args: SmallVec::from_slice(args),
            }
            .into(),
        )
    }

    pub fn push_load(
        &mut self,
        tyidx: TyIdx,
        ptr: InstIdx,
        volatile: bool,
    ) -> Result<InstIdx, IrError> {
        self.push_inst(
            Load {
                tyidx,
                ptr,
                volatile,
            }
            .into(),
        )
    }

    pub fn push_store(
        &mut self,
        val: InstIdx,
        ptr: InstIdx,
        volatile: bool,
    ) -> Result<InstIdx, IrError> {
        let tyidx = self.void_ty();
        self.push_inst(
            Store {
                tyidx,
                val,
                ptr,
                volatile,
            }
            .into(),
        )
    }

    /// If `iidx` is an integer constant, return its value.
    pub fn const_int(&self, iidx: InstIdx) -> Option<&ArbBitInt> {
        match self.inst(iidx) {
            Inst::Const(Const {
                kind: ConstKind::Int(x),
                ..
            }) => Some(x),
            _ => None,
        }
    }

    /// If `iidx` is an integer constant, or a vector whose elements are all the same integer
    /// constant, return that integer.
    pub fn const_int_or_splat(&self, iidx: InstIdx) -> Option<&ArbBitInt> {
        match self.inst(iidx) {
            Inst::Const(Const {
                kind: ConstKind::Int(x),
                ..
            }) => Some(x),
            Inst::Const(Const {
                tyidx,
                kind: ConstKind::Aggregate(elems),
            }) if matches!(self.ty(*tyidx), Ty::Vector { .. }) => {
                let first = *elems.first()?;
                if elems.iter().all(|x| *x == first) {
                    self.const_int(first)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Is `iidx` a constant with every bit zero?
    pub fn is_null_value(&self, iidx: InstIdx) -> bool {
        match self.inst(iidx) {
            Inst::Const(Const { kind, .. }) => match kind {
                ConstKind::Int(x) => x.is_zero(),
                ConstKind::Float(x) => *x == 0,
                ConstKind::Double(x) => *x == 0,
                ConstKind::Null | ConstKind::Zero => true,
                ConstKind::Aggregate(_) | ConstKind::Undef => false,
            },
            _ => false,
        }
    }

    /// Is `iidx` a compile-time constant (including the address of a global)?
    pub fn is_constant(&self, iidx: InstIdx) -> bool {
        matches!(
            self.inst(iidx),
            Inst::Const(_) | Inst::Global(_) | Inst::Alias(_)
        )
    }

    /// Annotate each of `gep`'s indices with the kind of step it takes. Returns `None` if a
    /// struct is indexed by anything other than an in-range constant, or if a non-aggregate is
    /// indexed.
    pub fn gep_steps(&self, gep: &Gep) -> Option<SmallVec<[(InstIdx, GepStep); 4]>> {
        let mut steps = SmallVec::new();
        let mut cur = gep.src_tyidx;
        for (i, idx) in gep.idxs.iter().enumerate() {
            if i == 0 {
                steps.push((*idx, GepStep::Seq { elem: cur }));
                continue;
            }
            match self.ty(cur) {
                Ty::Struct { fields, .. } => {
                    let field = self.const_int(*idx)?.to_zero_ext_u32()?;
                    let next = *fields.get(usize::try_from(field).ok()?)?;
                    steps.push((*idx, GepStep::Field { sty: cur, field }));
                    cur = next;
                }
                Ty::Array { elem, .. } | Ty::Vector { elem, .. } => {
                    steps.push((*idx, GepStep::Seq { elem: *elem }));
                    cur = *elem;
                }
                _ => return None,
            }
        }
        Some(steps)
    }

    /// Check that every instruction is well formed.
    ///
    /// # Panics
    ///
    /// If any instruction is not well formed.
    pub fn assert_well_formed(&self) {
        for (iidx, inst) in self.insts.iter_enumerated() {
            if let Err(e) = inst.verify(self) {
                panic!("%{}: {e}", usize::from(iidx));
            }
        }
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (iidx, inst) in self.insts.iter_enumerated() {
            let ty = self.inst_ty(iidx);
            if let Ty::Void = ty {
                writeln!(f, "{}", inst.to_string(self))?;
            } else {
                writeln!(
                    f,
                    "%{}: {} = {}",
                    usize::from(iidx),
                    ty.to_string(self),
                    inst.to_string(self)
                )?;
            }
        }
        Ok(())
    }
}
