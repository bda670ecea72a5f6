//! The instructions of the IR.
//!
//! Each instruction is a struct implementing [InstT]; [Inst] is the closed set of all
//! instructions.

use super::{IrError, InstIdx, Linkage, Module, Ty, TyIdx};
use crate::arbbitint::ArbBitInt;
use enum_dispatch::enum_dispatch;
use smallvec::SmallVec;

/// The trait that instructions must conform to.
#[enum_dispatch]
pub trait InstT: std::fmt::Debug {
    /// Return the [TyIdx] of the value `self` produces.
    fn tyidx(&self) -> TyIdx;

    /// Produce each of this instruction's operands, in order.
    fn operands(&self) -> SmallVec<[InstIdx; 4]>;

    /// Check that `self` is well formed relative to `m`. Operands are guaranteed to exist.
    fn verify(&self, _m: &Module) -> Result<(), IrError> {
        Ok(())
    }

    /// Return a pretty printed version of `self`.
    fn to_string(&self, m: &Module) -> String;
}

#[enum_dispatch(InstT)]
#[derive(Clone, Debug)]
pub enum Inst {
    Alias,
    Alloca,
    Arg,
    BinOp,
    Call,
    Cast,
    Const,
    ExtractValue,
    Gep,
    Global,
    InsertValue,
    Load,
    Phi,
    Select,
    Store,
}

fn fmt_iidxs(iidxs: &[InstIdx]) -> String {
    iidxs
        .iter()
        .map(|x| format!("%{}", usize::from(*x)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn mismatch(what: &str, m: &Module, expected: TyIdx, found: TyIdx) -> IrError {
    IrError::TypeMismatch(format!(
        "{what}: expected {}, found {}",
        m.ty(expected).to_string(m),
        m.ty(found).to_string(m)
    ))
}

/// The value of a [Const].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ConstKind {
    Int(ArbBitInt),
    /// A `float` as its IEEE-754 bit pattern.
    Float(u32),
    /// A `double` as its IEEE-754 bit pattern.
    Double(u64),
    /// The null pointer.
    Null,
    /// A vector, array, or struct with every element zero.
    Zero,
    Undef,
    /// A vector, array, or struct made of the constants `.0`.
    Aggregate(SmallVec<[InstIdx; 4]>),
}

/// A constant.
#[derive(Clone, Debug)]
pub struct Const {
    pub tyidx: TyIdx,
    pub kind: ConstKind,
}

impl InstT for Const {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        match &self.kind {
            ConstKind::Aggregate(x) => x.clone(),
            _ => SmallVec::new(),
        }
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        let ok = match (m.ty(self.tyidx), &self.kind) {
            (Ty::Int(bitw), ConstKind::Int(x)) => x.bitw() == *bitw,
            (Ty::Float, ConstKind::Float(_))
            | (Ty::Double, ConstKind::Double(_))
            | (Ty::Ptr, ConstKind::Null)
            | (Ty::Vector { .. } | Ty::Array { .. } | Ty::Struct { .. }, ConstKind::Zero) => true,
            (Ty::Void, ConstKind::Undef) => false,
            (_, ConstKind::Undef) => true,
            (Ty::Vector { elem, len }, ConstKind::Aggregate(xs)) => {
                xs.len() == usize::try_from(*len).unwrap_or(usize::MAX)
                    && xs
                        .iter()
                        .all(|x| m.inst_tyidx(*x) == *elem && m.is_constant(*x))
            }
            (Ty::Array { elem, len }, ConstKind::Aggregate(xs)) => {
                xs.len() == usize::try_from(*len).unwrap_or(usize::MAX)
                    && xs
                        .iter()
                        .all(|x| m.inst_tyidx(*x) == *elem && m.is_constant(*x))
            }
            (Ty::Struct { fields, .. }, ConstKind::Aggregate(xs)) => {
                xs.len() == fields.len()
                    && xs
                        .iter()
                        .zip(fields.iter())
                        .all(|(x, f)| m.inst_tyidx(*x) == *f && m.is_constant(*x))
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(IrError::InvalidConst(format!(
                "{} is not a valid {}",
                self.to_string(m),
                m.ty(self.tyidx).to_string(m)
            )))
        }
    }

    fn to_string(&self, m: &Module) -> String {
        match &self.kind {
            ConstKind::Int(x) => x.to_string(),
            ConstKind::Float(x) => format!("{:?}", f32::from_bits(*x)),
            ConstKind::Double(x) => format!("{:?}", f64::from_bits(*x)),
            ConstKind::Null => "null".to_string(),
            ConstKind::Zero => "zeroinitializer".to_string(),
            ConstKind::Undef => "undef".to_string(),
            ConstKind::Aggregate(xs) => match m.ty(self.tyidx) {
                Ty::Vector { .. } => format!("<{}>", fmt_iidxs(xs)),
                Ty::Struct { .. } => format!("{{{}}}", fmt_iidxs(xs)),
                _ => format!("[{}]", fmt_iidxs(xs)),
            },
        }
    }
}

/// The address of a global variable.
#[derive(Clone, Debug)]
pub struct Global {
    /// Must be a pointer.
    pub tyidx: TyIdx,
    pub name: String,
    /// The type of the global variable itself.
    pub value_tyidx: TyIdx,
    /// The explicit alignment in bytes, or 0 if none was specified.
    pub align: u32,
    pub linkage: Linkage,
    /// Is the global's memory immutable?
    pub constant: bool,
    /// The initializer: `None` if this global is only declared.
    pub init: Option<InstIdx>,
}

impl Global {
    pub fn is_declaration(&self) -> bool {
        self.init.is_none()
    }

    /// Is the initializer the one that will be used at run-time?
    pub fn has_definitive_initializer(&self) -> bool {
        self.init.is_some() && !self.linkage.may_be_overridden()
    }
}

impl InstT for Global {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        self.init.into_iter().collect()
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        if !m.ty(self.tyidx).is_ptr() {
            return Err(IrError::TypeMismatch(format!(
                "@{}: globals must be pointers",
                self.name
            )));
        }
        if self.align != 0 && !self.align.is_power_of_two() {
            return Err(IrError::InvalidConst(format!(
                "@{}: alignment {} is not a power of two",
                self.name, self.align
            )));
        }
        if let Some(init) = self.init {
            let found = m.inst_tyidx(init);
            if found != self.value_tyidx {
                return Err(mismatch(&format!("@{}", self.name), m, self.value_tyidx, found));
            }
        }
        Ok(())
    }

    fn to_string(&self, m: &Module) -> String {
        let mut s = format!(
            "global @{} {}, align {}, {}",
            self.name,
            m.ty(self.value_tyidx).to_string(m),
            self.align,
            self.linkage
        );
        if self.constant {
            s.push_str(", constant");
        }
        if let Some(init) = self.init {
            s.push_str(&format!(", init %{}", usize::from(init)));
        }
        s
    }
}

/// An alias for another global value.
#[derive(Clone, Debug)]
pub struct Alias {
    pub tyidx: TyIdx,
    pub name: String,
    pub aliasee: InstIdx,
    pub linkage: Linkage,
}

impl InstT for Alias {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        SmallVec::from_slice(&[self.aliasee])
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        let found = m.inst_tyidx(self.aliasee);
        if found != self.tyidx || !m.ty(self.tyidx).is_ptr() {
            return Err(mismatch(&format!("@{}", self.name), m, self.tyidx, found));
        }
        Ok(())
    }

    fn to_string(&self, _m: &Module) -> String {
        format!(
            "alias @{} = %{}, {}",
            self.name,
            usize::from(self.aliasee),
            self.linkage
        )
    }
}

/// A function argument.
#[derive(Clone, Debug)]
pub struct Arg {
    pub tyidx: TyIdx,
    /// Is this a pointer to a callee-owned copy of the caller's object?
    pub byval: bool,
    /// The alignment in bytes of a `byval` argument, or 0 if unspecified.
    pub align: u32,
}

impl InstT for Arg {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        SmallVec::new()
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        match m.ty(self.tyidx) {
            Ty::Void => Err(IrError::InvalidTy("void argument".to_string())),
            Ty::Ptr => Ok(()),
            _ if self.byval => Err(IrError::TypeMismatch(
                "byval arguments must be pointers".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn to_string(&self, _m: &Module) -> String {
        if self.byval {
            format!("arg byval, align {}", self.align)
        } else {
            "arg".to_string()
        }
    }
}

/// A binary operator kind.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
    FAdd,
}

impl BinOpKind {
    fn allows(self, flags: BinOpFlags) -> bool {
        let allowed = match self {
            BinOpKind::Add | BinOpKind::Sub | BinOpKind::Mul | BinOpKind::Shl => {
                BinOpFlags::NUW | BinOpFlags::NSW
            }
            BinOpKind::UDiv | BinOpKind::SDiv | BinOpKind::LShr | BinOpKind::AShr => {
                BinOpFlags::EXACT
            }
            _ => BinOpFlags::empty(),
        };
        allowed.contains(flags)
    }
}

bitflags::bitflags! {
    /// Poison-generating flags on a [BinOp].
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct BinOpFlags: u8 {
        /// No unsigned wrap.
        const NUW = 1;
        /// No signed wrap.
        const NSW = 1 << 1;
        /// The operation discards no non-zero bits.
        const EXACT = 1 << 2;
    }
}

/// A binary operator with normal LLVM semantics.
#[derive(Clone, Debug)]
pub struct BinOp {
    pub tyidx: TyIdx,
    pub kind: BinOpKind,
    /// What LLVM calls `op1`.
    pub lhs: InstIdx,
    /// What LLVM calls `op2`.
    pub rhs: InstIdx,
    pub flags: BinOpFlags,
}

impl BinOp {
    pub fn nuw(&self) -> bool {
        self.flags.contains(BinOpFlags::NUW)
    }

    pub fn nsw(&self) -> bool {
        self.flags.contains(BinOpFlags::NSW)
    }

    pub fn exact(&self) -> bool {
        self.flags.contains(BinOpFlags::EXACT)
    }
}

impl InstT for BinOp {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        SmallVec::from_slice(&[self.lhs, self.rhs])
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        for op in [self.lhs, self.rhs] {
            let found = m.inst_tyidx(op);
            if found != self.tyidx {
                return Err(mismatch(&self.kind.to_string(), m, self.tyidx, found));
            }
        }
        let scalar = m.scalar_ty(self.tyidx);
        let ok = match self.kind {
            BinOpKind::FAdd => scalar.is_fp(),
            _ => scalar.is_int(),
        };
        if !ok {
            return Err(IrError::TypeMismatch(format!(
                "{} cannot operate on {}",
                self.kind,
                m.ty(self.tyidx).to_string(m)
            )));
        }
        if !self.kind.allows(self.flags) {
            return Err(IrError::TypeMismatch(format!(
                "{} does not accept {:?}",
                self.kind, self.flags
            )));
        }
        Ok(())
    }

    fn to_string(&self, _m: &Module) -> String {
        let mut s = self.kind.to_string();
        if self.nuw() {
            s.push_str(" nuw");
        }
        if self.nsw() {
            s.push_str(" nsw");
        }
        if self.exact() {
            s.push_str(" exact");
        }
        format!(
            "{s} %{}, %{}",
            usize::from(self.lhs),
            usize::from(self.rhs)
        )
    }
}

/// A cast kind.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CastKind {
    Trunc,
    ZExt,
    SExt,
    FPTrunc,
    FPExt,
    FPToUI,
    FPToSI,
    UIToFP,
    SIToFP,
    PtrToInt,
    IntToPtr,
    BitCast,
}

/// Convert a value from one type to another.
#[derive(Clone, Debug)]
pub struct Cast {
    pub tyidx: TyIdx,
    pub kind: CastKind,
    pub val: InstIdx,
}

impl InstT for Cast {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        SmallVec::from_slice(&[self.val])
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        let src_tyidx = m.inst_tyidx(self.val);
        let vec_len = |tyidx| match m.ty(tyidx) {
            Ty::Vector { len, .. } => Some(*len),
            _ => None,
        };
        let (src, dst) = (m.scalar_ty(src_tyidx), m.scalar_ty(self.tyidx));
        let ok = match self.kind {
            CastKind::BitCast => match (m.ty(src_tyidx), m.ty(self.tyidx)) {
                (Ty::Ptr, Ty::Ptr) => true,
                (Ty::Ptr, _) | (_, Ty::Ptr) => false,
                _ => {
                    m.primitive_bitw(src_tyidx).is_some()
                        && m.primitive_bitw(src_tyidx) == m.primitive_bitw(self.tyidx)
                }
            },
            _ if vec_len(src_tyidx) != vec_len(self.tyidx) => false,
            CastKind::Trunc => matches!((src, dst), (Ty::Int(a), Ty::Int(b)) if a > b),
            CastKind::ZExt | CastKind::SExt => {
                matches!((src, dst), (Ty::Int(a), Ty::Int(b)) if a < b)
            }
            CastKind::FPTrunc => matches!((src, dst), (Ty::Double, Ty::Float)),
            CastKind::FPExt => matches!((src, dst), (Ty::Float, Ty::Double)),
            CastKind::FPToUI | CastKind::FPToSI => src.is_fp() && dst.is_int(),
            CastKind::UIToFP | CastKind::SIToFP => src.is_int() && dst.is_fp(),
            CastKind::PtrToInt => src.is_ptr() && dst.is_int(),
            CastKind::IntToPtr => src.is_int() && dst.is_ptr(),
        };
        if ok {
            Ok(())
        } else {
            Err(mismatch(&self.kind.to_string(), m, self.tyidx, src_tyidx))
        }
    }

    fn to_string(&self, _m: &Module) -> String {
        format!("{} %{}", self.kind, usize::from(self.val))
    }
}

/// Choose between two values.
#[derive(Clone, Debug)]
pub struct Select {
    pub tyidx: TyIdx,
    pub cond: InstIdx,
    pub trueval: InstIdx,
    pub falseval: InstIdx,
}

impl InstT for Select {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        SmallVec::from_slice(&[self.cond, self.trueval, self.falseval])
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        let cond_tyidx = m.inst_tyidx(self.cond);
        if m.scalar_ty(cond_tyidx) != &Ty::Int(1) {
            return Err(IrError::TypeMismatch(format!(
                "select condition must be i1, found {}",
                m.ty(cond_tyidx).to_string(m)
            )));
        }
        for op in [self.trueval, self.falseval] {
            let found = m.inst_tyidx(op);
            if found != self.tyidx {
                return Err(mismatch("select", m, self.tyidx, found));
            }
        }
        Ok(())
    }

    fn to_string(&self, _m: &Module) -> String {
        format!(
            "select {}",
            fmt_iidxs(&[self.cond, self.trueval, self.falseval])
        )
    }
}

/// Allocate stack memory.
#[derive(Clone, Debug)]
pub struct Alloca {
    pub tyidx: TyIdx,
    pub alloc_tyidx: TyIdx,
    /// The alignment in bytes, or 0 for the type's ABI alignment.
    pub align: u32,
}

impl InstT for Alloca {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        SmallVec::new()
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        if !m.is_sized(self.alloc_tyidx) || (self.align != 0 && !self.align.is_power_of_two()) {
            return Err(IrError::InvalidTy(format!(
                "cannot allocate {} with alignment {}",
                m.ty(self.alloc_tyidx).to_string(m),
                self.align
            )));
        }
        Ok(())
    }

    fn to_string(&self, m: &Module) -> String {
        if self.align == 0 {
            format!("alloca {}", m.ty(self.alloc_tyidx).to_string(m))
        } else {
            format!(
                "alloca {}, align {}",
                m.ty(self.alloc_tyidx).to_string(m),
                self.align
            )
        }
    }
}

/// Compute an address relative to `ptr`.
#[derive(Clone, Debug)]
pub struct Gep {
    pub tyidx: TyIdx,
    /// The type that the first index steps over.
    pub src_tyidx: TyIdx,
    pub ptr: InstIdx,
    pub idxs: SmallVec<[InstIdx; 4]>,
    pub inbounds: bool,
}

impl InstT for Gep {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        let mut ops = SmallVec::with_capacity(self.idxs.len() + 1);
        ops.push(self.ptr);
        ops.extend_from_slice(&self.idxs);
        ops
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        if !m.inst_ty(self.ptr).is_ptr() || !m.ty(self.tyidx).is_ptr() {
            return Err(IrError::TypeMismatch(
                "getelementptr operates on pointers".to_string(),
            ));
        }
        if self.idxs.is_empty()
            || self.idxs.iter().any(|x| !m.inst_ty(*x).is_int())
            || m.gep_steps(self).is_none()
        {
            return Err(IrError::InvalidIndices(self.to_string(m)));
        }
        Ok(())
    }

    fn to_string(&self, m: &Module) -> String {
        format!(
            "getelementptr{} {}, %{}, {}",
            if self.inbounds { " inbounds" } else { "" },
            m.ty(self.src_tyidx).to_string(m),
            usize::from(self.ptr),
            fmt_iidxs(&self.idxs)
        )
    }
}

/// Merge values from different control flow predecessors.
#[derive(Clone, Debug)]
pub struct Phi {
    pub tyidx: TyIdx,
    pub incoming: SmallVec<[InstIdx; 4]>,
}

impl InstT for Phi {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        self.incoming.clone()
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        for x in &self.incoming {
            let found = m.inst_tyidx(*x);
            if found != self.tyidx {
                return Err(mismatch("phi", m, self.tyidx, found));
            }
        }
        Ok(())
    }

    fn to_string(&self, _m: &Module) -> String {
        format!("phi {}", fmt_iidxs(&self.incoming))
    }
}

/// A compiler intrinsic.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
pub enum Intrinsic {
    #[strum(serialize = "llvm.bswap")]
    Bswap,
    #[strum(serialize = "llvm.ctlz")]
    Ctlz,
    #[strum(serialize = "llvm.ctpop")]
    Ctpop,
    #[strum(serialize = "llvm.cttz")]
    Cttz,
    #[strum(serialize = "llvm.lifetime.end")]
    LifetimeEnd,
    #[strum(serialize = "llvm.lifetime.start")]
    LifetimeStart,
    #[strum(serialize = "llvm.objectsize")]
    ObjectSize,
    #[strum(serialize = "llvm.sadd.with.overflow")]
    SAddWithOverflow,
    #[strum(serialize = "llvm.smul.with.overflow")]
    SMulWithOverflow,
    #[strum(serialize = "llvm.sqrt")]
    Sqrt,
    #[strum(serialize = "llvm.ssub.with.overflow")]
    SSubWithOverflow,
    #[strum(serialize = "llvm.uadd.with.overflow")]
    UAddWithOverflow,
    #[strum(serialize = "llvm.umul.with.overflow")]
    UMulWithOverflow,
    #[strum(serialize = "llvm.usub.with.overflow")]
    USubWithOverflow,
    #[strum(serialize = "llvm.x86.sse42.crc32.64.8")]
    X86Sse42Crc32_64_8,
    #[strum(serialize = "llvm.x86.sse42.crc32.64.64")]
    X86Sse42Crc32_64_64,
}

impl Intrinsic {
    /// How many arguments does this intrinsic take?
    pub fn arity(self) -> usize {
        match self {
            Intrinsic::Bswap | Intrinsic::Ctpop | Intrinsic::Sqrt => 1,
            _ => 2,
        }
    }
}

/// What a [Call] calls.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Callee {
    Intrinsic(Intrinsic),
    /// A function declared, but not defined, in this module.
    Decl(String),
}

/// A function call.
#[derive(Clone, Debug)]
pub struct Call {
    /// The return type.
    pub tyidx: TyIdx,
    pub callee: Callee,
    pub args: SmallVec<[InstIdx; 4]>,
}

impl InstT for Call {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        self.args.clone()
    }

    fn verify(&self, _m: &Module) -> Result<(), IrError> {
        if let Callee::Intrinsic(x) = self.callee
            && x.arity() != self.args.len()
        {
            return Err(IrError::TypeMismatch(format!(
                "{x} takes {} arguments, {} given",
                x.arity(),
                self.args.len()
            )));
        }
        Ok(())
    }

    fn to_string(&self, _m: &Module) -> String {
        match &self.callee {
            Callee::Intrinsic(x) => format!("call {x}({})", fmt_iidxs(&self.args)),
            Callee::Decl(x) => format!("call @{x}({})", fmt_iidxs(&self.args)),
        }
    }
}

/// Produce a copy of `agg` with the element at `idxs` replaced by `val`.
#[derive(Clone, Debug)]
pub struct InsertValue {
    pub tyidx: TyIdx,
    pub agg: InstIdx,
    pub val: InstIdx,
    pub idxs: SmallVec<[u32; 4]>,
}

impl InstT for InsertValue {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        SmallVec::from_slice(&[self.agg, self.val])
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        let found = m.inst_tyidx(self.agg);
        if found != self.tyidx || !m.ty(self.tyidx).is_aggregate() {
            return Err(mismatch("insertvalue", m, self.tyidx, found));
        }
        if self.idxs.is_empty() {
            return Err(IrError::InvalidIndices(self.to_string(m)));
        }
        match m.indexed_ty(self.tyidx, &self.idxs) {
            Some(x) if x == m.inst_tyidx(self.val) => Ok(()),
            Some(x) => Err(mismatch("insertvalue", m, x, m.inst_tyidx(self.val))),
            None => Err(IrError::InvalidIndices(self.to_string(m))),
        }
    }

    fn to_string(&self, _m: &Module) -> String {
        format!(
            "insertvalue %{}, %{}, {}",
            usize::from(self.agg),
            usize::from(self.val),
            self.idxs
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

/// Extract the element at `idxs` from `agg`.
#[derive(Clone, Debug)]
pub struct ExtractValue {
    pub tyidx: TyIdx,
    pub agg: InstIdx,
    pub idxs: SmallVec<[u32; 4]>,
}

impl InstT for ExtractValue {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        SmallVec::from_slice(&[self.agg])
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        let aggtyidx = m.inst_tyidx(self.agg);
        if self.idxs.is_empty() || !m.ty(aggtyidx).is_aggregate() {
            return Err(IrError::InvalidIndices(self.to_string(m)));
        }
        match m.indexed_ty(aggtyidx, &self.idxs) {
            Some(x) if x == self.tyidx => Ok(()),
            Some(x) => Err(mismatch("extractvalue", m, self.tyidx, x)),
            None => Err(IrError::InvalidIndices(self.to_string(m))),
        }
    }

    fn to_string(&self, _m: &Module) -> String {
        format!(
            "extractvalue %{}, {}",
            usize::from(self.agg),
            self.idxs
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

/// Load a value from memory.
#[derive(Clone, Debug)]
pub struct Load {
    pub tyidx: TyIdx,
    pub ptr: InstIdx,
    pub volatile: bool,
}

impl InstT for Load {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        SmallVec::from_slice(&[self.ptr])
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        if !m.inst_ty(self.ptr).is_ptr() || !m.is_sized(self.tyidx) {
            return Err(IrError::TypeMismatch(self.to_string(m)));
        }
        Ok(())
    }

    fn to_string(&self, _m: &Module) -> String {
        format!(
            "load{} %{}",
            if self.volatile { " volatile" } else { "" },
            usize::from(self.ptr)
        )
    }
}

/// Store a value to memory.
#[derive(Clone, Debug)]
pub struct Store {
    /// Always `void`.
    pub tyidx: TyIdx,
    pub val: InstIdx,
    pub ptr: InstIdx,
    pub volatile: bool,
}

impl InstT for Store {
    fn tyidx(&self) -> TyIdx {
        self.tyidx
    }

    fn operands(&self) -> SmallVec<[InstIdx; 4]> {
        SmallVec::from_slice(&[self.val, self.ptr])
    }

    fn verify(&self, m: &Module) -> Result<(), IrError> {
        if !m.inst_ty(self.ptr).is_ptr() || m.ty(self.tyidx) != &Ty::Void {
            return Err(IrError::TypeMismatch(self.to_string(m)));
        }
        Ok(())
    }

    fn to_string(&self, _m: &Module) -> String {
        format!(
            "store{} %{}, %{}",
            if self.volatile { " volatile" } else { "" },
            usize::from(self.val),
            usize::from(self.ptr)
        )
    }
}
