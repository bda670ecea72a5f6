//! Target data layout: the sizes and alignments of types.
//!
//! A [TargetLayout] can be created from an LLVM-style data layout string, e.g.:
//!
//! ```text
//! e-p:64:64:64-i1:8:8-i8:8:8-i16:16:16-i32:32:32-i64:64:64-f32:32:32-f64:64:64-a0:0:64
//! ```
//!
//! Specifications not present in the string keep their default values. All sizes in the string
//! are in bits; all sizes and alignments returned by a [TargetLayout] are in bytes.

use crate::ir::{Global, Module, Ty, TyIdx};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("unknown layout specification '{0}'")]
    UnknownSpec(String),
    #[error("invalid number '{0}' in layout specification")]
    InvalidNumber(String),
    /// A specification was missing a mandatory field.
    #[error("missing field in layout specification '{0}'")]
    MissingField(String),
    /// A size or alignment was not a whole, non-zero (where required), number of bytes.
    #[error("'{0}' is not a valid size or alignment")]
    InvalidSize(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum AlignKind {
    Int,
    Float,
    Vector,
    Aggregate,
}

#[derive(Clone, Copy, Debug)]
struct AlignRule {
    kind: AlignKind,
    bitw: u32,
    abi: u32,
    pref: u32,
}

/// The computed layout of a struct type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StructLayout {
    /// The size in bytes, including tail padding.
    pub size: u64,
    /// The alignment in bytes.
    pub align: u32,
    /// The byte offset of each field.
    pub offsets: Vec<u64>,
}

/// Sizes and alignments of types for a given target.
#[derive(Clone, Debug)]
pub struct TargetLayout {
    big_endian: bool,
    ptr_bitw: u32,
    ptr_abi_align: u32,
    ptr_pref_align: u32,
    rules: Vec<AlignRule>,
}

impl Default for TargetLayout {
    /// A little endian target with 64-bit pointers.
    fn default() -> Self {
        let rule = |kind, bitw, abi, pref| AlignRule {
            kind,
            bitw,
            abi,
            pref,
        };
        TargetLayout {
            big_endian: false,
            ptr_bitw: 64,
            ptr_abi_align: 8,
            ptr_pref_align: 8,
            rules: vec![
                rule(AlignKind::Int, 1, 1, 1),
                rule(AlignKind::Int, 8, 1, 1),
                rule(AlignKind::Int, 16, 2, 2),
                rule(AlignKind::Int, 32, 4, 4),
                rule(AlignKind::Int, 64, 4, 8),
                rule(AlignKind::Float, 32, 4, 4),
                rule(AlignKind::Float, 64, 8, 8),
                rule(AlignKind::Vector, 64, 8, 8),
                rule(AlignKind::Vector, 128, 16, 16),
                rule(AlignKind::Aggregate, 0, 0, 8),
            ],
        }
    }
}

impl FromStr for TargetLayout {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tl = TargetLayout::default();
        for spec in s.split('-').filter(|x| !x.is_empty()) {
            let mut fields = spec.split(':');
            // `split` always yields at least one item.
            let head = fields.next().unwrap_or_default();
            let rest = fields.collect::<Vec<_>>();
            let num = |x: &str| {
                x.parse::<u32>()
                    .map_err(|_| LayoutError::InvalidNumber(x.to_string()))
            };
            // An (abi, pref) pair of byte alignments from `rest`, where `pref` defaults to `abi`.
            let aligns = |rest: &[&str]| -> Result<(u32, u32), LayoutError> {
                let abi = num(rest.first().copied().ok_or(LayoutError::MissingField(spec.to_string()))?)?;
                let pref = rest.get(1).copied().map(num).transpose()?.unwrap_or(abi);
                if abi % 8 != 0 || pref % 8 != 0 || pref < abi {
                    return Err(LayoutError::InvalidSize(spec.to_string()));
                }
                Ok((abi / 8, pref / 8))
            };
            match head.chars().next() {
                Some('e') if head == "e" => tl.big_endian = false,
                Some('E') if head == "E" => tl.big_endian = true,
                Some('p') => {
                    // An address space, if present, must be 0.
                    if head.len() > 1 && num(&head[1..])? != 0 {
                        return Err(LayoutError::UnknownSpec(spec.to_string()));
                    }
                    let bitw = num(rest.first().copied().ok_or(LayoutError::MissingField(spec.to_string()))?)?;
                    if bitw == 0 || bitw % 8 != 0 || bitw > 64 {
                        return Err(LayoutError::InvalidSize(spec.to_string()));
                    }
                    let (abi, pref) = aligns(&rest[1..])?;
                    if abi == 0 {
                        return Err(LayoutError::InvalidSize(spec.to_string()));
                    }
                    tl.ptr_bitw = bitw;
                    tl.ptr_abi_align = abi;
                    tl.ptr_pref_align = pref;
                }
                Some(c @ ('i' | 'f' | 'v' | 'a')) => {
                    let kind = match c {
                        'i' => AlignKind::Int,
                        'f' => AlignKind::Float,
                        'v' => AlignKind::Vector,
                        _ => AlignKind::Aggregate,
                    };
                    let bitw = if head.len() > 1 { num(&head[1..])? } else { 0 };
                    if kind != AlignKind::Aggregate && bitw == 0 {
                        return Err(LayoutError::InvalidSize(spec.to_string()));
                    }
                    let (abi, pref) = aligns(&rest)?;
                    if kind == AlignKind::Int && abi == 0 {
                        return Err(LayoutError::InvalidSize(spec.to_string()));
                    }
                    tl.set_rule(AlignRule {
                        kind,
                        bitw,
                        abi,
                        pref,
                    });
                }
                // Native integer widths, stack alignment, and stack object specifications do not
                // affect the layout of types.
                Some('n' | 'S' | 's') => (),
                _ => return Err(LayoutError::UnknownSpec(spec.to_string())),
            }
        }
        Ok(tl)
    }
}

impl TargetLayout {
    fn set_rule(&mut self, rule: AlignRule) {
        match self
            .rules
            .iter()
            .position(|x| x.kind == rule.kind && x.bitw == rule.bitw)
        {
            Some(i) => self.rules[i] = rule,
            None => self.rules.push(rule),
        }
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// The width of a pointer in bits.
    pub fn ptr_bitw(&self) -> u32 {
        self.ptr_bitw
    }

    /// Find the alignment for a `kind` of type of `bitw` bits. Integers without an exact match
    /// use the smallest larger integer rule, or failing that the largest integer rule. Vectors
    /// without an exact match are naturally aligned.
    fn lookup_align(&self, m: &Module, kind: AlignKind, bitw: u32, abi: bool, tyidx: TyIdx) -> u32 {
        let pick = |x: &AlignRule| if abi { x.abi } else { x.pref };
        if let Some(x) = self
            .rules
            .iter()
            .find(|x| x.kind == kind && x.bitw == bitw)
        {
            return pick(x);
        }
        match kind {
            AlignKind::Int => {
                let ints = self.rules.iter().filter(|x| x.kind == AlignKind::Int);
                let best = ints
                    .clone()
                    .filter(|x| x.bitw > bitw)
                    .min_by_key(|x| x.bitw)
                    .or_else(|| ints.max_by_key(|x| x.bitw));
                best.map(pick).unwrap_or(1)
            }
            AlignKind::Vector => {
                let align = match m.ty(tyidx) {
                    Ty::Vector { elem, len } => self.alloc_size(m, *elem) * u64::from(*len),
                    _ => 1,
                };
                u32::try_from(align.max(1).next_power_of_two()).unwrap_or(u32::MAX)
            }
            AlignKind::Float | AlignKind::Aggregate => 0,
        }
    }

    fn alignment(&self, m: &Module, tyidx: TyIdx, abi: bool) -> u32 {
        match m.ty(tyidx) {
            Ty::Ptr => {
                if abi {
                    self.ptr_abi_align
                } else {
                    self.ptr_pref_align
                }
            }
            Ty::Array { elem, .. } => self.alignment(m, *elem, abi),
            Ty::Struct { packed, .. } => {
                if *packed && abi {
                    return 1;
                }
                let align = self.lookup_align(m, AlignKind::Aggregate, 0, abi, tyidx);
                align.max(self.struct_layout(m, tyidx).align)
            }
            Ty::Int(bitw) => self.lookup_align(m, AlignKind::Int, *bitw, abi, tyidx),
            Ty::Void => self.lookup_align(m, AlignKind::Int, 8, abi, tyidx),
            Ty::Float => self.lookup_align(m, AlignKind::Float, 32, abi, tyidx),
            Ty::Double => self.lookup_align(m, AlignKind::Float, 64, abi, tyidx),
            Ty::Vector { .. } => {
                let bitw = u32::try_from(self.size_in_bits(m, tyidx)).unwrap_or(u32::MAX);
                self.lookup_align(m, AlignKind::Vector, bitw, abi, tyidx)
            }
            Ty::Opaque => 1,
        }
    }

    /// The minimum alignment in bytes the ABI requires for `tyidx`.
    pub fn abi_align(&self, m: &Module, tyidx: TyIdx) -> u32 {
        self.alignment(m, tyidx, true)
    }

    /// The alignment in bytes the target prefers for `tyidx`.
    pub fn pref_align(&self, m: &Module, tyidx: TyIdx) -> u32 {
        self.alignment(m, tyidx, false)
    }

    /// The number of bits needed to hold a value of type `tyidx`. Unsized types have size 0.
    pub fn size_in_bits(&self, m: &Module, tyidx: TyIdx) -> u64 {
        match m.ty(tyidx) {
            Ty::Ptr => u64::from(self.ptr_bitw),
            Ty::Array { elem, len } => self.alloc_size(m, *elem) * len * 8,
            Ty::Struct { .. } => self.struct_layout(m, tyidx).size * 8,
            Ty::Int(bitw) => u64::from(*bitw),
            Ty::Void => 8,
            Ty::Float => 32,
            Ty::Double => 64,
            Ty::Vector { elem, len } => self.size_in_bits(m, *elem) * u64::from(*len),
            Ty::Opaque => 0,
        }
    }

    /// The number of bytes a store of type `tyidx` may overwrite.
    pub fn store_size(&self, m: &Module, tyidx: TyIdx) -> u64 {
        self.size_in_bits(m, tyidx).div_ceil(8)
    }

    /// The offset in bytes between successive objects of type `tyidx`, including padding.
    pub fn alloc_size(&self, m: &Module, tyidx: TyIdx) -> u64 {
        let align = u64::from(self.abi_align(m, tyidx).max(1));
        self.store_size(m, tyidx).next_multiple_of(align)
    }

    /// Lay out the struct type `tyidx`. Non-struct types produce an empty layout.
    pub fn struct_layout(&self, m: &Module, tyidx: TyIdx) -> StructLayout {
        let Ty::Struct { fields, packed } = m.ty(tyidx) else {
            return StructLayout {
                size: 0,
                align: 1,
                offsets: Vec::new(),
            };
        };
        let mut size = 0u64;
        let mut align = 0u32;
        let mut offsets = Vec::with_capacity(fields.len());
        for x in fields {
            let field_align = if *packed { 1 } else { self.abi_align(m, *x).max(1) };
            size = size.next_multiple_of(u64::from(field_align));
            align = align.max(field_align);
            offsets.push(size);
            size += self.alloc_size(m, *x);
        }
        let align = align.max(1);
        StructLayout {
            size: size.next_multiple_of(u64::from(align)),
            align,
            offsets,
        }
    }

    /// The alignment in bytes a global is expected to have: its explicit alignment or, if it is
    /// larger, the preferred alignment of its type. Large initialised globals are aligned to at
    /// least 16 bytes.
    pub fn pref_global_align(&self, m: &Module, g: &Global) -> u32 {
        let mut align = self.pref_align(m, g.value_tyidx);
        if g.align > align {
            align = g.align;
        }
        if !g.is_declaration() && align < 16 && self.size_in_bits(m, g.value_tyidx) > 128 {
            align = 16;
        }
        align
    }
}
