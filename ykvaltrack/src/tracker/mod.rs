//! Value tracking: what can be proven about the bits of a value without running the program.
//!
//! A [ValueTracker] answers queries about a value in a [Module]: which bits are known to be zero
//! or one ([ValueTracker::compute_known_bits]), whether it is a power of two, non-zero, or a
//! multiple of a constant, how many of its high bits replicate the sign bit, and so on. It also
//! answers questions about pointers: which object a pointer is derived from, at what constant
//! offset, and whether it points to a constant string.
//!
//! Every query recurses through operands up to a depth limit (see [Config]), at which point it
//! conservatively gives up. Queries never modify the [Module], and a [ValueTracker] holds only
//! shared references, so any number of queries can run concurrently on the same [Module].
//!
//! Pointer widths, type sizes, and alignments are only known if a [TargetLayout] is supplied:
//! without one, queries that need them return conservative answers.

mod known;
mod patterns;
mod provenance;
mod queries;
mod strings;

pub use provenance::only_used_by_lifetime_markers;
pub use queries::Multiple;

use crate::{
    arbbitint::ArbBitInt,
    config::Config,
    ir::{InstIdx, Module, Ty, TyIdx},
    known_bits::KnownBits,
    layout::TargetLayout,
    log::{Verbosity, log, should_log},
};

/// Answers value tracking queries about the values in a [Module].
#[derive(Clone, Copy, Debug)]
pub struct ValueTracker<'a> {
    m: &'a Module,
    layout: Option<&'a TargetLayout>,
    max_depth: u32,
    phi_fan_in: u32,
}

impl<'a> ValueTracker<'a> {
    /// Create a tracker for `m` with the default [Config].
    pub fn new(m: &'a Module, layout: Option<&'a TargetLayout>) -> Self {
        Self::with_config(m, layout, &Config::default())
    }

    pub fn with_config(m: &'a Module, layout: Option<&'a TargetLayout>, cfg: &Config) -> Self {
        debug_assert!(cfg.max_depth >= 2);
        ValueTracker {
            m,
            layout,
            max_depth: cfg.max_depth.max(2),
            phi_fan_in: cfg.phi_fan_in,
        }
    }

    pub fn module(&self) -> &'a Module {
        self.m
    }

    pub fn layout(&self) -> Option<&'a TargetLayout> {
        self.layout
    }

    /// The depth at which queries give up.
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// The bit width of `tyidx`'s scalar type if it is an integer or, given a layout, a pointer.
    pub fn scalar_bitw(&self, tyidx: TyIdx) -> Option<u32> {
        match self.m.scalar_ty(tyidx) {
            Ty::Int(bitw) => Some(*bitw),
            Ty::Ptr => self.layout.map(|x| x.ptr_bitw()),
            _ => None,
        }
    }

    /// The bit width of the value `iidx` produces: see [Self::scalar_bitw].
    pub fn inst_bitw(&self, iidx: InstIdx) -> Option<u32> {
        self.scalar_bitw(self.m.inst_tyidx(iidx))
    }

    /// Compute the known bits of every bit of `v`. Returns `None` if `v` is not an integer or
    /// (given a layout) a pointer.
    pub fn known_bits(&self, v: InstIdx) -> Option<KnownBits> {
        let bitw = self.inst_bitw(v)?;
        Some(self.compute_known_bits(v, &ArbBitInt::all_bits_set(bitw), 0))
    }

    fn warn_no_layout(&self, v: InstIdx, what: &str) {
        if should_log(Verbosity::Warning) {
            log(
                Verbosity::Warning,
                &format!("%{}: {what} needs a target layout", usize::from(v)),
            );
        }
    }

    fn log_query(&self, query: &str, v: InstIdx, result: &dyn std::fmt::Display) {
        if should_log(Verbosity::Query) {
            log(
                Verbosity::Query,
                &format!("{query} %{}: {result}", usize::from(v)),
            );
        }
    }
}
