//! Value tracking for an SSA intermediate representation.
//!
//! Given a [Module](ir::Module) of instructions, a [ValueTracker] proves facts about the values
//! those instructions produce without running the program: which bits are known to be zero or
//! one, whether a value is a power of two or non-zero, how many sign bits it has, which object a
//! pointer is derived from, and so on. Optimisers use these facts to justify rewrites.
//!
//! All [ValueTracker] queries are read-only. The handful of helpers which may need to create
//! new values ([find_inserted_value], [is_bytewise_value]) are free functions taking a mutable
//! [Module](ir::Module).
//!
//! Logging is controlled with the `YKVT_LOG` environment variable, and the analysis can be tuned
//! with a [Config].

pub mod aggregate;
pub mod arbbitint;
pub mod bytewise;
pub mod config;
pub mod ir;
pub mod known_bits;
pub mod layout;
mod log;
pub mod tracker;

pub use aggregate::find_inserted_value;
pub use arbbitint::ArbBitInt;
pub use bytewise::is_bytewise_value;
pub use config::Config;
pub use known_bits::{KnownBits, SignBit};
pub use layout::TargetLayout;
pub use tracker::{Multiple, ValueTracker, only_used_by_lifetime_markers};
