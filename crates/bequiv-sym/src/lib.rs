//! Symbolic expressions and memory models for program equivalence
//! checking.
//!
//! [`expr`] provides the bit-vector, boolean and byte-array expression
//! types every other crate builds formulas from. [`memory`] provides the
//! pluggable aliasing strategies: a flat array model, a naive bounded
//! enumeration, and the cell-based model that clusters accesses into
//! provably independent storage locations.

pub mod error;
pub mod expr;
pub mod memory;

pub use error::{MemoryError, MemoryResult};
pub use expr::{BvOp, SymArray, SymBool, SymBv};
pub use memory::{
    ArmMemory, BasicMemory, FlatMemory, MemAccess, MemConfig, MemoryStrategy, StrategyKind,
    SymbolicMemory,
};
