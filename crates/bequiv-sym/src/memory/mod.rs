//! Symbolic memory abstraction.
//!
//! Every strategy implements the same capability contract: record read and
//! write accesses during symbolic execution, then produce an equality
//! formula relating two finalized instances plus the generated constraints
//! that make the formula sound. The strategies differ only in how they
//! encode aliasing:
//!
//! - [`FlatMemory`] keeps one symbolic byte array and folds every access
//!   into array theory directly. Always sound, scales poorly.
//! - [`BasicMemory`] enumerates aliasing naively with per-byte ite chains,
//!   bounded by configuration. Sound, formula size grows quadratically.
//! - [`ArmMemory`] clusters accesses into a minimal set of disjoint cells
//!   and emits guarded per-cell value chains (see [`cells`]).

pub mod arm;
pub mod basic;
pub mod cells;
pub mod flat;

pub use arm::ArmMemory;
pub use basic::BasicMemory;
pub use cells::{assign_cells, AccessOffsets, Assignment, Cell, CellMember};
pub use flat::FlatMemory;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::expr::{SymArray, SymBool, SymBv};

/// One recorded read or write event.
///
/// `cell` and `cell_offset` stay unset until cell assignment resolves the
/// access; no other field is ever mutated after recording.
#[derive(Debug, Clone, PartialEq)]
pub struct MemAccess {
    /// Symbolic byte address of the access.
    pub address: SymBv,
    /// Written value, or the fresh placeholder bound to a read result.
    pub value: SymBv,
    /// Access size in bytes.
    pub size: u32,
    /// True for writes.
    pub write: bool,
    /// Sequence index in program order (within the combined list once two
    /// programs are merged).
    pub index: usize,
    /// Whether the access belongs to the other program of a comparison.
    pub is_other: bool,
    /// Resolved cell, once assignment has run.
    pub cell: Option<usize>,
    /// Byte offset within the resolved cell.
    pub cell_offset: i64,
}

/// Tuning knobs shared by the memory strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemConfig {
    /// Bound on states explored by the cell-assignment search.
    pub max_alias_cases: usize,
    /// Bound on accesses the basic strategy will enumerate.
    pub max_accesses: usize,
}

impl Default for MemConfig {
    fn default() -> Self {
        Self {
            max_alias_cases: 256,
            max_accesses: 64,
        }
    }
}

/// Shared bookkeeping for recorded accesses.
///
/// Each access binds a fresh alias variable to its address; the alias
/// variables give counterexample construction a stable handle on every
/// touched location, whatever the strategy does internally.
#[derive(Debug)]
pub(crate) struct AccessLog {
    prefix: String,
    next_var: u64,
    pub accesses: Vec<MemAccess>,
    pub constraints: Vec<SymBool>,
    pub access_list: Vec<(SymBv, u32)>,
}

impl AccessLog {
    pub fn new(prefix: String) -> Self {
        Self {
            prefix,
            next_var: 0,
            accesses: Vec::new(),
            constraints: Vec::new(),
            access_list: Vec::new(),
        }
    }

    pub fn fresh(&mut self, tag: &str, width: u32) -> SymBv {
        let n = self.next_var;
        self.next_var += 1;
        SymBv::var(format!("{}_{tag}{n}", self.prefix), width)
    }

    fn record_alias(&mut self, address: &SymBv, size: u32) {
        let alias = self.fresh("alias", 64);
        self.constraints.push(alias.equals(address));
        self.access_list.push((alias, size));
    }

    pub fn record_write(&mut self, address: SymBv, value: SymBv, size: u32) {
        self.record_alias(&address, size);
        let index = self.accesses.len();
        self.accesses.push(MemAccess {
            address,
            value,
            size,
            write: true,
            index,
            is_other: false,
            cell: None,
            cell_offset: 0,
        });
    }

    pub fn record_read(&mut self, address: SymBv, size: u32) -> SymBv {
        self.record_alias(&address, size);
        let value = self.fresh("val", size * 8);
        let index = self.accesses.len();
        self.accesses.push(MemAccess {
            address,
            value: value.clone(),
            size,
            write: false,
            index,
            is_other: false,
            cell: None,
            cell_offset: 0,
        });
        value
    }
}

/// The capability contract every strategy implements.
pub trait SymbolicMemory {
    /// Record a write. Returns the fault condition for the access.
    fn write(&mut self, address: SymBv, value: SymBv, size: u32) -> SymBool;

    /// Record a read. Returns a fresh placeholder for the read value plus
    /// the fault condition; the placeholder is tied to reality through the
    /// generated constraints.
    fn read(&mut self, address: SymBv, size: u32) -> (SymBv, SymBool);

    /// Symbolic memory state before any access.
    fn start_variable(&self) -> SymArray;

    /// Symbolic memory state after all accesses; meaningful only once
    /// [`SymbolicMemory::finalize`] has run.
    fn end_variable(&self) -> SymArray;

    /// Mark that no further accesses will be recorded.
    fn finalize(&mut self);

    /// All constraints accumulated so far. Must be asserted alongside the
    /// equality formula.
    fn generated_constraints(&self) -> Vec<SymBool>;

    /// Alias-variable/size pairs for every recorded access.
    fn access_list(&self) -> &[(SymBv, u32)];
}

/// Which aliasing encoding a [`MemoryStrategy`] instance uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    Flat,
    Basic,
    Arm,
}

/// A memory strategy instance; the obligation checker holds two of these
/// and never touches strategy-specific state.
#[derive(Debug)]
pub enum MemoryStrategy {
    Flat(FlatMemory),
    Basic(BasicMemory),
    Arm(ArmMemory),
}

impl MemoryStrategy {
    pub fn new(kind: StrategyKind, config: MemConfig, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        match kind {
            StrategyKind::Flat => MemoryStrategy::Flat(FlatMemory::new(prefix)),
            StrategyKind::Basic => MemoryStrategy::Basic(BasicMemory::new(config, prefix)),
            StrategyKind::Arm => MemoryStrategy::Arm(ArmMemory::new(config, prefix)),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            MemoryStrategy::Flat(_) => StrategyKind::Flat,
            MemoryStrategy::Basic(_) => StrategyKind::Basic,
            MemoryStrategy::Arm(_) => StrategyKind::Arm,
        }
    }

    /// Formula asserting this memory's end state equals `other`'s.
    ///
    /// For the cell-based strategy this is the only entry point that forces
    /// the aliasing algorithm to run; the constraints it generates land on
    /// `self` and must be collected afterwards.
    pub fn equality_constraint(&mut self, other: &mut MemoryStrategy) -> MemoryResult<SymBool> {
        match (self, other) {
            (MemoryStrategy::Flat(a), MemoryStrategy::Flat(b)) => a.equality_constraint(b),
            (MemoryStrategy::Basic(a), MemoryStrategy::Basic(b)) => a.equality_constraint(b),
            (MemoryStrategy::Arm(a), MemoryStrategy::Arm(b)) => a.equality_constraint(b),
            _ => Err(MemoryError::StrategyMismatch),
        }
    }
}

impl SymbolicMemory for MemoryStrategy {
    fn write(&mut self, address: SymBv, value: SymBv, size: u32) -> SymBool {
        match self {
            MemoryStrategy::Flat(m) => m.write(address, value, size),
            MemoryStrategy::Basic(m) => m.write(address, value, size),
            MemoryStrategy::Arm(m) => m.write(address, value, size),
        }
    }

    fn read(&mut self, address: SymBv, size: u32) -> (SymBv, SymBool) {
        match self {
            MemoryStrategy::Flat(m) => m.read(address, size),
            MemoryStrategy::Basic(m) => m.read(address, size),
            MemoryStrategy::Arm(m) => m.read(address, size),
        }
    }

    fn start_variable(&self) -> SymArray {
        match self {
            MemoryStrategy::Flat(m) => m.start_variable(),
            MemoryStrategy::Basic(m) => m.start_variable(),
            MemoryStrategy::Arm(m) => m.start_variable(),
        }
    }

    fn end_variable(&self) -> SymArray {
        match self {
            MemoryStrategy::Flat(m) => m.end_variable(),
            MemoryStrategy::Basic(m) => m.end_variable(),
            MemoryStrategy::Arm(m) => m.end_variable(),
        }
    }

    fn finalize(&mut self) {
        match self {
            MemoryStrategy::Flat(m) => m.finalize(),
            MemoryStrategy::Basic(m) => m.finalize(),
            MemoryStrategy::Arm(m) => m.finalize(),
        }
    }

    fn generated_constraints(&self) -> Vec<SymBool> {
        match self {
            MemoryStrategy::Flat(m) => m.generated_constraints(),
            MemoryStrategy::Basic(m) => m.generated_constraints(),
            MemoryStrategy::Arm(m) => m.generated_constraints(),
        }
    }

    fn access_list(&self) -> &[(SymBv, u32)] {
        match self {
            MemoryStrategy::Flat(m) => m.access_list(),
            MemoryStrategy::Basic(m) => m.access_list(),
            MemoryStrategy::Arm(m) => m.access_list(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_mismatch_is_an_error() {
        let mut a = MemoryStrategy::new(StrategyKind::Flat, MemConfig::default(), "t_mem");
        let mut b = MemoryStrategy::new(StrategyKind::Arm, MemConfig::default(), "r_mem");
        a.finalize();
        b.finalize();
        assert_eq!(
            a.equality_constraint(&mut b),
            Err(MemoryError::StrategyMismatch)
        );
    }

    #[test]
    fn test_access_log_names_are_deterministic() {
        let mut log = AccessLog::new("t_mem".to_string());
        log.record_write(SymBv::constant(0x100, 64), SymBv::constant(1, 32), 4);
        let value = log.record_read(SymBv::constant(0x104, 64), 4);
        assert_eq!(log.access_list[0].0.var_name(), Some("t_mem_alias0"));
        assert_eq!(log.access_list[1].0.var_name(), Some("t_mem_alias1"));
        assert_eq!(value.var_name(), Some("t_mem_val2"));
        assert_eq!(value.width(), 32);
    }

    #[test]
    fn test_access_log_preserves_program_order() {
        let mut log = AccessLog::new("m".to_string());
        log.record_write(SymBv::constant(0, 64), SymBv::constant(1, 8), 1);
        log.record_read(SymBv::constant(0, 64), 1);
        log.record_write(SymBv::constant(8, 64), SymBv::constant(2, 8), 1);
        let indices: Vec<usize> = log.accesses.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(log.accesses[0].write);
        assert!(!log.accesses[1].write);
    }
}
