//! Checker configuration.

use std::time::Duration;

use bequiv_sym::{MemConfig, StrategyKind};
use serde::{Deserialize, Serialize};

/// How memory aliasing is encoded when discharging an obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AliasStrategy {
    /// Naive bounded enumeration.
    Basic,
    /// One flat byte array, aliasing left to the solver.
    #[default]
    Flat,
    /// Cell-based clustering.
    Arm,
    /// Race `Arm` against `Flat`, first non-error result wins.
    ArmsRace,
}

impl AliasStrategy {
    /// The memory encoding this strategy runs, `None` for the race.
    pub fn memory_kind(self) -> Option<StrategyKind> {
        match self {
            AliasStrategy::Basic => Some(StrategyKind::Basic),
            AliasStrategy::Flat => Some(StrategyKind::Flat),
            AliasStrategy::Arm => Some(StrategyKind::Arm),
            AliasStrategy::ArmsRace => None,
        }
    }

    /// Entrants of the race, in spawn order.
    pub fn race_entrants() -> [StrategyKind; 2] {
        [StrategyKind::Arm, StrategyKind::Flat]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    pub alias_strategy: AliasStrategy,
    /// Bound every accessed address into the low 32-bit address space.
    pub nacl: bool,
    /// Track a per-basic-block execution counter in the symbolic state.
    pub basic_block_ghosts: bool,
    /// Additionally assume the hypothesis invariant over the final states.
    pub fixpoint_up: bool,
    /// Bound on the cell-assignment search.
    pub max_alias_cases: usize,
    /// Bound on accesses the basic strategy enumerates.
    pub max_accesses: usize,
    pub solver_timeout: Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            alias_strategy: AliasStrategy::Flat,
            nacl: false,
            basic_block_ghosts: true,
            fixpoint_up: false,
            max_alias_cases: 256,
            max_accesses: 64,
            solver_timeout: Duration::from_secs(60),
        }
    }
}

impl CheckerConfig {
    pub fn mem_config(&self) -> MemConfig {
        MemConfig {
            max_alias_cases: self.max_alias_cases,
            max_accesses: self.max_accesses,
        }
    }
}
