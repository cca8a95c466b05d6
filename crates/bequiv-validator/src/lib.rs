//! Obligation checking for binary program equivalence.
//!
//! Given two programs as control flow graphs, a path through each, a
//! hypothesis invariant over the starting states and a conclusion
//! invariant over the final states, the checker decides whether the
//! conclusion holds on every pair of executions satisfying the
//! hypothesis. Memory aliasing is handled by a pluggable strategy from
//! `bequiv-sym`; satisfiability by a pluggable backend from `bequiv-smt`.

pub mod checker;
pub mod config;
pub mod error;
pub mod executor;
pub mod filter;
pub mod invariant;
pub mod jump;
mod race;
pub mod result;
pub mod state;

pub use checker::{
    check_obligation, Callback, Job, ObligationChecker, SmtObligationChecker, SolverFactory,
};
pub use config::{AliasStrategy, CheckerConfig};
pub use error::ValidatorError;
pub use executor::{execute_path, Execution, SymState};
pub use filter::{DefaultFilter, Filter, PathLengthFilter};
pub use invariant::{
    ConjunctionInvariant, Invariant, RegisterEqInvariant, StateEqInvariant, StatePair,
    TrueInvariant,
};
pub use jump::{is_jump, JumpType};
pub use result::CheckResult;
pub use state::CpuState;
