use bequiv_sym::SymBool;

use crate::error::SolverResult;
use crate::outcome::SolverOutcome;

/// A blocking satisfiability backend.
///
/// Implementations take a conjunction of assertions and decide it,
/// returning a model on sat. Callers that need concurrency run each
/// solver on its own blocking task.
pub trait Solver: Send {
    fn check_sat(&mut self, assertions: &[SymBool]) -> SolverResult<SolverOutcome>;

    /// Human-readable backend name, for logs.
    fn name(&self) -> &str;
}
