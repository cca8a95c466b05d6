//! Deterministic scripted backend for tests.

use bequiv_sym::SymBool;
use std::collections::VecDeque;

use crate::error::{SolverError, SolverResult};
use crate::outcome::SolverOutcome;
use crate::solver::Solver;

/// A solver that replays a fixed sequence of outcomes and records every
/// assertion set it was asked to decide.
#[derive(Debug, Default)]
pub struct ScriptedSolver {
    script: VecDeque<SolverOutcome>,
    /// Assertion sets received, in call order.
    pub seen: Vec<Vec<SymBool>>,
}

impl ScriptedSolver {
    pub fn new(outcomes: impl IntoIterator<Item = SolverOutcome>) -> Self {
        Self {
            script: outcomes.into_iter().collect(),
            seen: Vec::new(),
        }
    }
}

impl Solver for ScriptedSolver {
    fn check_sat(&mut self, assertions: &[SymBool]) -> SolverResult<SolverOutcome> {
        self.seen.push(assertions.to_vec());
        self.script
            .pop_front()
            .ok_or_else(|| SolverError::Parse("scripted solver exhausted".to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_in_order_then_errors() {
        let mut solver = ScriptedSolver::new([
            SolverOutcome::Unsat,
            SolverOutcome::Unknown("later".to_string()),
        ]);
        assert_eq!(solver.check_sat(&[]).unwrap(), SolverOutcome::Unsat);
        assert!(matches!(
            solver.check_sat(&[SymBool::tru()]).unwrap(),
            SolverOutcome::Unknown(_)
        ));
        assert!(solver.check_sat(&[]).is_err());
        assert_eq!(solver.seen.len(), 3);
        assert_eq!(solver.seen[1], vec![SymBool::tru()]);
    }
}
