//! Solver interface for the equivalence checker.
//!
//! Formulas built from `bequiv-sym` expressions are rendered to SMT-LIB
//! ([`smtlib`]) and decided by a [`Solver`] backend: the [`Z3Solver`]
//! subprocess wrapper in production, or the replaying [`ScriptedSolver`]
//! in tests.

pub mod error;
pub mod outcome;
pub mod scripted;
pub mod smtlib;
pub mod solver;
pub mod z3;

pub use error::{SolverError, SolverResult};
pub use outcome::{Model, SmtValue, SolverOutcome};
pub use scripted::ScriptedSolver;
pub use smtlib::to_smt2;
pub use solver::Solver;
pub use z3::Z3Solver;
