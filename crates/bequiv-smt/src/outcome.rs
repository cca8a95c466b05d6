use rustc_hash::FxHashMap;

/// A value in a satisfying model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtValue {
    Bool(bool),
    BitVec { value: u64, width: u32 },
}

impl SmtValue {
    /// Bit-vector payload, if this is one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SmtValue::BitVec { value, .. } => Some(*value),
            SmtValue::Bool(_) => None,
        }
    }
}

/// Model mapping variable names to values.
pub type Model = FxHashMap<String, SmtValue>;

/// Result of a satisfiability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverOutcome {
    /// Satisfiable, with a (possibly partial) model.
    Sat(Model),
    Unsat,
    /// No definitive answer; carries the solver's stated reason.
    Unknown(String),
}

impl SolverOutcome {
    pub fn is_definitive(&self) -> bool {
        !matches!(self, SolverOutcome::Unknown(_))
    }
}
