//! Invariants over pairs of machine states.
//!
//! An obligation carries two invariants: a hypothesis over the starting
//! states and a conclusion over the final states. Implementations render
//! themselves as formulas over a [`StatePair`]; those that can also be
//! evaluated against concrete states opt into `eval_concrete`, which the
//! checker uses to refute obligations from supplied testcases without a
//! solver round-trip.

use std::fmt;
use std::sync::Arc;

use bequiv_cfg::{Reg, NUM_REGS};
use bequiv_sym::SymBool;

use crate::executor::SymState;
use crate::state::CpuState;

/// The symbolic context an invariant is rendered against.
pub struct StatePair<'a> {
    pub target: &'a SymState,
    pub rewrite: &'a SymState,
    /// Equality of the two programs' memories at this point.
    pub memory_eq: &'a SymBool,
}

pub trait Invariant: Send + Sync + fmt::Debug {
    fn to_formula(&self, states: &StatePair<'_>) -> SymBool;

    /// Evaluate against concrete states, `None` when this invariant cannot
    /// be decided concretely (it mentions memory, say).
    fn eval_concrete(&self, _target: &CpuState, _rewrite: &CpuState) -> Option<bool> {
        None
    }
}

/// The trivial invariant.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueInvariant;

impl Invariant for TrueInvariant {
    fn to_formula(&self, _states: &StatePair<'_>) -> SymBool {
        SymBool::tru()
    }

    fn eval_concrete(&self, _target: &CpuState, _rewrite: &CpuState) -> Option<bool> {
        Some(true)
    }
}

/// A target register equals a rewrite register.
#[derive(Debug, Clone, Copy)]
pub struct RegisterEqInvariant {
    pub target_reg: Reg,
    pub rewrite_reg: Reg,
}

impl RegisterEqInvariant {
    pub fn new(target_reg: Reg, rewrite_reg: Reg) -> Self {
        Self {
            target_reg,
            rewrite_reg,
        }
    }
}

impl Invariant for RegisterEqInvariant {
    fn to_formula(&self, states: &StatePair<'_>) -> SymBool {
        states.target.regs[self.target_reg.index() % NUM_REGS]
            .equals(&states.rewrite.regs[self.rewrite_reg.index() % NUM_REGS])
    }

    fn eval_concrete(&self, target: &CpuState, rewrite: &CpuState) -> Option<bool> {
        Some(
            target.regs[self.target_reg.index() % NUM_REGS]
                == rewrite.regs[self.rewrite_reg.index() % NUM_REGS],
        )
    }
}

/// Full state equality: every register pairwise equal plus memory equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateEqInvariant;

impl Invariant for StateEqInvariant {
    fn to_formula(&self, states: &StatePair<'_>) -> SymBool {
        let regs = (0..NUM_REGS)
            .map(|i| states.target.regs[i].equals(&states.rewrite.regs[i]));
        SymBool::and(SymBool::conjoin(regs), states.memory_eq.clone())
    }

    fn eval_concrete(&self, target: &CpuState, rewrite: &CpuState) -> Option<bool> {
        Some(target.regs == rewrite.regs && target.memory == rewrite.memory)
    }
}

/// Conjunction of invariants.
#[derive(Debug, Clone, Default)]
pub struct ConjunctionInvariant {
    pub parts: Vec<Arc<dyn Invariant>>,
}

impl ConjunctionInvariant {
    pub fn new(parts: Vec<Arc<dyn Invariant>>) -> Self {
        Self { parts }
    }
}

impl Invariant for ConjunctionInvariant {
    fn to_formula(&self, states: &StatePair<'_>) -> SymBool {
        SymBool::conjoin(self.parts.iter().map(|p| p.to_formula(states)))
    }

    fn eval_concrete(&self, target: &CpuState, rewrite: &CpuState) -> Option<bool> {
        // One definite false decides the conjunction even if other parts
        // cannot be evaluated.
        let mut unknown = false;
        for part in &self.parts {
            match part.eval_concrete(target, rewrite) {
                Some(false) => return Some(false),
                Some(true) => {}
                None => unknown = true,
            }
        }
        if unknown {
            None
        } else {
            Some(true)
        }
    }
}
