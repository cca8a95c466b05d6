//! Symbolic execution of a path through a control flow graph.
//!
//! Register contents are tracked as expressions; only the initial and
//! final values get dedicated variables, named deterministically from the
//! program prefix so counterexample extraction can find them in a model.
//! Memory traffic goes through the caller's [`MemoryStrategy`], which
//! records it for later aliasing analysis.

use std::collections::BTreeMap;

use bequiv_cfg::{BlockId, Cfg, Instr, MemRef, BinOp, Reg, NUM_REGS};
use bequiv_sym::{MemoryStrategy, SymBool, SymBv, SymbolicMemory};
use tracing::trace;

use crate::config::CheckerConfig;
use crate::error::ValidatorError;
use crate::jump::{is_jump, JumpType};

/// Symbolic register file plus per-block ghost counters.
#[derive(Debug, Clone)]
pub struct SymState {
    /// One 64-bit expression per register, indexed by register number.
    pub regs: Vec<SymBv>,
    pub ghosts: BTreeMap<BlockId, SymBv>,
}

/// Result of executing one path.
#[derive(Debug)]
pub struct Execution {
    /// State at path entry; every component is a fresh variable.
    pub initial: SymState,
    /// State at path exit, rebound to deterministic final variables.
    pub finals: SymState,
    /// Definitions, path conditions and access bindings to assert.
    pub constraints: Vec<SymBool>,
}

fn reg_index(reg: Reg) -> Result<usize, ValidatorError> {
    if reg.index() < NUM_REGS {
        Ok(reg.index())
    } else {
        Err(ValidatorError::BadRegister(reg.0))
    }
}

/// Execute `path` through `cfg`, recording memory traffic in `memory`.
///
/// `prefix` namespaces every variable this program introduces ("t" and
/// "r" for the two sides of an obligation).
pub fn execute_path(
    cfg: &Cfg,
    path: &[BlockId],
    prefix: &str,
    memory: &mut MemoryStrategy,
    config: &CheckerConfig,
) -> Result<Execution, ValidatorError> {
    let mut constraints = Vec::new();
    let mut regs: Vec<SymBv> = (0..NUM_REGS)
        .map(|i| SymBv::var(format!("{prefix}_r{i}_0"), 64))
        .collect();
    let initial_regs = regs.clone();

    let mut ghosts: BTreeMap<BlockId, SymBv> = BTreeMap::new();
    let mut ghost_versions: BTreeMap<BlockId, u32> = BTreeMap::new();
    if config.basic_block_ghosts {
        for id in cfg.block_ids() {
            ghosts.insert(id, SymBv::var(format!("{prefix}_g{id}_0"), 64));
            ghost_versions.insert(id, 0);
        }
    }
    let initial_ghosts = ghosts.clone();

    let address_of = |regs: &[SymBv], mem: &MemRef| -> Result<SymBv, ValidatorError> {
        Ok(match mem.base {
            Some(base) => regs[reg_index(base)?].offset(mem.disp),
            None => SymBv::constant(mem.disp as u64, 64),
        })
    };

    for (step, &bid) in path.iter().enumerate() {
        let block = cfg.block(bid).ok_or(ValidatorError::UnknownBlock(bid))?;
        trace!(prefix, block = bid, step, "executing block");

        if config.basic_block_ghosts {
            if let (Some(version), Some(old)) =
                (ghost_versions.get_mut(&bid), ghosts.get(&bid).cloned())
            {
                *version += 1;
                let fresh = SymBv::var(format!("{prefix}_g{bid}_{version}"), 64);
                constraints.push(fresh.equals(&old.offset(1)));
                ghosts.insert(bid, fresh);
            }
        }

        for instr in &block.instrs {
            match instr {
                Instr::Const { dst, value } => {
                    regs[reg_index(*dst)?] = SymBv::constant(*value, 64);
                }
                Instr::Mov { dst, src } => {
                    regs[reg_index(*dst)?] = regs[reg_index(*src)?].clone();
                }
                Instr::Binary { op, dst, lhs, rhs } => {
                    let lhs = regs[reg_index(*lhs)?].clone();
                    let rhs = regs[reg_index(*rhs)?].clone();
                    regs[reg_index(*dst)?] = match op {
                        BinOp::Add => SymBv::add(lhs, rhs),
                        BinOp::Sub => SymBv::sub(lhs, rhs),
                        BinOp::And => SymBv::and(lhs, rhs),
                        BinOp::Or => SymBv::or(lhs, rhs),
                        BinOp::Xor => SymBv::xor(lhs, rhs),
                    };
                }
                Instr::Load { dst, addr, size } => {
                    let address = address_of(&regs, addr)?;
                    if config.nacl {
                        constraints.push(address.ule(&SymBv::constant(u64::from(u32::MAX), 64)));
                    }
                    let (value, _fault) = memory.read(address, *size);
                    regs[reg_index(*dst)?] = value.zero_extend(64);
                }
                Instr::Store { src, addr, size } => {
                    let address = address_of(&regs, addr)?;
                    if config.nacl {
                        constraints.push(address.ule(&SymBv::constant(u64::from(u32::MAX), 64)));
                    }
                    let value = regs[reg_index(*src)?].clone().extract(size * 8 - 1, 0);
                    memory.write(address, value, *size);
                }
            }
        }

        // Branch condition imposed by where the path goes next.
        if let Some(cond) = block.cond {
            let taken = match is_jump(cfg, path, step) {
                JumpType::Jump => Some(true),
                JumpType::FallThrough => Some(false),
                JumpType::None => None,
            };
            if let Some(taken) = taken {
                let zero = SymBv::constant(0, 64);
                let is_zero = regs[reg_index(cond)?].equals(&zero);
                constraints.push(if taken { SymBool::not(is_zero) } else { is_zero });
            }
        }
    }

    let mut final_regs = Vec::with_capacity(NUM_REGS);
    for (i, value) in regs.iter().enumerate() {
        let bound = SymBv::var(format!("{prefix}_rf{i}"), 64);
        constraints.push(bound.equals(value));
        final_regs.push(bound);
    }
    let mut final_ghosts = BTreeMap::new();
    for (id, value) in &ghosts {
        let bound = SymBv::var(format!("{prefix}_gf{id}"), 64);
        constraints.push(bound.equals(value));
        final_ghosts.insert(*id, bound);
    }

    Ok(Execution {
        initial: SymState {
            regs: initial_regs,
            ghosts: initial_ghosts,
        },
        finals: SymState {
            regs: final_regs,
            ghosts: final_ghosts,
        },
        constraints,
    })
}
