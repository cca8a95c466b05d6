//! Control flow graphs over a small register-machine instruction set.
//!
//! A [`Cfg`] is a set of basic blocks with at most two outgoing edges
//! each: an unconditional fall-through and an optional conditional jump
//! taken when the block's condition register is nonzero. Obligations are
//! checked along [`CfgPath`]s, concrete block sequences through the graph.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine register index. The machine has [`NUM_REGS`] general-purpose
/// 64-bit registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reg(pub u8);

pub const NUM_REGS: usize = 16;

impl Reg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A base-plus-displacement memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemRef {
    /// Base register; `None` means an absolute address.
    pub base: Option<Reg>,
    pub disp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instr {
    /// Load an immediate into a register.
    Const { dst: Reg, value: u64 },
    Mov { dst: Reg, src: Reg },
    Binary { op: BinOp, dst: Reg, lhs: Reg, rhs: Reg },
    /// Load `size` bytes, zero-extended into `dst`.
    Load { dst: Reg, addr: MemRef, size: u32 },
    /// Store the low `size` bytes of `src`.
    Store { src: Reg, addr: MemRef, size: u32 },
}

pub type BlockId = u64;

/// A basic block: straight-line instructions plus an optional condition
/// register deciding between the jump and fall-through successors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub instrs: Vec<Instr>,
    /// Jump is taken when this register is nonzero. `None` for blocks with
    /// a single successor.
    pub cond: Option<Reg>,
}

/// A concrete sequence of block ids through a [`Cfg`].
pub type CfgPath = Vec<BlockId>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CfgError {
    #[error("duplicate block id {0}")]
    DuplicateBlock(BlockId),

    #[error("entry block {0} does not exist")]
    MissingEntry(BlockId),

    #[error("edge endpoint {0} does not exist")]
    MissingBlock(BlockId),

    #[error("block {0} has a jump edge but no condition register")]
    UnconditionalJump(BlockId),

    #[error("block {0} has a {1}-byte memory access, expected 1 to 8")]
    BadAccessSize(BlockId, u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cfg {
    blocks: FxHashMap<BlockId, Block>,
    entry: BlockId,
    fallthrough: FxHashMap<BlockId, BlockId>,
    jump: FxHashMap<BlockId, BlockId>,
}

impl Cfg {
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn fallthrough_target(&self, id: BlockId) -> Option<BlockId> {
        self.fallthrough.get(&id).copied()
    }

    pub fn jump_target(&self, id: BlockId) -> Option<BlockId> {
        self.jump.get(&id).copied()
    }

    /// Block ids in ascending order.
    pub fn block_ids(&self) -> Vec<BlockId> {
        let mut ids: Vec<BlockId> = self.blocks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether `path` starts at the entry and follows real edges.
    pub fn admits_path(&self, path: &[BlockId]) -> bool {
        let mut steps = path.iter();
        match steps.next() {
            Some(&first) if first == self.entry => {}
            Some(_) => return false,
            None => return true,
        }
        path.windows(2).all(|pair| {
            self.fallthrough_target(pair[0]) == Some(pair[1])
                || self.jump_target(pair[0]) == Some(pair[1])
        }) && path.iter().all(|id| self.blocks.contains_key(id))
    }
}

/// Builder validating block and edge consistency.
#[derive(Debug, Default)]
pub struct CfgBuilder {
    blocks: Vec<Block>,
    entry: Option<BlockId>,
    fallthrough: Vec<(BlockId, BlockId)>,
    jump: Vec<(BlockId, BlockId)>,
}

impl CfgBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, id: BlockId) -> Self {
        self.entry = Some(id);
        self
    }

    pub fn block(mut self, block: Block) -> Self {
        // First block becomes the entry unless one is set explicitly.
        if self.entry.is_none() {
            self.entry = Some(block.id);
        }
        self.blocks.push(block);
        self
    }

    pub fn fallthrough(mut self, from: BlockId, to: BlockId) -> Self {
        self.fallthrough.push((from, to));
        self
    }

    pub fn jump(mut self, from: BlockId, to: BlockId) -> Self {
        self.jump.push((from, to));
        self
    }

    pub fn build(self) -> Result<Cfg, CfgError> {
        let mut blocks = FxHashMap::default();
        for block in self.blocks {
            let id = block.id;
            for instr in &block.instrs {
                let size = match instr {
                    Instr::Load { size, .. } | Instr::Store { size, .. } => *size,
                    _ => continue,
                };
                if !(1..=8).contains(&size) {
                    return Err(CfgError::BadAccessSize(id, size));
                }
            }
            if blocks.insert(id, block).is_some() {
                return Err(CfgError::DuplicateBlock(id));
            }
        }
        let entry = self.entry.unwrap_or(0);
        if !blocks.contains_key(&entry) {
            return Err(CfgError::MissingEntry(entry));
        }
        let mut fallthrough = FxHashMap::default();
        for (from, to) in self.fallthrough {
            for id in [from, to] {
                if !blocks.contains_key(&id) {
                    return Err(CfgError::MissingBlock(id));
                }
            }
            fallthrough.insert(from, to);
        }
        let mut jump = FxHashMap::default();
        for (from, to) in self.jump {
            for id in [from, to] {
                if !blocks.contains_key(&id) {
                    return Err(CfgError::MissingBlock(id));
                }
            }
            if blocks[&from].cond.is_none() {
                return Err(CfgError::UnconditionalJump(from));
            }
            jump.insert(from, to);
        }
        Ok(Cfg {
            blocks,
            entry,
            fallthrough,
            jump,
        })
    }
}
