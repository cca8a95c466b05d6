//! Classification of path steps as jumps.

use bequiv_cfg::{BlockId, Cfg};
use serde::{Deserialize, Serialize};

/// How control moved from one block of a path to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JumpType {
    /// The block has one successor; no branch was decided.
    None,
    FallThrough,
    Jump,
}

/// Classify the step out of `path[index]`.
///
/// The last block of a path decides nothing. A block without a jump edge
/// imposes no branch condition even if the path continues through it.
pub fn is_jump(cfg: &Cfg, path: &[BlockId], index: usize) -> JumpType {
    let (Some(&block), Some(&next)) = (path.get(index), path.get(index + 1)) else {
        return JumpType::None;
    };
    match cfg.jump_target(block) {
        None => JumpType::None,
        Some(target) if target == next => JumpType::Jump,
        Some(_) => JumpType::FallThrough,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bequiv_cfg::{Block, CfgBuilder, Reg};

    fn diamond() -> Cfg {
        let block = |id, cond| Block {
            id,
            instrs: Vec::new(),
            cond,
        };
        CfgBuilder::new()
            .block(block(0, Some(Reg(1))))
            .block(block(1, None))
            .block(block(2, None))
            .fallthrough(0, 1)
            .jump(0, 2)
            .fallthrough(1, 2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_jump_taken() {
        let cfg = diamond();
        assert_eq!(is_jump(&cfg, &[0, 2], 0), JumpType::Jump);
    }

    #[test]
    fn test_fall_through() {
        let cfg = diamond();
        assert_eq!(is_jump(&cfg, &[0, 1, 2], 0), JumpType::FallThrough);
    }

    #[test]
    fn test_single_successor_is_none() {
        let cfg = diamond();
        assert_eq!(is_jump(&cfg, &[0, 1, 2], 1), JumpType::None);
    }

    #[test]
    fn test_last_block_is_none() {
        let cfg = diamond();
        assert_eq!(is_jump(&cfg, &[0, 2], 1), JumpType::None);
        assert_eq!(is_jump(&cfg, &[], 0), JumpType::None);
    }
}
