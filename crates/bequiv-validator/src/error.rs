use bequiv_cfg::BlockId;
use bequiv_smt::SolverError;
use bequiv_sym::MemoryError;
use thiserror::Error;

/// Errors surfaced while discharging an obligation. These never cross the
/// callback boundary; the checker converts them into error results.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("path references unknown block {0}")]
    UnknownBlock(BlockId),

    #[error("register index {0} out of range")]
    BadRegister(u8),
}
