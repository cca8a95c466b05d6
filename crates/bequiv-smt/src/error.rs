use thiserror::Error;

/// Errors from SMT encoding or solver interaction.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver process error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreadable solver output: {0}")]
    Parse(String),

    #[error("formula could not be encoded: {0}")]
    Encoding(String),
}

pub type SolverResult<T> = Result<T, SolverError>;
