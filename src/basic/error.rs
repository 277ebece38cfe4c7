use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::options::SolverType;

/// Failure raised at the sparse linear-solve boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinearSolveError {
    #[error("factorization failed: {0}")]
    Factorization(&'static str),
    #[error("solution contains non-finite values")]
    NonFinite,
}

/// Errors produced while solving a power flow.
///
/// Only [`PowerFlowError::Dimension`] escapes [`crate::prelude::run_power_flow`];
/// every other variant is recorded on the island it happened in and the
/// island is reported with `converged = false`.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PowerFlowError {
    #[error("singular or ill-conditioned Jacobian at iteration {iteration}: {reason}")]
    SingularJacobian { iteration: usize, reason: String },
    #[error("island has no slack bus")]
    NoSlack,
    #[error("voltage magnitude diverged at iteration {iteration}")]
    NumericalOverflow { iteration: usize },
    #[error("Jacobian is not square ({rows}x{cols})")]
    NonSquareJacobian { rows: usize, cols: usize },
    #[error("{0:?} is not supported as a power flow method")]
    UnsupportedSolver(SolverType),
    #[error("malformed circuit: {0}")]
    Dimension(String),
    #[error("solve cancelled")]
    Cancelled,
}

impl PowerFlowError {
    pub(crate) fn singular(iteration: usize, err: LinearSolveError) -> Self {
        PowerFlowError::SingularJacobian {
            iteration,
            reason: err.to_string(),
        }
    }
}
