use thiserror::Error;

use crate::model::params::ParameterVector;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("degenerate data: {0}")]
    DataDegeneracy(String),

    #[error("optimizer did not converge after {iterations} iterations (objective {objective})")]
    NonConvergence {
        iterations: usize,
        objective: f64,
        best: ParameterVector,
    },

    #[error("infeasible constraints: {0}")]
    InfeasibleConstraints(String),

    #[error("unbounded program: {0}")]
    Unbounded(String),

    #[error("non-finite value {value} on path {path} at step {step}")]
    NumericInstability { path: usize, step: usize, value: f64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// `true` for failures a decision loop may read as "no trade".
    pub fn is_infeasible(&self) -> bool {
        matches!(self, Self::InfeasibleConstraints(_))
    }
}
