use thiserror::Error;

use crate::network::VariableKey;

/// Failures raised while assembling or solving an equation network.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An equation or connection references a variable that nothing declares.
    #[error("unknown variable: {0}")]
    UnknownVariable(VariableKey),

    /// A connection references a component that was never added.
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// Two components share the same name.
    #[error("duplicate component: {0}")]
    DuplicateComponent(String),

    /// Matrix and right-hand side shapes disagree.
    #[error("dimension mismatch: {context} (expected {expected}, got {actual})")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Exact solve requested on a numerically singular matrix.
    #[error("singular system: condition number {condition:e} exceeds threshold {threshold:e}")]
    SingularSystem { condition: f64, threshold: f64 },

    /// Step sizes must be positive and finite.
    #[error("invalid time step: {0}")]
    InvalidTimeStep(f64),

    /// A matrix decomposition could not be completed.
    #[error("decomposition failed: {0}")]
    Decomposition(String),

    /// The solver produced NaN or infinite entries.
    #[error("non-finite solution at variable index {index}")]
    NonFiniteSolution { index: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
