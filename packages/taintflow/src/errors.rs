//! Error taxonomy.
//!
//! Only cancellation and configuration problems abort a scan. Everything
//! function-local — malformed IR, a fixpoint that will not settle — is
//! recorded as a `FunctionFailure`, degrades that one function to an
//! unknown summary, and lets the rest of the program be analyzed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::ir::FunctionId;

/// Scan-aborting errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("scan cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Function-local failure kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The supplied IR violates a structural precondition.
    MalformedIr(String),
    /// The dataflow fixpoint did not stabilize within its iteration
    /// budget. The partial result is discarded, never trusted.
    NonConvergence { rounds: usize, budget: usize },
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::MalformedIr(msg) => write!(f, "malformed IR: {}", msg),
            FailureKind::NonConvergence { rounds, budget } => {
                write!(
                    f,
                    "fixpoint did not converge after {} rounds (budget: {})",
                    rounds, budget
                )
            }
        }
    }
}

/// A function whose analysis was degraded to an unknown summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFailure {
    pub function: FunctionId,
    pub kind: FailureKind,
}
