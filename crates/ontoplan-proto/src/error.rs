//! Protocol error types.

use crate::plan::PlanStatus;
use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A plan status change that the lifecycle does not allow.
    #[error("invalid plan status transition: {from} -> {to}")]
    InvalidTransition { from: PlanStatus, to: PlanStatus },
}
