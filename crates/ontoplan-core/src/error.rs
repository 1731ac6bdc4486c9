//! Core error types.

use thiserror::Error;

/// Errors reported by a graph query port.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The store could not be reached.
    #[error("graph store unavailable: {0}")]
    Unavailable(String),

    /// The query did not finish in time.
    #[error("query timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The store rejected the query.
    #[error("query rejected: {0}")]
    Rejected(String),

    /// The store cannot evaluate this kind of query.
    #[error("unsupported query: {0}")]
    Unsupported(String),
}

impl QueryError {
    /// Whether retrying the same query may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::Unavailable(_) | QueryError::Timeout(_))
    }
}

/// Errors returned by the migration planner.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The caller passed arguments the planner cannot work with.
    #[error("invalid planner input: {0}")]
    InvalidInput(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Proto(#[from] ontoplan_proto::Error),
}

/// Top-level errors for configuration loading and embedding applications.
#[derive(Debug, Error)]
pub enum Error {
    /// File access failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON could not be parsed or produced.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Graph query failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Planning failed.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}
