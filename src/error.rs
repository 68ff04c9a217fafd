//! Error taxonomy shared by the core operations.

use thiserror::Error;

/// Failures the core can surface to callers.
///
/// Read paths that find nothing return `Ok(None)` instead of `NotFound`;
/// the variant is reserved for operations that require the entity to
/// pre-exist (temporal comparison, chat over an unknown conversation).
#[derive(Debug, Error)]
pub enum HomelensError {
    /// The inference/embedding/chat collaborator failed or returned
    /// malformed output. Propagated to the job result, never retried here.
    #[error("inference collaborator failed: {0}")]
    Inference(#[source] anyhow::Error),

    /// A store write failed. The whole ingestion attempt for that image
    /// fails; no partial commit is left behind.
    #[error("persistence failed: {0}")]
    Persistence(#[source] anyhow::Error),

    /// Query vector dimension does not match the indexed column.
    /// Rejected before any store access.
    #[error("query vector has dimension {got}, expected {expected}")]
    InvalidDimension { expected: usize, got: usize },

    /// A required entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The caller violated an operation precondition.
    #[error("precondition failed: {0}")]
    Precondition(&'static str),
}

pub type Result<T> = std::result::Result<T, HomelensError>;

impl HomelensError {
    /// Short tag for job results and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            HomelensError::Inference(_) => "inference",
            HomelensError::Persistence(_) => "persistence",
            HomelensError::InvalidDimension { .. } => "invalid_dimension",
            HomelensError::NotFound(_) => "not_found",
            HomelensError::Precondition(_) => "precondition",
        }
    }
}
