//! Error taxonomy
//!
//! One aggregate error for the orchestration boundary. Sub-system errors
//! stay typed within their modules and convert upward via `From`.

use thiserror::Error;

use crate::executor::ExecError;
use crate::resolver::ResolutionError;
use crate::snapshot::PatchError;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Structural validation rejected the raw plan before resolution.
    #[error("Plan validation failed: {0}")]
    InvalidPlan(String),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Execution(#[from] ExecError),

    #[error("Session error: {0}")]
    Session(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
