//! Error taxonomy for the recording domain.
//!
//! Every variant is recoverable at the session level: the controller
//! reports it and returns to Idle once the caller acknowledges.

use super::phase::Phase;
use super::postprocess::Stage;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Bad request, rejected before anything was spawned.
    #[error("Invalid recording request: {0}")]
    Validation(String),

    #[error("A recording session is already active")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    /// The session exists but has not reached Done/Failed yet.
    #[error("Session is still {0} — wait for it to finish")]
    StillActive(Phase),

    #[error("Failed to launch {tool}: {reason}")]
    Launch { tool: String, reason: String },

    /// The encoder ran but exited abnormally. Partial output stays on disk.
    #[error("{tool} exited abnormally ({status})")]
    Encode { tool: String, status: String },

    #[error("Post-processing stage '{stage}' failed: {reason}")]
    PostProcess { stage: Stage, reason: String },

    #[error(transparent)]
    Path(#[from] PathError),
}

impl SessionError {
    /// The post-processing stage that failed, if this is a pipeline error.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SessionError::PostProcess { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("Cannot create output directory {dir}: {reason}")]
    CreateDir { dir: PathBuf, reason: String },

    #[error("Output directory {dir} is not writable: {reason}")]
    NotWritable { dir: PathBuf, reason: String },

    #[error("No free output name left for '{base}' in {dir}")]
    Exhausted { dir: PathBuf, base: String },
}
