use connectors::error::SourceError;
use engine_core::error::StateError;
use engine_processing::error::{FactoryError, StepError};
use thiserror::Error;

/// Top-level errors of a job run and of the job store.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid job manifest: {0}")]
    Manifest(#[source] serde_json::Error),

    #[error("Invalid job state file {path}: {source}")]
    StateFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Job not found: {0}")]
    NotFound(String),

    /// The manifest names no object.
    #[error("Job manifest has no object rules")]
    NoObjects,

    #[error("Failed to launch worker for job {job_id}: {source}")]
    Launch {
        job_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl JobError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        JobError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
