use engine_config::error::ConfigError;
use engine_runtime::error::JobError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse the job manifest: {0}")]
    ManifestParse(#[source] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Failed to wait for the worker of job {job_id}: {source}")]
    Wait {
        job_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker for job {job_id} exited with {status}")]
    Worker { job_id: String, status: String },
}

impl CliError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) | CliError::ManifestParse(_) => 2,
            _ => 1,
        }
    }
}
