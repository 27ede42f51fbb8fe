use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    /// A logger was used before `init`.
    #[error("{0} used before initialization")]
    NotInitialized(&'static str),

    #[error("Object not found in statistics: {0}")]
    ObjectNotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl StateError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Internal consistency failures that must not be absorbed by a step.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            StateError::NotInitialized(_) | StateError::ObjectNotFound(_)
        )
    }
}
