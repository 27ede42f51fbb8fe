use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure talking to the remote source.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with an error payload.
    #[error("API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// A bulk job ended in a state other than complete.
    #[error("Bulk job '{job_id}' ended in state {state}: {message}")]
    BulkJob {
        job_id: String,
        state: String,
        message: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown query locator: {0}")]
    UnknownLocator(String),

    /// Describe metadata was requested for an object the source does not know.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Source error: {0}")]
    Generic(String),
}

impl SourceError {
    /// Whether the failure is worth retrying: transport errors, throttling
    /// and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SourceError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> SourceError {
        SourceError::Api {
            status,
            code: "CODE".into(),
            message: "message".into(),
        }
    }

    #[test]
    fn classifies_api_errors() {
        assert!(api(503).is_transient());
        assert!(api(429).is_transient());
        assert!(!api(400).is_transient());
        assert!(!SourceError::Generic("boom".into()).is_transient());
    }
}
