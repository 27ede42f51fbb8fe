use connectors::error::SourceError;
use engine_core::error::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaskError {
    #[error("Unknown masking type '{0}'")]
    UnknownType(String),

    #[error("Missing parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Unknown library '{0}'")]
    UnknownLibrary(String),

    #[error("Library '{0}' is empty")]
    EmptyLibrary(String),

    #[error("Field '{0}' has no active picklist values")]
    NoPicklistValues(String),
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("No schema description for field '{field}' of object '{object}'")]
    MissingField { object: String, field: String },

    #[error("Failed to mask field '{field}' of object '{object}': {source}")]
    Mask {
        object: String,
        field: String,
        #[source]
        source: MaskError,
    },
}

/// Failure of one object step. Everything except invariant violations is
/// absorbed at the step boundary.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Export job '{job_id}' failed: {message}")]
    ExportFailed { job_id: String, message: String },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("No schema description returned for object '{0}'")]
    NotDescribed(String),
}

impl StepError {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, StepError::State(e) if e.is_invariant_violation())
    }
}

/// Configuration problems found while turning rules into steps.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("Unknown rule type '{rule_type}' for object '{object}'")]
    UnknownRuleType { object: String, rule_type: String },

    #[error("Unknown masking type '{mask_type}' for field '{field}' of object '{object}'")]
    UnknownMaskType {
        object: String,
        field: String,
        mask_type: String,
    },

    #[error("Object '{object}' references unknown library '{library}'")]
    UnknownLibrary { object: String, library: String },

    #[error("Failed to describe objects: {0}")]
    Describe(#[source] SourceError),
}
