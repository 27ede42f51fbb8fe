use crate::error::TransformError;
use model::records::record::Record;
use std::sync::Arc;

pub mod field_mask;
pub mod masking;

pub trait Transform: Send + Sync {
    fn apply(&self, record: &Record) -> Result<Record, TransformError>;
}

/// Ordered chain of transforms; the first failure stops the chain.
#[derive(Clone, Default)]
pub struct TransformPipeline {
    transforms: Vec<Arc<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transform<T: Transform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn apply(&self, record: Record) -> Result<Record, TransformError> {
        self.transforms
            .iter()
            .try_fold(record, |acc, transform| transform.apply(&acc))
    }
}
