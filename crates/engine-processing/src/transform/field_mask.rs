use super::{
    Transform,
    masking::{MaskContext, MaskRegistry},
};
use crate::error::TransformError;
use model::{
    describe::ObjectDescribe,
    manifest::Libraries,
    records::record::{ID_FIELD, Record},
    rules::FieldRule,
};
use std::{collections::BTreeMap, sync::Arc};

/// Rewrites the ruled fields of a record. The output holds the identifier
/// and the masked fields only.
pub struct FieldMaskTransform {
    object: String,
    rules: BTreeMap<String, FieldRule>,
    describe: Arc<ObjectDescribe>,
    registry: Arc<MaskRegistry>,
    libraries: Arc<Libraries>,
}

impl FieldMaskTransform {
    pub fn new(
        object: &str,
        rules: BTreeMap<String, FieldRule>,
        describe: Arc<ObjectDescribe>,
        registry: Arc<MaskRegistry>,
        libraries: Arc<Libraries>,
    ) -> Self {
        FieldMaskTransform {
            object: object.to_string(),
            rules,
            describe,
            registry,
            libraries,
        }
    }
}

impl Transform for FieldMaskTransform {
    fn apply(&self, record: &Record) -> Result<Record, TransformError> {
        let mut out = Record::new();
        out.set(ID_FIELD, record.value(ID_FIELD).clone());

        for (name, rule) in &self.rules {
            let field = self
                .describe
                .field(name)
                .ok_or_else(|| TransformError::MissingField {
                    object: self.object.clone(),
                    field: name.clone(),
                })?;

            let masked = self
                .registry
                .apply(&MaskContext {
                    rule,
                    field,
                    original: record.value(&field.name),
                    libraries: &self.libraries,
                })
                .map_err(|source| TransformError::Mask {
                    object: self.object.clone(),
                    field: name.clone(),
                    source,
                })?;
            out.set(&field.name, masked);
        }

        Ok(out)
    }
}
