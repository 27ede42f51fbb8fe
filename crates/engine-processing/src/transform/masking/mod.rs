//! Masking functions keyed by the `type` of a field rule.

use crate::error::MaskError;
use model::{describe::FieldDescribe, manifest::Libraries, rules::FieldRule};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

pub mod functions;

/// Inputs of one masking call.
pub struct MaskContext<'a> {
    pub rule: &'a FieldRule,
    pub field: &'a FieldDescribe,
    pub original: &'a Value,
    pub libraries: &'a Libraries,
}

pub trait MaskingFunction: Send + Sync {
    fn mask(&self, ctx: &MaskContext<'_>) -> Result<Value, MaskError>;
}

impl<F> MaskingFunction for F
where
    F: Fn(&MaskContext<'_>) -> Result<Value, MaskError> + Send + Sync,
{
    fn mask(&self, ctx: &MaskContext<'_>) -> Result<Value, MaskError> {
        self(ctx)
    }
}

#[derive(Clone, Default)]
pub struct MaskRegistry {
    functions: HashMap<String, Arc<dyn MaskingFunction>>,
}

impl MaskRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in function.
    pub fn with_defaults() -> Self {
        use functions::*;

        Self::empty()
            .register("FIXED", fixed)
            .register("BLANK", blank)
            .register("RANDOM_NUMBER", random_number)
            .register("RANDOM_STRING", random_string)
            .register("RANDOM_EMAIL", random_email)
            .register("RANDOM_PHONE", random_phone)
            .register("RANDOM_DATE", random_date)
            .register("LIBRARY", library)
            .register("PICKLIST", picklist)
            .register("HASH", hash)
    }

    pub fn register<F: MaskingFunction + 'static>(mut self, name: &str, function: F) -> Self {
        self.functions.insert(name.to_string(), Arc::new(function));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Masks one value. Text results never exceed the field length.
    pub fn apply(&self, ctx: &MaskContext<'_>) -> Result<Value, MaskError> {
        let function = self
            .functions
            .get(&ctx.rule.mask_type)
            .ok_or_else(|| MaskError::UnknownType(ctx.rule.mask_type.clone()))?;

        let masked = function.mask(ctx)?;
        Ok(match (masked, ctx.field.max_length()) {
            (Value::String(s), Some(max)) => Value::String(truncate(s, max)),
            (other, _) => other,
        })
    }
}

fn truncate(mut s: String, max_chars: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(max_chars) {
        s.truncate(idx);
    }
    s
}
