use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown rule type '{0}'")]
pub struct UnknownRuleType(pub String);

/// Processing applied to every record of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Masking,
    Delete,
}

impl FromStr for RuleKind {
    type Err = UnknownRuleType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MASKING" => Ok(RuleKind::Masking),
            "DELETE" => Ok(RuleKind::Delete),
            other => Err(UnknownRuleType(other.to_string())),
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Masking => f.write_str("MASKING"),
            RuleKind::Delete => f.write_str("DELETE"),
        }
    }
}

/// Per-object processing configuration from the job manifest.
///
/// The `type` stays textual here so that an unsupported value surfaces when
/// steps are built rather than when the manifest is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRule {
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    // The disable_* flags are carried through for the external collaborator
    // that toggles org automation around a job; the engine does not act on them.
    #[serde(default)]
    pub disable_triggers: bool,
    #[serde(default)]
    pub disable_flows: bool,
    #[serde(default)]
    pub disable_validation_rules: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_rules: BTreeMap<String, FieldRule>,
}

impl ObjectRule {
    pub fn kind(&self) -> Result<RuleKind, UnknownRuleType> {
        self.rule_type.parse()
    }

    /// Filter clause with surrounding whitespace removed, `None` when blank.
    pub fn filter(&self) -> Option<&str> {
        self.where_clause
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
    }

    /// Names of the library lookup tables referenced by `LIBRARY` field rules.
    pub fn referenced_libraries(&self) -> Vec<&str> {
        self.field_rules
            .values()
            .filter(|r| r.mask_type == "LIBRARY")
            .filter_map(|r| r.value.as_ref().and_then(Value::as_str))
            .collect()
    }
}

/// Masking configuration for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    #[serde(rename = "type")]
    pub mask_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<Value>,
}

impl FieldRule {
    pub fn new(mask_type: &str) -> Self {
        FieldRule {
            mask_type: mask_type.to_string(),
            value: None,
            min_value: None,
            max_value: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_bounds(mut self, min: Value, max: Value) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }
}
