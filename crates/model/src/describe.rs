use serde::{Deserialize, Serialize};

/// Field types the masking functions care about. Anything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Id,
    Reference,
    Text,
    Email,
    Phone,
    Url,
    Picklist,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Other,
}

impl FieldKind {
    pub fn from_type(field_type: &str) -> Self {
        match field_type {
            "id" => FieldKind::Id,
            "reference" => FieldKind::Reference,
            "string" | "textarea" | "encryptedstring" | "combobox" => FieldKind::Text,
            "email" => FieldKind::Email,
            "phone" => FieldKind::Phone,
            "url" => FieldKind::Url,
            "picklist" | "multipicklist" => FieldKind::Picklist,
            "int" | "long" => FieldKind::Integer,
            "double" | "currency" | "percent" => FieldKind::Decimal,
            "boolean" => FieldKind::Boolean,
            "date" => FieldKind::Date,
            "datetime" => FieldKind::DateTime,
            _ => FieldKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PicklistValue {
    pub value: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Schema description of one field, as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescribe {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub length: u32,
    #[serde(default)]
    pub precision: u32,
    #[serde(default)]
    pub scale: u32,
    #[serde(default)]
    pub nillable: bool,
    #[serde(default)]
    pub updateable: bool,
    #[serde(default)]
    pub picklist_values: Vec<PicklistValue>,
}

impl FieldDescribe {
    pub fn new(name: &str, field_type: &str) -> Self {
        FieldDescribe {
            name: name.to_string(),
            field_type: field_type.to_string(),
            length: 0,
            precision: 0,
            scale: 0,
            nillable: true,
            updateable: true,
            picklist_values: Vec::new(),
        }
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    pub fn with_scale(mut self, precision: u32, scale: u32) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub fn with_picklist(mut self, values: &[&str]) -> Self {
        self.picklist_values = values
            .iter()
            .map(|v| PicklistValue {
                value: v.to_string(),
                active: true,
            })
            .collect();
        self
    }

    pub fn kind(&self) -> FieldKind {
        FieldKind::from_type(&self.field_type)
    }

    /// Maximum text length, `None` when the source reports no limit.
    pub fn max_length(&self) -> Option<usize> {
        (self.length > 0).then_some(self.length as usize)
    }
}

/// Schema metadata for one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescribe {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDescribe>,
}

impl ObjectDescribe {
    pub fn new(name: &str, fields: Vec<FieldDescribe>) -> Self {
        ObjectDescribe {
            name: name.to_string(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescribe> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }
}
