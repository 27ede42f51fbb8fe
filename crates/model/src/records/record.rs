use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the identifier field every record carries.
pub const ID_FIELD: &str = "Id";

/// A single source record: field name to JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: &str) -> Self {
        let mut record = Self::new();
        record.set(ID_FIELD, Value::String(id.to_string()));
        record
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Record { fields }
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Value of `field`, `Null` when the field is absent.
    pub fn value(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Drops the `attributes` envelope the REST API attaches to each record.
    pub fn strip_attributes(mut self) -> Self {
        self.fields.remove("attributes");
        self
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Record::from_map(fields)
    }
}
