use crate::error::SourceError;
use async_trait::async_trait;
use model::{
    describe::ObjectDescribe,
    records::record::{ID_FIELD, Record},
};
use std::{collections::HashMap, fmt};

/// Structured description of a read against one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub object: String,
    pub fields: Vec<String>,
    pub filter: Option<String>,
    /// Only return records whose identifier sorts after this one.
    pub after_id: Option<String>,
    pub limit: Option<usize>,
}

impl QuerySpec {
    pub fn new(object: &str, fields: &[String]) -> Self {
        let mut projection = vec![ID_FIELD.to_string()];
        for field in fields {
            if !projection.iter().any(|f| f.eq_ignore_ascii_case(field)) {
                projection.push(field.clone());
            }
        }

        QuerySpec {
            object: object.to_string(),
            fields: projection,
            filter: None,
            after_id: None,
            limit: None,
        }
    }

    pub fn with_filter(mut self, filter: Option<&str>) -> Self {
        self.filter = filter.map(str::to_string);
        self
    }

    pub fn after(mut self, id: Option<String>) -> Self {
        self.after_id = id;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Keyset reads (`after_id` / `limit`) need a stable order on the identifier.
    pub fn is_ordered(&self) -> bool {
        self.after_id.is_some() || self.limit.is_some()
    }

    pub fn to_soql(&self) -> String {
        let mut soql = format!("SELECT {} FROM {}", self.fields.join(", "), self.object);

        let mut conditions = Vec::new();
        if let Some(filter) = &self.filter {
            conditions.push(format!("({filter})"));
        }
        if let Some(after) = &self.after_id {
            conditions.push(format!("{ID_FIELD} > '{}'", after.replace('\'', "\\'")));
        }
        if !conditions.is_empty() {
            soql.push_str(" WHERE ");
            soql.push_str(&conditions.join(" AND "));
        }

        if self.is_ordered() {
            soql.push_str(&format!(" ORDER BY {ID_FIELD}"));
        }
        if let Some(limit) = self.limit {
            soql.push_str(&format!(" LIMIT {limit}"));
        }
        soql
    }
}

/// One page of a paginated read.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub records: Vec<Record>,
    pub done: bool,
    /// Opaque token used to fetch the next page when `done` is false.
    pub next_locator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportState {
    InProgress,
    Complete,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOperation {
    Update,
    Delete,
}

impl SubmitOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitOperation::Update => "update",
            SubmitOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for SubmitOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bulk write of `records` against `object`, serialized with `columns`.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub object: String,
    pub operation: SubmitOperation,
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

/// Outcome of one submitted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordResult {
    pub id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

impl RecordResult {
    pub fn ok(id: &str) -> Self {
        RecordResult {
            id: Some(id.to_string()),
            success: true,
            error: None,
        }
    }

    pub fn failed(id: Option<&str>, error: &str) -> Self {
        RecordResult {
            id: id.map(str::to_string),
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// The remote tabular source records are read from and written back to.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Schema metadata for all `objects`, fetched in as few calls as possible.
    async fn describe(
        &self,
        objects: &[String],
    ) -> Result<HashMap<String, ObjectDescribe>, SourceError>;

    /// Estimated number of records, `None` when the source cannot tell.
    async fn count(&self, object: &str, filter: Option<&str>) -> Result<Option<u64>, SourceError>;

    async fn query(&self, spec: &QuerySpec, page_size: usize) -> Result<QueryPage, SourceError>;

    async fn query_more(&self, locator: &str) -> Result<QueryPage, SourceError>;

    /// Submits an asynchronous export and returns its job identifier.
    async fn start_export(&self, spec: &QuerySpec) -> Result<String, SourceError>;

    async fn export_status(&self, job_id: &str) -> Result<ExportState, SourceError>;

    async fn export_results(
        &self,
        job_id: &str,
        locator: Option<&str>,
        max_records: usize,
    ) -> Result<QueryPage, SourceError>;

    async fn submit(&self, request: SubmitRequest) -> Result<Vec<RecordResult>, SourceError>;
}
