//! In-process [`DataSource`] backed by plain vectors of records.
//!
//! Reads ignore the textual filter; keyset reads (`after_id`, `limit`) are
//! honoured. Writes are applied to the stored records so callers can observe
//! the outcome of a job.

use crate::{
    error::SourceError,
    source::{
        DataSource, ExportState, QueryPage, QuerySpec, RecordResult, SubmitOperation,
        SubmitRequest,
    },
};
use async_trait::async_trait;
use model::{describe::ObjectDescribe, records::record::Record};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

/// Number of calls made against the source, per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStats {
    pub describe: usize,
    pub count: usize,
    pub query: usize,
    pub query_more: usize,
    pub exports: usize,
    pub export_polls: usize,
    pub submits: usize,
    pub submitted_records: usize,
    /// Largest number of submissions running at the same time.
    pub max_concurrent_submits: usize,
}

struct Export {
    records: Vec<Record>,
    polls_left: usize,
}

#[derive(Default)]
struct MemoryState {
    objects: HashMap<String, Vec<Record>>,
    describes: HashMap<String, ObjectDescribe>,
    counts: HashMap<String, Option<u64>>,
    rejections: HashMap<String, String>,
    query_failures: HashMap<String, String>,
    submit_failures: HashMap<String, String>,
    empty_pages: usize,
    export_polls: usize,
    cursors: HashMap<String, (Vec<Record>, usize)>,
    exports: HashMap<String, Export>,
    next_handle: u64,
    active_submits: usize,
    stats: CallStats,
}

impl MemoryState {
    fn handle(&mut self, prefix: &str) -> String {
        self.next_handle += 1;
        format!("{prefix}-{}", self.next_handle)
    }

    fn select(&self, spec: &QuerySpec) -> Result<Vec<Record>, SourceError> {
        if let Some(message) = self.query_failures.get(&spec.object) {
            return Err(SourceError::Generic(message.clone()));
        }

        let mut records = self.objects.get(&spec.object).cloned().unwrap_or_default();
        if spec.is_ordered() {
            records.sort_by(|a, b| a.id().cmp(&b.id()));
        }
        if let Some(after) = &spec.after_id {
            records.retain(|r| r.id().is_some_and(|id| id > after.as_str()));
        }
        if let Some(limit) = spec.limit {
            records.truncate(limit);
        }

        Ok(records
            .into_iter()
            .map(|r| project(&r, &spec.fields))
            .collect())
    }

    fn page(&mut self, mut records: Vec<Record>, page_size: usize) -> QueryPage {
        if self.empty_pages > 0 {
            self.empty_pages -= 1;
            let locator = self.handle("query");
            self.cursors.insert(locator.clone(), (records, page_size));
            return QueryPage {
                records: Vec::new(),
                done: false,
                next_locator: Some(locator),
            };
        }

        let rest = records.split_off(page_size.min(records.len()));
        if rest.is_empty() {
            return QueryPage {
                records,
                done: true,
                next_locator: None,
            };
        }

        let locator = self.handle("query");
        self.cursors.insert(locator.clone(), (rest, page_size));
        QueryPage {
            records,
            done: false,
            next_locator: Some(locator),
        }
    }

    fn apply(&mut self, request: &SubmitRequest, record: &Record) -> RecordResult {
        let Some(id) = record.id() else {
            return RecordResult::failed(None, "MISSING_ARGUMENT:Id not specified");
        };
        if let Some(message) = self.rejections.get(id) {
            return RecordResult::failed(Some(id), message);
        }

        let stored = self.objects.entry(request.object.clone()).or_default();
        let Some(pos) = stored.iter().position(|r| r.id() == Some(id)) else {
            return RecordResult::failed(Some(id), "ENTITY_IS_DELETED:entity is deleted");
        };

        match request.operation {
            SubmitOperation::Update => {
                for (field, value) in record.iter() {
                    stored[pos].set(field, value.clone());
                }
            }
            SubmitOperation::Delete => {
                stored.remove(pos);
            }
        }
        RecordResult::ok(id)
    }
}

fn project(record: &Record, fields: &[String]) -> Record {
    let mut out = Record::new();
    for field in fields {
        if let Some(value) = record.get(field) {
            out.set(field, value.clone());
        }
    }
    out
}

#[derive(Default)]
pub struct MemorySource {
    state: Mutex<MemoryState>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_object(self, describe: ObjectDescribe, records: Vec<Record>) -> Self {
        {
            let mut state = self.lock();
            state.objects.insert(describe.name.clone(), records);
            state.describes.insert(describe.name.clone(), describe);
        }
        self
    }

    /// Overrides the count reported for `object`; `None` reports it as unknown.
    pub fn with_count(self, object: &str, count: Option<u64>) -> Self {
        self.lock().counts.insert(object.to_string(), count);
        self
    }

    /// Every submission of the record with this id fails with `message`.
    pub fn with_rejection(self, id: &str, message: &str) -> Self {
        self.lock()
            .rejections
            .insert(id.to_string(), message.to_string());
        self
    }

    pub fn with_query_failure(self, object: &str, message: &str) -> Self {
        self.lock()
            .query_failures
            .insert(object.to_string(), message.to_string());
        self
    }

    pub fn with_submit_failure(self, object: &str, message: &str) -> Self {
        self.lock()
            .submit_failures
            .insert(object.to_string(), message.to_string());
        self
    }

    /// The next `pages` query pages come back empty but not done.
    pub fn with_empty_pages(self, pages: usize) -> Self {
        self.lock().empty_pages = pages;
        self
    }

    /// Exports report "in progress" this many times before completing.
    pub fn with_export_polls(self, polls: usize) -> Self {
        self.lock().export_polls = polls;
        self
    }

    pub fn records(&self, object: &str) -> Vec<Record> {
        self.lock().objects.get(object).cloned().unwrap_or_default()
    }

    pub fn stats(&self) -> CallStats {
        self.lock().stats.clone()
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn describe(
        &self,
        objects: &[String],
    ) -> Result<HashMap<String, ObjectDescribe>, SourceError> {
        let mut state = self.lock();
        state.stats.describe += 1;
        Ok(objects
            .iter()
            .filter_map(|name| state.describes.get(name).map(|d| (name.clone(), d.clone())))
            .collect())
    }

    async fn count(&self, object: &str, _filter: Option<&str>) -> Result<Option<u64>, SourceError> {
        let mut state = self.lock();
        state.stats.count += 1;
        if let Some(count) = state.counts.get(object) {
            return Ok(*count);
        }
        Ok(Some(
            state.objects.get(object).map(Vec::len).unwrap_or_default() as u64,
        ))
    }

    async fn query(&self, spec: &QuerySpec, page_size: usize) -> Result<QueryPage, SourceError> {
        let mut state = self.lock();
        state.stats.query += 1;
        let records = state.select(spec)?;
        Ok(state.page(records, page_size.max(1)))
    }

    async fn query_more(&self, locator: &str) -> Result<QueryPage, SourceError> {
        let mut state = self.lock();
        state.stats.query_more += 1;
        let (records, page_size) = state
            .cursors
            .remove(locator)
            .ok_or_else(|| SourceError::UnknownLocator(locator.to_string()))?;
        Ok(state.page(records, page_size))
    }

    async fn start_export(&self, spec: &QuerySpec) -> Result<String, SourceError> {
        let mut state = self.lock();
        state.stats.exports += 1;
        let records = state.select(spec)?;
        let polls_left = state.export_polls;
        let id = state.handle("export");
        state.exports.insert(id.clone(), Export { records, polls_left });
        Ok(id)
    }

    async fn export_status(&self, job_id: &str) -> Result<ExportState, SourceError> {
        let mut state = self.lock();
        state.stats.export_polls += 1;
        let export = state
            .exports
            .get_mut(job_id)
            .ok_or_else(|| SourceError::UnknownLocator(job_id.to_string()))?;
        if export.polls_left > 0 {
            export.polls_left -= 1;
            return Ok(ExportState::InProgress);
        }
        Ok(ExportState::Complete)
    }

    async fn export_results(
        &self,
        job_id: &str,
        locator: Option<&str>,
        max_records: usize,
    ) -> Result<QueryPage, SourceError> {
        let state = self.lock();
        let export = state
            .exports
            .get(job_id)
            .ok_or_else(|| SourceError::UnknownLocator(job_id.to_string()))?;

        let offset = match locator {
            Some(l) => l
                .parse::<usize>()
                .map_err(|_| SourceError::UnknownLocator(l.to_string()))?,
            None => 0,
        };
        let end = (offset + max_records.max(1)).min(export.records.len());
        let records = export.records[offset.min(end)..end].to_vec();
        let next_locator = (end < export.records.len()).then(|| end.to_string());

        Ok(QueryPage {
            records,
            done: next_locator.is_none(),
            next_locator,
        })
    }

    async fn submit(&self, request: SubmitRequest) -> Result<Vec<RecordResult>, SourceError> {
        {
            let mut state = self.lock();
            state.stats.submits += 1;
            state.stats.submitted_records += request.records.len();
            if let Some(message) = state.submit_failures.get(&request.object) {
                return Err(SourceError::Generic(message.clone()));
            }
            state.active_submits += 1;
            state.stats.max_concurrent_submits =
                state.stats.max_concurrent_submits.max(state.active_submits);
        }

        // Let sibling submissions interleave like remote calls would.
        tokio::task::yield_now().await;

        let mut state = self.lock();
        state.active_submits -= 1;
        Ok(request
            .records
            .iter()
            .map(|record| state.apply(&request, record))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::describe::FieldDescribe;
    use serde_json::json;

    fn source(n: usize) -> MemorySource {
        let records = (0..n)
            .map(|i| {
                let mut r = Record::with_id(&format!("001{i:05}"));
                r.set("Name", json!(format!("Account {i}")));
                r
            })
            .collect();
        MemorySource::new().with_object(
            ObjectDescribe::new("Account", vec![FieldDescribe::new("Name", "string")]),
            records,
        )
    }

    #[tokio::test]
    async fn pages_through_query_results() {
        let source = source(5);
        let spec = QuerySpec::new("Account", &["Name".into()]);

        let first = source.query(&spec, 2).await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert!(!first.done);

        let second = source
            .query_more(first.next_locator.as_deref().unwrap())
            .await
            .unwrap();
        let third = source
            .query_more(second.next_locator.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(third.records.len(), 1);
        assert!(third.done);
    }

    #[tokio::test]
    async fn keyset_reads_start_after_id() {
        let source = source(5);
        let spec = QuerySpec::new("Account", &[])
            .after(Some("00100001".into()))
            .limit(2);

        let page = source.query(&spec, 10).await.unwrap();
        let ids: Vec<_> = page.records.iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec!["00100002", "00100003"]);
    }

    #[tokio::test]
    async fn applies_updates_and_rejections() {
        let source = source(2).with_rejection("00100001", "FIELD_CUSTOM_VALIDATION_EXCEPTION");
        let mut update = Record::with_id("00100000");
        update.set("Name", json!("Masked"));

        let results = source
            .submit(SubmitRequest {
                object: "Account".into(),
                operation: SubmitOperation::Update,
                columns: vec!["Id".into(), "Name".into()],
                records: vec![update, Record::with_id("00100001")],
            })
            .await
            .unwrap();

        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(source.records("Account")[0].value("Name"), &json!("Masked"));
    }
}
