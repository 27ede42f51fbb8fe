use crate::source::{ExportState, RecordResult, SubmitOperation};
use model::records::record::Record;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{Value, json};

pub(crate) const UNPROCESSED: &str = "Record was not processed by the bulk job";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BulkJob {
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl BulkJob {
    pub fn export_state(&self) -> ExportState {
        match self.state.as_str() {
            "JobComplete" => ExportState::Complete,
            "Failed" | "Aborted" => ExportState::Failed(
                self.error_message
                    .clone()
                    .unwrap_or_else(|| format!("export job {}", self.state)),
            ),
            _ => ExportState::InProgress,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IngestJob {
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub number_records_processed: u64,
    #[serde(default)]
    pub number_records_failed: u64,
}

pub(crate) fn query_job_body(soql: &str) -> Value {
    json!({
        "operation": "query",
        "query": soql,
        "contentType": "CSV",
        "columnDelimiter": "COMMA",
        "lineEnding": "LF",
    })
}

pub(crate) fn ingest_job_body(object: &str, operation: SubmitOperation) -> Value {
    json!({
        "object": object,
        "operation": operation.as_str(),
        "contentType": "CSV",
        "columnDelimiter": "COMMA",
        "lineEnding": "LF",
    })
}

/// Locator of the next result page; the API sends the literal `null` on the last one.
pub(crate) fn next_locator(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Sforce-Locator")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "null")
        .map(str::to_string)
}

fn result_id(record: &Record) -> Option<&str> {
    record
        .get("sf__Id")
        .and_then(Value::as_str)
        .or_else(|| record.id())
}

pub(crate) fn success_result(record: &Record) -> RecordResult {
    RecordResult {
        id: result_id(record).map(str::to_string),
        success: true,
        error: None,
    }
}

pub(crate) fn failure_result(record: &Record) -> RecordResult {
    let error = record
        .get("sf__Error")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error");
    RecordResult::failed(result_id(record), error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire;
    use reqwest::header::HeaderValue;

    #[test]
    fn null_locator_ends_paging() {
        let mut headers = HeaderMap::new();
        headers.insert("Sforce-Locator", HeaderValue::from_static("null"));
        assert_eq!(next_locator(&headers), None);

        headers.insert("Sforce-Locator", HeaderValue::from_static("MTAwMDA"));
        assert_eq!(next_locator(&headers), Some("MTAwMDA".into()));
    }

    #[test]
    fn maps_job_states() {
        let job = BulkJob {
            id: "750".into(),
            state: "Failed".into(),
            error_message: Some("INVALID_FIELD".into()),
        };
        assert_eq!(job.export_state(), ExportState::Failed("INVALID_FIELD".into()));

        let job = BulkJob {
            id: "750".into(),
            state: "UploadComplete".into(),
            error_message: None,
        };
        assert_eq!(job.export_state(), ExportState::InProgress);
    }

    #[test]
    fn parses_failed_results() {
        let records =
            wire::decode(b"\"sf__Id\",\"sf__Error\",Id\n,\"ENTITY_IS_DELETED:entity is deleted:--\",001A\n")
                .unwrap();
        let result = failure_result(&records[0]);

        assert!(!result.success);
        assert_eq!(result.id.as_deref(), Some("001A"));
        assert_eq!(
            result.error.as_deref(),
            Some("ENTITY_IS_DELETED:entity is deleted:--")
        );
    }
}
