use crate::{
    error::SourceError,
    source::{
        DataSource, ExportState, QueryPage, QuerySpec, RecordResult, SubmitRequest,
    },
    wire,
};
use async_trait::async_trait;
use model::{describe::ObjectDescribe, manifest::Credentials, records::record::Record};
use reqwest::{Method, RequestBuilder, Response, header::HeaderMap};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use std::{collections::HashMap, time::Duration};
use tracing::{debug, info, warn};

mod bulk;

use bulk::{BulkJob, IngestJob};

/// Maximum number of sub-requests accepted by one composite batch call.
const COMPOSITE_BATCH_LIMIT: usize = 25;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_version: String,
    /// Delay between two status polls of a bulk job.
    pub poll_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_version: "v59.0".to_string(),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// REST and Bulk 2.0 client for a Salesforce org.
#[derive(Clone)]
pub struct SalesforceClient {
    http: reqwest::Client,
    instance_url: String,
    access_token: String,
    options: ClientOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    total_size: u64,
    done: bool,
    #[serde(default)]
    records: Vec<Record>,
    next_records_url: Option<String>,
}

impl From<QueryResponse> for QueryPage {
    fn from(resp: QueryResponse) -> Self {
        QueryPage {
            records: resp
                .records
                .into_iter()
                .map(Record::strip_attributes)
                .collect(),
            done: resp.done,
            next_locator: resp.next_records_url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompositeResponse {
    results: Vec<CompositeResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompositeResult {
    status_code: u16,
    result: serde_json::Value,
}

impl SalesforceClient {
    pub fn new(credentials: &Credentials, options: ClientOptions) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("maskforce/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            instance_url: credentials.instance_url.trim_end_matches('/').to_string(),
            access_token: credentials.access_token.clone(),
            options,
        })
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/services/data/{}/{}",
            self.instance_url,
            self.options.api_version,
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.access_token)
    }

    /// Turns non-success responses into [`SourceError::Api`].
    async fn check(resp: Response) -> Result<Response, SourceError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<Vec<ApiErrorBody>>(&body) {
            Ok(errors) if !errors.is_empty() => {
                (errors[0].error_code.clone(), errors[0].message.clone())
            }
            _ => (status.to_string(), body),
        };

        Err(SourceError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, SourceError> {
        let resp = Self::check(req.send().await?).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn send_csv(&self, req: RequestBuilder) -> Result<(HeaderMap, Vec<Record>), SourceError> {
        let resp = Self::check(req.header("Accept", "text/csv").send().await?).await?;
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;
        Ok((headers, wire::decode(&body)?))
    }

    async fn describe_chunk(
        &self,
        objects: &[String],
    ) -> Result<HashMap<String, ObjectDescribe>, SourceError> {
        let requests: Vec<_> = objects
            .iter()
            .map(|name| {
                json!({
                    "method": "GET",
                    "url": format!("{}/sobjects/{name}/describe", self.options.api_version),
                })
            })
            .collect();

        let resp: CompositeResponse = self
            .send_json(
                self.request(Method::POST, &self.data_url("composite/batch"))
                    .json(&json!({ "batchRequests": requests })),
            )
            .await?;

        let mut describes = HashMap::new();
        for (name, result) in objects.iter().zip(resp.results) {
            if result.status_code >= 400 {
                let errors: Vec<ApiErrorBody> =
                    serde_json::from_value(result.result).unwrap_or_default();
                let (code, message) = errors
                    .into_iter()
                    .next()
                    .map(|e| (e.error_code, e.message))
                    .unwrap_or_else(|| ("UNKNOWN".into(), format!("describe of {name} failed")));
                return Err(SourceError::Api {
                    status: result.status_code,
                    code,
                    message,
                });
            }

            let describe: ObjectDescribe = serde_json::from_value(result.result)?;
            describes.insert(name.clone(), describe);
        }
        Ok(describes)
    }

    async fn wait_for_ingest(&self, job_id: &str) -> Result<IngestJob, SourceError> {
        let url = self.data_url(&format!("jobs/ingest/{job_id}"));
        loop {
            let job: IngestJob = self.send_json(self.request(Method::GET, &url)).await?;
            match job.state.as_str() {
                "JobComplete" => return Ok(job),
                "Failed" | "Aborted" => {
                    return Err(SourceError::BulkJob {
                        job_id: job_id.to_string(),
                        state: job.state.clone(),
                        message: job.error_message.clone().unwrap_or_default(),
                    });
                }
                state => {
                    debug!(job_id, state, "Waiting for ingest job");
                    tokio::time::sleep(self.options.poll_interval).await;
                }
            }
        }
    }

    async fn ingest_results(
        &self,
        job_id: &str,
        kind: &str,
    ) -> Result<Vec<Record>, SourceError> {
        let url = self.data_url(&format!("jobs/ingest/{job_id}/{kind}/"));
        let (_, records) = self.send_csv(self.request(Method::GET, &url)).await?;
        Ok(records)
    }
}

#[async_trait]
impl DataSource for SalesforceClient {
    async fn describe(
        &self,
        objects: &[String],
    ) -> Result<HashMap<String, ObjectDescribe>, SourceError> {
        let mut describes = HashMap::with_capacity(objects.len());
        for chunk in objects.chunks(COMPOSITE_BATCH_LIMIT) {
            describes.extend(self.describe_chunk(chunk).await?);
        }
        info!(objects = describes.len(), "Fetched object describes");
        Ok(describes)
    }

    async fn count(&self, object: &str, filter: Option<&str>) -> Result<Option<u64>, SourceError> {
        let mut soql = format!("SELECT COUNT() FROM {object}");
        if let Some(filter) = filter {
            soql.push_str(&format!(" WHERE ({filter})"));
        }

        let req = self
            .request(Method::GET, &self.data_url("query"))
            .query(&[("q", soql.as_str())]);

        match self.send_json::<QueryResponse>(req).await {
            Ok(resp) => Ok(Some(resp.total_size)),
            Err(SourceError::Api { code, .. }) if code == "QUERY_TIMEOUT" => {
                warn!(object, "Count query timed out, record count is unknown");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn query(&self, spec: &QuerySpec, page_size: usize) -> Result<QueryPage, SourceError> {
        let soql = spec.to_soql();
        debug!(soql = %soql, "Running query");
        let req = self
            .request(Method::GET, &self.data_url("query"))
            .header("Sforce-Query-Options", format!("batchSize={page_size}"))
            .query(&[("q", soql.as_str())]);

        let resp: QueryResponse = self.send_json(req).await?;
        Ok(resp.into())
    }

    async fn query_more(&self, locator: &str) -> Result<QueryPage, SourceError> {
        let url = format!("{}{}", self.instance_url, locator);
        let resp: QueryResponse = self.send_json(self.request(Method::GET, &url)).await?;
        Ok(resp.into())
    }

    async fn start_export(&self, spec: &QuerySpec) -> Result<String, SourceError> {
        let job: BulkJob = self
            .send_json(
                self.request(Method::POST, &self.data_url("jobs/query"))
                    .json(&bulk::query_job_body(&spec.to_soql())),
            )
            .await?;
        info!(job_id = %job.id, object = %spec.object, "Started bulk export");
        Ok(job.id)
    }

    async fn export_status(&self, job_id: &str) -> Result<ExportState, SourceError> {
        let job: BulkJob = self
            .send_json(self.request(Method::GET, &self.data_url(&format!("jobs/query/{job_id}"))))
            .await?;
        Ok(job.export_state())
    }

    async fn export_results(
        &self,
        job_id: &str,
        locator: Option<&str>,
        max_records: usize,
    ) -> Result<QueryPage, SourceError> {
        let mut params = vec![("maxRecords", max_records.to_string())];
        if let Some(locator) = locator {
            params.push(("locator", locator.to_string()));
        }

        let req = self
            .request(
                Method::GET,
                &self.data_url(&format!("jobs/query/{job_id}/results")),
            )
            .query(&params);
        let (headers, records) = self.send_csv(req).await?;

        let next_locator = bulk::next_locator(&headers);
        Ok(QueryPage {
            records,
            done: next_locator.is_none(),
            next_locator,
        })
    }

    async fn submit(&self, request: SubmitRequest) -> Result<Vec<RecordResult>, SourceError> {
        let job: IngestJob = self
            .send_json(
                self.request(Method::POST, &self.data_url("jobs/ingest"))
                    .json(&bulk::ingest_job_body(&request.object, request.operation)),
            )
            .await?;

        let body = wire::encode(&request.columns, &request.records)?;
        Self::check(
            self.request(
                Method::PUT,
                &self.data_url(&format!("jobs/ingest/{}/batches", job.id)),
            )
            .header("Content-Type", "text/csv")
            .body(body)
            .send()
            .await?,
        )
        .await?;

        Self::check(
            self.request(
                Method::PATCH,
                &self.data_url(&format!("jobs/ingest/{}", job.id)),
            )
            .json(&json!({ "state": "UploadComplete" }))
            .send()
            .await?,
        )
        .await?;

        let finished = self.wait_for_ingest(&job.id).await?;
        debug!(
            job_id = %job.id,
            processed = finished.number_records_processed,
            failed = finished.number_records_failed,
            "Ingest job complete"
        );

        let mut results = Vec::with_capacity(request.records.len());
        for record in self.ingest_results(&job.id, "successfulResults").await? {
            results.push(bulk::success_result(&record));
        }
        for record in self.ingest_results(&job.id, "failedResults").await? {
            results.push(bulk::failure_result(&record));
        }
        for record in self.ingest_results(&job.id, "unprocessedrecords").await? {
            results.push(RecordResult::failed(record.id(), bulk::UNPROCESSED));
        }
        Ok(results)
    }
}
