use super::ReaderConfig;
use crate::{error::StepError, retry::with_retry};
use connectors::source::{ExportState, QuerySpec};
use model::records::record::Record;
use std::collections::VecDeque;
use tracing::{debug, info};

enum Phase {
    NotStarted,
    Reading {
        job_id: String,
        locator: Option<String>,
    },
    Finished,
}

/// One asynchronous bulk export: submit, poll until complete, then page
/// through the results.
pub struct BulkReader {
    spec: QuerySpec,
    config: ReaderConfig,
    buffer: VecDeque<Record>,
    phase: Phase,
}

impl BulkReader {
    pub fn new(spec: QuerySpec, config: ReaderConfig) -> Self {
        BulkReader {
            spec,
            config,
            buffer: VecDeque::new(),
            phase: Phase::NotStarted,
        }
    }

    pub async fn next(&mut self) -> Result<Option<Record>, StepError> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }

            match &self.phase {
                Phase::Finished => return Ok(None),
                Phase::NotStarted => {
                    let job_id = self.start().await?;
                    self.phase = Phase::Reading {
                        job_id,
                        locator: None,
                    };
                }
                Phase::Reading { job_id, locator } => {
                    let (job_id, locator) = (job_id.clone(), locator.clone());
                    let source = &self.config.source;
                    let page_size = self.config.settings.export_page_size;
                    let page = with_retry(&self.config.retry, "export_results", || {
                        source.export_results(&job_id, locator.as_deref(), page_size)
                    })
                    .await?;

                    debug!(job_id = %job_id, records = page.records.len(), "Read export results");
                    self.buffer.extend(page.records);
                    self.phase = match page.next_locator {
                        Some(next) if !page.done => Phase::Reading {
                            job_id,
                            locator: Some(next),
                        },
                        _ => Phase::Finished,
                    };
                }
            }
        }
    }

    async fn start(&self) -> Result<String, StepError> {
        let source = &self.config.source;
        let spec = &self.spec;
        let job_id =
            with_retry(&self.config.retry, "start_export", || source.start_export(spec)).await?;
        info!(object = %spec.object, job_id = %job_id, "Submitted bulk export");

        loop {
            let state =
                with_retry(&self.config.retry, "export_status", || source.export_status(&job_id))
                    .await?;
            match state {
                ExportState::Complete => return Ok(job_id),
                ExportState::Failed(message) => {
                    return Err(StepError::ExportFailed { job_id, message });
                }
                ExportState::InProgress => {
                    tokio::time::sleep(self.config.settings.export_poll_interval).await;
                }
            }
        }
    }
}
