use super::accumulator::{BatchAccumulator, BatchLimits};
use crate::error::StepError;
use connectors::{
    error::SourceError,
    source::{DataSource, RecordResult, SubmitOperation, SubmitRequest},
    wire::NULL_SENTINEL,
};
use engine_core::{context::JobContext, metrics::StepMetrics};
use model::records::{batch::Batch, record::Record};
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, info, warn};

struct BatchOutcome {
    batch_id: String,
    results: Vec<RecordResult>,
}

/// Totals of one deploy run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeploySummary {
    pub batches: u64,
    pub successful: u64,
    pub failed: u64,
}

/// Writes records back to the source in bounded batches with a bounded
/// number of submissions in flight.
pub struct BatchSubmitter {
    object: String,
    operation: SubmitOperation,
    ctx: JobContext,
    accumulator: BatchAccumulator,
    in_flight: JoinSet<Result<BatchOutcome, SourceError>>,
    concurrency: usize,
    metrics: StepMetrics,
    summary: DeploySummary,
}

impl BatchSubmitter {
    pub fn new(
        object: &str,
        operation: SubmitOperation,
        ctx: JobContext,
        metrics: StepMetrics,
    ) -> Self {
        let deploy = &ctx.settings.deploy;
        let limits = BatchLimits {
            max_records: deploy.max_records,
            max_bytes: deploy.max_bytes,
        };
        let concurrency = deploy.concurrency.max(1);

        BatchSubmitter {
            object: object.to_string(),
            operation,
            accumulator: BatchAccumulator::new(object, limits),
            in_flight: JoinSet::new(),
            concurrency,
            metrics,
            summary: DeploySummary::default(),
            ctx,
        }
    }

    /// Consumes the upstream channel until it closes. An upstream or intake
    /// error stops intake: submissions already in flight are awaited and
    /// counted, the unflushed remainder is dropped and the error returned.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Result<Record, StepError>>,
    ) -> Result<DeploySummary, StepError> {
        while let Some(item) = rx.recv().await {
            let accepted = match item {
                Ok(record) => self.accept(record).await,
                Err(e) => Err(e),
            };
            if let Err(e) = accepted {
                rx.close();
                return self.abort(e).await;
            }
        }
        self.close().await
    }

    async fn abort(mut self, err: StepError) -> Result<DeploySummary, StepError> {
        warn!(
            object = %self.object,
            pending = self.accumulator.pending(),
            error = %err,
            "Intake stopped, dropping unflushed records"
        );
        self.drain().await?;
        Err(err)
    }

    /// Adds one record, launching the batch it closes.
    pub async fn accept(&mut self, record: Record) -> Result<(), StepError> {
        let record = self.prepare(record);
        let closed = self
            .accumulator
            .push(record)
            .map_err(|e| StepError::Source(e.into()))?;
        if let Some(batch) = closed {
            self.launch(batch).await?;
        }
        Ok(())
    }

    /// Flushes the partial batch and waits for every submission.
    pub async fn close(mut self) -> Result<DeploySummary, StepError> {
        if let Some(batch) = self.accumulator.finish() {
            self.launch(batch).await?;
        }
        self.drain().await?;
        Ok(self.summary)
    }

    fn prepare(&self, record: Record) -> Record {
        match self.operation {
            SubmitOperation::Delete => match record.id() {
                Some(id) => Record::with_id(id),
                None => record,
            },
            SubmitOperation::Update => {
                let mut out = Record::new();
                for (field, value) in record.iter() {
                    let value = match value {
                        Value::Null => Value::String(NULL_SENTINEL.to_string()),
                        other => other.clone(),
                    };
                    out.set(field, value);
                }
                out
            }
        }
    }

    async fn launch(&mut self, batch: Batch) -> Result<(), StepError> {
        debug!(
            object = %self.object,
            batch_id = %batch.id,
            records = batch.len(),
            bytes = batch.size_bytes,
            "Submitting batch"
        );
        self.metrics.batch_submitted(batch.size_bytes);
        self.summary.batches += 1;

        let source: Arc<dyn DataSource> = self.ctx.source.clone();
        let request = SubmitRequest {
            object: batch.object,
            operation: self.operation,
            columns: batch.columns,
            records: batch.records,
        };
        let batch_id = batch.id;
        self.in_flight.spawn(async move {
            let results = source.submit(request).await?;
            Ok(BatchOutcome { batch_id, results })
        });

        if self.in_flight.len() >= self.concurrency {
            self.drain().await?;
        }
        Ok(())
    }

    /// Awaits every in-flight submission and aggregates what completed. The
    /// first submission error is returned after aggregation.
    async fn drain(&mut self) -> Result<(), StepError> {
        let mut outcomes = Vec::with_capacity(self.in_flight.len());
        let mut first_error: Option<StepError> = None;

        while let Some(joined) = self.in_flight.join_next().await {
            match joined {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => {
                    first_error.get_or_insert(StepError::Source(e));
                }
                Err(e) => {
                    first_error.get_or_insert(StepError::Join(e));
                }
            }
        }

        self.aggregate(outcomes).await?;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn aggregate(&mut self, outcomes: Vec<BatchOutcome>) -> Result<(), StepError> {
        if outcomes.is_empty() {
            return Ok(());
        }

        let mut successful = 0u64;
        let mut errors: BTreeMap<String, u64> = BTreeMap::new();
        for outcome in &outcomes {
            for result in &outcome.results {
                if result.success {
                    successful += 1;
                } else {
                    let message = result.error.as_deref().unwrap_or("Unknown error");
                    *errors.entry(message.to_string()).or_default() += 1;
                }
            }
        }
        let failed: u64 = errors.values().sum();

        for (message, count) in &errors {
            self.ctx
                .details
                .log(
                    format!("Failed to {} {count} record(s): {message}", self.operation),
                    Some(&self.object),
                )
                .await?;
        }
        self.ctx
            .state
            .add_results(&self.object, successful, failed)
            .await?;

        self.metrics.records_failed(failed);
        self.summary.successful += successful;
        self.summary.failed += failed;

        let batch_ids: Vec<&str> = outcomes.iter().map(|o| o.batch_id.as_str()).collect();
        info!(
            object = %self.object,
            batches = ?batch_ids,
            successful,
            failed,
            distinct_errors = errors.len(),
            "Aggregated submission results"
        );
        Ok(())
    }
}
