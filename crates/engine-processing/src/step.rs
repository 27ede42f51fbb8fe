use crate::{
    deploy::{BatchSubmitter, DeploySummary},
    error::StepError,
    retrieval::{ReaderConfig, RecordReader, Strategy, select_strategy},
    retry::with_retry,
    transform::TransformPipeline,
};
use connectors::source::{QuerySpec, SubmitOperation};
use engine_core::{
    context::JobContext,
    metrics::{StepMetrics, StepMetricsSnapshot},
};
use model::{job::Status, records::record::Record, rules::RuleKind};
use std::future::Future;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{Instrument, debug, info, info_span};

/// Outcome of one object step that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub object: String,
    /// `None` when the object had nothing to process.
    pub strategy: Option<Strategy>,
    pub deployed: DeploySummary,
    pub metrics: StepMetricsSnapshot,
}

/// Retrieval, optional masking and deploy of a single object.
pub struct ObjectStep {
    object: String,
    kind: RuleKind,
    spec: QuerySpec,
    transform: Option<TransformPipeline>,
    described: bool,
    ctx: JobContext,
}

impl ObjectStep {
    pub fn new(
        kind: RuleKind,
        spec: QuerySpec,
        transform: Option<TransformPipeline>,
        ctx: JobContext,
    ) -> Self {
        ObjectStep {
            object: spec.object.clone(),
            kind,
            spec,
            transform,
            described: true,
            ctx,
        }
    }

    /// Marks a masking step whose object the source did not describe. It
    /// fails as soon as it starts.
    pub fn undescribed(mut self) -> Self {
        self.described = false;
        self
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn masks_records(&self) -> bool {
        self.transform.as_ref().is_some_and(|t| !t.is_empty())
    }

    fn operation(&self) -> SubmitOperation {
        match self.kind {
            RuleKind::Masking => SubmitOperation::Update,
            RuleKind::Delete => SubmitOperation::Delete,
        }
    }

    /// Drives the object from IN_PROGRESS to COMPLETED. Errors leave the
    /// object status for the caller to settle.
    pub async fn run(&self) -> Result<StepReport, StepError> {
        let span = info_span!("step", object = %self.object, kind = %self.kind);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<StepReport, StepError> {
        let state = &self.ctx.state;
        state
            .set_object_status(&self.object, Status::InProgress)
            .await?;
        if !self.described {
            return Err(StepError::NotDescribed(self.object.clone()));
        }

        let source = &self.ctx.source;
        let filter = self.spec.filter.as_deref();
        let count = with_retry(&self.ctx.retry, "count", || {
            source.count(&self.object, filter)
        })
        .await?;

        let metrics = StepMetrics::new();
        if count == Some(0) {
            info!("No records to process");
            state
                .set_object_status(&self.object, Status::Completed)
                .await?;
            return Ok(StepReport {
                object: self.object.clone(),
                strategy: None,
                deployed: DeploySummary::default(),
                metrics: metrics.snapshot(),
            });
        }

        let retrieval = &self.ctx.settings.retrieval;
        let strategy = select_strategy(count, retrieval);
        info!(?count, %strategy, "Starting object pipeline");

        let reader = RecordReader::new(
            strategy,
            self.spec.clone(),
            ReaderConfig {
                source: source.clone(),
                settings: retrieval.clone(),
                retry: self.ctx.retry.clone(),
            },
        );
        let (tx, rx) = mpsc::channel(retrieval.channel_capacity.max(1));

        let feed = produce(reader, self.transform.clone(), tx.clone(), metrics.clone());
        let producer = spawn_producer(feed.in_current_span(), tx);
        let submitter =
            BatchSubmitter::new(&self.object, self.operation(), self.ctx.clone(), metrics.clone());
        let deployed = submitter.run(rx).await;
        producer.await?;
        let deployed = deployed?;

        state
            .set_object_status(&self.object, Status::Completed)
            .await?;

        let metrics = metrics.snapshot();
        info!(
            read = metrics.records_read,
            batches = deployed.batches,
            successful = deployed.successful,
            failed = deployed.failed,
            "Object pipeline finished"
        );
        Ok(StepReport {
            object: self.object.clone(),
            strategy: Some(strategy),
            deployed,
            metrics,
        })
    }
}

/// Runs `feed` on its own task. If it panics, the deploy side receives the
/// failure as a terminal error before the channel closes, so the unflushed
/// partial batch is never submitted.
fn spawn_producer<F>(feed: F, tx: mpsc::Sender<Result<Record, StepError>>) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(
        async move {
            if let Err(e) = tokio::spawn(feed).await {
                let _ = tx.send(Err(StepError::Join(e))).await;
            }
        }
        .in_current_span(),
    )
}

/// Feeds the deploy side until the reader is exhausted, the first error has
/// been handed over, or the receiver is gone.
async fn produce(
    mut reader: RecordReader,
    transform: Option<TransformPipeline>,
    tx: mpsc::Sender<Result<Record, StepError>>,
    metrics: StepMetrics,
) {
    loop {
        let item = match reader.next().await {
            Ok(Some(record)) => {
                metrics.record_read();
                match &transform {
                    Some(pipeline) => pipeline
                        .apply(record)
                        .inspect(|_| metrics.record_masked())
                        .map_err(StepError::from),
                    None => Ok(record),
                }
            }
            Ok(None) => break,
            Err(e) => Err(e),
        };

        let failed = item.is_err();
        if tx.send(item).await.is_err() {
            debug!("Deploy side closed, stopping retrieval");
            break;
        }
        if failed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{account, accounts, job_context, test_settings},
        error::TransformError,
        transform::{
            Transform,
            field_mask::FieldMaskTransform,
            masking::MaskRegistry,
        },
    };
    use connectors::memory::MemorySource;
    use model::{manifest::Libraries, rules::FieldRule};
    use serde_json::json;
    use std::{
        collections::BTreeMap,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };
    use tracing_test::traced_test;

    fn masking_pipeline(rules: &[(&str, FieldRule)]) -> TransformPipeline {
        let rules: BTreeMap<String, FieldRule> = rules
            .iter()
            .map(|(f, r)| (f.to_string(), r.clone()))
            .collect();
        TransformPipeline::new().add_transform(FieldMaskTransform::new(
            "Account",
            rules,
            Arc::new(crate::test_utils::account_describe()),
            Arc::new(MaskRegistry::with_defaults()),
            Arc::new(Libraries::new()),
        ))
    }

    fn name_spec() -> QuerySpec {
        QuerySpec::new("Account", &["Name".to_string()])
    }

    #[traced_test]
    #[tokio::test]
    async fn masks_every_record_through_the_query_path() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(accounts(MemorySource::new(), 25));
        let mut settings = test_settings(dir.path());
        settings.retrieval.page_size = 10;
        settings.retrieval.channel_capacity = 4;
        settings.deploy.max_records = 7;
        let ctx = job_context(dir.path(), source.clone(), settings, &["Account"]).await;

        let step = ObjectStep::new(
            RuleKind::Masking,
            name_spec(),
            Some(masking_pipeline(&[(
                "Name",
                FieldRule::new("FIXED").with_value(json!("Masked")),
            )])),
            ctx.clone(),
        );
        let report = step.run().await.unwrap();

        assert_eq!(report.strategy, Some(Strategy::Query));
        assert_eq!(report.deployed.successful, 25);
        assert_eq!(report.metrics.records_masked, 25);
        assert!(source.records("Account").iter().all(|r| r.value("Name") == &json!("Masked")));
        assert_eq!(source.records("Account")[3].value("Phone"), account(3).value("Phone"));

        let job = ctx.state.job().await.unwrap();
        assert_eq!(job.object("Account").unwrap().status, Status::Completed);
        assert!(logs_contain("Object pipeline finished"));
    }

    #[tokio::test]
    async fn zero_count_skips_retrieval_and_deploy() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(accounts(MemorySource::new(), 3).with_count("Account", Some(0)));
        let ctx = job_context(dir.path(), source.clone(), test_settings(dir.path()), &["Account"]).await;

        let step = ObjectStep::new(RuleKind::Delete, QuerySpec::new("Account", &[]), None, ctx.clone());
        let report = step.run().await.unwrap();

        assert_eq!(report.strategy, None);
        let stats = source.stats();
        assert_eq!((stats.query, stats.exports, stats.submits), (0, 0, 0));
        let job = ctx.state.job().await.unwrap();
        assert_eq!(job.object("Account").unwrap().status, Status::Completed);
    }

    #[tokio::test]
    async fn unknown_count_deletes_through_chunked_exports() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(accounts(MemorySource::new(), 12).with_count("Account", None));
        let mut settings = test_settings(dir.path());
        settings.retrieval.chunk_size = 5;
        let ctx = job_context(dir.path(), source.clone(), settings, &["Account"]).await;

        let step = ObjectStep::new(RuleKind::Delete, QuerySpec::new("Account", &[]), None, ctx);
        let report = step.run().await.unwrap();

        assert_eq!(report.strategy, Some(Strategy::ChunkedBulk));
        assert_eq!(report.deployed.successful, 12);
        assert!(source.records("Account").is_empty());
        assert_eq!(source.stats().exports, 3);
    }

    #[tokio::test]
    async fn masking_failure_fails_the_step() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(accounts(MemorySource::new(), 5));
        let ctx = job_context(dir.path(), source.clone(), test_settings(dir.path()), &["Account"]).await;

        let step = ObjectStep::new(
            RuleKind::Masking,
            name_spec(),
            Some(masking_pipeline(&[("Nickname__c", FieldRule::new("BLANK"))])),
            ctx.clone(),
        );
        let err = step.run().await.unwrap_err();

        assert!(matches!(err, StepError::Transform(_)));
        assert_eq!(source.stats().submits, 0);
        let job = ctx.state.job().await.unwrap();
        assert_eq!(job.object("Account").unwrap().status, Status::InProgress);
    }

    /// Passes records through and panics on the `n`th one.
    struct PanicAt {
        n: usize,
        seen: AtomicUsize,
    }

    impl Transform for PanicAt {
        fn apply(&self, record: &Record) -> Result<Record, TransformError> {
            if self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.n {
                panic!("transform blew up");
            }
            Ok(record.clone())
        }
    }

    #[tokio::test]
    async fn producer_panic_does_not_flush_the_partial_batch() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(accounts(MemorySource::new(), 6));
        let mut settings = test_settings(dir.path());
        settings.deploy.max_records = 100;
        let ctx = job_context(dir.path(), source.clone(), settings, &["Account"]).await;

        let pipeline = TransformPipeline::new().add_transform(PanicAt {
            n: 4,
            seen: AtomicUsize::new(0),
        });
        let step = ObjectStep::new(RuleKind::Masking, name_spec(), Some(pipeline), ctx.clone());

        assert!(matches!(step.run().await, Err(StepError::Join(_))));
        assert_eq!(source.stats().submits, 0);
        assert_eq!(ctx.state.job().await.unwrap().successful, 0);
    }

    #[tokio::test]
    async fn retrieval_failure_fails_the_step() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(accounts(MemorySource::new(), 5).with_query_failure("Account", "INVALID_FIELD"));
        let ctx = job_context(dir.path(), source, test_settings(dir.path()), &["Account"]).await;

        let step = ObjectStep::new(RuleKind::Delete, QuerySpec::new("Account", &[]), None, ctx);
        assert!(matches!(step.run().await, Err(StepError::Source(_))));
    }
}
