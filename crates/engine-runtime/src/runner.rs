use crate::error::JobError;
use connectors::{
    salesforce::{ClientOptions, SalesforceClient},
    source::DataSource,
};
use engine_config::settings::Settings;
use engine_core::context::{JobContext, MANIFEST_FILE};
use engine_processing::{
    factory::StepsFactory,
    orchestrator::{self, RunReport},
};
use model::{
    job::{Job, Status},
    manifest::JobManifest,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{Instrument, info, info_span};

/// Reads the manifest of a job directory and removes it, so credentials do
/// not outlive the worker start.
pub async fn take_manifest(job_dir: &Path) -> Result<JobManifest, JobError> {
    let path = job_dir.join(MANIFEST_FILE);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| JobError::io(&path, e))?;
    tokio::fs::remove_file(&path)
        .await
        .map_err(|e| JobError::io(&path, e))?;
    serde_json::from_slice(&bytes).map_err(JobError::Manifest)
}

/// Executes one job inside its directory: state and detail log live next to
/// the manifest it was created with.
pub struct JobRunner {
    job_id: String,
    job_dir: PathBuf,
    settings: Arc<Settings>,
    factory: StepsFactory,
}

impl JobRunner {
    pub fn new(job_id: &str, job_dir: impl Into<PathBuf>, settings: Arc<Settings>) -> Self {
        JobRunner {
            job_id: job_id.to_string(),
            job_dir: job_dir.into(),
            settings,
            factory: StepsFactory::default(),
        }
    }

    /// Worker entry point: consumes the manifest and runs against the org it
    /// names.
    pub async fn run(&self) -> Result<Job, JobError> {
        let manifest = take_manifest(&self.job_dir).await?;
        let options = ClientOptions {
            api_version: self.settings.api_version.clone(),
            poll_interval: self.settings.retrieval.export_poll_interval,
        };
        let client = SalesforceClient::new(&manifest.credentials, options)?;
        self.run_with_source(manifest, Arc::new(client)).await
    }

    /// Runs the job to a terminal status. Failures after the loggers are up
    /// end as a FAILED job rather than an error; `Err` means the run could
    /// not record its own outcome.
    pub async fn run_with_source(
        &self,
        manifest: JobManifest,
        source: Arc<dyn DataSource>,
    ) -> Result<Job, JobError> {
        let span = info_span!("job", job_id = %self.job_id);
        self.execute(manifest, source).instrument(span).await
    }

    async fn execute(
        &self,
        manifest: JobManifest,
        source: Arc<dyn DataSource>,
    ) -> Result<Job, JobError> {
        let ctx = JobContext::new(&self.job_id, &self.job_dir, source, self.settings.clone());
        let objects = manifest.object_names();

        ctx.state.init(&self.job_id, &objects).await?;
        ctx.details.init().await?;
        ctx.state.set_job_status(Status::InProgress).await?;
        info!(objects = objects.len(), "Job started");

        let outcome = self.process(&ctx, manifest).await;
        let settled = settle(&ctx, outcome).await;

        // Both loggers get their final write even when settling failed.
        let state_flushed = ctx.state.kill().await;
        let details_flushed = ctx.details.kill().await;
        settled?;
        state_flushed?;
        details_flushed?;

        let job = ctx.state.job().await?;
        info!(
            status = %job.status,
            successful = job.successful,
            failed = job.failed,
            "Job finished"
        );
        Ok(job)
    }

    async fn process(&self, ctx: &JobContext, manifest: JobManifest) -> Result<RunReport, JobError> {
        let steps = self
            .factory
            .build(&manifest.object_rules, manifest.libraries, ctx)
            .await?;
        Ok(orchestrator::run_steps(ctx, steps).await?)
    }
}

async fn settle(ctx: &JobContext, outcome: Result<RunReport, JobError>) -> Result<(), JobError> {
    match outcome {
        Ok(report) => {
            if !report.failed.is_empty() {
                info!(failed_objects = ?report.failed, "Job completed with failed objects");
            }
            ctx.state.set_job_status(Status::Completed).await?;
        }
        Err(e) => {
            ctx.details.exception(&e, None).await?;
            ctx.state.set_job_error(&e.to_string()).await?;
            ctx.state.set_job_status(Status::Failed).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::manifest::Credentials;
    use std::collections::BTreeMap;
    use tracing_test::traced_test;

    fn manifest_json() -> serde_json::Value {
        serde_json::json!({
            "credentials": {
                "accessToken": "token",
                "instanceUrl": "https://example.my.salesforce.com"
            },
            "objectRules": { "Account": { "type": "DELETE" } }
        })
    }

    #[tokio::test]
    async fn manifest_is_removed_once_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        std::fs::write(&path, manifest_json().to_string()).unwrap();

        let manifest = take_manifest(dir.path()).await.unwrap();
        assert_eq!(manifest.object_names(), vec!["Account".to_string()]);
        assert!(!path.exists());

        assert!(matches!(take_manifest(dir.path()).await, Err(JobError::Io { .. })));
    }

    #[tokio::test]
    async fn unreadable_manifest_is_still_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(take_manifest(dir.path()).await, Err(JobError::Manifest(_))));
        assert!(!path.exists());
    }

    #[traced_test]
    #[tokio::test]
    async fn unknown_rule_type_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = JobManifest {
            credentials: Credentials {
                access_token: "token".into(),
                instance_url: "https://example.my.salesforce.com".into(),
                refresh_token: None,
                client_id: None,
                client_secret: None,
            },
            libraries: Default::default(),
            object_rules: BTreeMap::from([(
                "Account".to_string(),
                serde_json::from_value(serde_json::json!({ "type": "ARCHIVE" })).unwrap(),
            )]),
        };
        let settings = Arc::new(Settings {
            jobs_root: dir.path().to_path_buf(),
            ..Settings::default()
        });

        let source = Arc::new(connectors::memory::MemorySource::new());
        let job = JobRunner::new("job-1", dir.path(), settings)
            .run_with_source(manifest, source)
            .await
            .unwrap();

        assert_eq!(job.status, Status::Failed);
        assert!(job.completed_date.is_some());
        assert!(job.error.as_deref().unwrap().contains("ARCHIVE"));
        assert_eq!(job.object("Account").unwrap().status, Status::Queued);
        assert!(logs_contain("Job started"));
    }
}
