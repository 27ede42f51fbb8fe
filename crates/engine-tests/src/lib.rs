#![allow(dead_code)]

use connectors::memory::MemorySource;
use engine_config::settings::Settings;
use engine_runtime::{JobRunner, JobStore, runner::take_manifest};
use model::{job::Job, log::LogMessage, manifest::JobManifest};
use serde_json::{Value, json};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tempfile::TempDir;

pub mod utils;

/// Everything a finished job left behind.
pub struct JobRun {
    pub root: TempDir,
    pub job_dir: PathBuf,
    pub job: Job,
    pub details: Vec<LogMessage>,
    pub source: Arc<MemorySource>,
}

/// Settings with fast polling and retries, rooted in `root`.
pub fn test_settings(root: &std::path::Path) -> Settings {
    let mut settings = Settings {
        jobs_root: root.to_path_buf(),
        flush_interval: Duration::from_millis(20),
        ..Settings::default()
    };
    settings.retrieval.export_poll_interval = Duration::from_millis(1);
    settings.retry.base_delay = Duration::from_millis(1);
    settings.retry.max_delay = Duration::from_millis(1);
    settings
}

/// Full manifest document around `object_rules`.
pub fn manifest(object_rules: Value) -> Value {
    json!({
        "credentials": {
            "accessToken": "00D-test-token",
            "instanceUrl": "https://example.my.salesforce.com"
        },
        "objectRules": object_rules
    })
}

pub fn manifest_with_libraries(object_rules: Value, libraries: Value) -> Value {
    let mut doc = manifest(object_rules);
    doc["libraries"] = libraries;
    doc
}

/// Creates the job through the store, then runs the worker side against
/// `source` the way `maskforce run` does.
pub async fn run_job(source: MemorySource, manifest: Value) -> JobRun {
    run_job_with(source, manifest, |_| {}).await
}

pub async fn run_job_with(
    source: MemorySource,
    manifest: Value,
    configure: impl FnOnce(&mut Settings),
) -> JobRun {
    let root = tempfile::tempdir().expect("temp dir");
    let mut settings = test_settings(root.path());
    configure(&mut settings);

    let store = JobStore::from_settings(&settings);
    let manifest: JobManifest = serde_json::from_value(manifest).expect("valid manifest");
    let id = store.create(&manifest).await.expect("create job");

    let job_dir = store.job_dir(&id);
    let manifest = take_manifest(&job_dir).await.expect("read manifest");
    let source = Arc::new(source);
    let job = JobRunner::new(&id, &job_dir, Arc::new(settings))
        .run_with_source(manifest, source.clone())
        .await
        .expect("job run");

    let details = store.details(&id).await.expect("read details");
    JobRun {
        root,
        job_dir,
        job,
        details,
        source,
    }
}
