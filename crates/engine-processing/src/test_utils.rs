use crate::retrieval::ReaderConfig;
use connectors::memory::MemorySource;
use engine_config::settings::Settings;
use engine_core::{context::JobContext, retry::RetryPolicy};
use model::{
    describe::{FieldDescribe, ObjectDescribe},
    records::record::Record,
};
use serde_json::json;
use std::{path::Path, sync::Arc, time::Duration};

pub fn account_describe() -> ObjectDescribe {
    ObjectDescribe::new(
        "Account",
        vec![
            FieldDescribe::new("Id", "id").with_length(18),
            FieldDescribe::new("Name", "string").with_length(80),
            FieldDescribe::new("Phone", "phone").with_length(40),
            FieldDescribe::new("Rating", "picklist").with_picklist(&["Hot", "Warm", "Cold"]),
            FieldDescribe::new("AnnualRevenue", "currency").with_scale(18, 2),
        ],
    )
}

pub fn account(i: usize) -> Record {
    let mut record = Record::with_id(&format!("001{i:015}"));
    record.set("Name", json!(format!("Account {i}")));
    record.set("Phone", json!("555-0100"));
    record.set("Rating", json!("Hot"));
    record
}

/// Adds an `Account` object with `n` records to `source`.
pub fn accounts(source: MemorySource, n: usize) -> MemorySource {
    source.with_object(account_describe(), (0..n).map(account).collect())
}

pub fn test_settings(jobs_root: &Path) -> Settings {
    let mut settings = Settings {
        jobs_root: jobs_root.to_path_buf(),
        flush_interval: Duration::from_secs(3600),
        ..Settings::default()
    };
    settings.retrieval.export_poll_interval = Duration::from_millis(1);
    settings.retry.base_delay = Duration::from_millis(1);
    settings.retry.max_delay = Duration::from_millis(1);
    settings
}

pub fn reader_config(source: Arc<MemorySource>) -> ReaderConfig {
    let settings = test_settings(Path::new("."));
    ReaderConfig {
        source,
        retry: RetryPolicy::from(&settings.retry),
        settings: settings.retrieval,
    }
}

/// Job context over `source` with both loggers initialized.
pub async fn job_context(
    dir: &Path,
    source: Arc<MemorySource>,
    settings: Settings,
    objects: &[&str],
) -> JobContext {
    let ctx = JobContext::new("job-test", dir, source, Arc::new(settings));
    ctx.state.init("job-test", objects).await.unwrap();
    ctx.details.init().await.unwrap();
    ctx
}
