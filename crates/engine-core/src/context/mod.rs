use crate::{
    retry::RetryPolicy,
    state::{DetailLogger, JobStateLogger},
};
use connectors::source::DataSource;
use engine_config::settings::Settings;
use std::{path::Path, sync::Arc};

pub const STATE_FILE: &str = "state.json";
pub const DETAILS_FILE: &str = "details.csv";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Everything shared by the steps of one job run.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: String,
    pub source: Arc<dyn DataSource>,
    pub settings: Arc<Settings>,
    pub state: JobStateLogger,
    pub details: DetailLogger,
    pub retry: RetryPolicy,
}

impl JobContext {
    /// Context whose loggers write into `job_dir`. Loggers still need `init`.
    pub fn new(
        job_id: &str,
        job_dir: &Path,
        source: Arc<dyn DataSource>,
        settings: Arc<Settings>,
    ) -> Self {
        JobContext {
            job_id: job_id.to_string(),
            state: JobStateLogger::new(job_dir.join(STATE_FILE), settings.flush_interval),
            details: DetailLogger::new(job_dir.join(DETAILS_FILE), settings.flush_interval),
            retry: RetryPolicy::from(&settings.retry),
            source,
            settings,
        }
    }
}
