use crate::{env::EnvManager, error::ConfigError};
use std::{path::PathBuf, str::FromStr, time::Duration};

pub const ENV_PREFIX: &str = "MASKFORCE_";

/// How records are read from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalSettings {
    /// Estimated counts at or above this use chunked bulk exports.
    pub chunked_threshold: u64,
    /// Estimated counts at or above this use a single bulk export.
    pub bulk_threshold: u64,
    pub page_size: usize,
    /// Records per chunk of a chunked export.
    pub chunk_size: usize,
    pub export_poll_interval: Duration,
    pub export_page_size: usize,
    /// Capacity of the channel between retrieval and deploy.
    pub channel_capacity: usize,
}

/// How records are written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySettings {
    pub max_records: usize,
    pub max_bytes: usize,
    /// Submissions in flight before the submitter drains them.
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub deploy: DeploySettings,
    pub retry: RetrySettings,
    /// Interval of the background flush of job state and detail log.
    pub flush_interval: Duration,
    pub api_version: String,
    pub jobs_root: PathBuf,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            chunked_threshold: 10_000_000,
            bulk_threshold: 1_000_000,
            page_size: 2_000,
            chunk_size: 250_000,
            export_poll_interval: Duration::from_secs(2),
            export_page_size: 50_000,
            channel_capacity: 1_000,
        }
    }
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            max_records: 10_000,
            max_bytes: 10_000_000,
            concurrency: 20,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retrieval: RetrievalSettings::default(),
            deploy: DeploySettings::default(),
            retry: RetrySettings::default(),
            flush_interval: Duration::from_secs(5),
            api_version: "v59.0".to_string(),
            jobs_root: default_jobs_root().unwrap_or_else(|_| PathBuf::from(".maskforce/jobs")),
        }
    }
}

pub fn default_jobs_root() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".maskforce").join("jobs"))
        .ok_or(ConfigError::NoHomeDir)
}

impl Settings {
    /// Defaults overridden by any `MASKFORCE_*` variable present in `env`.
    pub fn from_env(env: &EnvManager) -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let reader = Reader(env);

        let retrieval = RetrievalSettings {
            chunked_threshold: reader.number(
                "CHUNKED_THRESHOLD",
                defaults.retrieval.chunked_threshold,
            )?,
            bulk_threshold: reader.number("BULK_THRESHOLD", defaults.retrieval.bulk_threshold)?,
            page_size: reader.positive("QUERY_PAGE_SIZE", defaults.retrieval.page_size)?,
            chunk_size: reader.positive("CHUNK_SIZE", defaults.retrieval.chunk_size)?,
            export_poll_interval: reader.millis(
                "EXPORT_POLL_MS",
                defaults.retrieval.export_poll_interval,
            )?,
            export_page_size: reader
                .positive("EXPORT_PAGE_SIZE", defaults.retrieval.export_page_size)?,
            channel_capacity: reader
                .positive("CHANNEL_CAPACITY", defaults.retrieval.channel_capacity)?,
        };

        if retrieval.bulk_threshold > retrieval.chunked_threshold {
            return Err(ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}BULK_THRESHOLD"),
                value: retrieval.bulk_threshold.to_string(),
                reason: "must not exceed the chunked threshold".to_string(),
            });
        }

        let deploy = DeploySettings {
            max_records: reader.positive("BATCH_MAX_RECORDS", defaults.deploy.max_records)?,
            max_bytes: reader.positive("BATCH_MAX_BYTES", defaults.deploy.max_bytes)?,
            concurrency: reader.positive("SUBMIT_CONCURRENCY", defaults.deploy.concurrency)?,
        };

        let retry = RetrySettings {
            max_attempts: reader.positive("RETRY_ATTEMPTS", defaults.retry.max_attempts)?,
            base_delay: reader.millis("RETRY_BASE_MS", defaults.retry.base_delay)?,
            max_delay: reader.millis("RETRY_MAX_MS", defaults.retry.max_delay)?,
        };

        let jobs_root = match reader.raw("JOBS_ROOT") {
            Some(path) => PathBuf::from(path),
            None => default_jobs_root()?,
        };

        Ok(Settings {
            retrieval,
            deploy,
            retry,
            flush_interval: reader.millis("FLUSH_INTERVAL_MS", defaults.flush_interval)?,
            api_version: reader
                .raw("API_VERSION")
                .map(str::to_string)
                .unwrap_or(defaults.api_version),
            jobs_root,
        })
    }
}

struct Reader<'a>(&'a EnvManager);

impl Reader<'_> {
    fn raw(&self, name: &str) -> Option<&str> {
        self.0.get(&format!("{ENV_PREFIX}{name}"))
    }

    fn number<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(name) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}{name}"),
                value: value.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn positive(&self, name: &str, default: usize) -> Result<usize, ConfigError> {
        let value = self.number(name, default)?;
        if value == 0 {
            return Err(ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}{name}"),
                value: value.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(value)
    }

    fn millis(&self, name: &str, default: Duration) -> Result<Duration, ConfigError> {
        let ms = self.number(name, default.as_millis() as u64)?;
        Ok(Duration::from_millis(ms))
    }
}
