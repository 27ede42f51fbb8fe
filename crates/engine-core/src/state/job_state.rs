use super::debounce::{Debouncer, Flush, Tracked};
use crate::error::StateError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::job::{Job, Status};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const NAME: &str = "job state logger";

struct StateShared {
    path: PathBuf,
    doc: Mutex<Option<Tracked<Job>>>,
}

#[async_trait]
impl Flush for StateShared {
    const NAME: &'static str = NAME;

    async fn flush(&self, force: bool) -> Result<bool, StateError> {
        let mut guard = self.doc.lock().await;
        let tracked = guard.as_mut().ok_or(StateError::NotInitialized(NAME))?;
        if !force && !tracked.is_dirty() {
            return Ok(false);
        }

        let bytes = serde_json::to_vec_pretty(&tracked.value)?;
        write_atomic(&self.path, &bytes).await?;
        tracked.mark_written();
        debug!(job_id = %tracked.value.id, status = %tracked.value.status, "Wrote job state");
        Ok(true)
    }
}

/// Writes `bytes` next to `path` and renames the file into place, so readers
/// never observe a partially written document.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StateError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| StateError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StateError::io(path, e))
}

/// Job-wide and per-object progress, mirrored to a JSON document on disk.
///
/// Mutations only touch memory and mark the document dirty; a background task
/// writes it every flush interval when dirty. [`JobStateLogger::kill`] stops
/// the task and writes one last time regardless.
#[derive(Clone)]
pub struct JobStateLogger {
    shared: Arc<StateShared>,
    flush_interval: Duration,
    debouncer: Arc<StdMutex<Option<Debouncer>>>,
}

impl JobStateLogger {
    pub fn new(path: impl Into<PathBuf>, flush_interval: Duration) -> Self {
        JobStateLogger {
            shared: Arc::new(StateShared {
                path: path.into(),
                doc: Mutex::new(None),
            }),
            flush_interval,
            debouncer: Arc::new(StdMutex::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Loads the state of `job_id` from disk when present, otherwise starts a
    /// fresh document with every object QUEUED. Starts the flush task.
    pub async fn init<S: AsRef<str>>(&self, job_id: &str, objects: &[S]) -> Result<(), StateError> {
        let job = match self.load(job_id).await? {
            Some(mut job) => {
                job.ensure_objects(objects);
                info!(job_id, objects = job.processed.len(), "Resuming job state");
                job
            }
            None => Job::new(job_id, objects),
        };

        let mut tracked = Tracked::new(job);
        tracked.mark_dirty();
        *self.shared.doc.lock().await = Some(tracked);

        let mut debouncer = self
            .debouncer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if debouncer.is_none() {
            *debouncer = Some(Debouncer::spawn(self.shared.clone(), self.flush_interval));
        }
        Ok(())
    }

    async fn load(&self, job_id: &str) -> Result<Option<Job>, StateError> {
        let path = &self.shared.path;
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StateError::io(path, e)),
        };

        match serde_json::from_slice::<Job>(&bytes) {
            Ok(job) if job.id == job_id => Ok(Some(job)),
            Ok(job) => {
                warn!(expected = job_id, found = %job.id, "State file belongs to another job, starting over");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable state file, starting over");
                Ok(None)
            }
        }
    }

    async fn update<R>(
        &self,
        f: impl FnOnce(&mut Job) -> Result<R, StateError>,
    ) -> Result<R, StateError> {
        let mut guard = self.shared.doc.lock().await;
        let tracked = guard.as_mut().ok_or(StateError::NotInitialized(NAME))?;
        let out = f(&mut tracked.value)?;
        tracked.mark_dirty();
        Ok(out)
    }

    pub async fn is_initialized(&self) -> bool {
        self.shared.doc.lock().await.is_some()
    }

    pub async fn set_job_status(&self, status: Status) -> Result<(), StateError> {
        self.update(|job| {
            job.set_status(status);
            Ok(())
        })
        .await
    }

    pub async fn set_job_error(&self, error: &str) -> Result<(), StateError> {
        self.update(|job| {
            job.error = Some(error.to_string());
            Ok(())
        })
        .await
    }

    pub async fn set_object_status(&self, object: &str, status: Status) -> Result<(), StateError> {
        self.update(|job| {
            let state = job
                .object_mut(object)
                .ok_or_else(|| StateError::ObjectNotFound(object.to_string()))?;
            state.status = status;
            Ok(())
        })
        .await
    }

    /// Adds submission outcomes to the object and to the job totals in one step.
    pub async fn add_results(
        &self,
        object: &str,
        successful: u64,
        failed: u64,
    ) -> Result<(), StateError> {
        self.update(|job| {
            let state = job
                .object_mut(object)
                .ok_or_else(|| StateError::ObjectNotFound(object.to_string()))?;
            state.successful += successful;
            state.failed += failed;
            job.successful += successful;
            job.failed += failed;
            Ok(())
        })
        .await
    }

    /// Snapshot of the in-memory document.
    pub async fn job(&self) -> Result<Job, StateError> {
        let guard = self.shared.doc.lock().await;
        guard
            .as_ref()
            .map(|t| t.value.clone())
            .ok_or(StateError::NotInitialized(NAME))
    }

    /// Runs one flush cycle as the background task would.
    pub async fn tick(&self) -> Result<bool, StateError> {
        self.shared.flush(false).await
    }

    /// Stops the flush task and forces a final write.
    pub async fn kill(&self) -> Result<(), StateError> {
        let debouncer = self
            .debouncer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(debouncer) = debouncer {
            debouncer.stop().await;
        }
        self.shared.flush(true).await?;
        Ok(())
    }

    pub async fn writes(&self) -> u64 {
        self.shared
            .doc
            .lock()
            .await
            .as_ref()
            .map(Tracked::writes)
            .unwrap_or_default()
    }

    pub async fn last_write(&self) -> Option<DateTime<Utc>> {
        self.shared
            .doc
            .lock()
            .await
            .as_ref()
            .and_then(Tracked::last_write)
    }
}
