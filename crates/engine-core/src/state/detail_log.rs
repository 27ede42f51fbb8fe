use super::debounce::{Debouncer, Flush, Tracked};
use crate::error::StateError;
use async_trait::async_trait;
use model::log::LogMessage;
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};
use tokio::{io::AsyncWriteExt, sync::Mutex};
use tracing::{debug, error};

const NAME: &str = "detail logger";

pub const DETAIL_HEADER: [&str; 3] = ["date", "message", "objectName"];

#[derive(Debug, Default)]
struct Pending {
    queue: Vec<LogMessage>,
    header_written: bool,
}

struct DetailShared {
    path: PathBuf,
    pending: Mutex<Option<Tracked<Pending>>>,
}

fn encode(messages: &[LogMessage], with_header: bool) -> Result<Vec<u8>, StateError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    if with_header {
        writer.write_record(DETAIL_HEADER)?;
    }
    for msg in messages {
        writer.write_record([
            msg.date.to_rfc3339().as_str(),
            msg.message.as_str(),
            msg.object_name.as_deref().unwrap_or_default(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| StateError::Csv(e.into_error().into()))
}

#[async_trait]
impl Flush for DetailShared {
    const NAME: &'static str = NAME;

    async fn flush(&self, force: bool) -> Result<bool, StateError> {
        let mut guard = self.pending.lock().await;
        let tracked = guard.as_mut().ok_or(StateError::NotInitialized(NAME))?;
        if !force && !tracked.is_dirty() {
            return Ok(false);
        }

        let pending = &mut tracked.value;
        if !pending.queue.is_empty() {
            let bytes = encode(&pending.queue, !pending.header_written)?;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| StateError::io(&self.path, e))?;
            file.write_all(&bytes)
                .await
                .map_err(|e| StateError::io(&self.path, e))?;
            file.flush()
                .await
                .map_err(|e| StateError::io(&self.path, e))?;

            debug!(messages = pending.queue.len(), "Appended detail log entries");
            pending.header_written = true;
            pending.queue.clear();
        }

        tracked.mark_written();
        Ok(true)
    }
}

/// Append-only CSV log of notable events of a job (errors, exceptions).
///
/// Messages are queued in memory and appended to the file by the flush task;
/// the header row is written with the first appended batch.
#[derive(Clone)]
pub struct DetailLogger {
    shared: Arc<DetailShared>,
    flush_interval: Duration,
    debouncer: Arc<StdMutex<Option<Debouncer>>>,
}

impl DetailLogger {
    pub fn new(path: impl Into<PathBuf>, flush_interval: Duration) -> Self {
        DetailLogger {
            shared: Arc::new(DetailShared {
                path: path.into(),
                pending: Mutex::new(None),
            }),
            flush_interval,
            debouncer: Arc::new(StdMutex::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Truncates the log file and starts the flush task.
    pub async fn init(&self) -> Result<(), StateError> {
        tokio::fs::write(&self.shared.path, b"")
            .await
            .map_err(|e| StateError::io(&self.shared.path, e))?;
        *self.shared.pending.lock().await = Some(Tracked::new(Pending::default()));

        let mut debouncer = self
            .debouncer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if debouncer.is_none() {
            *debouncer = Some(Debouncer::spawn(self.shared.clone(), self.flush_interval));
        }
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.shared.pending.lock().await.is_some()
    }

    pub async fn append(&self, message: LogMessage) -> Result<(), StateError> {
        let mut guard = self.shared.pending.lock().await;
        let tracked = guard.as_mut().ok_or(StateError::NotInitialized(NAME))?;
        tracked.value.queue.push(message);
        tracked.mark_dirty();
        Ok(())
    }

    pub async fn log(&self, message: impl Into<String>, object: Option<&str>) -> Result<(), StateError> {
        self.append(LogMessage::new(message, object)).await
    }

    /// Records a failure that ended an object or the job.
    pub async fn exception(&self, err: &dyn Display, object: Option<&str>) -> Result<(), StateError> {
        error!(object = object.unwrap_or("-"), error = %err, "Exception recorded");
        self.log(format!("Exception: {err}"), object).await
    }

    /// Messages accepted but not yet written to disk.
    pub async fn pending(&self) -> usize {
        self.shared
            .pending
            .lock()
            .await
            .as_ref()
            .map(|t| t.value.queue.len())
            .unwrap_or_default()
    }

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
            .pending
            .lock()
            .await
            .as_ref()
            .map(Tracked::writes)
            .unwrap_or_default()
    }
}

/// Reads a detail log written by [`DetailLogger`]. An empty file has no entries.
pub fn read_details(path: &Path) -> Result<Vec<LogMessage>, StateError> {
    let bytes = std::fs::read(path).map_err(|e| StateError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes.as_slice());

    let mut messages = Vec::new();
    for row in reader.deserialize::<LogMessage>() {
        messages.push(row?);
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    const HOUR: Duration = Duration::from_secs(3600);

    fn logger(dir: &tempfile::TempDir) -> DetailLogger {
        DetailLogger::new(dir.path().join("details.csv"), HOUR)
    }

    #[tokio::test]
    async fn init_truncates_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(&dir);
        std::fs::write(logger.path(), "stale content\n").unwrap();

        logger.init().await.unwrap();
        assert_eq!(std::fs::read(logger.path()).unwrap(), b"");
        assert!(read_details(logger.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(&dir);
        logger.init().await.unwrap();

        logger.log("first", Some("Account")).await.unwrap();
        assert!(logger.tick().await.unwrap());
        logger.log("second, with comma", None).await.unwrap();
        logger.kill().await.unwrap();

        let content = std::fs::read_to_string(logger.path()).unwrap();
        assert_eq!(content.matches("date,message,objectName").count(), 1);

        let entries = read_details(logger.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].object_name.as_deref(), Some("Account"));
        assert_eq!(entries[1].message, "second, with comma");
        assert_eq!(entries[1].object_name, None);
    }

    #[tokio::test]
    async fn queue_is_cleared_after_flush() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(&dir);
        logger.init().await.unwrap();

        logger.log("one", None).await.unwrap();
        logger.log("two", None).await.unwrap();
        assert_eq!(logger.pending().await, 2);

        logger.tick().await.unwrap();
        assert_eq!(logger.pending().await, 0);
        assert!(!logger.tick().await.unwrap());
        assert_eq!(read_details(logger.path()).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn kill_forces_one_write_without_changes() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(&dir);
        logger.init().await.unwrap();

        assert!(!logger.tick().await.unwrap());
        logger.kill().await.unwrap();
        assert_eq!(logger.writes().await, 1);
        // Nothing was logged, so the file stays empty.
        assert_eq!(std::fs::read(logger.path()).unwrap(), b"");
    }

    #[traced_test]
    #[tokio::test]
    async fn exceptions_are_tagged_with_object() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(&dir);
        logger.init().await.unwrap();

        logger
            .exception(&"connection reset", Some("Contact"))
            .await
            .unwrap();
        logger.kill().await.unwrap();

        let entries = read_details(logger.path()).unwrap();
        assert_eq!(entries[0].message, "Exception: connection reset");
        assert_eq!(entries[0].object_name.as_deref(), Some("Contact"));
        assert!(logs_contain("Exception recorded"));
    }

    #[tokio::test]
    async fn append_before_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(&dir);
        assert!(matches!(
            logger.log("early", None).await,
            Err(StateError::NotInitialized(_))
        ));
    }
}
