use crate::error::JobError;
use engine_config::settings::Settings;
use engine_core::{
    error::StateError,
    context::{DETAILS_FILE, MANIFEST_FILE, STATE_FILE},
    state::{read_details, write_atomic},
};
use model::{job::Job, log::LogMessage, manifest::JobManifest};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Job directories under a common root, one per job id.
#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JobStore { root: root.into() }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.jobs_root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Registers a new QUEUED job: its manifest, an initial state document and
    /// an empty detail log. Returns the generated id.
    pub async fn create(&self, manifest: &JobManifest) -> Result<String, JobError> {
        let objects = manifest.object_names();
        if objects.is_empty() {
            return Err(JobError::NoObjects);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let dir = self.job_dir(&id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| JobError::io(&dir, e))?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let bytes = serde_json::to_vec(manifest).map_err(JobError::Manifest)?;
        tokio::fs::write(&manifest_path, bytes)
            .await
            .map_err(|e| JobError::io(&manifest_path, e))?;

        let state = serde_json::to_vec_pretty(&Job::new(&id, &objects)).map_err(StateError::from)?;
        write_atomic(&dir.join(STATE_FILE), &state).await?;

        let details_path = dir.join(DETAILS_FILE);
        tokio::fs::write(&details_path, b"")
            .await
            .map_err(|e| JobError::io(&details_path, e))?;

        info!(job_id = %id, objects = objects.len(), "Job created");
        Ok(id)
    }

    /// Starts a detached worker process for `id` running the current
    /// executable's `run` command. `global_args` go before the subcommand.
    pub fn launch(&self, id: &str, global_args: &[OsString]) -> Result<Child, JobError> {
        let launch_err = |source| JobError::Launch {
            job_id: id.to_string(),
            source,
        };
        let exe = std::env::current_exe().map_err(launch_err)?;

        let child = Command::new(exe)
            .args(global_args)
            .arg("run")
            .arg("--dir")
            .arg(self.job_dir(id))
            .arg("--job-id")
            .arg(id)
            .stdin(Stdio::null())
            .spawn()
            .map_err(launch_err)?;

        info!(job_id = %id, pid = ?child.id(), "Worker launched");
        Ok(child)
    }

    /// Job summaries, newest first.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Job>, JobError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(JobError::io(&self.root, e)),
        };

        let mut jobs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| JobError::io(&self.root, e))?
        {
            let path = entry.path().join(STATE_FILE);
            if !path.is_file() {
                continue;
            }
            match read_job(&path).await {
                Ok(job) => jobs.push(job.summary()),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable job state"),
            }
        }

        jobs.sort_by(|a, b| b.created_date.cmp(&a.created_date));
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    /// One job, with per-object detail when `with_objects` is set.
    pub async fn get(&self, id: &str, with_objects: bool) -> Result<Job, JobError> {
        let path = self.existing_dir(id)?.join(STATE_FILE);
        let job = read_job(&path).await?;
        Ok(if with_objects { job } else { job.summary() })
    }

    /// The detail log of a job.
    pub async fn details(&self, id: &str) -> Result<Vec<LogMessage>, JobError> {
        let path = self.existing_dir(id)?.join(DETAILS_FILE);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        Ok(read_details(&path)?)
    }

    fn existing_dir(&self, id: &str) -> Result<PathBuf, JobError> {
        // Ids are single path components.
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(JobError::NotFound(id.to_string()));
        }
        let dir = self.job_dir(id);
        if dir.join(STATE_FILE).is_file() {
            Ok(dir)
        } else {
            Err(JobError::NotFound(id.to_string()))
        }
    }
}

async fn read_job(path: &Path) -> Result<Job, JobError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| JobError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| JobError::StateFile {
        path: path.display().to_string(),
        source,
    })
}
