use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status shared by jobs and the objects they process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Queued => "QUEUED",
            Status::InProgress => "IN_PROGRESS",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a single target object within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectState {
    pub name: String,
    pub status: Status,
    pub successful: u64,
    pub failed: u64,
}

impl ObjectState {
    pub fn queued(name: &str) -> Self {
        ObjectState {
            name: name.to_string(),
            status: Status::Queued,
            successful: 0,
            failed: 0,
        }
    }
}

/// One masking/deletion run and the progress of every object it targets.
///
/// `completed_date` is only ever set through [`Job::set_status`] when the job
/// reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub status: Status,
    pub created_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub successful: u64,
    pub failed: u64,
    #[serde(default)]
    pub processed: Vec<ObjectState>,
}

impl Job {
    pub fn new<S: AsRef<str>>(id: &str, objects: &[S]) -> Self {
        Job {
            id: id.to_string(),
            status: Status::Queued,
            created_date: Utc::now(),
            completed_date: None,
            error: None,
            successful: 0,
            failed: 0,
            processed: objects
                .iter()
                .map(|name| ObjectState::queued(name.as_ref()))
                .collect(),
        }
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
        if status.is_terminal() {
            self.completed_date = Some(Utc::now());
        }
    }

    pub fn object(&self, name: &str) -> Option<&ObjectState> {
        self.processed.iter().find(|o| o.name == name)
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut ObjectState> {
        self.processed.iter_mut().find(|o| o.name == name)
    }

    /// Registers objects that are not tracked yet as QUEUED.
    pub fn ensure_objects<S: AsRef<str>>(&mut self, objects: &[S]) {
        for name in objects {
            if self.object(name.as_ref()).is_none() {
                self.processed.push(ObjectState::queued(name.as_ref()));
            }
        }
    }

    /// Copy of the job without per-object detail, used by job listings.
    pub fn summary(&self) -> Job {
        Job {
            processed: Vec::new(),
            ..self.clone()
        }
    }

    /// Sum of the per-object counters as `(successful, failed)`.
    pub fn object_totals(&self) -> (u64, u64) {
        self.processed
            .iter()
            .fold((0, 0), |(s, f), o| (s + o.successful, f + o.failed))
    }
}
