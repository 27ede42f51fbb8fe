use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the per-job detail log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    pub date: DateTime<Utc>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
}

impl LogMessage {
    pub fn new(message: impl Into<String>, object_name: Option<&str>) -> Self {
        LogMessage {
            date: Utc::now(),
            message: message.into(),
            object_name: object_name.map(str::to_string),
        }
    }
}
