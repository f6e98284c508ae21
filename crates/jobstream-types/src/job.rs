use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Job status as reported by `get_state`.
///
/// Unrecognized codes are preserved in `Unknown` so they can still be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Created,
    Queued,
    Starting,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Unknown(String),
}

impl JobStatus {
    /// Returns true for succeeded/failed/cancelled: no further events follow.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Queued => "queued",
            JobStatus::Starting => "starting",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Unknown(code) => code,
        }
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Unknown(String::new())
    }
}

impl From<&str> for JobStatus {
    fn from(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "created" => JobStatus::Created,
            "queued" | "pending" => JobStatus::Queued,
            "starting" => JobStatus::Starting,
            "running" => JobStatus::Running,
            "succeeded" | "success" => JobStatus::Succeeded,
            "failed" | "error" => JobStatus::Failed,
            "cancelled" | "canceled" => JobStatus::Cancelled,
            _ => JobStatus::Unknown(code.to_string()),
        }
    }
}

impl From<String> for JobStatus {
    fn from(code: String) -> Self {
        JobStatus::from(code.as_str())
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative job snapshot returned by `get_state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    /// Latest backend stage code, when the backend reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Fields this client does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of `get_artifacts`: requested names mapped to content, `None` when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    #[serde(default)]
    pub items: BTreeMap<String, Option<String>>,
}

impl ArtifactSet {
    /// Returns the artifact content, treating missing and blank entries alike.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.items
            .get(name)
            .and_then(Option::as_deref)
            .filter(|content| !content.trim().is_empty())
    }
}

/// Test case listing returned by `get_tests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
}

/// Payload for `create`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub problem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_main_cpp: Option<String>,
    /// Follow-up instruction for continuation runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

/// Streams a subscription can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamName {
    AgentStatus,
    Terminal,
}

/// Payload for `subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub job_id: JobId,
    pub streams: Vec<StreamName>,
    pub agent_status_offset: u64,
    pub terminal_offset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_known_and_unknown_codes() {
        let status: JobStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(status, JobStatus::Cancelled);
        assert!(status.is_terminal());

        let status: JobStatus = serde_json::from_str("\"compiling\"").unwrap();
        assert_eq!(status, JobStatus::Unknown("compiling".to_string()));
        assert!(!status.is_terminal());
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"compiling\"");
    }

    #[test]
    fn test_job_state_defaults_and_keeps_extra_fields() {
        let state: JobState =
            serde_json::from_str(r#"{"status":"running","model":"m1","elapsed":12}"#).unwrap();
        assert_eq!(state.status, JobStatus::Running);
        assert_eq!(state.model.as_deref(), Some("m1"));
        assert_eq!(state.extra.get("elapsed"), Some(&Value::from(12)));

        let state: JobState = serde_json::from_str("{}").unwrap();
        assert_eq!(state.status, JobStatus::Unknown(String::new()));
    }

    #[test]
    fn test_artifact_get_treats_blank_as_absent() {
        let set: ArtifactSet = serde_json::from_str(
            r#"{"items":{"main.cpp":"int main(){}","report.json":null,"solution.json":"  "}}"#,
        )
        .unwrap();
        assert_eq!(set.get("main.cpp"), Some("int main(){}"));
        assert_eq!(set.get("report.json"), None);
        assert_eq!(set.get("solution.json"), None);
        assert_eq!(set.get("missing"), None);
    }
}
