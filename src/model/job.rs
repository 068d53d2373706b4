use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        JobState::Queued,
        JobState::Pending,
        JobState::Running,
        JobState::Succeeded,
        JobState::Failed,
        JobState::Cancelled,
    ];
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => write!(f, "Queued"),
            JobState::Pending => write!(f, "Pending"),
            JobState::Running => write!(f, "Running"),
            JobState::Succeeded => write!(f, "Succeeded"),
            JobState::Failed => write!(f, "Failed"),
            JobState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Flat job record as returned by the query service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    pub queue: String,
    pub job_set: String,
    pub state: JobState,
    /// CPU request in millicores
    pub cpu: u64,
    pub memory: String,
    pub ephemeral_storage: String,
    pub submitted: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl JobRecord {
    pub fn new(job_id: impl Into<String>, queue: impl Into<String>, job_set: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            queue: queue.into(),
            job_set: job_set.into(),
            state: JobState::Queued,
            cpu: 1000,
            memory: "1Gi".to_string(),
            ephemeral_storage: "8Gi".to_string(),
            submitted: Utc::now(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = state;
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Look up a field by its wire name. Unknown names fall through to the
    /// annotations, so any annotation key can be used as a dimension.
    pub fn field_value(&self, field: &str) -> Option<String> {
        match field {
            "jobId" => Some(self.job_id.clone()),
            "queue" => Some(self.queue.clone()),
            "jobSet" => Some(self.job_set.clone()),
            "state" => Some(self.state.to_string()),
            "cpu" => Some(self.cpu.to_string()),
            "memory" => Some(self.memory.clone()),
            "ephemeralStorage" => Some(self.ephemeral_storage.clone()),
            "submitted" => Some(self.submitted.to_rfc3339()),
            other => self.annotations.get(other).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_covers_builtin_fields() {
        let job = JobRecord::new("7", "queue-1", "job-set-2").with_state(JobState::Running);
        assert_eq!(job.field_value("jobId").as_deref(), Some("7"));
        assert_eq!(job.field_value("queue").as_deref(), Some("queue-1"));
        assert_eq!(job.field_value("jobSet").as_deref(), Some("job-set-2"));
        assert_eq!(job.field_value("state").as_deref(), Some("Running"));
        assert_eq!(job.field_value("cpu").as_deref(), Some("1000"));
    }

    #[test]
    fn field_value_falls_back_to_annotations() {
        let job = JobRecord::new("1", "q", "js").with_annotation("team", "infra");
        assert_eq!(job.field_value("team").as_deref(), Some("infra"));
        assert_eq!(job.field_value("owner"), None);
    }

    #[test]
    fn serializes_with_wire_names() {
        let job = JobRecord::new("1", "q", "js");
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["jobId"], "1");
        assert_eq!(json["jobSet"], "js");
        assert_eq!(json["ephemeralStorage"], "8Gi");
        assert!(json.get("annotations").is_none());
    }
}
