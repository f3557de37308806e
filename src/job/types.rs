use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Starting,
    Running,
    Stopped,
    /// Exited non-zero without a stop request
    Crashed,
    /// The backend could not start the job
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        match self {
            JobStatus::Starting | JobStatus::Running => false,
            JobStatus::Stopped | JobStatus::Crashed | JobStatus::Failed => true,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Starting => write!(f, "starting"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Stopped => write!(f, "stopped"),
            JobStatus::Crashed => write!(f, "crashed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What to run. Unset fields fall back to the host's
/// [`SandboxConfig`](crate::config::SandboxConfig).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub memory_limit: Option<String>,
    #[serde(default)]
    pub cpu_limit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// Set when a stop is requested while the job is still starting.
    /// Consulted by [`JobStore::mark_running`](crate::job::JobStore::mark_running).
    pub force_stop: bool,
    pub config: JobConfig,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(id: impl Into<String>, config: JobConfig) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Starting,
            force_stop: false,
            config,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            exit_code: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Start,
    Stop,
    Error,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Create => write!(f, "create"),
            EventKind::Start => write!(f, "start"),
            EventKind::Stop => write!(f, "stop"),
            EventKind::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of a job at the moment of a transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub event: EventKind,
    pub job_id: String,
    pub job: Job,
}

impl JobEvent {
    pub fn new(event: EventKind, job: &Job) -> Self {
        Self {
            event,
            job_id: job.id.clone(),
            job: job.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_starting() {
        let job = Job::new("j1", JobConfig::default());
        assert_eq!(job.id, "j1");
        assert_eq!(job.status, JobStatus::Starting);
        assert!(!job.force_stop);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn only_starting_and_running_are_live() {
        assert!(!JobStatus::Starting.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Stopped.is_terminal());
        assert!(JobStatus::Crashed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
        assert_eq!(JobStatus::Crashed.to_string(), "crashed");
    }

    #[test]
    fn event_carries_job_id() {
        let job = Job::new("j7", JobConfig::default());
        let event = JobEvent::new(EventKind::Create, &job);
        assert_eq!(event.job_id, "j7");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "create");
        assert_eq!(json["job"]["status"], "starting");
    }

    #[test]
    fn job_config_accepts_partial_json() {
        let cfg: JobConfig = serde_json::from_str(r#"{"cmd": ["sleep", "5"]}"#).unwrap();
        assert!(cfg.image.is_none());
        assert_eq!(cfg.cmd, vec!["sleep", "5"]);
    }
}
