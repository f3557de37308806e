use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{HostError, Result};
use crate::events::ListenerRegistry;
use crate::job::types::{EventKind, Job, JobEvent, JobStatus};

/// Outcome of [`JobStore::request_stop`], decided against a single status read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    /// No job with that id
    Unknown,
    /// Job was starting; `force_stop` is now set
    Deferred,
    /// Job is running and must be stopped by the backend
    Running,
    /// Job is in a terminal status
    AlreadyStopped,
}

/// Authoritative in-memory record of every job on this host.
///
/// Every transition that changes a job publishes a [`JobEvent`] to the
/// registry while the write lock is held, so listeners see transitions of a
/// job in the order they were applied.
#[derive(Debug)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, Job>>,
    registry: Arc<ListenerRegistry>,
}

impl JobStore {
    pub fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Record a new job. Fails if the id is already known.
    pub async fn add_job(&self, job: Job) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(HostError::JobExists(job.id));
        }

        self.registry.dispatch(&JobEvent::new(EventKind::Create, &job));
        jobs.insert(job.id.clone(), job.clone());
        tracing::debug!(job_id = %job.id, "Job added");
        Ok(job)
    }

    pub async fn get_job(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Snapshot of all jobs sorted chronologically by creation time
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Inspect the job's status and, if it is still starting, set its
    /// `force_stop` marker, all under one write lock.
    pub async fn request_stop(&self, id: &str) -> StopDecision {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return StopDecision::Unknown;
        };

        match job.status {
            JobStatus::Starting => {
                job.force_stop = true;
                StopDecision::Deferred
            }
            JobStatus::Running => StopDecision::Running,
            JobStatus::Stopped | JobStatus::Crashed | JobStatus::Failed => {
                StopDecision::AlreadyStopped
            }
        }
    }

    /// Move a starting job to `Running`.
    ///
    /// If a stop was requested while the job was starting, the job goes
    /// straight to `Stopped` instead and this returns false; the caller must
    /// then tear down whatever it launched. Also false for unknown jobs or
    /// jobs no longer starting.
    pub async fn mark_running(&self, id: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return false;
        };
        if job.status != JobStatus::Starting {
            return false;
        }

        if job.force_stop {
            job.status = JobStatus::Stopped;
            job.ended_at = Some(Utc::now());
            tracing::info!(job_id = %id, "Job stopped before it finished starting");
            self.registry.dispatch(&JobEvent::new(EventKind::Stop, job));
            return false;
        }

        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        tracing::info!(job_id = %id, "Job running");
        self.registry.dispatch(&JobEvent::new(EventKind::Start, job));
        true
    }

    /// Record process exit. A requested stop or a zero exit code is `Stopped`,
    /// anything else is `Crashed`. Jobs already terminal are left untouched.
    pub async fn mark_exited(&self, id: &str, exit_code: Option<i32>, stop_requested: bool) {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return;
        };
        if job.status.is_terminal() {
            return;
        }

        job.status = if stop_requested || exit_code == Some(0) {
            JobStatus::Stopped
        } else {
            JobStatus::Crashed
        };
        job.exit_code = exit_code;
        job.ended_at = Some(Utc::now());
        tracing::info!(job_id = %id, status = %job.status, exit_code = ?exit_code, "Job exited");
        self.registry.dispatch(&JobEvent::new(EventKind::Stop, job));
    }

    /// Record that the backend could not run the job.
    pub async fn mark_failed(&self, id: &str, error: String) {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return;
        };
        if job.status.is_terminal() {
            return;
        }

        job.status = JobStatus::Failed;
        job.error = Some(error);
        job.ended_at = Some(Utc::now());
        tracing::warn!(job_id = %id, error = ?job.error, "Job failed");
        self.registry.dispatch(&JobEvent::new(EventKind::Error, job));
    }
}
