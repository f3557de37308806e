use std::sync::Arc;

use crate::backend::Backend;
use crate::error::{HostError, Result};
use crate::events::{Subscription, ALL_JOBS};
use crate::job::{Job, JobConfig, JobStore, StopDecision};

/// Job controller for this host: stop decisions, job registration and
/// event subscriptions.
pub struct Host {
    store: Arc<JobStore>,
    backend: Arc<dyn Backend>,
}

impl Host {
    pub fn new(store: Arc<JobStore>, backend: Arc<dyn Backend>) -> Self {
        Self { store, backend }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Register a listener for one job, or every job when `key` is [`ALL_JOBS`].
    pub fn subscribe(&self, key: &str) -> Subscription {
        self.store.registry().add_listener(key)
    }

    /// Stop a job.
    ///
    /// | Status   | Effect                                   |
    /// |----------|------------------------------------------|
    /// | starting | `force_stop` is set; the store stops the job when it would otherwise start running |
    /// | running  | the backend stops it; its result is returned |
    /// | terminal | `AlreadyStopped`                         |
    pub async fn stop_job(&self, id: &str) -> Result<()> {
        match self.store.request_stop(id).await {
            StopDecision::Unknown => Err(HostError::UnknownJob(id.to_string())),
            StopDecision::Deferred => {
                tracing::info!(job_id = %id, "Stop requested while starting, deferring");
                Ok(())
            }
            StopDecision::Running => Ok(self.backend.stop(id).await?),
            StopDecision::AlreadyStopped => Err(HostError::AlreadyStopped(id.to_string())),
        }
    }

    /// Record a new job as starting and hand it to the backend.
    pub async fn add_job(&self, id: &str, config: JobConfig) -> Result<Job> {
        validate_job_id(id)?;

        let job = self.store.add_job(Job::new(id, config)).await?;
        self.backend.start(job.clone()).await;
        Ok(job)
    }
}

/// Ids double as container names and subscription keys.
fn validate_job_id(id: &str) -> Result<()> {
    if id == ALL_JOBS {
        return Err(HostError::InvalidJob(format!(
            "'{}' is reserved for subscriptions",
            ALL_JOBS
        )));
    }

    let mut chars = id.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid {
        return Err(HostError::InvalidJob(format!(
            "job id '{}' must match [a-zA-Z0-9][a-zA-Z0-9_.-]*",
            id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_container_safe_ids() {
        assert!(validate_job_id("j1").is_ok());
        assert!(validate_job_id("web.1_a-b").is_ok());
    }

    #[test]
    fn rejects_reserved_and_malformed_ids() {
        assert!(matches!(validate_job_id("all"), Err(HostError::InvalidJob(_))));
        assert!(matches!(validate_job_id(""), Err(HostError::InvalidJob(_))));
        assert!(matches!(validate_job_id("-x"), Err(HostError::InvalidJob(_))));
        assert!(matches!(validate_job_id("a/b"), Err(HostError::InvalidJob(_))));
    }
}
