use std::collections::HashSet;
use std::ffi::OsStr;
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::process::Command;

use crate::backend::Backend;
use crate::config::SandboxConfig;
use crate::error::BackendError;
use crate::job::{Job, JobStore};

/// Container name used for a job.
pub fn container_name(job_id: &str) -> String {
    format!("jobhost-{}", job_id)
}

#[derive(Debug, Default)]
struct Tracked {
    /// Jobs whose container has been started
    running: HashSet<String>,
    /// Running jobs for which a stop was issued
    stopping: HashSet<String>,
}

/// Runs jobs in Docker containers with security isolation.
///
/// Every container runs with:
/// - Network isolation (unless disabled in [`SandboxConfig`])
/// - Dropped capabilities and no new privileges
/// - Read-only root filesystem
/// - Memory and CPU limits
///
/// A job becomes `Running` only once its container has been created and
/// started. Until then it is `Starting` and a stop request is deferred to the
/// store's `force_stop` marker.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    config: SandboxConfig,
    store: Arc<JobStore>,
    tracked: Arc<Mutex<Tracked>>,
}

impl DockerBackend {
    pub fn new(config: SandboxConfig, store: Arc<JobStore>) -> Self {
        Self {
            config,
            store,
            tracked: Arc::new(Mutex::new(Tracked::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tracked> {
        self.tracked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Arguments passed to the runtime to create the container for `job`.
    pub fn create_args(&self, job: &Job) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            format!("--name={}", container_name(&job.id)),
        ];

        if self.config.network_disabled {
            args.push("--network=none".to_string());
        }

        if let Some(limit) = job
            .config
            .memory_limit
            .as_ref()
            .or(self.config.memory_limit.as_ref())
        {
            args.push(format!("--memory={}", limit));
        }

        if let Some(limit) = job
            .config
            .cpu_limit
            .as_ref()
            .or(self.config.cpu_limit.as_ref())
        {
            args.push(format!("--cpus={}", limit));
        }

        args.push("--cap-drop=ALL".to_string());
        args.push("--security-opt=no-new-privileges".to_string());
        args.push("--read-only".to_string());

        args.push(
            job.config
                .image
                .clone()
                .unwrap_or_else(|| self.config.image.clone()),
        );
        args.extend(job.config.cmd.iter().cloned());
        args
    }

    /// Run one runtime subcommand to completion, failing on a non-zero exit.
    async fn runtime<I, A>(&self, args: I) -> Result<Output, BackendError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        let output = Command::new(&self.config.runtime)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(BackendError::Command {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Drop tracking for a job; returns whether a stop had been issued for it.
    fn forget(&self, id: &str) -> bool {
        let mut tracked = self.lock();
        tracked.running.remove(id);
        tracked.stopping.remove(id)
    }

    async fn launch(self, job: Job) {
        let id = job.id.clone();
        let name = container_name(&id);

        if let Err(e) = self.runtime(self.create_args(&job)).await {
            tracing::error!(job_id = %id, error = %e, "Failed to create container");
            self.store.mark_failed(&id, e.to_string()).await;
            return;
        }

        if let Err(e) = self.runtime(["start", name.as_str()]).await {
            tracing::error!(job_id = %id, error = %e, "Failed to start container");
            self.remove_container(&id).await;
            self.store.mark_failed(&id, e.to_string()).await;
            return;
        }

        // Tracked before the job can be observed as running, so a stop
        // issued right after the transition finds it.
        self.lock().running.insert(id.clone());

        if !self.store.mark_running(&id).await {
            self.forget(&id);
            self.remove_container(&id).await;
            return;
        }

        self.supervise(id).await;
    }

    async fn supervise(self, id: String) {
        let name = container_name(&id);
        let result = self.runtime(["wait", name.as_str()]).await;
        let stop_requested = self.forget(&id);

        let exit_code = result.and_then(|output| {
            let stdout = String::from_utf8_lossy(&output.stdout);
            stdout
                .trim()
                .parse::<i32>()
                .map_err(|_| BackendError::Command {
                    code: output.status.code(),
                    stderr: format!("unexpected wait output: {:?}", stdout.trim()),
                })
        });

        match exit_code {
            Ok(code) => {
                if code != 0 && !stop_requested {
                    tracing::warn!(job_id = %id, exit_code = code, "Job exited with failure");
                }
                self.store.mark_exited(&id, Some(code), stop_requested).await;
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Failed to wait for job");
                self.store.mark_failed(&id, e.to_string()).await;
            }
        }

        self.remove_container(&id).await;
    }

    async fn remove_container(&self, id: &str) {
        if let Err(e) = self.runtime(["rm", "-f", container_name(id).as_str()]).await {
            tracing::warn!(job_id = %id, error = %e, "Failed to remove container");
        }
    }
}

#[async_trait]
impl Backend for DockerBackend {
    async fn start(&self, job: Job) {
        tracing::info!(
            job_id = %job.id,
            runtime = %self.config.runtime,
            args = ?self.create_args(&job),
            "Starting job"
        );

        // Creating the container can take as long as an image pull.
        let backend = self.clone();
        tokio::spawn(async move {
            backend.launch(job).await;
        });
    }

    async fn stop(&self, id: &str) -> Result<(), BackendError> {
        {
            let mut tracked = self.lock();
            if !tracked.running.contains(id) {
                return Err(BackendError::UnknownJob(id.to_string()));
            }
            tracked.stopping.insert(id.to_string());
        }

        tracing::info!(job_id = %id, "Stopping job");
        if let Err(e) = self.runtime(["stop", container_name(id).as_str()]).await {
            self.lock().stopping.remove(id);
            return Err(e);
        }
        Ok(())
    }
}
