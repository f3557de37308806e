//! Job execution backends.
//!
//! The host never terminates processes itself; it asks a [`Backend`].
//!
//! - [`DockerBackend`]: runs each job as a sandboxed container through the
//!   container runtime CLI and reports transitions to the
//!   [`JobStore`](crate::job::JobStore)

pub mod docker;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::job::Job;

pub use docker::{container_name, DockerBackend};

#[async_trait]
pub trait Backend: Send + Sync {
    /// Launch a job the store has recorded as `Starting`. The backend owns the
    /// job's later transitions (running, exited, failed).
    async fn start(&self, job: Job);

    /// Terminate a running job. Errors are reported verbatim to the caller.
    async fn stop(&self, id: &str) -> Result<(), BackendError>;
}
