use thiserror::Error;

/// Errors raised by a [`Backend`](crate::backend::Backend) while starting or stopping a job.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to spawn container runtime: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Container runtime exited with {code:?}: {stderr}")]
    Command { code: Option<i32>, stderr: String },

    #[error("Backend has no process for job {0}")]
    UnknownJob(String),
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Job is already stopped: {0}")]
    AlreadyStopped(String),

    #[error("Job already exists: {0}")]
    JobExists(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Event stream write failed: {0}")]
    StreamWrite(String),
}

pub type Result<T> = std::result::Result<T, HostError>;
