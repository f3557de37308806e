pub mod store;
pub mod types;

pub use store::{JobStore, StopDecision};
pub use types::{EventKind, Job, JobConfig, JobEvent, JobStatus};
