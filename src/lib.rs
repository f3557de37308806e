pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod job;
pub mod node;
pub mod shutdown;

pub use error::{BackendError, HostError, Result};
pub use host::Host;
