use std::net::SocketAddr;

/// Default port of the host API.
pub const DEFAULT_PORT: u16 = 1113;

/// Default per-listener event buffer.
pub const DEFAULT_LISTENER_BUFFER: usize = 64;

/// Configuration for Docker-based job execution.
///
/// Jobs run in sandboxed containers; per-job settings in
/// [`JobConfig`](crate::job::JobConfig) override these defaults.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Container runtime binary (`docker`, or a compatible CLI such as `podman`)
    pub runtime: String,
    /// Image used when a job does not name one
    pub image: String,
    /// Disable network access in containers
    pub network_disabled: bool,
    /// Default memory limit (e.g., "256m")
    pub memory_limit: Option<String>,
    /// Default CPU limit (e.g., "0.5" for half a CPU)
    pub cpu_limit: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            image: "alpine:latest".to_string(),
            network_disabled: true,
            memory_limit: Some("256m".to_string()),
            cpu_limit: Some("0.5".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub listen_addr: SocketAddr,
    /// Capacity of each event listener channel. Events to a full listener are dropped.
    pub listener_buffer: usize,
    pub sandbox: SandboxConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            listener_buffer: DEFAULT_LISTENER_BUFFER,
            sandbox: SandboxConfig::default(),
        }
    }
}

impl HostConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_listener_buffer(mut self, capacity: usize) -> Self {
        self.listener_buffer = capacity.max(1);
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }
}
