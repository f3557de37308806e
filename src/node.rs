use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::run_api;
use crate::backend::DockerBackend;
use crate::config::HostConfig;
use crate::events::ListenerRegistry;
use crate::host::Host;
use crate::job::JobStore;

/// Wires the registry, job store, backend and API of one host.
pub struct HostNode {
    pub config: HostConfig,
    pub host: Arc<Host>,
}

impl HostNode {
    pub fn new(config: HostConfig) -> Self {
        let registry = Arc::new(ListenerRegistry::new(config.listener_buffer));
        let store = Arc::new(JobStore::new(registry));
        let backend = Arc::new(DockerBackend::new(config.sandbox.clone(), store.clone()));
        let host = Arc::new(Host::new(store, backend));

        Self { config, host }
    }

    /// Serve the host API until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the server fails.
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        run_api(self.config.listen_addr, self.host, shutdown).await?;
        tracing::info!("Host API stopped");
        Ok(())
    }
}
