use async_trait::async_trait;

use crate::core::backend::BackendUrl;

/// ServiceDiscovery defines the port for resolving a backend's logical name
/// to a dispatchable address. The gateway only ever addresses backends by
/// name; actual resolution is an external collaborator.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync + 'static {
    /// Resolve a logical backend name to a base URL, if known.
    async fn resolve(&self, backend: &str) -> Option<BackendUrl>;
}
