pub mod discovery;
pub mod http_client;
pub mod ingress;
pub mod memory_store;
pub mod middleware;

pub use discovery::StaticDiscovery;
pub use http_client::HttpClientAdapter;
pub use ingress::Ingress;
pub use memory_store::InMemoryCounterStore;
