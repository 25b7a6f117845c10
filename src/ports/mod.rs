pub mod counter_store;
pub mod discovery;
pub mod http_client;

pub use counter_store::CounterStore;
pub use discovery::ServiceDiscovery;
pub use http_client::HttpClient;
