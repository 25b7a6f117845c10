//! Static service discovery backed by the configured backend table.
use std::collections::HashMap;

use async_trait::async_trait;
use eyre::{Result, WrapErr};

use crate::{core::backend::BackendUrl, ports::discovery::ServiceDiscovery};

/// Resolves logical backend names from the config's `backends` map.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    backends: HashMap<String, BackendUrl>,
}

impl StaticDiscovery {
    pub fn from_config(backends: &HashMap<String, String>) -> Result<Self> {
        let mut resolved = HashMap::with_capacity(backends.len());
        for (name, url) in backends {
            let backend = url
                .parse::<BackendUrl>()
                .wrap_err_with(|| format!("Invalid URL for backend '{name}'"))?;
            resolved.insert(name.clone(), backend);
        }
        Ok(Self { backends: resolved })
    }
}

#[async_trait]
impl ServiceDiscovery for StaticDiscovery {
    async fn resolve(&self, backend: &str) -> Option<BackendUrl> {
        self.backends.get(backend).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_known_backend() {
        let discovery = StaticDiscovery::from_config(&HashMap::from([(
            "user-service".to_string(),
            "http://user-service:8080".to_string(),
        )]))
        .unwrap();

        let backend = discovery.resolve("user-service").await.unwrap();
        assert_eq!(backend.as_str(), "http://user-service:8080");
    }

    #[tokio::test]
    async fn test_unknown_backend_is_none() {
        let discovery = StaticDiscovery::from_config(&HashMap::new()).unwrap();
        assert!(discovery.resolve("missing").await.is_none());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = StaticDiscovery::from_config(&HashMap::from([(
            "bad".to_string(),
            "ftp://nope".to_string(),
        )]));
        assert!(result.is_err());
    }
}
