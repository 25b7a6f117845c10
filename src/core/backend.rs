//! Type-safe backend addresses.
use std::{fmt, str::FromStr};

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BackendError {
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A validated backend base URL resolved from a logical service name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendUrl {
    url: String,
    is_secure: bool,
}

impl BackendUrl {
    pub fn new(url: &str) -> BackendResult<Self> {
        let is_secure = url.starts_with("https://");
        let is_http = url.starts_with("http://");

        if !is_secure && !is_http {
            return Err(BackendError::InvalidUrl(format!(
                "Backend URL must start with http:// or https://, got: {url}"
            )));
        }

        Ok(BackendUrl {
            url: url.trim_end_matches('/').to_string(),
            is_secure,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn is_secure(&self) -> bool {
        self.is_secure
    }

    /// Join a rewritten path (and optional query) onto the base URL.
    pub fn join(&self, path_and_query: &str) -> String {
        format!("{}{}", self.url, path_and_query)
    }
}

impl FromStr for BackendUrl {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendUrl::new(s)
    }
}

impl fmt::Display for BackendUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        let plain = BackendUrl::new("http://user-service:8080").unwrap();
        assert_eq!(plain.as_str(), "http://user-service:8080");
        assert!(!plain.is_secure());

        let secure = BackendUrl::new("https://auth-service/").unwrap();
        assert_eq!(secure.as_str(), "https://auth-service");
        assert!(secure.is_secure());
    }

    #[test]
    fn test_invalid_urls() {
        assert!(BackendUrl::new("user-service:8080").is_err());
        assert!(BackendUrl::new("ftp://user-service").is_err());
    }

    #[test]
    fn test_join() {
        let url = BackendUrl::new("http://auth-service:8080").unwrap();
        assert_eq!(
            url.join("/v3/api-docs?group=public"),
            "http://auth-service:8080/v3/api-docs?group=public"
        );
    }
}
