//! Bearer credential extraction and propagation.
//!
//! The edge is a pure propagator: it extracts a token from the
//! `Authorization` header or a named cookie and forwards it unchanged.
//! Signature and expiry verification is delegated to whichever backend
//! receives the token.
use hyper::{HeaderMap, header};

/// Extract a bearer token, preferring the `Authorization` header and
/// falling back to the named cookie.
pub fn extract_bearer(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION)
        && let Ok(value) = value.to_str()
        && let Some(token) = value.strip_prefix("Bearer ")
        && !token.is_empty()
    {
        return Some(token.to_string());
    }

    cookie_value(headers, cookie_name)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for pair in raw.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            if parts.next() == Some(name) {
                let token = parts.next().unwrap_or("");
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use hyper::header::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                hyper::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_header_token_preferred() {
        let map = headers(&[
            ("authorization", "Bearer header-token"),
            ("cookie", "ACCESS_TOKEN=cookie-token"),
        ]);
        assert_eq!(
            extract_bearer(&map, "ACCESS_TOKEN").as_deref(),
            Some("header-token")
        );
    }

    #[test]
    fn test_cookie_fallback() {
        let map = headers(&[("cookie", "theme=dark; ACCESS_TOKEN=cookie-token; lang=en")]);
        assert_eq!(
            extract_bearer(&map, "ACCESS_TOKEN").as_deref(),
            Some("cookie-token")
        );
    }

    #[test]
    fn test_missing_token() {
        let map = headers(&[("cookie", "theme=dark")]);
        assert_eq!(extract_bearer(&map, "ACCESS_TOKEN"), None);
    }

    #[test]
    fn test_non_bearer_scheme_ignored() {
        let map = headers(&[("authorization", "Basic dXNlcjpwYXNz")]);
        assert_eq!(extract_bearer(&map, "ACCESS_TOKEN"), None);
    }

    #[test]
    fn test_empty_bearer_ignored() {
        let map = headers(&[("authorization", "Bearer ")]);
        assert_eq!(extract_bearer(&map, "ACCESS_TOKEN"), None);
    }
}
