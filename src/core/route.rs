//! Route table and glob path matching.
//!
//! Patterns support three wildcard forms: `*` matches exactly one path
//! segment, `{var}` matches one segment (named, for readability), and `**`
//! matches any remaining tail including the empty one. When several routes
//! match a path the first-declared route wins, so declaration order is
//! significant and preserved exactly as configured. Overlaps between
//! patterns are detected at load time and surfaced to the validator.
use thiserror::Error;

use crate::config::{FallbackConfig, RouteConfig};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PatternError {
    #[error("pattern must start with '/': {0}")]
    MissingLeadingSlash(String),

    #[error("'**' is only allowed as the final segment: {0}")]
    TailNotLast(String),

    #[error("unclosed variable segment in pattern: {0}")]
    UnclosedVariable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*` or `{var}`: exactly one segment.
    Any,
    /// `**`: zero or more trailing segments.
    Tail,
}

/// A compiled glob path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn compile(raw: &str) -> Result<Self, PatternError> {
        if !raw.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(raw.to_string()));
        }

        let parts: Vec<&str> = raw.trim_start_matches('/').split('/').collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "**" => {
                    if i != parts.len() - 1 {
                        return Err(PatternError::TailNotLast(raw.to_string()));
                    }
                    Segment::Tail
                }
                "*" => Segment::Any,
                p if p.starts_with('{') => {
                    if !p.ends_with('}') {
                        return Err(PatternError::UnclosedVariable(raw.to_string()));
                    }
                    Segment::Any
                }
                p => Segment::Literal(p.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let path_segments: Vec<&str> = split_path(path);
        Self::match_segments(&self.segments, &path_segments)
    }

    fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
        match (pattern.first(), path.first()) {
            (None, None) => true,
            (Some(Segment::Tail), _) => true,
            (None, Some(_)) | (Some(_), None) => false,
            (Some(Segment::Any), Some(_)) => Self::match_segments(&pattern[1..], &path[1..]),
            (Some(Segment::Literal(lit)), Some(seg)) => {
                lit == seg && Self::match_segments(&pattern[1..], &path[1..])
            }
        }
    }

    /// Conservative check whether two patterns can match a common path.
    /// Used by config validation to warn about order-dependent routes.
    pub fn overlaps(&self, other: &PathPattern) -> bool {
        Self::segments_overlap(&self.segments, &other.segments)
    }

    fn segments_overlap(a: &[Segment], b: &[Segment]) -> bool {
        match (a.first(), b.first()) {
            (None, None) => true,
            (Some(Segment::Tail), _) | (_, Some(Segment::Tail)) => true,
            (None, Some(_)) | (Some(_), None) => false,
            (Some(Segment::Literal(x)), Some(Segment::Literal(y))) => {
                x == y && Self::segments_overlap(&a[1..], &b[1..])
            }
            // Any vs literal or Any vs Any: both can accept a shared segment.
            _ => Self::segments_overlap(&a[1..], &b[1..]),
        }
    }
}

fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

/// A single resolved route: patterns, rewrite rule and dispatch policy.
/// Immutable after load.
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    pub id: String,
    pub patterns: Vec<PathPattern>,
    pub strip_prefix: usize,
    pub backend: String,
    pub breaker: Option<String>,
    pub fallback: Option<FallbackConfig>,
    pub retries: u32,
}

impl RouteDefinition {
    fn from_config(cfg: &RouteConfig) -> Result<Self, PatternError> {
        let patterns = cfg
            .patterns
            .iter()
            .map(|p| PathPattern::compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: cfg.id.clone(),
            patterns,
            strip_prefix: cfg.strip_prefix,
            backend: cfg.backend.clone(),
            breaker: cfg.breaker.clone(),
            fallback: cfg.fallback.clone(),
            retries: cfg.retries,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }

    /// Apply the strip-prefix rewrite to an inbound path.
    pub fn rewrite(&self, path: &str) -> String {
        if self.strip_prefix == 0 {
            return path.to_string();
        }
        let segments = split_path(path);
        let kept: Vec<&str> = segments
            .into_iter()
            .skip(self.strip_prefix)
            .collect();
        if kept.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", kept.join("/"))
        }
    }
}

/// The ordered, read-only set of route definitions. Safe for unlimited
/// concurrent lookups.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<RouteDefinition>,
}

impl RouteTable {
    pub fn from_config(routes: &[RouteConfig]) -> Result<Self, PatternError> {
        let routes = routes
            .iter()
            .map(RouteDefinition::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    /// First-declared-wins lookup over all route patterns.
    pub fn match_path(&self, path: &str) -> Option<&RouteDefinition> {
        self.routes.iter().find(|route| route.matches(path))
    }

    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }

    /// Pairs of route ids whose patterns can match a common path. Declaration
    /// order still decides at request time; the validator warns about these.
    pub fn overlapping_routes(&self) -> Vec<(String, String, String, String)> {
        let mut overlaps = Vec::new();
        for (i, a) in self.routes.iter().enumerate() {
            for b in self.routes.iter().skip(i + 1) {
                for pa in &a.patterns {
                    for pb in &b.patterns {
                        if pa.overlaps(pb) {
                            overlaps.push((
                                a.id.clone(),
                                pa.as_str().to_string(),
                                b.id.clone(),
                                pb.as_str().to_string(),
                            ));
                        }
                    }
                }
            }
        }
        overlaps
    }
}

/// Compiled glob pattern set matched against request paths. Used for the
/// public-path exemption list and for the auth cookie watch list.
#[derive(Debug)]
pub struct PathSet {
    patterns: Vec<PathPattern>,
}

impl PathSet {
    pub fn compile(patterns: &[String]) -> Result<Self, PatternError> {
        let patterns = patterns
            .iter()
            .map(|p| PathPattern::compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(id: &str, patterns: &[&str], strip: usize, backend: &str, retries: u32) -> RouteConfig {
        RouteConfig {
            id: id.to_string(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            strip_prefix: strip,
            backend: backend.to_string(),
            breaker: None,
            fallback: None,
            retries,
        }
    }

    #[test]
    fn test_single_wildcard_matches_one_segment() {
        let p = PathPattern::compile("/api/*/status").unwrap();
        assert!(p.matches("/api/users/status"));
        assert!(!p.matches("/api/users/1/status"));
        assert!(!p.matches("/api/status"));
    }

    #[test]
    fn test_tail_wildcard_matches_any_depth() {
        let p = PathPattern::compile("/api/documents/**").unwrap();
        assert!(p.matches("/api/documents"));
        assert!(p.matches("/api/documents/upload"));
        assert!(p.matches("/api/documents/a/b/c"));
        assert!(!p.matches("/api/users"));
    }

    #[test]
    fn test_variable_segment() {
        let p = PathPattern::compile("/api/users/{id}").unwrap();
        assert!(p.matches("/api/users/42"));
        assert!(!p.matches("/api/users"));
        assert!(!p.matches("/api/users/42/profile"));
    }

    #[test]
    fn test_invalid_patterns_rejected() {
        assert!(PathPattern::compile("api/users").is_err());
        assert!(PathPattern::compile("/api/**/users").is_err());
        assert!(PathPattern::compile("/api/{id").is_err());
    }

    #[test]
    fn test_first_declared_wins() {
        let table = RouteTable::from_config(&[
            route("docs-upload", &["/api/documents/upload"], 1, "document-service", 0),
            route("docs", &["/api/documents/**"], 1, "document-service", 2),
        ])
        .unwrap();

        // Both patterns match; resolution is deterministic every time.
        for _ in 0..50 {
            let matched = table.match_path("/api/documents/upload").unwrap();
            assert_eq!(matched.id, "docs-upload");
        }
        let matched = table.match_path("/api/documents/123").unwrap();
        assert_eq!(matched.id, "docs");
    }

    #[test]
    fn test_strip_prefix_rewrite() {
        let table = RouteTable::from_config(&[route(
            "auth-docs",
            &["/auth-service/v3/api-docs"],
            1,
            "auth-service",
            0,
        )])
        .unwrap();

        let matched = table.match_path("/auth-service/v3/api-docs").unwrap();
        assert_eq!(matched.backend, "auth-service");
        assert_eq!(matched.rewrite("/auth-service/v3/api-docs"), "/v3/api-docs");
    }

    #[test]
    fn test_strip_all_segments_yields_root() {
        let def = RouteDefinition::from_config(&route("r", &["/x/y"], 2, "b", 0)).unwrap();
        assert_eq!(def.rewrite("/x/y"), "/");
    }

    #[test]
    fn test_overlap_detection() {
        let table = RouteTable::from_config(&[
            route("a", &["/api/documents/upload"], 0, "document-service", 0),
            route("b", &["/api/documents/**"], 0, "document-service", 0),
            route("c", &["/api/users/**"], 0, "user-service", 0),
        ])
        .unwrap();

        let overlaps = table.overlapping_routes();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].0, "a");
        assert_eq!(overlaps[0].2, "b");
    }

    #[test]
    fn test_public_path_set() {
        let set = PathSet::compile(&[
            "/auth-service/v3/api-docs".to_string(),
            "/api/auth/**".to_string(),
        ])
        .unwrap();
        assert!(set.contains("/auth-service/v3/api-docs"));
        assert!(set.contains("/api/auth/login"));
        assert!(!set.contains("/api/users/1"));
    }
}
