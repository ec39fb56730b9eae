//! Service name → API base URL mapping.
//!
//! The first path segment of an inbound request names the service:
//! `/queue/v1/task/ABC` targets `{queue base}/task/ABC`. When the base URL
//! already ends in the version segment the request repeats, that segment is
//! not doubled.

use std::collections::HashMap;

use url::Url;

const DEFAULT_SERVICES: &[&str] = &[
    "auth",
    "aws-provisioner",
    "github",
    "hooks",
    "index",
    "notify",
    "purge-cache",
    "queue",
    "scheduler",
    "secrets",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown taskcluster service: {0}")]
pub struct UnknownService(pub String);

/// A resolved inbound path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub service: String,
    /// Path after the service segment, starting with `/` (or empty).
    pub remaining_path: String,
    pub target: Url,
}

/// Immutable after construction; lookups never mutate it.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    routes: HashMap<String, Url>,
}

impl ServiceRegistry {
    pub fn new<I, S>(routes: I) -> Self
    where
        I: IntoIterator<Item = (S, Url)>,
        S: Into<String>,
    {
        Self {
            routes: routes.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// The public Taskcluster deployment: `https://{name}.taskcluster.net/v1`.
    pub fn taskcluster_defaults() -> Self {
        Self::new(DEFAULT_SERVICES.iter().filter_map(|name| {
            Url::parse(&format!("https://{name}.taskcluster.net/v1"))
                .ok()
                .map(|url| (*name, url))
        }))
    }

    /// Add or replace a single service.
    pub fn with_override(mut self, name: impl Into<String>, base: Url) -> Self {
        self.routes.insert(name.into(), base);
        self
    }

    pub fn base_url(&self, service: &str) -> Option<&Url> {
        self.routes.get(service)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolve an inbound `path` (and raw `query`) to its backend URL.
    pub fn resolve(&self, path: &str, query: Option<&str>) -> Result<Route, UnknownService> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let (service, remaining_path) = match trimmed.find('/') {
            Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
            None => (trimmed, ""),
        };

        let base = self
            .routes
            .get(service)
            .ok_or_else(|| UnknownService(service.to_string()))?;

        let base_path = base.path().trim_end_matches('/');
        let joined = if !base_path.is_empty() && starts_with_segment(remaining_path, base_path) {
            remaining_path.to_string()
        } else {
            format!("{base_path}{remaining_path}")
        };

        let mut target = base.clone();
        target.set_path(&joined);
        target.set_query(query);

        Ok(Route {
            service: service.to_string(),
            remaining_path: remaining_path.to_string(),
            target,
        })
    }
}

/// `path` begins with `prefix` on a segment boundary.
fn starts_with_segment(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
