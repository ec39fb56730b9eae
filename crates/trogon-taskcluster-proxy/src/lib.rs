//! # trogon-taskcluster-proxy
//!
//! Local sidecar that lets an unauthenticated client call Taskcluster APIs.
//! Requests to `http://localhost:{port}/{service}/...` are forwarded to the
//! service's base URL with a Hawk `Authorization` header that delegates the
//! proxy's credentials, restricted to the scopes it was started with.
//!
//! ```text
//! client ──HTTP──► proxy::router ──signed HTTPS──► {service}.taskcluster.net
//!                      │
//!                      └─ POST /bewit ──► 303 See Other + bewit URL
//! ```
//!
//! - [`config`]: flags and environment variables.
//! - [`services`]: service name → base URL.
//! - [`proxy`]: the axum router, forwarding and bewit minting.
//! - [`task_scopes`]: optional startup lookup of a task's scopes.

pub mod clock;
pub mod config;
pub mod env;
pub mod proxy;
pub mod services;
pub mod task_scopes;
