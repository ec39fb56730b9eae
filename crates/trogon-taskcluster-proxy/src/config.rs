//! Proxy configuration from command-line flags and environment variables.
//!
//! Flags take precedence over the environment.
//!
//! | Flag | Env var | Default |
//! |---|---|---|
//! | `--client-id` | `TASKCLUSTER_CLIENT_ID` | required |
//! | `--access-token` | `TASKCLUSTER_ACCESS_TOKEN` | required |
//! | `--certificate` | `TASKCLUSTER_CERTIFICATE` | none |
//! | `-p`, `--port` | `PROXY_PORT` | `8080` |
//! | `-t`, `--task-id` | `TASK_ID` | none |
//! | `--service NAME=URL` | `PROXY_SERVICE_OVERRIDES` (comma separated) | taskcluster.net |
//! | `<SCOPE>...` | none | none |
//! | none | `PROXY_UPSTREAM_TIMEOUT_SECS` | `60` |
//! | none | `PROXY_CONNECT_TIMEOUT_SECS` | `10` |
//! | none | `PROXY_MAX_BEWIT_BODY_BYTES` | `8192` |
//! | none | `PROXY_MAX_REQUEST_BODY_BYTES` | `67108864` |

use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use tracing::warn;
use trogon_hawk::{Credentials, ScopeSet};
use url::Url;

use crate::env::ReadEnv;
use crate::services::ServiceRegistry;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_BEWIT_BODY_BYTES: usize = 8 * 1024;
const DEFAULT_MAX_REQUEST_BODY_BYTES: usize = 64 * 1024 * 1024;
const MIN_TIMEOUT_SECS: u64 = 1;

const ENV_CLIENT_ID: &str = "TASKCLUSTER_CLIENT_ID";
const ENV_ACCESS_TOKEN: &str = "TASKCLUSTER_ACCESS_TOKEN";
const ENV_CERTIFICATE: &str = "TASKCLUSTER_CERTIFICATE";
const ENV_PORT: &str = "PROXY_PORT";
const ENV_TASK_ID: &str = "TASK_ID";
const ENV_SERVICE_OVERRIDES: &str = "PROXY_SERVICE_OVERRIDES";
const ENV_UPSTREAM_TIMEOUT_SECS: &str = "PROXY_UPSTREAM_TIMEOUT_SECS";
const ENV_CONNECT_TIMEOUT_SECS: &str = "PROXY_CONNECT_TIMEOUT_SECS";
const ENV_MAX_BEWIT_BODY_BYTES: &str = "PROXY_MAX_BEWIT_BODY_BYTES";
const ENV_MAX_REQUEST_BODY_BYTES: &str = "PROXY_MAX_REQUEST_BODY_BYTES";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing client id: pass --client-id or set TASKCLUSTER_CLIENT_ID")]
    MissingClientId,

    #[error("missing access token: pass --access-token or set TASKCLUSTER_ACCESS_TOKEN")]
    MissingAccessToken,

    #[error("invalid service override {0:?}: expected NAME=URL")]
    InvalidServiceOverride(String),

    #[error("invalid URL for service {name:?}: {reason}")]
    InvalidServiceUrl { name: String, reason: String },
}

#[derive(Parser, Debug, Default)]
#[command(name = "taskcluster-proxy", version)]
#[command(
    about = "Sidecar proxy that signs Taskcluster API calls with delegated credentials",
    long_about = None
)]
pub struct Args {
    /// Port to listen on.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    #[arg(long = "client-id")]
    pub client_id: Option<String>,

    #[arg(long = "access-token")]
    pub access_token: Option<String>,

    /// Certificate of temporary credentials (JSON).
    #[arg(long = "certificate")]
    pub certificate: Option<String>,

    /// Add the scopes of this task to the scopes the proxy signs with.
    #[arg(short = 't', long = "task-id")]
    pub task_id: Option<String>,

    /// Override a service base URL, e.g. `queue=http://localhost:8081/v1`.
    #[arg(long = "service", value_name = "NAME=URL")]
    pub services: Vec<String>,

    /// Scopes the proxy signs with.
    #[arg(value_name = "SCOPE")]
    pub scopes: Vec<String>,
}

/// Everything the proxy needs at startup. Immutable once built.
#[derive(Debug, Clone)]
pub struct Config {
    credentials: Credentials,
    scopes: ScopeSet,
    port: u16,
    task_id: Option<String>,
    services: ServiceRegistry,
    upstream_timeout: Duration,
    connect_timeout: Duration,
    max_bewit_body_bytes: usize,
    max_request_body_bytes: usize,
}

impl Config {
    pub fn new(credentials: Credentials, scopes: ScopeSet) -> Self {
        Self {
            credentials,
            scopes,
            port: DEFAULT_PORT,
            task_id: None,
            services: ServiceRegistry::taskcluster_defaults(),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_bewit_body_bytes: DEFAULT_MAX_BEWIT_BODY_BYTES,
            max_request_body_bytes: DEFAULT_MAX_REQUEST_BODY_BYTES,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_services(mut self, services: ServiceRegistry) -> Self {
        self.services = services;
        self
    }

    pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_bewit_body_bytes(mut self, limit: usize) -> Self {
        self.max_bewit_body_bytes = limit;
        self
    }

    pub fn with_max_request_body_bytes(mut self, limit: usize) -> Self {
        self.max_request_body_bytes = limit;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn upstream_timeout(&self) -> Duration {
        self.upstream_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn max_bewit_body_bytes(&self) -> usize {
        self.max_bewit_body_bytes
    }

    pub fn max_request_body_bytes(&self) -> usize {
        self.max_request_body_bytes
    }
}

pub fn from_env_with_provider<E: ReadEnv>(env: &E) -> Result<Config, ConfigError> {
    from_args(Args::parse(), env)
}

pub fn from_args<E: ReadEnv>(args: Args, env: &E) -> Result<Config, ConfigError> {
    let client_id = args
        .client_id
        .or_else(|| non_empty_var(env, ENV_CLIENT_ID))
        .ok_or(ConfigError::MissingClientId)?;
    let access_token = args
        .access_token
        .or_else(|| non_empty_var(env, ENV_ACCESS_TOKEN))
        .ok_or(ConfigError::MissingAccessToken)?;
    let certificate = args
        .certificate
        .or_else(|| non_empty_var(env, ENV_CERTIFICATE))
        .unwrap_or_default();

    let credentials = Credentials::new(client_id, access_token).with_certificate(certificate);
    let mut config = Config::new(credentials, ScopeSet::new(args.scopes));

    if let Some(port) = args.port {
        config = config.with_port(port);
    } else if let Some(port) = parse_var::<u16, E>(env, ENV_PORT) {
        config = config.with_port(port);
    }

    if let Some(task_id) = args.task_id.or_else(|| non_empty_var(env, ENV_TASK_ID)) {
        config = config.with_task_id(task_id);
    }

    let mut services = ServiceRegistry::taskcluster_defaults();
    let env_overrides = non_empty_var(env, ENV_SERVICE_OVERRIDES).unwrap_or_default();
    let overrides = env_overrides
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .chain(args.services);
    for raw in overrides {
        let (name, url) = parse_service_override(&raw)?;
        services = services.with_override(name, url);
    }
    config = config.with_services(services);

    if let Some(secs) = parse_timeout_secs(env, ENV_UPSTREAM_TIMEOUT_SECS) {
        config = config.with_upstream_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = parse_timeout_secs(env, ENV_CONNECT_TIMEOUT_SECS) {
        config = config.with_connect_timeout(Duration::from_secs(secs));
    }
    if let Some(limit) = parse_var::<usize, E>(env, ENV_MAX_BEWIT_BODY_BYTES) {
        config = config.with_max_bewit_body_bytes(limit);
    }
    if let Some(limit) = parse_var::<usize, E>(env, ENV_MAX_REQUEST_BODY_BYTES) {
        config = config.with_max_request_body_bytes(limit);
    }

    Ok(config)
}

fn parse_service_override(raw: &str) -> Result<(String, Url), ConfigError> {
    let (name, url) = raw
        .split_once('=')
        .filter(|(name, url)| !name.trim().is_empty() && !url.trim().is_empty())
        .ok_or_else(|| ConfigError::InvalidServiceOverride(raw.to_string()))?;
    let name = name.trim().to_string();
    let url = Url::parse(url.trim()).map_err(|e| ConfigError::InvalidServiceUrl {
        name: name.clone(),
        reason: e.to_string(),
    })?;
    Ok((name, url))
}

fn non_empty_var<E: ReadEnv>(env: &E, key: &str) -> Option<String> {
    env.var(key).ok().filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr, E: ReadEnv>(env: &E, key: &str) -> Option<T> {
    let raw = env.var(key).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("{key}={raw:?} is not a valid number, using default");
            None
        }
    }
}

fn parse_timeout_secs<E: ReadEnv>(env: &E, key: &str) -> Option<u64> {
    match parse_var::<u64, E>(env, key)? {
        secs if secs >= MIN_TIMEOUT_SECS => Some(secs),
        secs => {
            warn!("{key}={secs} is below minimum ({MIN_TIMEOUT_SECS}), using default");
            None
        }
    }
}
