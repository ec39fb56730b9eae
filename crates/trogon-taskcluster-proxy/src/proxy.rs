//! Axum HTTP proxy server.
//!
//! Every request except `POST /bewit` is forwarded to the service named by
//! its first path segment, signed with the proxy's delegated credentials:
//!
//! ```text
//! GET /queue/v1/task/ABC
//!     ↓ ServiceRegistry::resolve
//! GET https://queue.taskcluster.net/v1/task/ABC
//!     Authorization: Hawk id="…", ts="…", nonce="…", ext="…", mac="…"
//!     ↓ shared reqwest::Client
//! response status + headers + streamed body
//!     + X-Taskcluster-Endpoint, X-Taskcluster-Proxy-Version
//! ```
//!
//! `POST /bewit` with an absolute URL as the body answers `303 See Other`
//! pointing at that URL with a bewit appended.
//!
//! Upstream calls are bounded by a connect timeout and an idle read timeout;
//! there is no cap on total duration.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, HttpBody as _};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use http_body_util::Limited;
use trogon_hawk::bewit::DEFAULT_BEWIT_TTL;
use trogon_hawk::{Delegator, MintError};

use crate::clock::WallClock;
use crate::config::Config;
use crate::services::{ServiceRegistry, UnknownService};

pub const BEWIT_PATH: &str = "/bewit";
pub const ENDPOINT_HEADER: HeaderName = HeaderName::from_static("x-taskcluster-endpoint");
pub const VERSION_HEADER: HeaderName = HeaderName::from_static("x-taskcluster-proxy-version");
pub const PROXY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared by every request. Nothing in here is mutated after startup; the
/// `reqwest::Client` is one connection pool reused across requests.
#[derive(Clone)]
pub struct ProxyState {
    pub services: Arc<ServiceRegistry>,
    pub delegator: Arc<Delegator>,
    pub http_client: reqwest::Client,
    pub clock: Arc<dyn WallClock>,
    pub max_bewit_body_bytes: usize,
    pub max_request_body_bytes: usize,
}

impl ProxyState {
    pub fn new(
        config: &Config,
        delegator: Delegator,
        http_client: reqwest::Client,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        Self {
            services: Arc::new(config.services().clone()),
            delegator: Arc::new(delegator),
            http_client,
            clock,
            max_bewit_body_bytes: config.max_bewit_body_bytes(),
            max_request_body_bytes: config.max_request_body_bytes(),
        }
    }
}

/// The pooled upstream client. The upstream timeout bounds each wait for
/// data (response headers or the next body chunk) rather than the whole
/// exchange, so long artifact downloads keep streaming while they make progress.
pub fn http_client(config: &Config) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .read_timeout(config.upstream_timeout())
        .connect_timeout(config.connect_timeout())
        .build()
}

/// Build the axum router for the proxy.
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route(BEWIT_PATH, post(handle_bewit).fallback(handle_request))
        .fallback(handle_request)
        .with_state(state)
}

async fn handle_bewit(State(state): State<ProxyState>, body: Body) -> Result<Response, ProxyError> {
    // Refuse before reading anything: temporary credentials can never mint.
    if state.delegator.credentials().is_temporary() {
        return Err(ProxyError::BewitForbidden);
    }

    let bytes = axum::body::to_bytes(body, state.max_bewit_body_bytes)
        .await
        .map_err(|e| ProxyError::BodyRead(e.to_string()))?;
    let text = std::str::from_utf8(&bytes).map_err(|e| ProxyError::BodyRead(e.to_string()))?;
    let target = text.trim();

    let signed = state
        .delegator
        .mint_bewit(DEFAULT_BEWIT_TTL, target, state.clock.now())
        .map_err(|e| match e {
            MintError::Forbidden => ProxyError::BewitForbidden,
            other => ProxyError::Mint(other.to_string()),
        })?;

    let location = HeaderValue::from_str(signed.as_str())
        .map_err(|e| ProxyError::Mint(e.to_string()))?;

    tracing::info!(url = %target, "Minted bewit URL");

    Ok((
        StatusCode::SEE_OTHER,
        [(header::LOCATION, location)],
        signed.to_string(),
    )
        .into_response())
}

async fn handle_request(State(state): State<ProxyState>, req: Request) -> Result<Response, ProxyError> {
    let route = state.services.resolve(req.uri().path(), req.uri().query())?;
    let (parts, body) = req.into_parts();

    tracing::info!(
        method = %parts.method,
        path = %parts.uri.path(),
        service = %route.service,
        endpoint = %route.target,
        "Proxying request"
    );

    let mut headers = forwarded_headers(&parts.headers);
    let authorization = state
        .delegator
        .sign(parts.method.as_str(), &route.target, state.clock.now())
        .map_err(|e| ProxyError::Signing(e.to_string()))?;
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&authorization)
            .map_err(|e| ProxyError::RequestConstruction(e.to_string()))?,
    );

    let mut upstream = state
        .http_client
        .request(parts.method, route.target.clone())
        .headers(headers);
    if body.size_hint().exact() != Some(0) {
        let limited = Body::new(Limited::new(body, state.max_request_body_bytes));
        upstream = upstream.body(reqwest::Body::wrap_stream(limited.into_data_stream()));
    }

    let upstream = upstream
        .send()
        .await
        .map_err(|e| ProxyError::UpstreamTransport(e.to_string()))?;

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    response_headers.insert(
        ENDPOINT_HEADER,
        HeaderValue::from_str(route.target.as_str())
            .map_err(|e| ProxyError::RequestConstruction(e.to_string()))?,
    );
    response_headers.insert(VERSION_HEADER, HeaderValue::from_static(PROXY_VERSION));

    tracing::debug!(status = %status, endpoint = %route.target, "Relaying upstream response");

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

/// Every inbound header except the per-hop `Connection` and `Host`.
fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if name == header::CONNECTION || name == header::HOST {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Errors the proxy can produce. Each one ends the request with a status code
/// and a plain-text explanation.
#[derive(Debug)]
pub enum ProxyError {
    UnknownService(String),
    BewitForbidden,
    BodyRead(String),
    Signing(String),
    Mint(String),
    UpstreamTransport(String),
    RequestConstruction(String),
}

impl std::fmt::Display for ProxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownService(s) => write!(f, "Unknown taskcluster service: {}", s),
            Self::BewitForbidden => write!(
                f,
                "This proxy runs with temporary credentials, and therefore forbids bewit \
                 requests, since it cannot sign a request valid only for its scopes. Use a \
                 proxy holding permanent credentials, which can create temporary credentials \
                 with restricted scopes for bewit signing."
            ),
            Self::BodyRead(e) => write!(f, "Failed to read request body: {}", e),
            Self::Signing(e) => write!(f, "Failed to sign proxy request: {}", e),
            Self::Mint(e) => write!(f, "Failed to create bewit URL: {}", e),
            Self::UpstreamTransport(e) => write!(f, "Failed during proxy request: {}", e),
            Self::RequestConstruction(e) => write!(f, "Failed to generate proxy request: {}", e),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<UnknownService> for ProxyError {
    fn from(e: UnknownService) -> Self {
        Self::UnknownService(e.0)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::UnknownService(_) => StatusCode::NOT_FOUND,
            Self::BewitForbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Proxy error");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        (status, self.to_string()).into_response()
    }
}
