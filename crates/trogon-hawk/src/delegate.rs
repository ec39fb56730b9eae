//! Delegated authorization: Hawk headers that carry the signer's certificate
//! and the scopes it is willing to exercise.
//!
//! The `ext` attribute is standard base64 of a JSON object:
//!
//! ```json
//! {"certificate": { ... }, "authorizedScopes": ["queue:get-artifact:*"]}
//! ```
//!
//! `certificate` is present only for temporary credentials and
//! `authorizedScopes` only when the scope set is non-empty.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use url::Url;

use crate::bewit::{self, MintError};
use crate::credentials::{Credentials, CredentialsError};
use crate::hawk::{Artifacts, AuthorizationHeader, HeaderError, new_nonce};
use crate::mac::MacSigner;
use crate::scopes::ScopeSet;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignError {
    #[error("credentials have no client id")]
    MissingClientId,

    #[error("credentials have no access token")]
    MissingAccessToken,

    #[error("cannot sign request: {0}")]
    InvalidUrl(#[from] HeaderError),

    #[error("cannot sign request: {0}")]
    InvalidCertificate(#[from] CredentialsError),
}

/// The `ext` attribute for `credentials` acting with `scopes`, or an empty
/// string when there is nothing to assert.
pub fn delegation_ext(credentials: &Credentials, scopes: &ScopeSet) -> Result<String, SignError> {
    let mut ext = serde_json::Map::new();
    if let Some(cert) = credentials.certificate_json()? {
        ext.insert("certificate".to_string(), cert);
    }
    if !scopes.is_empty() {
        ext.insert(
            "authorizedScopes".to_string(),
            serde_json::Value::from(scopes.as_slice().to_vec()),
        );
    }
    if ext.is_empty() {
        return Ok(String::new());
    }
    Ok(STANDARD.encode(serde_json::Value::Object(ext).to_string()))
}

/// Compute the `Authorization` header value for `method url` at `now`.
pub fn authorization<S: MacSigner + ?Sized>(
    signer: &S,
    credentials: &Credentials,
    scopes: &ScopeSet,
    method: &str,
    url: &Url,
    now: DateTime<Utc>,
) -> Result<String, SignError> {
    if credentials.client_id().is_empty() {
        return Err(SignError::MissingClientId);
    }
    if credentials.access_token().is_empty() {
        return Err(SignError::MissingAccessToken);
    }

    let artifacts = Artifacts::for_request(method, url, now.timestamp())?
        .with_nonce(new_nonce())
        .with_ext(delegation_ext(credentials, scopes)?);

    Ok(AuthorizationHeader::sign(
        signer,
        credentials.client_id(),
        credentials.access_token(),
        &artifacts,
    )
    .to_string())
}

/// The proxy's signing identity: credentials, the scopes it acts with and the
/// MAC primitive. Immutable once built, so it can be shared across requests.
pub struct Delegator {
    credentials: Credentials,
    scopes: ScopeSet,
    signer: Box<dyn MacSigner>,
}

impl Delegator {
    pub fn new(credentials: Credentials, scopes: ScopeSet, signer: impl MacSigner + 'static) -> Self {
        Self {
            credentials,
            scopes,
            signer: Box::new(signer),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    /// Sign an outbound request.
    pub fn sign(&self, method: &str, url: &Url, now: DateTime<Utc>) -> Result<String, SignError> {
        authorization(&*self.signer, &self.credentials, &self.scopes, method, url, now)
    }

    /// Mint a bewit URL restricted to this delegator's scopes.
    pub fn mint_bewit(&self, ttl: Duration, target: &str, now: DateTime<Utc>) -> Result<Url, MintError> {
        bewit::mint(&*self.signer, &self.credentials, &self.scopes, ttl, target, now)
    }
}

impl std::fmt::Debug for Delegator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delegator")
            .field("credentials", &self.credentials)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}
