//! Credentials held by the proxy and derivation of temporary credentials.
//!
//! Temporary credentials carry a certificate signed with the permanent access
//! token:
//!
//! ```text
//! version:1
//! seed:{seed}
//! start:{start}
//! expiry:{expiry}
//! scopes:
//! {scope 1}
//! {scope 2}
//! ```
//!
//! The temporary access token is the unpadded base64url MAC of the seed,
//! keyed with the permanent access token.

use std::fmt;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mac::{MacSigner, mac_base64};
use crate::scopes::ScopeSet;

/// Maximum lifetime of a temporary credential.
pub const MAX_TEMPORARY_DURATION: Duration = Duration::from_secs(31 * 24 * 60 * 60);

/// How far `start` is backdated to tolerate clock skew at the verifier.
pub const CLOCK_SKEW_ALLOWANCE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("credentials already carry a certificate and cannot derive further temporary credentials")]
    AlreadyTemporary,

    #[error("temporary credentials must have a positive duration")]
    InvalidDuration,

    #[error("temporary credentials cannot last longer than 31 days (requested {0:?})")]
    DurationTooLong(Duration),

    #[error("requested scopes are not granted to these credentials: {0:?}")]
    ScopesNotGranted(Vec<String>),

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
}

/// A client id / access token pair, optionally restricted by a certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    client_id: String,
    access_token: String,
    certificate: Option<String>,
}

impl Credentials {
    /// Permanent credentials.
    pub fn new(client_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            access_token: access_token.into(),
            certificate: None,
        }
    }

    /// Attach a certificate. An empty string means "no certificate".
    pub fn with_certificate(mut self, certificate: impl Into<String>) -> Self {
        let certificate = certificate.into();
        self.certificate = (!certificate.is_empty()).then_some(certificate);
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn certificate(&self) -> Option<&str> {
        self.certificate.as_deref()
    }

    /// Temporary credentials are the ones restricted by a certificate.
    pub fn is_temporary(&self) -> bool {
        self.certificate.is_some()
    }

    /// Parse the held certificate, if any.
    pub fn certificate_json(&self) -> Result<Option<serde_json::Value>, CredentialsError> {
        self.certificate
            .as_deref()
            .map(|raw| {
                serde_json::from_str(raw)
                    .map_err(|e| CredentialsError::InvalidCertificate(e.to_string()))
            })
            .transpose()
    }

    /// Derive temporary credentials limited to `scopes` and valid for
    /// `duration` from `now`.
    ///
    /// `held_scopes` is the maximum the caller is allowed to grant; requesting
    /// anything outside it fails with [`CredentialsError::ScopesNotGranted`].
    pub fn create_temporary_credentials<S: MacSigner + ?Sized>(
        &self,
        signer: &S,
        now: DateTime<Utc>,
        duration: Duration,
        held_scopes: &ScopeSet,
        scopes: &ScopeSet,
    ) -> Result<Credentials, CredentialsError> {
        if self.is_temporary() {
            return Err(CredentialsError::AlreadyTemporary);
        }
        if duration.is_zero() {
            return Err(CredentialsError::InvalidDuration);
        }
        if duration > MAX_TEMPORARY_DURATION {
            return Err(CredentialsError::DurationTooLong(duration));
        }
        let missing = held_scopes.uncovered(scopes);
        if !missing.is_empty() {
            return Err(CredentialsError::ScopesNotGranted(missing));
        }

        let start = now - to_chrono(CLOCK_SKEW_ALLOWANCE);
        let expiry = now + to_chrono(duration);
        let seed = new_seed();

        let mut cert = Certificate {
            version: 1,
            scopes: scopes.as_slice().to_vec(),
            start: start.timestamp_millis(),
            expiry: expiry.timestamp_millis(),
            seed,
            signature: String::new(),
        };
        cert.signature = mac_base64(
            signer,
            self.access_token.as_bytes(),
            cert.signing_string().as_bytes(),
        );

        let access_token =
            URL_SAFE_NO_PAD.encode(signer.mac(self.access_token.as_bytes(), cert.seed.as_bytes()));
        let certificate = serde_json::to_string(&cert)
            .map_err(|e| CredentialsError::InvalidCertificate(e.to_string()))?;

        Ok(Credentials {
            client_id: self.client_id.clone(),
            access_token,
            certificate: Some(certificate),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("access_token", &"<redacted>")
            .field("temporary", &self.is_temporary())
            .finish()
    }
}

/// The certificate attached to temporary credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub version: u32,
    pub scopes: Vec<String>,
    /// Milliseconds since the Unix epoch.
    pub start: i64,
    /// Milliseconds since the Unix epoch.
    pub expiry: i64,
    pub seed: String,
    pub signature: String,
}

impl Certificate {
    pub fn signing_string(&self) -> String {
        let mut lines = vec![
            format!("version:{}", self.version),
            format!("seed:{}", self.seed),
            format!("start:{}", self.start),
            format!("expiry:{}", self.expiry),
            "scopes:".to_string(),
        ];
        lines.extend(self.scopes.iter().cloned());
        lines.join("\n")
    }

    /// Check the certificate signature against the issuing access token.
    pub fn verify<S: MacSigner + ?Sized>(&self, signer: &S, issuer_access_token: &str) -> bool {
        let expected = mac_base64(
            signer,
            issuer_access_token.as_bytes(),
            self.signing_string().as_bytes(),
        );
        crate::mac::constant_time_eq(expected.as_bytes(), self.signature.as_bytes())
    }
}

/// Two slugids back to back: 44 URL-safe characters.
fn new_seed() -> String {
    let a = URL_SAFE_NO_PAD.encode(uuid::Uuid::new_v4().as_bytes());
    let b = URL_SAFE_NO_PAD.encode(uuid::Uuid::new_v4().as_bytes());
    format!("{a}{b}")
}

pub(crate) fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}
