//! Hawk request MACs.
//!
//! Both the `Authorization: Hawk ...` header and the bewit query token MAC
//! the same normalized string, differing only in the type line:
//!
//! ```text
//! hawk.1.{header|bewit}
//! {ts}
//! {nonce}
//! {METHOD}
//! {path?query}
//! {host}
//! {port}
//! {payload hash}
//! {ext}
//! ```

use std::fmt;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use url::Url;

use crate::mac::{MacSigner, constant_time_eq, mac_base64};

/// Accepted distance between a header timestamp and the verifier's clock.
pub const DEFAULT_TIMESTAMP_SKEW: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("URL has no host: {0}")]
    MissingHost(String),

    #[error("URL has no known port: {0}")]
    MissingPort(String),

    #[error("not a Hawk authorization header")]
    NotHawk,

    #[error("malformed Hawk attribute near {0:?}")]
    Malformed(String),

    #[error("Hawk header is missing the {0} attribute")]
    MissingAttribute(&'static str),

    #[error("Hawk timestamp is not a number: {0}")]
    InvalidTimestamp(String),

    #[error("Hawk timestamp is outside the accepted skew")]
    StaleTimestamp,

    #[error("Hawk MAC does not match")]
    InvalidMac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacType {
    Header,
    Bewit,
}

impl MacType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Bewit => "bewit",
        }
    }
}

/// Everything covered by a Hawk MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub ts: i64,
    pub nonce: String,
    pub method: String,
    pub resource: String,
    pub host: String,
    pub port: u16,
    pub hash: String,
    pub ext: String,
}

impl Artifacts {
    /// Artifacts for `method url` at `ts` with empty nonce, hash and ext.
    pub fn for_request(method: &str, url: &Url, ts: i64) -> Result<Self, HeaderError> {
        let host = url
            .host_str()
            .ok_or_else(|| HeaderError::MissingHost(url.to_string()))?
            .to_ascii_lowercase();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| HeaderError::MissingPort(url.to_string()))?;
        let resource = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        Ok(Self {
            ts,
            nonce: String::new(),
            method: method.to_ascii_uppercase(),
            resource,
            host,
            port,
            hash: String::new(),
            ext: String::new(),
        })
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = nonce.into();
        self
    }

    pub fn with_ext(mut self, ext: impl Into<String>) -> Self {
        self.ext = ext.into();
        self
    }

    pub fn normalized(&self, kind: MacType) -> String {
        format!(
            "hawk.1.{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n",
            kind.as_str(),
            self.ts,
            self.nonce,
            self.method,
            self.resource,
            self.host,
            self.port,
            self.hash,
            self.ext,
        )
    }

    pub fn mac<S: MacSigner + ?Sized>(&self, signer: &S, key: &str, kind: MacType) -> String {
        mac_base64(signer, key.as_bytes(), self.normalized(kind).as_bytes())
    }
}

/// A random 8-character nonce.
pub fn new_nonce() -> String {
    let mut nonce = URL_SAFE_NO_PAD.encode(uuid::Uuid::new_v4().as_bytes());
    nonce.truncate(8);
    nonce
}

/// A parsed or freshly built `Authorization: Hawk ...` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationHeader {
    pub id: String,
    pub ts: i64,
    pub nonce: String,
    pub ext: String,
    pub mac: String,
}

impl AuthorizationHeader {
    /// Sign `artifacts` as `id` with `key`.
    pub fn sign<S: MacSigner + ?Sized>(signer: &S, id: &str, key: &str, artifacts: &Artifacts) -> Self {
        Self {
            id: id.to_string(),
            ts: artifacts.ts,
            nonce: artifacts.nonce.clone(),
            ext: artifacts.ext.clone(),
            mac: artifacts.mac(signer, key, MacType::Header),
        }
    }

    pub fn parse(value: &str) -> Result<Self, HeaderError> {
        let attrs = value
            .trim()
            .strip_prefix("Hawk ")
            .ok_or(HeaderError::NotHawk)?;

        let mut id = None;
        let mut ts = None;
        let mut nonce = None;
        let mut ext = None;
        let mut mac = None;

        for part in attrs.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, raw) = part
                .split_once('=')
                .ok_or_else(|| HeaderError::Malformed(part.to_string()))?;
            let val = raw
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .ok_or_else(|| HeaderError::Malformed(part.to_string()))?
                .to_string();
            match key.trim() {
                "id" => id = Some(val),
                "ts" => ts = Some(val),
                "nonce" => nonce = Some(val),
                "ext" => ext = Some(val),
                "mac" => mac = Some(val),
                // hash and app are not produced by this crate
                _ => {}
            }
        }

        let ts = ts.ok_or(HeaderError::MissingAttribute("ts"))?;
        Ok(Self {
            id: id.ok_or(HeaderError::MissingAttribute("id"))?,
            ts: ts.parse().map_err(|_| HeaderError::InvalidTimestamp(ts))?,
            nonce: nonce.ok_or(HeaderError::MissingAttribute("nonce"))?,
            ext: ext.unwrap_or_default(),
            mac: mac.ok_or(HeaderError::MissingAttribute("mac"))?,
        })
    }

    /// Check this header against `method url` using the shared `key`.
    pub fn verify<S: MacSigner + ?Sized>(
        &self,
        signer: &S,
        key: &str,
        method: &str,
        url: &Url,
        now: DateTime<Utc>,
        skew: Duration,
    ) -> Result<(), HeaderError> {
        let artifacts = Artifacts::for_request(method, url, self.ts)?
            .with_nonce(self.nonce.clone())
            .with_ext(self.ext.clone());
        let expected = artifacts.mac(signer, key, MacType::Header);
        if !constant_time_eq(expected.as_bytes(), self.mac.as_bytes()) {
            return Err(HeaderError::InvalidMac);
        }
        if self.ts.abs_diff(now.timestamp()) > skew.as_secs() {
            return Err(HeaderError::StaleTimestamp);
        }
        Ok(())
    }
}

impl fmt::Display for AuthorizationHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r#"Hawk id="{}", ts="{}", nonce="{}""#, self.id, self.ts, self.nonce)?;
        if !self.ext.is_empty() {
            write!(f, r#", ext="{}""#, self.ext)?;
        }
        write!(f, r#", mac="{}""#, self.mac)
    }
}
