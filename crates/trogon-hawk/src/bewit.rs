//! Bewits: single-request GET authorizations carried in the query string.
//!
//! A bewit is `base64url(id \ exp \ mac \ ext)` without padding, where `exp`
//! is in seconds and `mac` covers the URL (without the bewit parameter) using
//! the `hawk.1.bewit` normalized string with an empty nonce.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use url::Url;

use crate::credentials::{Credentials, CredentialsError, to_chrono};
use crate::delegate::delegation_ext;
use crate::hawk::{Artifacts, HeaderError, MacType};
use crate::mac::{MacSigner, constant_time_eq};
use crate::scopes::ScopeSet;

/// Lifetime of minted bewits and the temporary credentials behind them.
pub const DEFAULT_BEWIT_TTL: Duration = Duration::from_secs(60 * 60);

/// Query parameter the token is carried in.
pub const BEWIT_PARAM: &str = "bewit";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MintError {
    #[error(
        "this proxy runs with temporary credentials and cannot sign a bewit restricted to its \
         scopes; bewits require a proxy holding permanent credentials"
    )]
    Forbidden,

    #[error("could not create temporary credentials: {0}")]
    Derivation(#[from] CredentialsError),

    #[error("invalid bewit target URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BewitError {
    #[error("URL carries no bewit")]
    Missing,

    #[error("bewit is not valid base64url")]
    Encoding,

    #[error("bewit must have four backslash-separated parts")]
    Malformed,

    #[error("bewit expiry is not a number")]
    InvalidExpiry,

    #[error("bewit expired at {0}")]
    Expired(i64),

    #[error("bewit MAC does not match")]
    InvalidMac,

    #[error(transparent)]
    Url(#[from] HeaderError),
}

/// The decoded contents of a bewit token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bewit {
    pub id: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    pub mac: String,
    pub ext: String,
}

impl Bewit {
    /// Build a bewit for a GET of `url` by `credentials`, expiring at `exp`.
    pub fn sign<S: MacSigner + ?Sized>(
        signer: &S,
        credentials: &Credentials,
        url: &Url,
        exp: i64,
        ext: String,
    ) -> Result<Self, HeaderError> {
        let artifacts = Artifacts::for_request("GET", url, exp)?.with_ext(ext.clone());
        Ok(Self {
            id: credentials.client_id().to_string(),
            exp,
            mac: artifacts.mac(signer, credentials.access_token(), MacType::Bewit),
            ext,
        })
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}\\{}\\{}\\{}", self.id, self.exp, self.mac, self.ext))
    }

    pub fn decode(token: &str) -> Result<Self, BewitError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim_end_matches('='))
            .map_err(|_| BewitError::Encoding)?;
        let raw = String::from_utf8(raw).map_err(|_| BewitError::Encoding)?;
        let parts: Vec<&str> = raw.split('\\').collect();
        let [id, exp, mac, ext] = parts.as_slice() else {
            return Err(BewitError::Malformed);
        };
        if id.is_empty() || mac.is_empty() {
            return Err(BewitError::Malformed);
        }
        Ok(Self {
            id: id.to_string(),
            exp: exp.parse().map_err(|_| BewitError::InvalidExpiry)?,
            mac: mac.to_string(),
            ext: ext.to_string(),
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.exp
    }
}

/// Mint a signed URL granting a single GET of `target` for `ttl`.
///
/// Permanent credentials first derive temporary credentials restricted to
/// `scopes`; the bewit is signed with those. Credentials that already carry a
/// certificate are always refused.
pub fn mint<S: MacSigner + ?Sized>(
    signer: &S,
    credentials: &Credentials,
    scopes: &ScopeSet,
    ttl: Duration,
    target: &str,
    now: DateTime<Utc>,
) -> Result<Url, MintError> {
    if credentials.is_temporary() {
        return Err(MintError::Forbidden);
    }

    let temp = credentials.create_temporary_credentials(signer, now, ttl, scopes, scopes)?;

    let invalid = |reason: String| MintError::InvalidUrl {
        url: target.to_string(),
        reason,
    };
    let mut url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;
    // A bare `?` does not survive stripping the bewit back off.
    if url.query() == Some("") {
        url.set_query(None);
    }
    let exp = (now + to_chrono(ttl)).timestamp();
    let ext = delegation_ext(&temp, &ScopeSet::empty()).map_err(|e| invalid(e.to_string()))?;
    let bewit = Bewit::sign(signer, &temp, &url, exp, ext).map_err(|e| invalid(e.to_string()))?;

    url.query_pairs_mut().append_pair(BEWIT_PARAM, &bewit.encode());
    Ok(url)
}

/// Check a bewit URL as the relying party would, given the access token of
/// the bewit's client id.
pub fn verify<S: MacSigner + ?Sized>(
    signer: &S,
    access_token: &str,
    url: &Url,
    now: DateTime<Utc>,
) -> Result<Bewit, BewitError> {
    let (stripped, token) = strip_bewit(url);
    let bewit = Bewit::decode(&token.ok_or(BewitError::Missing)?)?;

    let artifacts = Artifacts::for_request("GET", &stripped, bewit.exp)?.with_ext(bewit.ext.clone());
    let expected = artifacts.mac(signer, access_token, MacType::Bewit);
    if !constant_time_eq(expected.as_bytes(), bewit.mac.as_bytes()) {
        return Err(BewitError::InvalidMac);
    }
    if bewit.is_expired_at(now) {
        return Err(BewitError::Expired(bewit.exp));
    }
    Ok(bewit)
}

/// Split the bewit parameter off `url`. The remaining query is kept byte for
/// byte, since that is what was signed.
fn strip_bewit(url: &Url) -> (Url, Option<String>) {
    let Some(query) = url.query() else {
        return (url.clone(), None);
    };

    let prefix = format!("{BEWIT_PARAM}=");
    let mut token = None;
    let rest: Vec<&str> = query
        .split('&')
        .filter(|pair| match pair.strip_prefix(&prefix) {
            Some(value) if token.is_none() => {
                token = Some(value.to_string());
                false
            }
            _ => true,
        })
        .collect();

    let mut stripped = url.clone();
    stripped.set_query((!rest.is_empty()).then(|| rest.join("&")).as_deref());
    (stripped, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Certificate;
    use crate::mac::HmacSha256;
    use chrono::TimeZone;

    const TARGET: &str = "https://queue.example/v1/task/ABC/artifacts/foo";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    fn permanent() -> Credentials {
        Credentials::new("proxy", "permanent-secret")
    }

    fn artifact_scopes() -> ScopeSet {
        ScopeSet::new(["queue:get-artifact:*"])
    }

    fn bewit_of(url: &Url) -> Bewit {
        let token = url
            .query_pairs()
            .find(|(k, _)| k == BEWIT_PARAM)
            .map(|(_, v)| v.into_owned())
            .unwrap();
        Bewit::decode(&token).unwrap()
    }

    /// The temporary access token is recoverable from the certificate seed,
    /// which is how a relying party holding the permanent secret checks it.
    fn temp_token(bewit: &Bewit) -> String {
        let ext: serde_json::Value =
            serde_json::from_slice(&base64::engine::general_purpose::STANDARD.decode(&bewit.ext).unwrap())
                .unwrap();
        let cert: Certificate = serde_json::from_value(ext["certificate"].clone()).unwrap();
        URL_SAFE_NO_PAD.encode(HmacSha256.mac(b"permanent-secret", cert.seed.as_bytes()))
    }

    #[test]
    fn minted_url_keeps_target_and_appends_bewit() {
        let url = mint(&HmacSha256, &permanent(), &artifact_scopes(), DEFAULT_BEWIT_TTL, TARGET, now()).unwrap();
        assert!(url.as_str().starts_with(&format!("{TARGET}?bewit=")));

        let bewit = bewit_of(&url);
        assert_eq!(bewit.id, "proxy");
        assert_eq!(bewit.exp, now().timestamp() + 3600);
    }

    #[test]
    fn existing_query_parameters_are_preserved() {
        let target = format!("{TARGET}?a=1&b=two");
        let url = mint(&HmacSha256, &permanent(), &artifact_scopes(), DEFAULT_BEWIT_TTL, &target, now()).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("a".to_string(), "1".to_string()));
        assert_eq!(pairs[1], ("b".to_string(), "two".to_string()));
        assert_eq!(pairs[2].0, BEWIT_PARAM);
    }

    #[test]
    fn target_with_empty_query_still_verifies() {
        let target = format!("{TARGET}?");
        let url = mint(&HmacSha256, &permanent(), &artifact_scopes(), DEFAULT_BEWIT_TTL, &target, now()).unwrap();
        assert!(url.as_str().starts_with(&format!("{TARGET}?bewit=")));

        let token = temp_token(&bewit_of(&url));
        assert!(verify(&HmacSha256, &token, &url, now()).is_ok());
    }

    #[test]
    fn minted_bewit_verifies_until_expiry_and_not_after() {
        let url = mint(&HmacSha256, &permanent(), &artifact_scopes(), DEFAULT_BEWIT_TTL, TARGET, now()).unwrap();
        let token = temp_token(&bewit_of(&url));

        let at_expiry = now() + chrono::Duration::hours(1);
        assert!(verify(&HmacSha256, &token, &url, now()).is_ok());
        assert!(verify(&HmacSha256, &token, &url, at_expiry).is_ok());

        let after = at_expiry + chrono::Duration::seconds(1);
        assert_eq!(
            verify(&HmacSha256, &token, &url, after),
            Err(BewitError::Expired(now().timestamp() + 3600))
        );
    }

    #[test]
    fn bewit_is_bound_to_its_url() {
        let url = mint(&HmacSha256, &permanent(), &artifact_scopes(), DEFAULT_BEWIT_TTL, TARGET, now()).unwrap();
        let token = temp_token(&bewit_of(&url));

        let mut other = Url::parse("https://queue.example/v1/task/ABC/artifacts/bar").unwrap();
        other.set_query(url.query());
        assert_eq!(verify(&HmacSha256, &token, &other, now()), Err(BewitError::InvalidMac));
        assert_eq!(
            verify(&HmacSha256, "permanent-secret", &url, now()),
            Err(BewitError::InvalidMac)
        );
    }

    #[test]
    fn temporary_credentials_are_always_forbidden() {
        let temp = permanent().with_certificate(r#"{"version":1}"#);
        for scopes in [ScopeSet::empty(), artifact_scopes()] {
            for target in [TARGET, "not a url"] {
                assert_eq!(
                    mint(&HmacSha256, &temp, &scopes, DEFAULT_BEWIT_TTL, target, now()),
                    Err(MintError::Forbidden)
                );
            }
        }
    }

    #[test]
    fn malformed_target_is_a_mint_error() {
        let err = mint(&HmacSha256, &permanent(), &artifact_scopes(), DEFAULT_BEWIT_TTL, "/relative/path", now())
            .unwrap_err();
        assert!(matches!(err, MintError::InvalidUrl { .. }));
    }

    #[test]
    fn derivation_failure_is_a_mint_error() {
        let err = mint(&HmacSha256, &permanent(), &artifact_scopes(), Duration::ZERO, TARGET, now()).unwrap_err();
        assert_eq!(err, MintError::Derivation(CredentialsError::InvalidDuration));
    }

    #[test]
    fn decode_rejects_malformed_tokens() {
        assert_eq!(Bewit::decode("!!!"), Err(BewitError::Encoding));
        assert_eq!(
            Bewit::decode(&URL_SAFE_NO_PAD.encode("id\\1\\mac")),
            Err(BewitError::Malformed)
        );
        assert_eq!(
            Bewit::decode(&URL_SAFE_NO_PAD.encode("id\\soon\\mac\\")),
            Err(BewitError::InvalidExpiry)
        );
        assert_eq!(
            verify(&HmacSha256, "k", &Url::parse(TARGET).unwrap(), now()),
            Err(BewitError::Missing)
        );
    }

    #[test]
    fn encode_decode_preserves_fields() {
        let bewit = Bewit {
            id: "client".into(),
            exp: 42,
            mac: "bWFj".into(),
            ext: String::new(),
        };
        assert_eq!(Bewit::decode(&bewit.encode()).unwrap(), bewit);
    }
}
