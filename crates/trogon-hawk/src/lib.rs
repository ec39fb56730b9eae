//! # trogon-hawk
//!
//! Hawk signing for Taskcluster-style credentials, without any I/O.
//!
//! - [`mac`]: the injected MAC primitive ([`MacSigner`], [`HmacSha256`]).
//! - [`scopes`]: [`ScopeSet`] and `*`-suffix scope satisfaction.
//! - [`credentials`]: [`Credentials`] and temporary credential certificates.
//! - [`hawk`]: normalized strings and `Authorization: Hawk` headers.
//! - [`delegate`]: delegated authorization headers and the [`Delegator`].
//! - [`bewit`]: minting and verifying bewit URLs.
//!
//! ```rust
//! use chrono::Utc;
//! use trogon_hawk::{Credentials, Delegator, HmacSha256, ScopeSet, bewit::DEFAULT_BEWIT_TTL};
//!
//! let delegator = Delegator::new(
//!     Credentials::new("project/proxy", "secret"),
//!     ScopeSet::new(["queue:get-artifact:*"]),
//!     HmacSha256,
//! );
//!
//! let url = url::Url::parse("https://queue.example/v1/task/ABC").unwrap();
//! let header = delegator.sign("GET", &url, Utc::now()).unwrap();
//! assert!(header.starts_with("Hawk id=\"project/proxy\""));
//!
//! let signed = delegator
//!     .mint_bewit(DEFAULT_BEWIT_TTL, "https://queue.example/v1/task/ABC/artifacts/foo", Utc::now())
//!     .unwrap();
//! assert!(signed.query().unwrap().starts_with("bewit="));
//! ```

pub mod bewit;
pub mod credentials;
pub mod delegate;
pub mod hawk;
pub mod mac;
pub mod scopes;

pub use bewit::{Bewit, BewitError, MintError};
pub use credentials::{Certificate, Credentials, CredentialsError};
pub use delegate::{Delegator, SignError};
pub use hawk::{AuthorizationHeader, HeaderError};
pub use mac::{HmacSha256, MacSigner};
pub use scopes::ScopeSet;
