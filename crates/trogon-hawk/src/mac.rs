//! The MAC primitive every signature in this crate is built on.
//!
//! Signing code never calls HMAC directly; it goes through [`MacSigner`] so
//! callers can swap in a fake primitive in tests.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256Inner = Hmac<Sha256>;

/// A keyed message authentication function: `(secret, message) -> tag`.
pub trait MacSigner: Send + Sync {
    fn mac(&self, key: &[u8], message: &[u8]) -> Vec<u8>;
}

/// HMAC-SHA256, the primitive Hawk and Taskcluster certificates use.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256;

impl MacSigner for HmacSha256 {
    fn mac(&self, key: &[u8], message: &[u8]) -> Vec<u8> {
        let Ok(mut mac) = HmacSha256Inner::new_from_slice(key) else {
            unreachable!("HMAC accepts keys of any length");
        };
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }
}

impl<F> MacSigner for F
where
    F: Fn(&[u8], &[u8]) -> Vec<u8> + Send + Sync,
{
    fn mac(&self, key: &[u8], message: &[u8]) -> Vec<u8> {
        self(key, message)
    }
}

/// Standard (padded) base64 of the MAC, as carried in Hawk headers and bewits.
pub fn mac_base64<S: MacSigner + ?Sized>(signer: &S, key: &[u8], message: &[u8]) -> String {
    STANDARD.encode(signer.mac(key, message))
}

/// Compare two MAC strings without short-circuiting on the first mismatch.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha256_matches_rfc4231_case_2() {
        let tag = HmacSha256.mac(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn closures_act_as_signers() {
        let fake = |key: &[u8], msg: &[u8]| [key, b"|".as_slice(), msg].concat();
        assert_eq!(fake.mac(b"k", b"m"), b"k|m".to_vec());
        assert_eq!(mac_base64(&fake, b"k", b"m"), STANDARD.encode(b"k|m"));
    }

    #[test]
    fn different_keys_produce_different_tags() {
        assert_ne!(HmacSha256.mac(b"a", b"msg"), HmacSha256.mac(b"b", b"msg"));
    }

    #[test]
    fn constant_time_eq_behaves_like_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
