//! # Checksum — Keyed Integrity Codes for Metrics
//!
//! HMAC-SHA256 over a metric's canonical string (see [`Metric::canonical`]),
//! hex-encoded. The agent signs every metric before sending; the server
//! verifies the incoming checksum before a write is accepted and re-signs the
//! merged value so that reads return a checksum consistent with storage.
//!
//! An empty key disables signing and verification entirely. This is a normal
//! operating mode: [`Signer::sign`] then yields `None` and
//! [`Signer::verify`] accepts everything.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::StoreError;
use crate::metric::Metric;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `message` under `key`.
pub fn sign(message: &str, key: &[u8]) -> String {
    // HMAC accepts keys of any length, so the error arm is unreachable.
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return String::new();
    };
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of `digest` (hex) against the HMAC of `message`.
/// A digest that is not valid hex never verifies.
pub fn verify(message: &str, digest: &str, key: &[u8]) -> bool {
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(message.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Shared-secret holder used by the agent and every repository backend.
#[derive(Clone, Default)]
pub struct Signer {
    key: Vec<u8>,
}

impl Signer {
    pub fn new(key: &str) -> Self {
        Signer {
            key: key.as_bytes().to_vec(),
        }
    }

    pub fn disabled() -> Self {
        Signer::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.key.is_empty()
    }

    /// Checksum for `metric`, or `None` when signing is disabled or the
    /// metric has no canonical form.
    pub fn sign(&self, metric: &Metric) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        metric.canonical().map(|c| sign(&c, &self.key))
    }

    /// Accept `metric` only if its `hash` matches the canonical form as sent.
    pub fn verify(&self, metric: &Metric) -> Result<(), StoreError> {
        if !self.is_enabled() {
            return Ok(());
        }
        let ok = match (metric.canonical(), metric.hash.as_deref()) {
            (Some(canonical), Some(digest)) => verify(&canonical, digest, &self.key),
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(StoreError::InvalidChecksum {
                id: metric.id.clone(),
            })
        }
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RFC 4231 test case 2.
    #[test]
    fn sign_matches_rfc4231_vector() {
        assert_eq!(
            sign("what do ya want for nothing?", b"Jefe"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verify_accepts_own_signature() {
        let digest = sign("x:gauge:1.000000", b"k");
        assert!(verify("x:gauge:1.000000", &digest, b"k"));
    }

    #[test]
    fn verify_rejects_wrong_key_and_garbage() {
        let digest = sign("x:gauge:1.000000", b"k");
        assert!(!verify("x:gauge:1.000000", &digest, b"other"));
        assert!(!verify("x:gauge:1.000000", "not-hex", b"k"));
        assert!(!verify("x:gauge:2.000000", &digest, b"k"));
    }

    #[test]
    fn disabled_signer_skips_everything() {
        let signer = Signer::disabled();
        let mut m = Metric::gauge("x", 1.0);
        m.hash = Some("tampered".into());
        assert!(signer.sign(&m).is_none());
        assert!(signer.verify(&m).is_ok());
    }

    #[test]
    fn signer_roundtrip_and_tamper() {
        let signer = Signer::new("k");
        let mut m = Metric::counter("c", 10);
        m.hash = signer.sign(&m);
        assert!(signer.verify(&m).is_ok());

        m.delta = Some(11);
        assert!(matches!(
            signer.verify(&m),
            Err(StoreError::InvalidChecksum { ref id }) if id == "c"
        ));
    }

    #[test]
    fn missing_hash_fails_when_enabled() {
        let signer = Signer::new("k");
        assert!(signer.verify(&Metric::gauge("x", 1.0)).is_err());
    }
}
