//! HMAC-SHA256 request/callback signing.
//!
//! Both directions use the same scheme: the signature covers the raw body
//! bytes and the unix-seconds timestamp, joined by `|`, and is rendered as
//! `sha256=<lowercase hex>`. Verification is fail-closed: anything that
//! does not parse, and any timestamp outside the skew window, is a plain
//! `false`, never an error the caller could mishandle.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{WebhookError, WebhookResult};

type HmacSha256 = Hmac<Sha256>;

/// Prefix of every signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Signs and verifies bodies with a shared secret.
#[derive(Clone)]
pub struct SignatureCodec {
    secret: String,
}

impl SignatureCodec {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self) -> WebhookResult<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| WebhookError::config(format!("Invalid HMAC key: {}", e)))
    }

    /// Sign a body for the given unix-seconds timestamp.
    pub fn sign(&self, body: &[u8], timestamp: i64) -> WebhookResult<String> {
        let mut mac = self.mac()?;
        mac.update(body);
        mac.update(b"|");
        mac.update(timestamp.to_string().as_bytes());
        Ok(format!("{}{:x}", SIGNATURE_PREFIX, mac.finalize().into_bytes()))
    }

    /// Verify a signature header against a body and its timestamp header.
    ///
    /// `timestamp` is the exact header string the sender signed; it must
    /// parse as unix seconds and lie within `max_skew` of now.
    pub fn verify(&self, body: &[u8], timestamp: &str, signature: &str, max_skew: Duration) -> bool {
        self.verify_at(body, timestamp, signature, max_skew, Utc::now().timestamp())
    }

    fn verify_at(
        &self,
        body: &[u8],
        timestamp: &str,
        signature: &str,
        max_skew: Duration,
        now: i64,
    ) -> bool {
        let Some(hex_part) = signature.strip_prefix(SIGNATURE_PREFIX) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(hex_part) else {
            return false;
        };
        let Ok(ts) = timestamp.parse::<i64>() else {
            return false;
        };
        if now.abs_diff(ts) > max_skew.as_secs() {
            return false;
        }
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(body);
        mac.update(b"|");
        mac.update(timestamp.as_bytes());
        // Constant-time comparison
        mac.verify_slice(&sig_bytes).is_ok()
    }
}

impl fmt::Debug for SignatureCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret
        f.debug_struct("SignatureCodec")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKEW: Duration = Duration::from_secs(300);

    fn codec() -> SignatureCodec {
        SignatureCodec::new("test-secret")
    }

    #[test]
    fn sign_verify_round_trip() {
        let codec = codec();
        let body = br#"{"versionId":"v-1"}"#;
        let ts = Utc::now().timestamp();
        let sig = codec.sign(body, ts).unwrap();
        assert!(sig.starts_with(SIGNATURE_PREFIX));
        assert!(codec.verify(body, &ts.to_string(), &sig, SKEW));
    }

    #[test]
    fn rejects_tampered_body() {
        let codec = codec();
        let ts = Utc::now().timestamp();
        let sig = codec.sign(b"payload-a", ts).unwrap();
        assert!(!codec.verify(b"payload-b", &ts.to_string(), &sig, SKEW));
    }

    #[test]
    fn rejects_tampered_signature() {
        let codec = codec();
        let ts = Utc::now().timestamp();
        let sig = codec.sign(b"payload", ts).unwrap();
        // Flip the last hex digit
        let mut tampered = sig.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert!(!codec.verify(b"payload", &ts.to_string(), &tampered, SKEW));
    }

    #[test]
    fn rejects_wrong_secret() {
        let ts = Utc::now().timestamp();
        let sig = SignatureCodec::new("secret-a").sign(b"payload", ts).unwrap();
        assert!(!SignatureCodec::new("secret-b").verify(b"payload", &ts.to_string(), &sig, SKEW));
    }

    #[test]
    fn rejects_missing_or_wrong_prefix() {
        let codec = codec();
        let ts = Utc::now().timestamp();
        let sig = codec.sign(b"payload", ts).unwrap();
        let bare = sig.strip_prefix(SIGNATURE_PREFIX).unwrap();
        assert!(!codec.verify(b"payload", &ts.to_string(), bare, SKEW));
        assert!(!codec.verify(b"payload", &ts.to_string(), &format!("md5={}", bare), SKEW));
    }

    #[test]
    fn rejects_invalid_hex() {
        let codec = codec();
        let ts = Utc::now().timestamp();
        assert!(!codec.verify(b"payload", &ts.to_string(), "sha256=zz-not-hex", SKEW));
    }

    #[test]
    fn rejects_unparsable_timestamp() {
        let codec = codec();
        let ts = Utc::now().timestamp();
        let sig = codec.sign(b"payload", ts).unwrap();
        assert!(!codec.verify(b"payload", "yesterday", &sig, SKEW));
        assert!(!codec.verify(b"payload", "", &sig, SKEW));
    }

    #[test]
    fn rejects_timestamps_outside_skew_in_both_directions() {
        let codec = codec();
        let now = 1_700_000_000i64;

        for offset in [-301i64, 301] {
            let ts = now + offset;
            let sig = codec.sign(b"payload", ts).unwrap();
            assert!(
                !codec.verify_at(b"payload", &ts.to_string(), &sig, SKEW, now),
                "offset {} should be rejected",
                offset
            );
        }
    }

    #[test]
    fn accepts_timestamps_on_the_skew_boundary() {
        let codec = codec();
        let now = 1_700_000_000i64;

        for offset in [-300i64, 0, 300] {
            let ts = now + offset;
            let sig = codec.sign(b"payload", ts).unwrap();
            assert!(
                codec.verify_at(b"payload", &ts.to_string(), &sig, SKEW, now),
                "offset {} should be accepted",
                offset
            );
        }
    }
}
