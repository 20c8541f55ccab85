//! Webhook signature verification
//!
//! Providers sign status callbacks with HMAC-SHA256 over the raw body
//! (`X-Hub-Signature-256: sha256=<hex>`).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify an `X-Hub-Signature-256` style header value against the raw body.
///
/// Returns false on any malformed header rather than erroring; the caller
/// treats a failed verification as an unauthenticated request.
pub fn verify_signature(secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some(hex_digest) = header_value.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);

    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"provider_message_id":"wamid.1","status":"delivered"}"#;
        let header = sign("topsecret", body);
        assert!(verify_signature("topsecret", body, &header));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"payload";
        let header = sign("topsecret", body);
        assert!(!verify_signature("othersecret", body, &header));
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(!verify_signature("s", b"x", "md5=abcd"));
        assert!(!verify_signature("s", b"x", "sha256=zzzz"));
        assert!(!verify_signature("s", b"x", ""));
    }
}
