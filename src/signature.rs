//! HMAC-SHA256 signing and verification of webhook payloads.
//!
//! Signatures cover the exact payload bytes that go on the wire. The header
//! value format is `sha256=<hex>`, GitHub-style.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm tag prefixed to every signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the signature header value for a payload.
///
/// Deterministic: identical `(payload, secret)` always yields the identical
/// string.
pub fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header value against a payload.
///
/// Uses a constant-time comparison; a malformed header returns false rather
/// than erroring.
pub fn verify(payload: &[u8], signature: &str, secret: &str) -> bool {
    let Some(provided_hex) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(provided) = hex::decode(provided_hex) else {
        return false;
    };

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    let computed = mac.finalize().into_bytes();

    provided.ct_eq(computed.as_slice()).into()
}
