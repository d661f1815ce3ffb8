//! Webhook authenticity: HMAC-SHA256 over the raw request body.
//!
//! The regulator signs each delivery with a shared secret; we recompute and
//! compare in constant time so the check leaks nothing about the expected
//! signature.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `body` under `secret`.
pub fn compute_signature(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex signature header against the raw body. Constant-time on the
/// signature bytes; malformed hex simply fails.
pub fn verify_signature(secret: &[u8], body: &[u8], provided_hex: &str) -> bool {
    let provided = match hex::decode(provided_hex.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    if provided.len() != expected.len() {
        return false;
    }
    expected.ct_eq(provided.as_slice()).into()
}
