//! Request signing for the cross-site protocol.
//!
//! Every HTTP call between Primary and Secondary carries a timestamp, a
//! single-use nonce, and an HMAC-SHA256 signature over a canonical string:
//!
//! ```text
//! UPPER(method) \n path \n timestamp \n nonce \n hex(sha256(body))
//! ```
//!
//! Protocol rule: only the route path is signed, never the query string.
//! Both ends of the protocol are this crate, so the rule holds by
//! construction on outbound calls and is enforced on inbound verification.
//!
//! This is a shared-secret scheme; Primary and each Secondary are
//! configured with the same value out-of-band. Replay protection (nonce
//! bookkeeping) lives in the signature middleware, which has database
//! access; this module is pure.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the Unix timestamp of the request.
pub const HEADER_TIMESTAMP: &str = "x-ms-timestamp";

/// Header carrying the single-use request nonce.
pub const HEADER_NONCE: &str = "x-ms-nonce";

/// Header carrying the base64 HMAC signature.
pub const HEADER_SIGNATURE: &str = "x-ms-signature";

/// Maximum tolerated clock skew between sites, in seconds.
pub const TIMESTAMP_WINDOW_SECS: i64 = 300;

/// How long a nonce is remembered for replay rejection, in seconds.
pub const NONCE_TTL_SECS: i64 = 600;

/// Build the canonical string covered by the signature.
fn canonical_string(method: &str, path: &str, timestamp: &str, nonce: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!(
        "{}\n{}\n{}\n{}\n{}",
        method.to_uppercase(),
        path,
        timestamp,
        nonce,
        hex::encode(hasher.finalize())
    )
}

/// Sign a request. Returns the base64-encoded HMAC-SHA256 signature.
pub fn sign(
    method: &str,
    path: &str,
    timestamp: &str,
    nonce: &str,
    body: &[u8],
    secret: &str,
) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(canonical_string(method, path, timestamp, nonce, body).as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Verify a signature and the timestamp window.
///
/// The comparison is constant-time (`Mac::verify_slice`). `now` is passed
/// in rather than read from the clock so verification is deterministic
/// under test. Nonce replay is checked separately by the middleware.
pub fn verify(
    signature: &str,
    method: &str,
    path: &str,
    timestamp: &str,
    nonce: &str,
    body: &[u8],
    secret: &str,
    now: i64,
) -> bool {
    let Ok(sig_bytes) = STANDARD.decode(signature) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(canonical_string(method, path, timestamp, nonce, body).as_bytes());
    if mac.verify_slice(&sig_bytes).is_err() {
        return false;
    }

    // Signature is good; now bound the replay window by wall clock.
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    (now - ts).abs() <= TIMESTAMP_WINDOW_SECS
}

/// Hash a nonce for storage in the replay cache.
///
/// The raw nonce never hits the database; only its digest is stored.
pub fn nonce_hash(nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}
