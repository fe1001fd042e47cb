//! Detached-signature and freshness verification.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::Pkcs1v15Sign;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::keys::KeyMaterial;

/// Sentinel signature value marking data that arrived over an
/// already-authenticated encrypted channel, where a second signature
/// would be redundant. Always accepted.
pub const ENCRYPTED_CHANNEL_SENTINEL: &str = "ENCRYPTED_CHANNEL";

/// Maximum tolerated skew between a message timestamp and receipt
/// time, in milliseconds. One hour: replay protection here is
/// intentionally coarse (no nonce cache), and client clocks drift.
pub const FRESHNESS_WINDOW_MS: i64 = 3_600_000;

impl KeyMaterial {
    /// Verify a detached SHA256-with-RSA signature over `data`.
    ///
    /// Always true when validation is disabled or when the sentinel
    /// value marks an encrypted-channel payload.
    pub fn verify_signature(&self, data: &str, signature_b64: &str) -> bool {
        let key = match &self.verify_key {
            Some(k) => k,
            None => return true,
        };
        if signature_b64 == ENCRYPTED_CHANNEL_SENTINEL {
            return true;
        }
        let sig = match crate::keys::decode_b64(signature_b64) {
            Some(s) => s,
            None => {
                debug!("signature is not valid base64");
                return false;
            }
        };
        let digest = Sha256::digest(data.as_bytes());
        key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &sig)
            .is_ok()
    }

    /// True iff `timestamp_ms` is within the freshness window of
    /// `now_ms`. Always true when validation is disabled.
    pub fn verify_freshness(&self, timestamp_ms: i64, now_ms: i64) -> bool {
        if self.verify_key.is_none() {
            return true;
        }
        (now_ms - timestamp_ms).abs() < FRESHNESS_WINDOW_MS
    }
}

/// Build the canonical signature input for an inventory response:
/// `checkId|raw1,raw2,...` over the raw (versioned) entries.
pub fn signature_input(check_id: Option<&str>, raw_mods: &[String]) -> String {
    let mut out = String::from(check_id.unwrap_or("unknown"));
    out.push('|');
    out.push_str(&raw_mods.join(","));
    out
}
