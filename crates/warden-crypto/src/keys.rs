//! Key material loading.
//!
//! Keys are provisioned out of band as base64 DER blobs (PKCS#8 for
//! the private key, SPKI for the public key). A missing, placeholder,
//! or unparseable blob disables the corresponding operation rather
//! than blocking startup.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::{info, warn};

/// Marker embedded in unprovisioned key slots of shipped builds.
const PLACEHOLDER_MARKER: &str = "PLACEHOLDER";

/// Process-wide, read-only credential state. Loaded once at startup,
/// no teardown.
#[derive(Clone)]
pub struct KeyMaterial {
    pub(crate) decrypt_key: Option<RsaPrivateKey>,
    pub(crate) verify_key: Option<RsaPublicKey>,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("decryption_enabled", &self.decrypt_key.is_some())
            .field("validation_enabled", &self.verify_key.is_some())
            .finish()
    }
}

impl KeyMaterial {
    /// Key material with both operations disabled (open/advisory mode).
    pub fn disabled() -> Self {
        Self {
            decrypt_key: None,
            verify_key: None,
        }
    }

    /// Load both halves from base64 DER. Either half failing to load
    /// degrades that half to disabled, logged once here.
    pub fn from_base64(private_key_b64: Option<&str>, public_key_b64: Option<&str>) -> Self {
        let decrypt_key = private_key_b64.and_then(|b64| match load_private(b64) {
            Ok(key) => Some(key),
            Err(reason) => {
                warn!(reason, "no usable decryption key; envelope decryption disabled");
                None
            }
        });
        let verify_key = public_key_b64.and_then(|b64| match load_public(b64) {
            Ok(key) => Some(key),
            Err(reason) => {
                warn!(reason, "no usable verifying key; signature validation disabled");
                None
            }
        });
        if decrypt_key.is_some() || verify_key.is_some() {
            info!(
                decryption = decrypt_key.is_some(),
                validation = verify_key.is_some(),
                "key material loaded"
            );
        }
        Self {
            decrypt_key,
            verify_key,
        }
    }

    /// Build from already-parsed keys (tests and embedders that manage
    /// their own key storage).
    pub fn from_keys(decrypt_key: Option<RsaPrivateKey>, verify_key: Option<RsaPublicKey>) -> Self {
        Self {
            decrypt_key,
            verify_key,
        }
    }

    /// Whether signature and freshness validation are active.
    pub fn validation_enabled(&self) -> bool {
        self.verify_key.is_some()
    }

    /// Whether envelope decryption is active.
    pub fn decryption_enabled(&self) -> bool {
        self.decrypt_key.is_some()
    }
}

fn load_private(b64: &str) -> Result<RsaPrivateKey, &'static str> {
    if b64.contains(PLACEHOLDER_MARKER) {
        return Err("placeholder private key");
    }
    let der = decode_b64(b64).ok_or("private key is not valid base64")?;
    RsaPrivateKey::from_pkcs8_der(&der).map_err(|_| "private key is not valid PKCS#8 DER")
}

fn load_public(b64: &str) -> Result<RsaPublicKey, &'static str> {
    if b64.contains(PLACEHOLDER_MARKER) {
        return Err("placeholder public key");
    }
    let der = decode_b64(b64).ok_or("public key is not valid base64")?;
    RsaPublicKey::from_public_key_der(&der).map_err(|_| "public key is not valid SPKI DER")
}

/// Base64 decode tolerating embedded whitespace (keys are often pasted
/// with line breaks).
pub(crate) fn decode_b64(s: &str) -> Option<Vec<u8>> {
    let compact: String = s.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64.decode(compact.as_bytes()).ok()
}
