//! Hybrid envelope decryption.
//!
//! The encrypted inventory response carries three `|`-separated base64
//! segments: the RSA-encrypted symmetric key, the CBC initialization
//! vector, and the AES-encrypted body. Any step failure is a hard
//! `EnvelopeError`; the caller must treat it as a dropped message and
//! never retry the decryption transparently.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use rsa::traits::PublicKeyParts;
use rsa::Pkcs1v15Encrypt;
use thiserror::Error;
use tracing::debug;

use warden_proto::WireMessage;

use crate::keys::{decode_b64, KeyMaterial};
use crate::verify::ENCRYPTED_CHANNEL_SENTINEL;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Failures opening a hybrid envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("decryption key not provisioned")]
    Disabled,
    #[error("expected 3 envelope segments, got {0}")]
    SegmentCount(usize),
    #[error("invalid base64 in {0} segment")]
    Base64(&'static str),
    #[error("encrypted key segment is {len} bytes, exceeds modulus size {max}")]
    OversizedKey { len: usize, max: usize },
    #[error("asymmetric key decryption failed")]
    KeyDecrypt,
    #[error("unsupported symmetric key length {0}")]
    BadSymmetricKeyLength(usize),
    #[error("symmetric body decryption failed")]
    BodyDecrypt,
    #[error("decrypted body is not valid UTF-8")]
    NotUtf8,
}

impl KeyMaterial {
    /// Open a three-segment hybrid envelope and return the plaintext.
    pub fn open_envelope(&self, ciphertext: &str) -> Result<String, EnvelopeError> {
        let key = self.decrypt_key.as_ref().ok_or(EnvelopeError::Disabled)?;

        let segments: Vec<&str> = ciphertext.split('|').collect();
        if segments.len() != 3 {
            return Err(EnvelopeError::SegmentCount(segments.len()));
        }

        let enc_key = decode_b64(segments[0]).ok_or(EnvelopeError::Base64("key"))?;
        let iv = decode_b64(segments[1]).ok_or(EnvelopeError::Base64("iv"))?;
        let body = decode_b64(segments[2]).ok_or(EnvelopeError::Base64("body"))?;

        let max = key.size();
        if enc_key.len() > max {
            return Err(EnvelopeError::OversizedKey {
                len: enc_key.len(),
                max,
            });
        }

        let sym_key = key
            .decrypt(Pkcs1v15Encrypt, &enc_key)
            .map_err(|_| EnvelopeError::KeyDecrypt)?;

        let plaintext = match sym_key.len() {
            16 => Aes128CbcDec::new_from_slices(&sym_key, &iv)
                .map_err(|_| EnvelopeError::BodyDecrypt)?
                .decrypt_padded_vec_mut::<Pkcs7>(&body)
                .map_err(|_| EnvelopeError::BodyDecrypt)?,
            24 => Aes192CbcDec::new_from_slices(&sym_key, &iv)
                .map_err(|_| EnvelopeError::BodyDecrypt)?
                .decrypt_padded_vec_mut::<Pkcs7>(&body)
                .map_err(|_| EnvelopeError::BodyDecrypt)?,
            32 => Aes256CbcDec::new_from_slices(&sym_key, &iv)
                .map_err(|_| EnvelopeError::BodyDecrypt)?
                .decrypt_padded_vec_mut::<Pkcs7>(&body)
                .map_err(|_| EnvelopeError::BodyDecrypt)?,
            n => return Err(EnvelopeError::BadSymmetricKeyLength(n)),
        };

        String::from_utf8(plaintext).map_err(|_| EnvelopeError::NotUtf8)
    }
}

/// Reconstruct an inventory response from decrypted envelope plaintext.
///
/// The body is `key=value` fields joined by `|`, e.g.
/// `checkId=chk-1a2b|mods=sodium:0.5,lithium:0.12`. The result carries
/// the encrypted-channel sentinel signature and a receipt-time
/// timestamp so it re-enters the normal response path.
pub fn decode_inner_response(plaintext: &str, now_ms: i64) -> WireMessage {
    let mut check_id = None;
    let mut mods = Vec::new();
    for field in plaintext.split('|') {
        if let Some(v) = field.strip_prefix("checkId=") {
            check_id = Some(v.to_string());
        } else if let Some(v) = field.strip_prefix("mods=") {
            mods = v
                .split(',')
                .filter(|m| !m.is_empty())
                .map(|m| m.to_string())
                .collect();
        } else if !field.is_empty() {
            debug!(field, "ignoring unknown envelope field");
        }
    }
    WireMessage::ResponseModList {
        check_id,
        mods,
        signature: Some(ENCRYPTED_CHANNEL_SENTINEL.to_string()),
        timestamp: Some(now_ms),
    }
}
