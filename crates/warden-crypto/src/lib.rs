//! Warden Crypto - the authentication layer of the verification protocol.
//!
//! Two independent credential pairs, each independently enable-able:
//! a local RSA private key for opening hybrid envelopes, and the remote
//! party's RSA public key for verifying detached signatures. Absence of
//! either degrades that half of the layer to disabled instead of
//! failing startup; the degradation is logged once when keys load.
//!
//! Separating signing credentials from encryption credentials means a
//! compromise of the shared client-side signing secret cannot by itself
//! expose content meant only for the server.

#![forbid(unsafe_code)]

pub mod envelope;
pub mod keys;
pub mod verify;

pub use envelope::{decode_inner_response, EnvelopeError};
pub use keys::KeyMaterial;
pub use verify::{signature_input, ENCRYPTED_CHANNEL_SENTINEL, FRESHNESS_WINDOW_MS};
