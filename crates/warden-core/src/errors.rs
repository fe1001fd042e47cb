//! Engine error taxonomy.

use thiserror::Error;

use warden_crypto::EnvelopeError;
use warden_proto::CodecError;

use crate::gateway::GatewayError;

/// Failures surfacing at the dispatch boundary. Transport errors on a
/// required send are fatal for the session; codec and envelope errors
/// are recorded but the offending message is merely dropped.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transport: {0}")]
    Transport(#[from] GatewayError),
    #[error("malformed payload: {0}")]
    Malformed(#[from] CodecError),
    #[error("envelope: {0}")]
    Envelope(#[from] EnvelopeError),
}
