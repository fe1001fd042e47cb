//! Wire message model.
//!
//! Every payload carries a `messageType` discriminator. Field order in
//! encoded output is fixed so the byte stream matches what deployed
//! clients expect; decoding tolerates reordering via the scanners.

use thiserror::Error;

use crate::scan;

/// Message type tags as they appear on the wire.
pub const TYPE_ANNOUNCE_PRESENCE: &str = "ANNOUNCE_PRESENCE";
pub const TYPE_ACKNOWLEDGE_PRESENCE: &str = "ACKNOWLEDGE_PRESENCE";
pub const TYPE_REQUEST_MODLIST: &str = "REQUEST_MODLIST";
pub const TYPE_RESPONSE_MODLIST: &str = "RESPONSE_MODLIST";
pub const TYPE_RESPONSE_MODLIST_ENCRYPTED: &str = "RESPONSE_MODLIST_ENCRYPTED";

/// Errors from decoding a wire payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,
    #[error("missing or unknown messageType")]
    Malformed,
}

/// An ephemeral protocol payload. Never persisted.
///
/// Per-field absence is not a decode error: list fields default to
/// empty and scalars to `None`. Callers decide whether absence is
/// fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// server -> client: asks the client to announce itself. Carried
    /// as an empty payload on the channel.
    PresenceRequest,
    /// client -> server: the companion module announces itself.
    AnnouncePresence {
        mod_id: Option<String>,
        version: Option<String>,
    },
    /// server -> client: presence accepted, proceed.
    AcknowledgePresence { status: String, server_id: String },
    /// server -> client: request the module inventory.
    RequestModList { check_id: String },
    /// client -> server: the module inventory, optionally signed.
    /// Entries in `mods` are raw `id:version` strings.
    ResponseModList {
        check_id: Option<String>,
        mods: Vec<String>,
        signature: Option<String>,
        timestamp: Option<i64>,
    },
    /// client -> server: inventory sealed in a three-segment envelope
    /// (`encKey|iv|body`, each base64).
    ResponseModListEncrypted { ciphertext: String },
}

impl WireMessage {
    /// Encode to the wire text form.
    pub fn encode(&self) -> String {
        match self {
            WireMessage::PresenceRequest => String::new(),
            WireMessage::AnnouncePresence { mod_id, version } => {
                let mut out = format!("{{\"messageType\":\"{}\"", TYPE_ANNOUNCE_PRESENCE);
                if let Some(id) = mod_id {
                    out.push_str(&format!(",\"modId\":\"{}\"", scan::escape(id)));
                }
                if let Some(v) = version {
                    out.push_str(&format!(",\"version\":\"{}\"", scan::escape(v)));
                }
                out.push('}');
                out
            }
            WireMessage::AcknowledgePresence { status, server_id } => format!(
                "{{\"messageType\":\"{}\",\"status\":\"{}\",\"serverId\":\"{}\"}}",
                TYPE_ACKNOWLEDGE_PRESENCE,
                scan::escape(status),
                scan::escape(server_id)
            ),
            WireMessage::RequestModList { check_id } => format!(
                "{{\"messageType\":\"{}\",\"checkId\":\"{}\"}}",
                TYPE_REQUEST_MODLIST,
                scan::escape(check_id)
            ),
            WireMessage::ResponseModList {
                check_id,
                mods,
                signature,
                timestamp,
            } => {
                let mut out = format!("{{\"messageType\":\"{}\"", TYPE_RESPONSE_MODLIST);
                if let Some(c) = check_id {
                    out.push_str(&format!(",\"checkId\":\"{}\"", scan::escape(c)));
                }
                out.push_str(",\"mods\":[");
                for (i, m) in mods.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push('"');
                    out.push_str(&scan::escape(m));
                    out.push('"');
                }
                out.push(']');
                if let Some(s) = signature {
                    out.push_str(&format!(",\"signature\":\"{}\"", scan::escape(s)));
                }
                if let Some(t) = timestamp {
                    out.push_str(&format!(",\"timestamp\":{}", t));
                }
                out.push('}');
                out
            }
            WireMessage::ResponseModListEncrypted { ciphertext } => format!(
                "{{\"messageType\":\"{}\",\"ciphertext\":\"{}\"}}",
                TYPE_RESPONSE_MODLIST_ENCRYPTED,
                scan::escape(ciphertext)
            ),
        }
    }

    /// Encode straight to channel bytes.
    pub fn encode_bytes(&self) -> Vec<u8> {
        self.encode().into_bytes()
    }

    /// Decode a raw channel payload.
    ///
    /// An empty payload is a presence request (the legacy wire form).
    /// A payload with no recognizable `messageType` is `Malformed`;
    /// everything else decodes with per-field tolerance.
    pub fn decode(payload: &[u8]) -> Result<WireMessage, CodecError> {
        if payload.is_empty() {
            return Ok(WireMessage::PresenceRequest);
        }
        let text = std::str::from_utf8(payload).map_err(|_| CodecError::NotUtf8)?;
        Self::decode_text(text)
    }

    /// Decode from already-validated text.
    pub fn decode_text(text: &str) -> Result<WireMessage, CodecError> {
        if text.is_empty() {
            return Ok(WireMessage::PresenceRequest);
        }
        let msg_type = scan::string_field(text, "messageType").ok_or(CodecError::Malformed)?;
        match msg_type.as_str() {
            TYPE_ANNOUNCE_PRESENCE => Ok(WireMessage::AnnouncePresence {
                mod_id: scan::string_field(text, "modId"),
                version: scan::string_field(text, "version"),
            }),
            TYPE_ACKNOWLEDGE_PRESENCE => Ok(WireMessage::AcknowledgePresence {
                status: scan::string_field(text, "status").unwrap_or_default(),
                server_id: scan::string_field(text, "serverId").unwrap_or_default(),
            }),
            TYPE_REQUEST_MODLIST => Ok(WireMessage::RequestModList {
                check_id: scan::string_field(text, "checkId").unwrap_or_default(),
            }),
            TYPE_RESPONSE_MODLIST => Ok(WireMessage::ResponseModList {
                check_id: scan::string_field(text, "checkId"),
                mods: scan::string_array_field(text, "mods"),
                signature: scan::string_field(text, "signature"),
                timestamp: scan::number_field(text, "timestamp"),
            }),
            TYPE_RESPONSE_MODLIST_ENCRYPTED => {
                let ciphertext =
                    scan::string_field(text, "ciphertext").ok_or(CodecError::Malformed)?;
                Ok(WireMessage::ResponseModListEncrypted { ciphertext })
            }
            _ => Err(CodecError::Malformed),
        }
    }
}
