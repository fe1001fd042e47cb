//! Identifier and key types shared across the engine.

use std::fmt;

use uuid::Uuid;

/// Stable client identity, independent of connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Identifiers minted by the alternate-protocol bridge have a
    /// zeroed high half. Those clients cannot run companion modules at
    /// all, so verification may be waived for them by policy.
    pub fn has_zero_high_bits(&self) -> bool {
        self.0.as_u64_pair().0 == 0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for ClientId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Why a session exists. One session per (client, purpose) may be
/// live at a time; the two purposes never share state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Join-time gate: failure disconnects the client.
    Verification,
    /// Operator-triggered inspection: report-only, never disconnects.
    Inspection,
}

/// Composite session store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub client: ClientId,
    pub purpose: Purpose,
}

impl SessionKey {
    pub fn verification(client: ClientId) -> Self {
        Self {
            client,
            purpose: Purpose::Verification,
        }
    }

    pub fn inspection(client: ClientId) -> Self {
        Self {
            client,
            purpose: Purpose::Inspection,
        }
    }
}

/// Short correlation token: `prefix` plus eight random hex characters,
/// e.g. `hs-1f3a9c02` or `chk-77b0e1d4`.
pub fn short_token(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &hex[..8])
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
