//! Per-client session records and the verification stage machine.

use std::fmt;
use std::sync::Arc;

use crate::policy::VerificationPolicy;
use crate::timer::TimerHandle;
use crate::types::{now_ms, short_token, ClientId, Purpose};

/// Verification lifecycle. Stages only ever advance; both `Verified`
/// and `Rejected` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    AwaitingPresence,
    PresenceConfirmed,
    ModListRequested,
    ModListReceived,
    Verified,
    Rejected(RejectReason),
}

impl Stage {
    fn rank(&self) -> u8 {
        match self {
            Stage::AwaitingPresence => 0,
            Stage::PresenceConfirmed => 1,
            Stage::ModListRequested => 2,
            Stage::ModListReceived => 3,
            Stage::Verified | Stage::Rejected(_) => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Verified | Stage::Rejected(_))
    }

    /// Monotonic advancement check: terminal stages never move, and a
    /// stage never moves backwards or sideways.
    pub fn can_advance(&self, next: &Stage) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// Why a session ended unsuccessfully. Maps one-to-one onto the
/// configurable rejection message templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No valid presence announcement within the handshake window.
    MissingCompanion,
    /// Inventory request could not be delivered after all retries.
    RequestFailed,
    /// Inventory requested but no response before the final timeout.
    InventoryTimeout,
    /// Signature or freshness validation failed.
    SecurityFailure,
    /// One or more blacklisted modules detected.
    IllegalModules(Vec<String>),
    /// Module count over the configured ceiling.
    TooManyModules { count: usize, max: usize },
    /// Unrecoverable handling failure mid-session.
    ProtocolError,
}

impl RejectReason {
    /// Key into the rejection message template table.
    pub fn template_key(&self) -> &'static str {
        match self {
            RejectReason::MissingCompanion => "missingCompanion",
            RejectReason::RequestFailed => "modlistRequestFailed",
            RejectReason::InventoryTimeout => "modlistTimeout",
            RejectReason::SecurityFailure => "securityFailure",
            RejectReason::IllegalModules(_) => "blacklistedMods",
            RejectReason::TooManyModules { .. } => "modCountExceeded",
            RejectReason::ProtocolError => "protocolError",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingCompanion => write!(f, "companion module not announced"),
            RejectReason::RequestFailed => write!(f, "inventory request undeliverable"),
            RejectReason::InventoryTimeout => write!(f, "inventory response timed out"),
            RejectReason::SecurityFailure => write!(f, "security validation failed"),
            RejectReason::IllegalModules(mods) => {
                write!(f, "blacklisted modules: {}", mods.join(", "))
            }
            RejectReason::TooManyModules { count, max } => {
                write!(f, "{count} modules exceeds limit of {max}")
            }
            RejectReason::ProtocolError => write!(f, "protocol error"),
        }
    }
}

/// Mutable state for one client going through one verification or
/// inspection flow. Owned exclusively by the session store; all access
/// happens under its lock.
pub struct Session {
    pub client: ClientId,
    pub name: String,
    pub purpose: Purpose,
    /// Handshake correlation token, `hs-` prefixed.
    pub handshake_id: String,
    /// Inventory-check correlation token, `chk-` prefixed.
    pub check_id: String,
    pub stage: Stage,
    pub started_at_ms: i64,
    pub last_request_at_ms: i64,
    /// Inventory request deliveries so far (retries included).
    pub attempt_count: u32,
    pub mod_version: Option<String>,
    /// Raw payload of the accepted inventory response, kept for audit
    /// logging.
    pub raw_response: Option<String>,
    pub detected_mods: Vec<String>,
    /// Policy snapshot taken at session start. Config reloads never
    /// affect an in-flight session.
    pub policy: Arc<VerificationPolicy>,
    pub handshake_timer: Option<TimerHandle>,
    pub modlist_timer: Option<TimerHandle>,
}

impl Session {
    /// New session in its purpose's starting stage: verification waits
    /// for a presence announcement, inspection goes straight to the
    /// inventory request (the companion is already known-present).
    pub fn new(
        client: ClientId,
        name: &str,
        purpose: Purpose,
        policy: Arc<VerificationPolicy>,
    ) -> Self {
        let stage = match purpose {
            Purpose::Verification => Stage::AwaitingPresence,
            Purpose::Inspection => Stage::ModListRequested,
        };
        Self {
            client,
            name: name.to_string(),
            purpose,
            handshake_id: short_token("hs"),
            check_id: short_token("chk"),
            stage,
            started_at_ms: now_ms(),
            last_request_at_ms: 0,
            attempt_count: 0,
            mod_version: None,
            raw_response: None,
            detected_mods: Vec::new(),
            policy,
            handshake_timer: None,
            modlist_timer: None,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("client", &self.client)
            .field("name", &self.name)
            .field("purpose", &self.purpose)
            .field("handshake_id", &self.handshake_id)
            .field("check_id", &self.check_id)
            .field("stage", &self.stage)
            .field("attempt_count", &self.attempt_count)
            .finish_non_exhaustive()
    }
}
