//! Engine configuration.
//!
//! Loaded once from JSON at startup; every field has a default so a
//! partial (or empty) document yields a working configuration.
//! Rejection messages are a template table keyed by reason, with
//! `{mods}`, `{plural}` and `{maxMods}` placeholders.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Deserialize;

use crate::session::RejectReason;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WardenConfig {
    /// Module id the companion must announce during the handshake.
    pub companion_mod_id: String,
    /// Identifier echoed back in the handshake acknowledgement.
    pub server_id: String,
    pub handshake_timeout_secs: u64,
    pub modlist_timeout_secs: u64,
    /// Pause between presence confirmation and the first inventory
    /// request, giving the companion time to finish initializing.
    pub grace_delay_ms: u64,
    /// Total inventory request deliveries per session.
    pub max_retries: u32,
    pub enable_notifications: bool,
    pub welcome_message: String,
    pub enable_mod_count_threshold: bool,
    pub max_mod_count: usize,
    /// Baseline inventory entries hidden from policy and reports.
    pub modlist_filter: Vec<String>,
    /// Client names exempt from verification.
    pub whitelist: HashSet<String>,
    /// Waive verification for alternate-protocol bridged clients,
    /// which cannot run companion modules.
    pub allow_alternate_protocol: bool,
    pub reject_messages: HashMap<String, String>,
    /// Base64 DER decryption key (PKCS#8), if provisioned.
    pub private_key: Option<String>,
    /// Base64 DER verifying key (SPKI), if provisioned.
    pub public_key: Option<String>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            companion_mod_id: "companion".to_string(),
            server_id: "warden".to_string(),
            handshake_timeout_secs: 10,
            modlist_timeout_secs: 15,
            grace_delay_ms: 1_000,
            max_retries: 3,
            enable_notifications: true,
            welcome_message: "Verification complete. Welcome!".to_string(),
            enable_mod_count_threshold: false,
            max_mod_count: 50,
            modlist_filter: vec![
                "java".to_string(),
                "minecraft".to_string(),
                "fabricloader".to_string(),
            ],
            whitelist: HashSet::new(),
            allow_alternate_protocol: true,
            reject_messages: default_reject_messages(),
            private_key: None,
            public_key: None,
        }
    }
}

fn default_reject_messages() -> HashMap<String, String> {
    [
        (
            "missingCompanion",
            "Required companion module not detected. Please install it to join.",
        ),
        (
            "modlistRequestFailed",
            "Could not request your module list. Please rejoin.",
        ),
        (
            "modlistTimeout",
            "No module list received in time. Please rejoin.",
        ),
        ("securityFailure", "Security verification failed."),
        (
            "blacklistedMods",
            "Disallowed module{plural} detected: {mods}",
        ),
        (
            "modCountExceeded",
            "Too many modules installed ({mods} over the limit of {maxMods}).",
        ),
        ("protocolError", "Verification failed. Please rejoin."),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl WardenConfig {
    /// Parse from JSON, backfilling any missing rejection templates
    /// with their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let mut config: WardenConfig = serde_json::from_str(text)?;
        for (key, template) in default_reject_messages() {
            config.reject_messages.entry(key).or_insert(template);
        }
        Ok(config)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn modlist_timeout(&self) -> Duration {
        Duration::from_secs(self.modlist_timeout_secs)
    }

    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    pub fn max_mod_count_opt(&self) -> Option<usize> {
        self.enable_mod_count_threshold.then_some(self.max_mod_count)
    }

    /// Render the client-facing rejection text for `reason`.
    pub fn rejection_text(&self, reason: &RejectReason) -> String {
        let template = self
            .reject_messages
            .get(reason.template_key())
            .cloned()
            .unwrap_or_else(|| "Verification failed.".to_string());
        match reason {
            RejectReason::IllegalModules(mods) => template
                .replace("{mods}", &mods.join(", "))
                .replace("{plural}", if mods.len() > 1 { "s" } else { "" }),
            RejectReason::TooManyModules { count, max } => template
                .replace("{mods}", &count.to_string())
                .replace("{maxMods}", &max.to_string()),
            _ => template,
        }
    }
}
