//! The verification engine.
//!
//! Drives every session through the handshake and inventory stages,
//! owns the retry/timeout schedule, and applies policy to accepted
//! inventories. All entry points are connection lifecycle events and
//! inbound payloads; everything outbound goes through the
//! [`ClientGateway`].
//!
//! Concurrency model: session state is only ever touched inside store
//! `update` closures, and every timer callback re-checks stage at fire
//! time, so a callback racing a response (or a disconnect) degrades to
//! a no-op instead of double-acting.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use warden_crypto::{decode_inner_response, signature_input, KeyMaterial};
use warden_proto::{strip_versions, WireMessage};

use crate::config::WardenConfig;
use crate::errors::EngineError;
use crate::gateway::ClientGateway;
use crate::policy::{Verdict, VerificationPolicy};
use crate::session::{RejectReason, Session, Stage};
use crate::stats::{EngineStats, StatsSnapshot};
use crate::store::SessionStore;
use crate::timer::TimerHandle;
use crate::types::{now_ms, ClientId, Purpose, SessionKey};

/// Cheaply cloneable engine facade. Clones share all state.
pub struct VerifierEngine<S, G> {
    inner: Arc<EngineInner<S, G>>,
}

impl<S, G> Clone for VerifierEngine<S, G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct EngineInner<S, G> {
    config: WardenConfig,
    keys: KeyMaterial,
    /// Current policy snapshot. Sessions capture the snapshot live at
    /// their start; a reload swaps this slot only.
    policy: RwLock<Arc<VerificationPolicy>>,
    store: S,
    gateway: G,
    stats: EngineStats,
}

enum Announce {
    Confirmed,
    WrongModule,
    Ignore,
}

enum TimeoutAction {
    Satisfied,
    Resend,
    Reject,
}

impl<S, G> VerifierEngine<S, G>
where
    S: SessionStore,
    G: ClientGateway,
{
    pub fn new(
        config: WardenConfig,
        policy: VerificationPolicy,
        keys: KeyMaterial,
        store: S,
        gateway: G,
    ) -> Self {
        info!(
            companion = %config.companion_mod_id,
            handshake_timeout_secs = config.handshake_timeout_secs,
            modlist_timeout_secs = config.modlist_timeout_secs,
            max_retries = config.max_retries,
            validation = keys.validation_enabled(),
            decryption = keys.decryption_enabled(),
            "verifier engine ready"
        );
        Self {
            inner: Arc::new(EngineInner {
                config,
                keys,
                policy: RwLock::new(Arc::new(policy)),
                store,
                gateway,
                stats: EngineStats::new(),
            }),
        }
    }

    /// Swap in a new policy snapshot. In-flight sessions keep the
    /// snapshot they started with.
    pub async fn reload_policy(&self, policy: VerificationPolicy) {
        *self.inner.policy.write().await = Arc::new(policy);
        info!("verification policy reloaded");
    }

    pub async fn current_policy(&self) -> Arc<VerificationPolicy> {
        Arc::clone(&*self.inner.policy.read().await)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub async fn is_approved(&self, client: ClientId) -> bool {
        self.inner.store.is_approved(client).await
    }

    /// Start join-time verification for a connecting client.
    ///
    /// Whitelisted names and (when allowed) alternate-protocol clients
    /// are approved immediately without a session. Everyone else gets
    /// a fresh verification session, a presence request, and a
    /// handshake deadline.
    pub async fn on_client_connected(&self, client: ClientId, name: &str) {
        let inner = &self.inner;
        if inner.config.whitelist.contains(name) {
            info!(%client, name, "whitelisted; verification waived");
            inner.store.approve(client).await;
            return;
        }
        if inner.config.allow_alternate_protocol && client.has_zero_high_bits() {
            info!(%client, name, "alternate-protocol client; verification waived");
            inner.store.approve(client).await;
            return;
        }

        let policy = self.current_policy().await;
        let session = Session::new(client, name, Purpose::Verification, policy);
        let handshake_id = session.handshake_id.clone();
        info!(%client, name, %handshake_id, "verification started");
        if inner.store.put(session).await.is_some() {
            debug!(%client, "stale verification session displaced");
        }

        if let Err(e) = inner
            .gateway
            .send(client, Bytes::from(WireMessage::PresenceRequest.encode_bytes()))
            .await
        {
            // The handshake deadline decides the outcome either way.
            warn!(%client, error = %e, "presence request not delivered");
        }

        let key = SessionKey::verification(client);
        let timer = EngineInner::schedule_handshake_timeout(inner, client);
        inner
            .store
            .update(key, move |s| s.handshake_timer = Some(timer))
            .await;
    }

    /// Tear down all state for a disconnecting client. Dropping the
    /// session records aborts their pending timers.
    pub async fn on_client_disconnected(&self, client: ClientId) {
        let inner = &self.inner;
        let removed = inner.store.remove(SessionKey::verification(client)).await;
        inner.store.remove(SessionKey::inspection(client)).await;
        inner.store.revoke(client).await;
        if let Some(session) = removed {
            let lifetime_ms = now_ms() - session.started_at_ms;
            info!(
                %client,
                name = %session.name,
                handshake_id = %session.handshake_id,
                stage = ?session.stage,
                lifetime_ms,
                "session cleaned up on disconnect"
            );
        }
    }

    /// Dispatch one inbound payload from a client's companion channel.
    ///
    /// Undecodable payloads are dropped (the pending timers decide the
    /// session's fate); a handler failure is fatal for the client.
    pub async fn on_inbound_message(&self, client: ClientId, payload: &[u8]) {
        let inner = &self.inner;
        inner.stats.inc_received();

        let message = match WireMessage::decode(payload) {
            Ok(m) => m,
            Err(e) => {
                let error = EngineError::from(e);
                debug!(%client, %error, "undecodable payload dropped");
                inner.stats.inc_dropped();
                return;
            }
        };

        let result = match message {
            WireMessage::AnnouncePresence { mod_id, version } => {
                EngineInner::handle_announce_presence(inner, client, mod_id, version).await
            }
            WireMessage::ResponseModList {
                check_id,
                mods,
                signature,
                timestamp,
            } => {
                let raw = String::from_utf8_lossy(payload).into_owned();
                EngineInner::route_inventory_response(
                    inner, client, check_id, mods, signature, timestamp, raw,
                )
                .await
            }
            WireMessage::ResponseModListEncrypted { ciphertext } => {
                EngineInner::handle_encrypted_response(inner, client, ciphertext).await
            }
            other => {
                debug!(%client, message = ?other, "unexpected server-bound message dropped");
                inner.stats.inc_dropped();
                Ok(())
            }
        };

        match result {
            Ok(()) => inner.stats.inc_handled(),
            Err(error) => {
                warn!(%client, %error, "message handling failed; disconnecting client");
                inner.stats.inc_dropped();
                inner.cleanup_client(client).await;
                let text = inner.config.rejection_text(&RejectReason::ProtocolError);
                inner.gateway.kick(client, text).await;
            }
        }
    }

    /// Start a report-only inventory inspection of a connected client.
    /// False if the client is offline or unknown.
    pub async fn trigger_inspection(&self, client: ClientId) -> bool {
        let inner = &self.inner;
        if !inner.gateway.is_online(client).await {
            return false;
        }
        let name = match inner.gateway.client_name(client).await {
            Some(n) => n,
            None => return false,
        };

        let policy = self.current_policy().await;
        let session = Session::new(client, &name, Purpose::Inspection, policy);
        let check_id = session.check_id.clone();
        info!(%client, %name, %check_id, "inspection started");
        inner.store.put(session).await;
        EngineInner::send_inventory_request(inner, SessionKey::inspection(client)).await;
        true
    }
}

impl<S, G> EngineInner<S, G>
where
    S: SessionStore,
    G: ClientGateway,
{
    // ==================== handshake stage ====================

    fn schedule_handshake_timeout(this: &Arc<Self>, client: ClientId) -> TimerHandle {
        let inner = Arc::clone(this);
        let delay = this.config.handshake_timeout();
        TimerHandle::spawn_after(delay, async move {
            EngineInner::handshake_timeout_fired(&inner, client).await;
        })
    }

    async fn handshake_timeout_fired(this: &Arc<Self>, client: ClientId) {
        let key = SessionKey::verification(client);
        let fired = this
            .store
            .update(key, |s| {
                if s.stage != Stage::AwaitingPresence {
                    return false;
                }
                s.stage = Stage::Rejected(RejectReason::MissingCompanion);
                true
            })
            .await
            .unwrap_or(false);
        if fired {
            warn!(%client, "no companion announcement before handshake deadline");
            this.finish_rejection(key, RejectReason::MissingCompanion).await;
        }
    }

    async fn handle_announce_presence(
        this: &Arc<Self>,
        client: ClientId,
        mod_id: Option<String>,
        version: Option<String>,
    ) -> Result<(), EngineError> {
        let key = SessionKey::verification(client);
        let expected = this.config.companion_mod_id.clone();
        let outcome = this
            .store
            .update(key, move |s| {
                if s.stage != Stage::AwaitingPresence {
                    return Announce::Ignore;
                }
                match mod_id.as_deref() {
                    Some(id) if id == expected => {
                        s.stage = Stage::PresenceConfirmed;
                        s.mod_version = version;
                        // Presence arrived; the handshake deadline is void.
                        s.handshake_timer = None;
                        Announce::Confirmed
                    }
                    _ => Announce::WrongModule,
                }
            })
            .await;

        match outcome {
            None => {
                debug!(%client, "presence announcement without a session");
                Ok(())
            }
            Some(Announce::Ignore) => Ok(()),
            Some(Announce::WrongModule) => {
                // Not our companion. Stay silent; the deadline decides.
                info!(%client, "announcement from unrecognized module ignored");
                Ok(())
            }
            Some(Announce::Confirmed) => {
                info!(%client, "companion presence confirmed");
                let ack = WireMessage::AcknowledgePresence {
                    status: "ready".to_string(),
                    server_id: this.config.server_id.clone(),
                };
                this.gateway
                    .send(client, Bytes::from(ack.encode_bytes()))
                    .await?;
                Self::begin_inventory_stage(this, key).await;
                Ok(())
            }
        }
    }

    // ==================== inventory stage ====================

    async fn begin_inventory_stage(this: &Arc<Self>, key: SessionKey) {
        if !this.store.advance_stage(key, Stage::ModListRequested).await {
            return;
        }
        // Short grace pause before the first request so the companion
        // can finish initializing its channel handler.
        let timer = Self::schedule_grace(this, key);
        this.store
            .update(key, move |s| s.modlist_timer = Some(timer))
            .await;
    }

    fn schedule_grace(this: &Arc<Self>, key: SessionKey) -> TimerHandle {
        let inner = Arc::clone(this);
        let delay = this.config.grace_delay();
        TimerHandle::spawn_after(delay, async move {
            let ready = inner
                .store
                .update(key, |s| {
                    s.stage == Stage::ModListRequested && s.attempt_count == 0
                })
                .await
                .unwrap_or(false);
            if ready {
                EngineInner::send_inventory_request(&inner, key).await;
            }
        })
    }

    /// Deliver the next inventory request, retrying immediately on
    /// send failure until the attempt budget runs out.
    async fn send_inventory_request(this: &Arc<Self>, key: SessionKey) {
        loop {
            let max = this.config.max_retries;
            let decision = match this
                .store
                .update(key, move |s| {
                    if s.attempt_count >= max {
                        return None;
                    }
                    s.attempt_count += 1;
                    s.last_request_at_ms = now_ms();
                    Some((s.check_id.clone(), s.attempt_count))
                })
                .await
            {
                Some(d) => d,
                None => return, // session gone
            };
            let (check_id, attempt) = match decision {
                Some(v) => v,
                None => {
                    warn!(client = %key.client, "inventory request budget exhausted");
                    this.reject_session(key, RejectReason::RequestFailed).await;
                    return;
                }
            };

            let request = WireMessage::RequestModList {
                check_id: check_id.clone(),
            };
            match this
                .gateway
                .send(key.client, Bytes::from(request.encode_bytes()))
                .await
            {
                Ok(()) => {
                    debug!(client = %key.client, %check_id, attempt, "inventory requested");
                    let timer = Self::schedule_inventory_timeout(this, key);
                    this.store
                        .update(key, move |s| s.modlist_timer = Some(timer))
                        .await;
                    return;
                }
                Err(error) => {
                    warn!(
                        client = %key.client,
                        attempt,
                        %error,
                        "inventory request not delivered; retrying"
                    );
                }
            }
        }
    }

    fn schedule_inventory_timeout(this: &Arc<Self>, key: SessionKey) -> TimerHandle {
        let inner = Arc::clone(this);
        let delay = this.config.modlist_timeout();
        TimerHandle::spawn_after(delay, async move {
            EngineInner::inventory_timeout_fired(&inner, key).await;
        })
    }

    async fn inventory_timeout_fired(this: &Arc<Self>, key: SessionKey) {
        let max = this.config.max_retries;
        let action = this
            .store
            .update(key, move |s| {
                if s.stage != Stage::ModListRequested {
                    return TimeoutAction::Satisfied;
                }
                if s.attempt_count < max {
                    TimeoutAction::Resend
                } else {
                    s.stage = Stage::Rejected(RejectReason::InventoryTimeout);
                    TimeoutAction::Reject
                }
            })
            .await
            .unwrap_or(TimeoutAction::Satisfied);

        match action {
            TimeoutAction::Satisfied => {}
            TimeoutAction::Resend => {
                info!(client = %key.client, "inventory response overdue; retrying");
                Self::send_inventory_request(this, key).await;
            }
            TimeoutAction::Reject => {
                this.finish_rejection(key, RejectReason::InventoryTimeout)
                    .await;
            }
        }
    }

    // ==================== response handling ====================

    /// Decide whether an inventory response belongs to the client's
    /// inspection session (matched by check id, or by elimination when
    /// the response carries none) or to the verification flow.
    #[allow(clippy::too_many_arguments)]
    async fn route_inventory_response(
        this: &Arc<Self>,
        client: ClientId,
        check_id: Option<String>,
        mods: Vec<String>,
        signature: Option<String>,
        timestamp: Option<i64>,
        raw: String,
    ) -> Result<(), EngineError> {
        let inspection_key = SessionKey::inspection(client);
        let verification_key = SessionKey::verification(client);
        let inspection_check = this
            .store
            .update(inspection_key, |s| s.check_id.clone())
            .await;

        let for_inspection = match (&inspection_check, &check_id) {
            (Some(expected), Some(got)) => expected == got,
            (Some(_), None) => !this.store.contains(verification_key).await,
            (None, _) => false,
        };

        if for_inspection {
            this.handle_inspection_response(inspection_key, &mods).await;
            return Ok(());
        }
        this.handle_verification_response(
            verification_key,
            check_id,
            mods,
            signature,
            timestamp,
            raw,
        )
        .await
    }

    async fn handle_verification_response(
        &self,
        key: SessionKey,
        check_id: Option<String>,
        mods: Vec<String>,
        signature: Option<String>,
        timestamp: Option<i64>,
        raw: String,
    ) -> Result<(), EngineError> {
        // Accept at most one response per request cycle; anything else
        // is unsolicited and dropped.
        let accepted = self
            .store
            .update(key, move |s| {
                if s.stage != Stage::ModListRequested {
                    return None;
                }
                s.modlist_timer = None;
                s.raw_response = Some(raw);
                s.stage = Stage::ModListReceived;
                Some((s.name.clone(), Arc::clone(&s.policy)))
            })
            .await
            .flatten();
        let (name, policy) = match accepted {
            Some(v) => v,
            None => {
                debug!(client = %key.client, "unsolicited inventory response dropped");
                self.stats.inc_dropped();
                return Ok(());
            }
        };

        if self.keys.validation_enabled() {
            let (signature, timestamp) = match (signature, timestamp) {
                (Some(s), Some(t)) => (s, t),
                _ => {
                    warn!(client = %key.client, %name, "inventory response missing signature or timestamp");
                    self.stats.inc_security_failures();
                    self.reject_session(key, RejectReason::SecurityFailure).await;
                    return Ok(());
                }
            };
            let signed = signature_input(check_id.as_deref(), &mods);
            if !self.keys.verify_signature(&signed, &signature) {
                warn!(client = %key.client, %name, "inventory signature rejected");
                self.stats.inc_security_failures();
                self.reject_session(key, RejectReason::SecurityFailure).await;
                return Ok(());
            }
            if !self.keys.verify_freshness(timestamp, now_ms()) {
                warn!(client = %key.client, %name, timestamp, "inventory timestamp outside freshness window");
                self.stats.inc_security_failures();
                self.reject_session(key, RejectReason::SecurityFailure).await;
                return Ok(());
            }
            debug!(client = %key.client, "inventory response authenticated");
        }

        let ids = strip_versions(&mods);
        {
            let ids = ids.clone();
            self.store.update(key, move |s| s.detected_mods = ids).await;
        }

        match policy.evaluate(&ids) {
            Verdict::Blacklisted(found) => {
                warn!(client = %key.client, %name, modules = ?found, "blacklisted modules detected");
                self.reject_session(key, RejectReason::IllegalModules(found))
                    .await;
            }
            Verdict::TooMany { count, max } => {
                warn!(client = %key.client, %name, count, max, "module count over the ceiling");
                self.reject_session(key, RejectReason::TooManyModules { count, max })
                    .await;
            }
            Verdict::Clean { shown } => {
                info!(client = %key.client, %name, modules = shown.len(), "client verified");
                self.store.advance_stage(key, Stage::Verified).await;
                self.store.remove(key).await;
                self.store.approve(key.client).await;
                self.stats.inc_verified();
                if self.config.enable_notifications {
                    self.gateway
                        .notify(key.client, self.config.welcome_message.clone())
                        .await;
                }
            }
        }
        Ok(())
    }

    /// Report-only path: never kicks, always ends in an operator
    /// report line.
    async fn handle_inspection_response(&self, key: SessionKey, mods: &[String]) {
        let found = self
            .store
            .update(key, |s| {
                s.modlist_timer = None;
                s.stage = Stage::ModListReceived;
                (s.name.clone(), Arc::clone(&s.policy))
            })
            .await;
        let (name, policy) = match found {
            Some(v) => v,
            None => return,
        };
        self.store.remove(key).await;

        let ids = strip_versions(mods);
        let shown = policy.filtered(&ids);
        let flagged: Vec<String> = shown
            .iter()
            .filter(|m| policy.is_blacklisted(m))
            .cloned()
            .collect();

        let mut line = format!("{}: {} module(s)", name, shown.len());
        if !shown.is_empty() {
            line.push_str(": ");
            line.push_str(&shown.join(", "));
        }
        if !flagged.is_empty() {
            line.push_str(" [blacklisted: ");
            line.push_str(&flagged.join(", "));
            line.push(']');
        }
        info!(client = %key.client, %name, modules = shown.len(), flagged = flagged.len(), "inspection complete");
        self.gateway.report(line).await;
    }

    async fn handle_encrypted_response(
        this: &Arc<Self>,
        client: ClientId,
        ciphertext: String,
    ) -> Result<(), EngineError> {
        match this.keys.open_envelope(&ciphertext) {
            Ok(plaintext) => {
                if let WireMessage::ResponseModList {
                    check_id,
                    mods,
                    signature,
                    timestamp,
                } = decode_inner_response(&plaintext, now_ms())
                {
                    Self::route_inventory_response(
                        this, client, check_id, mods, signature, timestamp, plaintext,
                    )
                    .await?;
                }
                Ok(())
            }
            Err(e) => {
                // Dropped without advancing state; the retry/timeout
                // schedule governs the session's fate.
                let error = EngineError::from(e);
                warn!(%client, %error, "encrypted inventory response dropped");
                this.stats.inc_decryption_failures();
                Ok(())
            }
        }
    }

    // ==================== rejection ====================

    /// Move the session to `Rejected` exactly once and run the
    /// terminal side effects. Re-entry (racing callbacks) is a no-op.
    async fn reject_session(&self, key: SessionKey, reason: RejectReason) {
        let first = self
            .store
            .update(key, {
                let reason = reason.clone();
                move |s| {
                    if s.stage.is_terminal() {
                        return false;
                    }
                    s.stage = Stage::Rejected(reason);
                    true
                }
            })
            .await
            .unwrap_or(false);
        if first {
            self.finish_rejection(key, reason).await;
        }
    }

    async fn finish_rejection(&self, key: SessionKey, reason: RejectReason) {
        let removed = self.store.remove(key).await;
        let name = removed.map(|s| s.name).unwrap_or_default();
        self.stats.inc_rejected();
        match key.purpose {
            Purpose::Verification => {
                warn!(client = %key.client, %name, %reason, "verification failed; disconnecting");
                let text = self.config.rejection_text(&reason);
                self.gateway.kick(key.client, text).await;
            }
            Purpose::Inspection => {
                warn!(client = %key.client, %name, %reason, "inspection ended without a result");
                self.gateway
                    .report(format!("inspection of {name} failed: {reason}"))
                    .await;
            }
        }
    }

    async fn cleanup_client(&self, client: ClientId) {
        self.store.remove(SessionKey::verification(client)).await;
        self.store.remove(SessionKey::inspection(client)).await;
        self.store.revoke(client).await;
    }
}
