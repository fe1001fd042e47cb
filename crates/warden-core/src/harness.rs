//! Test harness: a recording gateway and engine builders.
//!
//! Compiled into the crate so unit tests, the integration suite, and
//! downstream embedders' tests can share one set of fakes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use warden_crypto::KeyMaterial;
use warden_proto::WireMessage;

use crate::config::WardenConfig;
use crate::engine::VerifierEngine;
use crate::gateway::{ClientGateway, GatewayError};
use crate::policy::VerificationPolicy;
use crate::store::InMemorySessionStore;
use crate::types::ClientId;

/// Gateway that records everything the engine does to clients.
/// `set_fail_sends` injects delivery failures.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<(ClientId, Vec<u8>)>>,
    kicks: Mutex<Vec<(ClientId, String)>>,
    notices: Mutex<Vec<(ClientId, String)>>,
    reports: Mutex<Vec<String>>,
    online: Mutex<HashMap<ClientId, String>>,
    fail_sends: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a fresh random client as online and return its id.
    pub fn connect(&self, name: &str) -> ClientId {
        let client = ClientId::new_random();
        self.connect_as(client, name);
        client
    }

    pub fn connect_as(&self, client: ClientId, name: &str) {
        self.online
            .lock()
            .unwrap()
            .insert(client, name.to_string());
    }

    pub fn disconnect(&self, client: ClientId) {
        self.online.lock().unwrap().remove(&client);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Decoded protocol messages sent to `client`, in order.
    pub fn sent_to(&self, client: ClientId) -> Vec<WireMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == client)
            .filter_map(|(_, payload)| WireMessage::decode(payload).ok())
            .collect()
    }

    /// Check id of the most recent inventory request sent to `client`.
    pub fn requested_check_id(&self, client: ClientId) -> Option<String> {
        self.sent_to(client)
            .into_iter()
            .rev()
            .find_map(|m| match m {
                WireMessage::RequestModList { check_id } => Some(check_id),
                _ => None,
            })
    }

    pub fn inventory_request_count(&self, client: ClientId) -> usize {
        self.sent_to(client)
            .iter()
            .filter(|m| matches!(m, WireMessage::RequestModList { .. }))
            .count()
    }

    pub fn kicks(&self) -> Vec<(ClientId, String)> {
        self.kicks.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<(ClientId, String)> {
        self.notices.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientGateway for RecordingGateway {
    async fn send(&self, client: ClientId, payload: Bytes) -> Result<(), GatewayError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(GatewayError::SendFailed("injected failure".to_string()));
        }
        if !self.online.lock().unwrap().contains_key(&client) {
            return Err(GatewayError::Offline);
        }
        self.sent.lock().unwrap().push((client, payload.to_vec()));
        Ok(())
    }

    async fn kick(&self, client: ClientId, reason: String) {
        self.kicks.lock().unwrap().push((client, reason));
        self.online.lock().unwrap().remove(&client);
    }

    async fn notify(&self, client: ClientId, message: String) {
        self.notices.lock().unwrap().push((client, message));
    }

    async fn report(&self, text: String) {
        self.reports.lock().unwrap().push(text);
    }

    async fn is_online(&self, client: ClientId) -> bool {
        self.online.lock().unwrap().contains_key(&client)
    }

    async fn client_name(&self, client: ClientId) -> Option<String> {
        self.online.lock().unwrap().get(&client).cloned()
    }
}

pub type TestEngine = VerifierEngine<InMemorySessionStore, Arc<RecordingGateway>>;

pub fn engine_with(
    config: WardenConfig,
    policy: VerificationPolicy,
    keys: KeyMaterial,
) -> (TestEngine, Arc<RecordingGateway>) {
    let gateway = Arc::new(RecordingGateway::new());
    let engine = VerifierEngine::new(
        config,
        policy,
        keys,
        InMemorySessionStore::new(),
        Arc::clone(&gateway),
    );
    (engine, gateway)
}

/// Default config, permissive policy, crypto disabled.
pub fn default_engine() -> (TestEngine, Arc<RecordingGateway>) {
    engine_with(
        WardenConfig::default(),
        VerificationPolicy::permissive(),
        KeyMaterial::disabled(),
    )
}

/// Client-side payload builders.
pub fn announce_payload(mod_id: &str) -> Vec<u8> {
    WireMessage::AnnouncePresence {
        mod_id: Some(mod_id.to_string()),
        version: Some("1.0.0".to_string()),
    }
    .encode_bytes()
}

pub fn inventory_payload(check_id: &str, mods: &[&str]) -> Vec<u8> {
    WireMessage::ResponseModList {
        check_id: Some(check_id.to_string()),
        mods: mods.iter().map(|m| m.to_string()).collect(),
        signature: None,
        timestamp: None,
    }
    .encode_bytes()
}

pub fn signed_inventory_payload(
    check_id: &str,
    mods: &[&str],
    signature: &str,
    timestamp: i64,
) -> Vec<u8> {
    WireMessage::ResponseModList {
        check_id: Some(check_id.to_string()),
        mods: mods.iter().map(|m| m.to_string()).collect(),
        signature: Some(signature.to_string()),
        timestamp: Some(timestamp),
    }
    .encode_bytes()
}
