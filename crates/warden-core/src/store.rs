//! Session storage.
//!
//! One record per (client, purpose). All mutation happens through
//! closures run under the store lock, so timer callbacks and inbound
//! handlers racing each other always observe consistent session
//! state. The approved set survives session removal and lives until
//! disconnect.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::session::{Session, Stage};
use crate::types::{ClientId, SessionKey};

#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Insert a session, returning the displaced record if the key was
    /// occupied. Dropping the displaced record cancels its timers.
    async fn put(&self, session: Session) -> Option<Session>;

    async fn remove(&self, key: SessionKey) -> Option<Session>;

    async fn contains(&self, key: SessionKey) -> bool;

    /// Run `f` against the session under the store lock. `None` if no
    /// session exists for `key`. Callbacks use the return value to
    /// make check-and-act decisions atomically.
    async fn update<R, F>(&self, key: SessionKey, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Session) -> R + Send + 'static;

    /// Compare-and-advance the stage. False if the session is missing
    /// or the transition would not be a forward move.
    async fn advance_stage(&self, key: SessionKey, next: Stage) -> bool;

    async fn approve(&self, client: ClientId);

    async fn revoke(&self, client: ClientId);

    async fn is_approved(&self, client: ClientId) -> bool;
}

/// In-process store; the default for a single-server deployment.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, Session>>,
    approved: RwLock<HashSet<ClientId>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, session: Session) -> Option<Session> {
        let key = SessionKey {
            client: session.client,
            purpose: session.purpose,
        };
        self.sessions.write().await.insert(key, session)
    }

    async fn remove(&self, key: SessionKey) -> Option<Session> {
        self.sessions.write().await.remove(&key)
    }

    async fn contains(&self, key: SessionKey) -> bool {
        self.sessions.read().await.contains_key(&key)
    }

    async fn update<R, F>(&self, key: SessionKey, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Session) -> R + Send + 'static,
    {
        self.sessions.write().await.get_mut(&key).map(f)
    }

    async fn advance_stage(&self, key: SessionKey, next: Stage) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&key) {
            Some(session) if session.stage.can_advance(&next) => {
                session.stage = next;
                true
            }
            _ => false,
        }
    }

    async fn approve(&self, client: ClientId) {
        self.approved.write().await.insert(client);
    }

    async fn revoke(&self, client: ClientId) {
        self.approved.write().await.remove(&client);
    }

    async fn is_approved(&self, client: ClientId) -> bool {
        self.approved.read().await.contains(&client)
    }
}
