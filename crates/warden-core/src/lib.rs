//! Warden Core - the per-client verification protocol engine.
//!
//! This crate implements:
//! - Handshake and mod-list verification state machines
//! - Session store with one record per (client, purpose)
//! - Retry/timeout scheduling over one-shot timers
//! - Policy evaluation (filter set, blacklist, mod-count threshold)
//! - Message dispatch with a fail-closed boundary
//! - Configuration and blacklist file storage seams

#![forbid(unsafe_code)]

// Core state machine
pub mod engine;
pub mod session;

// Services
pub mod policy;
pub mod store;

// Infrastructure
pub mod blacklist;
pub mod config;
pub mod gateway;
pub mod stats;
pub mod timer;

// Supporting modules
pub mod errors;
pub mod harness;
pub mod types;

pub use config::WardenConfig;
pub use engine::VerifierEngine;
pub use errors::EngineError;
pub use gateway::{ClientGateway, GatewayError};
pub use policy::{Verdict, VerificationPolicy};
pub use session::{RejectReason, Session, Stage};
pub use store::{InMemorySessionStore, SessionStore};
pub use types::{ClientId, Purpose, SessionKey};
