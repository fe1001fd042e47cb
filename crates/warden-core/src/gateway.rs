//! Outbound seam to the hosting server.
//!
//! The engine never talks to a socket directly; everything it does to
//! a client goes through this trait. The host wires it to its own
//! player/connection layer, tests wire it to a recorder.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::types::ClientId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("client is not connected")]
    Offline,
    #[error("send failed: {0}")]
    SendFailed(String),
}

#[async_trait]
pub trait ClientGateway: Send + Sync + 'static {
    /// Deliver a protocol payload to the client's companion channel.
    async fn send(&self, client: ClientId, payload: Bytes) -> Result<(), GatewayError>;

    /// Disconnect the client, showing `reason`.
    async fn kick(&self, client: ClientId, reason: String);

    /// Show an in-band chat/notice message to the client.
    async fn notify(&self, client: ClientId, message: String);

    /// Deliver an operator-facing report line (inspection results,
    /// advisory findings).
    async fn report(&self, text: String);

    async fn is_online(&self, client: ClientId) -> bool;

    /// Display name for a connected client, `None` if unknown.
    async fn client_name(&self, client: ClientId) -> Option<String>;
}

#[async_trait]
impl<G: ClientGateway + ?Sized> ClientGateway for std::sync::Arc<G> {
    async fn send(&self, client: ClientId, payload: Bytes) -> Result<(), GatewayError> {
        (**self).send(client, payload).await
    }

    async fn kick(&self, client: ClientId, reason: String) {
        (**self).kick(client, reason).await
    }

    async fn notify(&self, client: ClientId, message: String) {
        (**self).notify(client, message).await
    }

    async fn report(&self, text: String) {
        (**self).report(text).await
    }

    async fn is_online(&self, client: ClientId) -> bool {
        (**self).is_online(client).await
    }

    async fn client_name(&self, client: ClientId) -> Option<String> {
        (**self).client_name(client).await
    }
}
