//! Backend hook.
//!
//! The gateway has no opinion about payloads. Everything that arrives on a
//! link is handed to a `Backend`, which answers through `Router::route_out`.
//! The backend runs on the read pump of the connection the packet came from.

use crate::error::GateError;
use crate::router::Router;
use async_trait::async_trait;
use gate_shared::{Packet, BROADCAST};

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Handles one inbound packet.
    ///
    /// Errors and panics come back to the calling read pump, which logs them
    /// and keeps the connection open.
    async fn on_packet(&self, packet: Packet, router: &Router) -> Result<(), GateError>;
}

/// Sends every payload straight back to the connection it came from.
#[derive(Debug, Default, Clone, Copy)]
pub struct Echo;

#[async_trait]
impl Backend for Echo {
    async fn on_packet(&self, packet: Packet, router: &Router) -> Result<(), GateError> {
        router.route_out(packet).await
    }
}

/// Rebroadcasts every payload to all live connections, sender included.
#[derive(Debug, Default, Clone, Copy)]
pub struct Relay;

#[async_trait]
impl Backend for Relay {
    async fn on_packet(&self, packet: Packet, router: &Router) -> Result<(), GateError> {
        router
            .route_out(Packet::new(BROADCAST, packet.into_payload()))
            .await
    }
}

/// Passes inbound packets to a channel instead of answering them.
#[cfg(test)]
pub(crate) struct Forward(tokio::sync::mpsc::UnboundedSender<Packet>);

#[cfg(test)]
impl Forward {
    pub(crate) fn channel() -> (
        std::sync::Arc<Self>,
        tokio::sync::mpsc::UnboundedReceiver<Packet>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (std::sync::Arc::new(Self(tx)), rx)
    }
}

#[cfg(test)]
#[async_trait]
impl Backend for Forward {
    async fn on_packet(&self, packet: Packet, _router: &Router) -> Result<(), GateError> {
        let _ = self.0.send(packet);
        Ok(())
    }
}
