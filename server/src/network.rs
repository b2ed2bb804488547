//! TCP listener: accepts connections, registers a link for each, and starts
//! its pumps.

use crate::config::GatewayConfig;
use crate::error::{log_panic, GateError};
use crate::id_generator::IdGenerator;
use crate::link::Link;
use crate::registry::Registry;
use crate::router::{guard, Router};
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(10);

pub struct Gateway {
    listener: TcpListener,
    config: Arc<GatewayConfig>,
    registry: Arc<Registry>,
    router: Arc<Router>,
    ids: Arc<dyn IdGenerator>,
}

impl Gateway {
    /// Binds the client-facing port. Failing here is a startup error.
    pub async fn bind(
        config: Arc<GatewayConfig>,
        ids: Arc<dyn IdGenerator>,
        router: Arc<Router>,
    ) -> Result<Self, GateError> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        info!("listen on: {}", listener.local_addr()?);

        Ok(Gateway {
            listener,
            registry: Arc::clone(router.registry()),
            config,
            router,
            ids,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, GateError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Accepts connections until the task is dropped.
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    info!(
                        "connected: {} map count: {}",
                        peer_addr,
                        self.registry.len().await
                    );
                    let gateway = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(GateError::Fault(cause)) =
                            guard(gateway.handle_connection(stream, peer_addr)).await
                        {
                            log_panic("accept", peer_addr, &cause);
                        }
                    });
                }
                Err(e) => {
                    warn!("accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), GateError> {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("set_nodelay failed for {}: {}", peer_addr, e);
        }

        let id = self.ids.next_id();
        let (link, outbound_rx) = Link::new(id, peer_addr, &self.registry, &self.config);

        if let Err(e) = self.registry.put(id, Arc::clone(&link)).await {
            link.close();
            warn!(
                "{} disconnected: {} id: {} map count: {}",
                e,
                peer_addr,
                id,
                self.registry.len().await
            );
            return Err(e);
        }

        let (reader, writer) = stream.into_split();
        link.serve(
            reader,
            writer,
            outbound_rx,
            Arc::clone(&self.router),
            Arc::clone(&self.config),
        );
        info!(
            "serving: {} id: {} map count: {}",
            peer_addr,
            id,
            self.registry.len().await
        );
        Ok(())
    }
}
