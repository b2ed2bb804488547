//! Packet routing between links and the backend.
//!
//! Both entry points run behind [`guard`], so a panic while routing one
//! packet comes back as `GateError::Fault` instead of unwinding through the
//! pump that called us.

use crate::backend::Backend;
use crate::error::GateError;
use crate::registry::Registry;
use futures::future::join_all;
use futures::FutureExt;
use gate_shared::{Packet, BROADCAST, DROP};
use log::{debug, warn};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Runs `fut`, converting a panic into `GateError::Fault`.
pub async fn guard<F, T>(fut: F) -> Result<T, GateError>
where
    F: Future<Output = Result<T, GateError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(GateError::from_panic(payload)),
    }
}

pub struct Router {
    registry: Arc<Registry>,
    backend: Arc<dyn Backend>,
}

impl Router {
    pub fn new(registry: Arc<Registry>, backend: Arc<dyn Backend>) -> Self {
        Self { registry, backend }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Hands an inbound packet to the backend.
    ///
    /// The backend runs on the caller's task. Whatever it waits on, such as
    /// a full outbound queue in `route_out`, slows down the sending
    /// connection's read pump and no one else.
    pub async fn route_in(&self, packet: Packet) -> Result<(), GateError> {
        guard(async move {
            debug!("routing. id: {} data: {:?}", packet.id(), packet.payload());
            self.backend.on_packet(packet, self).await
        })
        .await
    }

    /// Delivers a packet to one link, to every link, or nowhere.
    ///
    /// Broadcast is best-effort: per-recipient failures are logged and the
    /// call still succeeds. Unicast failures are returned to the caller, who
    /// decides whether to retry.
    pub async fn route_out(&self, packet: Packet) -> Result<(), GateError> {
        guard(self.dispatch(packet)).await
    }

    async fn dispatch(&self, packet: Packet) -> Result<(), GateError> {
        match packet.id() {
            BROADCAST => {
                let links = self.registry.snapshot().await;
                let payload = packet.into_payload();
                let deliveries = links.values().map(|link| {
                    let payload = payload.clone();
                    async move { (link.id(), link.put_bytes(payload).await) }
                });
                for (id, result) in join_all(deliveries).await {
                    if let Err(e) = result {
                        warn!("broadcast to {} failed: {}", id, e);
                    }
                }
                Ok(())
            }
            DROP => {
                debug!("dropping packet for reserved id {}: {:?}", DROP, packet.payload());
                Ok(())
            }
            id => {
                let link = self
                    .registry
                    .get(id)
                    .await
                    .ok_or(GateError::InvalidTarget(id))?;
                link.put_bytes(packet.into_payload()).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Forward;
    use crate::config::GatewayConfig;
    use crate::link::Link;
    use async_trait::async_trait;
    use gate_shared::ConnectionId;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            outbound_queue_capacity: 1,
            enqueue_timeout: Duration::from_millis(100),
            ..Default::default()
        }
    }

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    async fn register(
        registry: &Arc<Registry>,
        config: &GatewayConfig,
        id: ConnectionId,
    ) -> (Arc<Link>, mpsc::Receiver<Vec<u8>>) {
        let (link, rx) = Link::new(id, test_addr(), registry, config);
        registry.put(id, Arc::clone(&link)).await.unwrap();
        (link, rx)
    }

    fn setup() -> (Arc<Registry>, Router, mpsc::UnboundedReceiver<Packet>, GatewayConfig) {
        let config = test_config();
        let registry = Arc::new(Registry::new(16));
        let (backend, backend_rx) = Forward::channel();
        let router = Router::new(Arc::clone(&registry), backend);
        (registry, router, backend_rx, config)
    }

    struct Faulty;

    #[async_trait]
    impl Backend for Faulty {
        async fn on_packet(&self, _packet: Packet, _router: &Router) -> Result<(), GateError> {
            panic!("backend exploded")
        }
    }

    #[tokio::test]
    async fn test_guard_passes_results_through() {
        assert_eq!(guard(async { Ok::<_, GateError>(7) }).await.unwrap(), 7);
        let err = guard(async { Err::<(), _>(GateError::InvalidTarget(1)) }).await;
        assert!(matches!(err, Err(GateError::InvalidTarget(1))));
    }

    async fn explode() -> Result<(), GateError> {
        panic!("routing exploded")
    }

    #[tokio::test]
    async fn test_guard_converts_panics() {
        let result = guard(explode()).await;
        assert!(matches!(result, Err(GateError::Fault(ref m)) if m == "routing exploded"));
    }

    #[tokio::test]
    async fn test_route_in_reaches_backend() {
        let (_registry, router, mut backend_rx, _config) = setup();
        router.route_in(Packet::new(3, b"ping".to_vec())).await.unwrap();

        let packet = backend_rx.recv().await.unwrap();
        assert_eq!(packet, Packet::new(3, b"ping".to_vec()));
    }

    #[tokio::test]
    async fn test_route_in_converts_backend_panic() {
        let router = Router::new(Arc::new(Registry::new(4)), Arc::new(Faulty));
        let result = router.route_in(Packet::new(3, b"ping".to_vec())).await;
        assert!(matches!(result, Err(GateError::Fault(ref m)) if m == "backend exploded"));
    }

    #[tokio::test]
    async fn test_unicast_delivers_to_target_only() {
        let (registry, router, _backend_rx, config) = setup();
        let (_a, mut rx_a) = register(&registry, &config, 1).await;
        let (_b, mut rx_b) = register(&registry, &config, 2).await;

        router.route_out(Packet::new(2, b"for b".to_vec())).await.unwrap();

        assert_eq!(rx_b.try_recv().unwrap(), b"for b".to_vec());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_target_is_rejected() {
        let (registry, router, _backend_rx, config) = setup();
        let (_a, mut rx_a) = register(&registry, &config, 1).await;

        let result = router.route_out(Packet::new(77, b"lost".to_vec())).await;

        assert!(matches!(result, Err(GateError::InvalidTarget(77))));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drop_enqueues_nothing() {
        let (registry, router, _backend_rx, config) = setup();
        let (_a, mut rx_a) = register(&registry, &config, 1).await;
        let (_b, mut rx_b) = register(&registry, &config, 2).await;

        router.route_out(Packet::new(DROP, b"void".to_vec())).await.unwrap();

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_link() {
        let (registry, router, _backend_rx, config) = setup();
        let mut receivers = Vec::new();
        for id in 1..=3 {
            receivers.push(register(&registry, &config, id).await);
        }

        router
            .route_out(Packet::new(BROADCAST, b"all".to_vec()))
            .await
            .unwrap();

        for (_link, rx) in receivers.iter_mut() {
            assert_eq!(rx.try_recv().unwrap(), b"all".to_vec());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_survives_full_recipient() {
        let (registry, router, _backend_rx, config) = setup();
        let (_a, mut rx_a) = register(&registry, &config, 1).await;
        let (b, mut rx_b) = register(&registry, &config, 2).await;
        let (_c, mut rx_c) = register(&registry, &config, 3).await;

        // Fill B's single-slot queue.
        b.put_bytes(b"backlog".to_vec()).await.unwrap();

        let started = Instant::now();
        router
            .route_out(Packet::new(BROADCAST, b"news".to_vec()))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(rx_a.try_recv().unwrap(), b"news".to_vec());
        assert_eq!(rx_c.try_recv().unwrap(), b"news".to_vec());
        assert_eq!(rx_b.try_recv().unwrap(), b"backlog".to_vec());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unicast_backpressure_is_returned() {
        let (registry, router, _backend_rx, config) = setup();
        let (link, _rx) = register(&registry, &config, 5).await;
        link.put_bytes(b"backlog".to_vec()).await.unwrap();

        let result = router.route_out(Packet::new(5, b"more".to_vec())).await;
        assert!(matches!(
            result,
            Err(GateError::BackpressureTimeout { id: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_unicast_to_closed_link() {
        let (registry, router, _backend_rx, config) = setup();
        let (link, _rx) = register(&registry, &config, 5).await;
        link.close();

        let result = router.route_out(Packet::new(5, b"late".to_vec())).await;
        assert!(matches!(result, Err(GateError::LinkClosed(5))));
    }
}
