//! One live client connection and its two pumps.
//!
//! A `Link` is shared between the registry (which owns it) and its pump
//! tasks. The read pump turns inbound frames into packets for the router;
//! the write pump drains the bounded outbound queue onto the socket. Either
//! pump failing detaches the link from the registry, which closes it and
//! makes the other pump wind down.

use crate::config::GatewayConfig;
use crate::error::{log_panic, GateError};
use crate::registry::Registry;
use crate::router::{guard, Router};
use gate_shared::{read_frame, write_frame, ConnectionId, Packet};
use log::{debug, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Accepted,
    Registered,
    Serving,
    Closing,
    Closed,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LinkState::Accepted,
            1 => LinkState::Registered,
            2 => LinkState::Serving,
            3 => LinkState::Closing,
            _ => LinkState::Closed,
        }
    }
}

pub struct Link {
    id: ConnectionId,
    peer_addr: SocketAddr,
    /// Used only to ask for our own removal.
    registry: Weak<Registry>,
    outbound: mpsc::Sender<Vec<u8>>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
    state: AtomicU8,
    running_pumps: AtomicUsize,
    enqueue_timeout: Duration,
}

impl Link {
    /// Creates a link in the `Accepted` state together with the receiving end
    /// of its outbound queue, which belongs to the write pump.
    pub fn new(
        id: ConnectionId,
        peer_addr: SocketAddr,
        registry: &Arc<Registry>,
        config: &GatewayConfig,
    ) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_queue_capacity);
        let (shutdown, _) = watch::channel(false);
        let link = Arc::new(Self {
            id,
            peer_addr,
            registry: Arc::downgrade(registry),
            outbound,
            shutdown,
            closed: AtomicBool::new(false),
            state: AtomicU8::new(LinkState::Accepted as u8),
            running_pumps: AtomicUsize::new(0),
            enqueue_timeout: config.enqueue_timeout,
        });
        (link, outbound_rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_registered(&self) {
        let _ = self.state.compare_exchange(
            LinkState::Accepted as u8,
            LinkState::Registered as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn set_state(&self, state: LinkState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Queues a payload for the write pump.
    ///
    /// Waits at most the configured enqueue timeout when the queue is full and
    /// then gives up with `BackpressureTimeout`. A slow peer only ever stalls
    /// senders addressing it, and only for that long.
    pub async fn put_bytes(&self, payload: Vec<u8>) -> Result<(), GateError> {
        if self.is_closed() {
            return Err(GateError::LinkClosed(self.id));
        }
        match self.outbound.send_timeout(payload, self.enqueue_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(GateError::BackpressureTimeout {
                id: self.id,
                timeout: self.enqueue_timeout,
            }),
            Err(SendTimeoutError::Closed(_)) => Err(GateError::LinkClosed(self.id)),
        }
    }

    /// Stops the link. Only the first call has any effect.
    ///
    /// The read pump is signalled to stop; the write pump stops accepting new
    /// payloads and delivers what is already queued, for at most the close
    /// linger, before it drops the socket.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.set_state(LinkState::Closing);
        self.shutdown.send_replace(true);
        if self.running_pumps.load(Ordering::Acquire) == 0 {
            self.set_state(LinkState::Closed);
        }
        info!("disconnected: {} id: {}", self.peer_addr, self.id);
    }

    /// Removes this link from its registry (if still there) and closes it.
    pub async fn detach(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id).await;
        }
        self.close();
    }

    /// Starts the read and write pumps over the two halves of a connection.
    pub fn serve<R, W>(
        self: &Arc<Self>,
        reader: R,
        writer: W,
        outbound_rx: mpsc::Receiver<Vec<u8>>,
        router: Arc<Router>,
        config: Arc<GatewayConfig>,
    ) where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.running_pumps.fetch_add(2, Ordering::AcqRel);
        if !self.is_closed() {
            self.set_state(LinkState::Serving);
        }

        let read = read_pump(Arc::clone(self), reader, router, Arc::clone(&config));
        spawn_pump(Arc::clone(self), "read pump", read);

        let write = write_pump(Arc::clone(self), writer, outbound_rx, config);
        spawn_pump(Arc::clone(self), "write pump", write);
    }

    fn pump_finished(&self) {
        let remaining = self.running_pumps.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 && self.is_closed() {
            self.set_state(LinkState::Closed);
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

// Runs a pump with a panic boundary; any exit detaches the link.
fn spawn_pump<F>(link: Arc<Link>, task: &'static str, pump: F)
where
    F: Future<Output = Result<(), GateError>> + Send + 'static,
{
    tokio::spawn(async move {
        match guard(pump).await {
            Ok(()) => debug!("{} finished. id: {}", task, link.id()),
            Err(GateError::Fault(cause)) => log_panic(task, link.id(), &cause),
            Err(e) => warn!("{} failed. id: {} error: {}", task, link.id(), e),
        }
        link.detach().await;
        link.pump_finished();
    });
}

// Resolves once the link has been closed.
async fn closed(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|closed| *closed).await;
}

async fn read_pump<R>(
    link: Arc<Link>,
    mut reader: R,
    router: Arc<Router>,
    config: Arc<GatewayConfig>,
) -> Result<(), GateError>
where
    R: AsyncRead + Unpin,
{
    let mut shutdown = link.shutdown.subscribe();
    loop {
        let frame = tokio::select! {
            _ = closed(&mut shutdown) => return Ok(()),
            frame = read_frame(&mut reader, config.max_inbound_payload, config.read_timeout) => frame?,
        };

        let Some(payload) = frame else {
            info!("read EOF. id: {}", link.id());
            return Ok(());
        };

        // Routing failures are the sender's problem, not the connection's.
        let packet = Packet::new(link.id(), payload);
        tokio::select! {
            _ = closed(&mut shutdown) => return Ok(()),
            routed = router.route_in(packet) => match routed {
                Ok(()) => {}
                Err(GateError::Fault(cause)) => log_panic("route in", link.id(), &cause),
                Err(e) => warn!("route in failed. id: {} error: {}", link.id(), e),
            },
        }
    }
}

async fn write_pump<W>(
    link: Arc<Link>,
    mut writer: W,
    outbound: mpsc::Receiver<Vec<u8>>,
    config: Arc<GatewayConfig>,
) -> Result<(), GateError>
where
    W: AsyncWrite + Unpin,
{
    let mut linger = link.shutdown.subscribe();
    tokio::select! {
        flushed = flush_outbound(&link, &mut writer, outbound, &config) => flushed,
        _ = async {
            closed(&mut linger).await;
            tokio::time::sleep(config.close_linger).await;
        } => {
            warn!("close linger expired, unsent payloads dropped. id: {}", link.id());
            Ok(())
        }
    }
}

// Writes queued payloads until the link is closed and the queue is empty.
async fn flush_outbound<W>(
    link: &Link,
    writer: &mut W,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    config: &GatewayConfig,
) -> Result<(), GateError>
where
    W: AsyncWrite + Unpin,
{
    let mut shutdown = link.shutdown.subscribe();
    let mut draining = false;
    loop {
        tokio::select! {
            biased;
            _ = closed(&mut shutdown), if !draining => {
                outbound.close();
                draining = true;
            }
            payload = outbound.recv() => match payload {
                Some(payload) => {
                    write_frame(
                        writer,
                        &payload,
                        config.max_outbound_payload,
                        config.write_timeout,
                    )
                    .await?;
                }
                None => break,
            },
        }
    }

    if tokio::time::timeout(config.write_timeout, writer.shutdown())
        .await
        .is_err()
    {
        debug!("write shutdown timed out. id: {}", link.id());
    }
    Ok(())
}
