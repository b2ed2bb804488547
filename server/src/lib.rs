//! # Gateway Server Library
//!
//! The front door of the game-server architecture. It holds tens of thousands
//! of persistent TCP connections, frames a length-prefixed packet protocol
//! over each one, and routes packets by connection id between clients and a
//! backend. It knows nothing about what the payloads mean.
//!
//! ## Core Responsibilities
//!
//! ### Connection Lifecycle
//! Every accepted socket gets a fresh connection id, a `Link`, and a slot in
//! the `Registry`. A link lives until its read or write side fails, times
//! out, sees a protocol violation, or is removed explicitly. Teardown always
//! removes the registry entry and closes the link exactly once.
//!
//! ### Framing
//! Frames are a 4-byte big-endian length followed by the payload. Inbound
//! payloads must be `1..=16384` bytes and outbound payloads `1..=1048576`;
//! anything else is fatal for that connection only.
//!
//! ### Routing
//! Packets addressed to a connection id go to that link. The reserved id
//! `BROADCAST` fans out to every live link and `DROP` discards the packet.
//!
//! ### Backpressure
//! Each link has a small bounded outbound queue. A sender waiting on a full
//! queue gives up after the enqueue timeout, so a slow client only ever
//! hurts itself.
//!
//! ## Architecture Design
//!
//! One task accepts connections. Each connection runs two tasks for its whole
//! life: a read pump and a write pump. The registry's map is the only state
//! shared between connections; each link's queue is the only channel into
//! its write pump.
//!
//! ```text
//! Gateway ──► Registry::put ──► read pump ──► Router::route_in ──► Backend
//!                                                                   │
//! socket ◄── write pump ◄── Link::put_bytes ◄── Router::route_out ◄─┘
//! ```
//!
//! The backend runs on the sender's read pump, so a full outbound queue
//! only ever slows the connection whose packet is being answered.
//!
//! ### Failure Isolation
//! Routing and every spawned task run behind a panic boundary. A fault while
//! handling one packet becomes an error value; a fault inside a pump tears
//! down that connection and nothing else. Only failing to bind the listener
//! is fatal to the process.
//!
//! ## Module Organization
//!
//! - `config`: runtime configuration and its TOML file form
//! - `error`: the `GateError` taxonomy
//! - `id_generator`: connection id allocation
//! - `link`: one connection, its outbound queue and its two pumps
//! - `registry`: the concurrent map owning every live link
//! - `router`: unicast / broadcast / drop dispatch and the panic boundary
//! - `backend`: the hook where application logic plugs in
//! - `network`: the TCP listener
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use gate_server::backend::Echo;
//! use gate_server::config::GatewayConfig;
//! use gate_server::id_generator::SequentialIds;
//! use gate_server::network::Gateway;
//! use gate_server::registry::Registry;
//! use gate_server::router::Router;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(GatewayConfig::default());
//!     let registry = Arc::new(Registry::new(config.max_connections));
//!
//!     // Answer every packet by sending it back to its sender
//!     let router = Arc::new(Router::new(registry, Arc::new(Echo)));
//!
//!     let gateway = Gateway::bind(config, Arc::new(SequentialIds::new()), router).await?;
//!     Arc::new(gateway).run().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod id_generator;
pub mod link;
pub mod network;
pub mod registry;
pub mod router;

pub use error::GateError;
pub use gate_shared::{ConnectionId, Packet, BROADCAST, DROP};
