//! Connection registry for the gateway
//!
//! The registry is the single owner of every live `Link`, keyed by its
//! connection id. It enforces:
//! - At most one link per connection id
//! - The configured ceiling on concurrent connections
//! - Close-on-removal, so a link leaves the map and shuts down exactly once
//!
//! Inserts, removals and broadcast snapshots take the write lock; plain
//! lookups share the read lock.

use crate::error::GateError;
use crate::link::Link;
use gate_shared::ConnectionId;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct Registry {
    /// Live links indexed by connection id
    links: RwLock<HashMap<ConnectionId, Arc<Link>>>,
    /// Maximum number of concurrent links allowed
    max_connections: usize,
}

impl Registry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            links: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Registers a link under `id`.
    ///
    /// The capacity and uniqueness checks run under the same write lock as the
    /// insert, so two racing puts for one id cannot both succeed. A conflicting
    /// put leaves the existing entry untouched.
    pub async fn put(&self, id: ConnectionId, link: Arc<Link>) -> Result<(), GateError> {
        let mut links = self.links.write().await;
        if links.len() >= self.max_connections {
            return Err(GateError::CapacityExceeded {
                limit: self.max_connections,
            });
        }
        if links.contains_key(&id) {
            return Err(GateError::IdConflict(id));
        }
        link.mark_registered();
        links.insert(id, link);
        Ok(())
    }

    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Link>> {
        self.links.read().await.get(&id).cloned()
    }

    /// Removes and closes the link under `id`.
    ///
    /// Returns false if nothing was registered under that id, in which case
    /// nothing is closed.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let (removed, count) = {
            let mut links = self.links.write().await;
            let removed = links.remove(&id);
            (removed, links.len())
        };

        match removed {
            Some(link) => {
                info!(
                    "has been removed: {} id: {} map count: {}",
                    link.peer_addr(),
                    id,
                    count
                );
                link.close();
                true
            }
            None => false,
        }
    }

    /// Copies the live set so a broadcast can fan out without holding the lock.
    pub async fn snapshot(&self) -> HashMap<ConnectionId, Arc<Link>> {
        self.links.write().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.links.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.links.read().await.is_empty()
    }
}
