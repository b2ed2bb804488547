//! Connection id allocation.
//!
//! Ids for ordinary connections start at 1 and never take the reserved
//! `DROP` or `BROADCAST` values.

use gate_shared::{ConnectionId, BROADCAST};
use std::sync::atomic::{AtomicI64, Ordering};

/// Hands out connection ids. Implementations must never return a reserved id.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> ConnectionId;
}

/// Counter starting at 1 that wraps back to 1 before reaching `BROADCAST`.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicI64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: ConnectionId) -> Self {
        Self {
            next: AtomicI64::new(first.clamp(1, BROADCAST - 1)),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> ConnectionId {
        let mut current = self.next.load(Ordering::Relaxed);
        loop {
            let following = if current >= BROADCAST - 1 { 1 } else { current + 1 };
            match self.next.compare_exchange_weak(
                current,
                following,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current,
                Err(actual) => current = actual,
            }
        }
    }
}
