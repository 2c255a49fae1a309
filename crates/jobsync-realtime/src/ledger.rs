//! Echo suppression ledger.
//!
//! The transport does not correlate a sent chat message with its echo: the
//! server delivers it back on the same subscription a peer message would
//! use. Ids the client produced are recorded here for a short TTL so the
//! echo can be recognized.

use crate::clock::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Short-lived set of self-produced message ids.
#[derive(Debug)]
pub struct EchoLedger {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: HashMap<String, Instant>,
}

impl EchoLedger {
    /// Create a ledger whose entries live for `ttl`.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: HashMap::new(),
        }
    }

    /// Record an id the client just produced.
    ///
    /// Recording an id again restarts its TTL.
    pub fn record(&mut self, message_id: impl Into<String>) {
        let now = self.clock.now();
        self.entries.retain(|_, expires_at| *expires_at > now);

        let message_id = message_id.into();
        trace!(message_id = %message_id, "Recorded own message");
        self.entries.insert(message_id, now + self.ttl);
    }

    /// True if `message_id` was recorded and has not expired.
    pub fn is_own(&self, message_id: &str) -> bool {
        self.entries
            .get(message_id)
            .is_some_and(|expires_at| *expires_at > self.clock.now())
    }

    /// Number of entries, including expired ones not yet pruned.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
