//! Real-time layer configuration.

use crate::stomp::HeartBeat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the connection manager and the echo ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Value of the STOMP `host` header.
    pub host: String,
    /// Subscription and send destinations.
    pub destinations: Destinations,
    /// Interval at which the client offers to send heart-beats (ms, 0 = never).
    pub heartbeat_outgoing_ms: u64,
    /// Interval at which the client wants to receive heart-beats (ms, 0 = never).
    pub heartbeat_incoming_ms: u64,
    /// Time allowed for the server's CONNECTED frame (ms).
    pub handshake_timeout_ms: u64,
    /// Fixed delay before a reconnect attempt (ms).
    pub reconnect_delay_ms: u64,
    /// Lifetime of an echo-ledger entry (ms).
    pub echo_ttl_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            host: "/".to_string(),
            destinations: Destinations::default(),
            heartbeat_outgoing_ms: 10_000,
            heartbeat_incoming_ms: 10_000,
            handshake_timeout_ms: 10_000,
            reconnect_delay_ms: 5_000,
            echo_ttl_ms: 120_000,
        }
    }
}

impl RealtimeConfig {
    /// Heart-beat intervals the client proposes on CONNECT.
    pub fn heart_beat(&self) -> HeartBeat {
        HeartBeat::new(
            Duration::from_millis(self.heartbeat_outgoing_ms),
            Duration::from_millis(self.heartbeat_incoming_ms),
        )
    }

    /// Handshake timeout.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Echo-ledger entry lifetime.
    pub fn echo_ttl(&self) -> Duration {
        Duration::from_millis(self.echo_ttl_ms)
    }
}

/// STOMP destinations used by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Destinations {
    /// Personal notification queue.
    pub notifications: String,
    /// Personal chat message queue.
    pub messages: String,
    /// Personal unread-delta queue.
    pub unread: String,
    /// Destination for outbound chat messages.
    pub send_message: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Self {
            notifications: "/user/queue/notifications".to_string(),
            messages: "/user/queue/messages".to_string(),
            unread: "/user/queue/unread".to_string(),
            send_message: "/app/chat.send".to_string(),
        }
    }
}
