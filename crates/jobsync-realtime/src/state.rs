//! Client-side sync state and the epoch guard around it.

use crate::clock::Clock;
use crate::config::RealtimeConfig;
use crate::event::{ChatMessage, InboundEvent};
use crate::ledger::EchoLedger;
use crate::notification::{Notification, NotificationStore};
use crate::registry::SubscriberRegistry;
use crate::stomp::{Command, Frame};
use crate::unread::UnreadAggregate;
use jobsync_types::SessionIdentity;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Lifecycle of the real-time connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// No transport, or the last one dropped.
    Disconnected,
    /// Opening the transport or waiting for CONNECTED.
    Connecting,
    /// Handshake complete and subscriptions sent.
    Connected,
    /// The last attempt was refused before CONNECTED.
    Error,
}

impl ConnectionStatus {
    /// Wire-style name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What subscribers must see after an event was applied.
#[derive(Debug)]
pub(crate) enum Delivery {
    Nothing,
    Message(ChatMessage),
    Notification(Notification),
}

/// Everything guarded by the state lock.
#[derive(Debug)]
pub(crate) struct SyncState {
    pub epoch: u64,
    pub identity: Option<SessionIdentity>,
    pub status: ConnectionStatus,
    pub outbound: Option<mpsc::UnboundedSender<String>>,
    pub ledger: EchoLedger,
    pub unread: UnreadAggregate,
    pub notifications: NotificationStore,
}

impl SyncState {
    fn new(config: &RealtimeConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            epoch: 0,
            identity: None,
            status: ConnectionStatus::Disconnected,
            outbound: None,
            ledger: EchoLedger::new(config.echo_ttl(), clock),
            unread: UnreadAggregate::new(),
            notifications: NotificationStore::new(),
        }
    }

    /// Fold one classified event into the state.
    pub fn apply(&mut self, event: InboundEvent) -> Delivery {
        let Some(identity) = self.identity.as_ref() else {
            return Delivery::Nothing;
        };

        match event {
            InboundEvent::ChatMessage(message) => {
                if self.ledger.is_own(&message.id) {
                    debug!(message_id = %message.id, "Suppressed echo of own message");
                    return Delivery::Nothing;
                }
                self.unread.on_chat_message(&message, identity, &self.ledger);
                Delivery::Message(message)
            }
            InboundEvent::Notification(notification) => {
                let echo = notification
                    .message_id
                    .as_deref()
                    .is_some_and(|id| self.ledger.is_own(id));
                if echo || notification.is_authored_by(&identity.subject_id) {
                    debug!(
                        notification_id = %notification.id,
                        "Skipped self-originated notification"
                    );
                    return Delivery::Nothing;
                }
                if self.notifications.add(notification.clone()) {
                    Delivery::Notification(notification)
                } else {
                    debug!(notification_id = %notification.id, "Duplicate notification");
                    Delivery::Nothing
                }
            }
            InboundEvent::SeenUpdate(update) => {
                self.unread.on_seen_update(&update, identity.role);
                Delivery::Nothing
            }
            InboundEvent::UnreadSnapshot(snapshot) => {
                self.unread.on_snapshot(snapshot);
                Delivery::Nothing
            }
        }
    }

    fn reset(&mut self) {
        self.ledger.clear();
        self.unread.clear();
        self.notifications.clear();
    }
}

/// State shared between the service facade and the connection task.
pub(crate) struct Shared {
    state: Mutex<SyncState>,
    status_tx: watch::Sender<ConnectionStatus>,
    pub messages: SubscriberRegistry<ChatMessage>,
    pub notifications: SubscriberRegistry<Notification>,
    pub statuses: SubscriberRegistry<ConnectionStatus>,
}

impl Shared {
    pub fn new(config: &RealtimeConfig, clock: Arc<dyn Clock>) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            state: Mutex::new(SyncState::new(config, clock)),
            status_tx,
            messages: SubscriberRegistry::new(),
            notifications: SubscriberRegistry::new(),
            statuses: SubscriberRegistry::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.state.lock().epoch == epoch
    }

    /// Start a new epoch bound to `identity`.
    ///
    /// Sends DISCONNECT on the live transport if there is one and reports
    /// DISCONNECTED. Stores are left alone; see [`Shared::reset_stores`].
    pub fn supersede(&self, identity: Option<SessionIdentity>) -> u64 {
        let (epoch, changed) = {
            let mut state = self.state.lock();
            state.epoch += 1;
            state.identity = identity;
            if let Some(outbound) = state.outbound.take() {
                let _ = outbound.send(Frame::new(Command::Disconnect).encode());
            }
            let changed = self.transition(&mut state, ConnectionStatus::Disconnected);
            (state.epoch, changed)
        };
        self.announce(changed);
        epoch
    }

    /// Clear ledger, unread map and notifications if `epoch` is current.
    pub fn reset_stores(&self, epoch: u64) {
        let mut state = self.state.lock();
        if state.epoch == epoch {
            state.reset();
        }
    }

    /// Set the status on behalf of `epoch`. Returns false if superseded.
    pub fn set_status(&self, epoch: u64, status: ConnectionStatus) -> bool {
        let changed = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return false;
            }
            if status != ConnectionStatus::Connected {
                state.outbound = None;
            }
            self.transition(&mut state, status)
        };
        self.announce(changed);
        true
    }

    /// Enter CONNECTED with `outbound` as the send path.
    pub fn mark_connected(&self, epoch: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let changed = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return false;
            }
            state.outbound = Some(outbound);
            self.transition(&mut state, ConnectionStatus::Connected)
        };
        self.announce(changed);
        true
    }

    /// Apply an event on behalf of `epoch`. `None` if superseded.
    pub fn apply(&self, epoch: u64, event: InboundEvent) -> Option<Delivery> {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return None;
        }
        Some(state.apply(event))
    }

    /// Merge fetched notifications on behalf of `epoch`.
    pub fn seed_notifications(&self, epoch: u64, recent: Vec<Notification>) -> bool {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return false;
        }
        let added = state.notifications.merge_recent(recent);
        debug!(added, "Seeded notification history");
        true
    }

    /// Hand a delivery to subscribers. Must be called without the lock held.
    pub fn dispatch(&self, delivery: Delivery) {
        match delivery {
            Delivery::Nothing => {}
            Delivery::Message(message) => {
                self.messages.dispatch(&message);
            }
            Delivery::Notification(notification) => {
                self.notifications.dispatch(&notification);
            }
        }
    }

    fn transition(
        &self,
        state: &mut SyncState,
        status: ConnectionStatus,
    ) -> Option<ConnectionStatus> {
        if state.status == status {
            return None;
        }
        debug!(from = %state.status, to = %status, "Connection status changed");
        state.status = status;
        self.status_tx.send_replace(status);
        Some(status)
    }

    fn announce(&self, changed: Option<ConnectionStatus>) {
        if let Some(status) = changed {
            self.statuses.dispatch(&status);
        }
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("state", &*self.state.lock())
            .field("messages", &self.messages)
            .field("notifications", &self.notifications)
            .finish()
    }
}
