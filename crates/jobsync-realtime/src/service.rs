//! The sync service facade.

use crate::backend::{HistoryService, NotificationService, TokenProvider};
use crate::clock::{Clock, SystemClock};
use crate::config::RealtimeConfig;
use crate::connection::{self, Inner};
use crate::error::RealtimeError;
use crate::event::ChatMessage;
use crate::notification::Notification;
use crate::registry::Subscription;
use crate::state::{ConnectionStatus, Shared};
use crate::stomp::{Command, Frame};
use crate::transport::Connector;
use jobsync_types::{Role, SessionIdentity};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// External collaborators the service is built from.
#[derive(Clone)]
pub struct Collaborators {
    /// Opens transports.
    pub connector: Arc<dyn Connector>,
    /// Supplies bearer credentials.
    pub tokens: Arc<dyn TokenProvider>,
    /// Conversation endpoints.
    pub history: Arc<dyn HistoryService>,
    /// Notification endpoints.
    pub notifications: Arc<dyn NotificationService>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingMessage<'a> {
    conversation_id: &'a str,
    content: &'a str,
}

/// Client-side real-time sync for one signed-in subject at a time.
///
/// Owns the connection task, the echo ledger, the unread aggregate, the
/// notification store and the subscriber registries. Identity changes go
/// through [`SyncService::set_identity`] / [`SyncService::clear_identity`],
/// which tear the old connection down before any state of the new identity
/// is touched.
pub struct SyncService {
    inner: Arc<Inner>,
    worker: AsyncMutex<Option<JoinHandle<()>>>,
}

impl SyncService {
    /// Create a service using the runtime clock.
    pub fn new(config: RealtimeConfig, collaborators: Collaborators) -> Self {
        Self::with_clock(config, collaborators, Arc::new(SystemClock))
    }

    /// Create a service with an explicit clock for echo expiry.
    pub fn with_clock(
        config: RealtimeConfig,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shared = Shared::new(&config, clock);
        Self {
            inner: Arc::new(Inner {
                config,
                collaborators,
                shared,
            }),
            worker: AsyncMutex::new(None),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    /// Bind `subject_id` in `role` and connect.
    pub async fn set_identity(&self, subject_id: impl Into<String>, role: Role) {
        self.bind(SessionIdentity::new(subject_id, role)).await
    }

    /// Bind `identity` and connect.
    ///
    /// A different identity tears down the current connection and clears
    /// all state first. Binding the bound identity again only restarts the
    /// connection task if it has stopped, e.g. for want of a credential.
    pub async fn bind(&self, identity: SessionIdentity) {
        let mut worker = self.worker.lock().await;

        if self.identity().as_ref() == Some(&identity) {
            if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
                debug!(identity = %identity, "Identity already bound");
                return;
            }
            let epoch = self.inner.shared.supersede(Some(identity.clone()));
            stop(&mut worker).await;
            *worker = Some(self.spawn(epoch, identity));
            return;
        }

        info!(identity = %identity, "Binding identity");
        let epoch = self.inner.shared.supersede(Some(identity.clone()));
        stop(&mut worker).await;
        self.inner.shared.reset_stores(epoch);
        *worker = Some(self.spawn(epoch, identity));
    }

    /// Sign out: tear down the connection and clear all state.
    pub async fn clear_identity(&self) {
        let mut worker = self.worker.lock().await;
        let Some(identity) = self.identity() else {
            return;
        };

        info!(identity = %identity, "Clearing identity");
        let epoch = self.inner.shared.supersede(None);
        stop(&mut worker).await;
        self.inner.shared.reset_stores(epoch);
    }

    /// (Re)start the connection for the bound identity.
    ///
    /// Does nothing without an identity or while a connection task runs.
    pub async fn connect(&self) {
        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let Some(identity) = self.identity() else {
            debug!("No identity bound, not connecting");
            return;
        };

        let epoch = self.inner.shared.supersede(Some(identity.clone()));
        stop(&mut worker).await;
        *worker = Some(self.spawn(epoch, identity));
    }

    /// Close the connection and stop reconnecting. State and identity are kept.
    pub async fn disconnect(&self) {
        let mut worker = self.worker.lock().await;
        let identity = self.identity();
        info!(identity = ?identity, "Disconnecting");
        self.inner.shared.supersede(identity);
        stop(&mut worker).await;
    }

    fn spawn(&self, epoch: u64, identity: SessionIdentity) -> JoinHandle<()> {
        tokio::spawn(connection::run(self.inner.clone(), epoch, identity))
    }

    /// Send a chat message over the live connection.
    ///
    /// Fails with [`RealtimeError::NotConnected`] unless the connection is
    /// CONNECTED. The frame is queued without waiting for acknowledgment;
    /// the server's echo arrives on the message channel.
    pub fn send_chat_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<(), RealtimeError> {
        let outbound = {
            let state = self.inner.shared.lock();
            match (state.status, state.outbound.as_ref()) {
                (ConnectionStatus::Connected, Some(outbound)) => outbound.clone(),
                _ => return Err(RealtimeError::NotConnected),
            }
        };

        let body = serde_json::to_string(&OutgoingMessage {
            conversation_id,
            content,
        })?;
        let frame = Frame::new(Command::Send)
            .header("destination", self.inner.config.destinations.send_message.as_str())
            .header("content-type", "application/json")
            .header("content-length", body.len().to_string())
            .body(body);

        outbound
            .send(frame.encode())
            .map_err(|_| RealtimeError::NotConnected)?;
        debug!(conversation_id, "Queued chat message");
        Ok(())
    }

    /// Remember a message id this client produced so its echo is ignored.
    pub fn record_own_sent_message(&self, message_id: impl Into<String>) {
        self.inner.shared.lock().ledger.record(message_id);
    }

    /// Mark one notification read locally, then confirm in the background.
    pub fn mark_as_read(&self, notification_id: &str) {
        let role = {
            let mut state = self.inner.shared.lock();
            let Some(role) = state.identity.as_ref().map(|identity| identity.role) else {
                return;
            };
            state.notifications.mark_read(notification_id);
            role
        };

        let api = self.inner.collaborators.notifications.clone();
        let id = notification_id.to_string();
        confirm("mark_as_read", async move { api.mark_read(role, &id).await });
    }

    /// Mark every notification read locally, then confirm in the background.
    pub fn mark_all_as_read(&self) {
        let role = {
            let mut state = self.inner.shared.lock();
            let Some(role) = state.identity.as_ref().map(|identity| identity.role) else {
                return;
            };
            let changed = state.notifications.mark_all_read();
            debug!(changed, "Marked all notifications read");
            role
        };

        let api = self.inner.collaborators.notifications.clone();
        confirm("mark_all_as_read", async move { api.mark_all_read(role).await });
    }

    /// Zero a conversation's unread flag locally, then confirm in the background.
    pub fn mark_conversation_as_seen_locally(&self, conversation_id: &str) {
        let role = {
            let mut state = self.inner.shared.lock();
            let Some(role) = state.identity.as_ref().map(|identity| identity.role) else {
                return;
            };
            state.unread.mark_seen_locally(conversation_id);
            role
        };

        let api = self.inner.collaborators.history.clone();
        let id = conversation_id.to_string();
        confirm("mark_as_seen", async move { api.mark_as_seen(role, &id).await });
    }

    /// Register a callback for every non-echo chat message.
    pub fn subscribe_to_messages<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.inner.shared.messages.subscribe(callback)
    }

    /// Register a callback for newly stored notifications.
    pub fn subscribe_to_notifications<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.inner.shared.notifications.subscribe(callback)
    }

    /// Register a callback for connection status changes.
    pub fn subscribe_to_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.inner.shared.statuses.subscribe(callback)
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.shared.lock().status
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.shared.watch()
    }

    /// Bound identity, if any.
    pub fn identity(&self) -> Option<SessionIdentity> {
        self.inner.shared.lock().identity.clone()
    }

    /// Notifications, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.shared.lock().notifications.list()
    }

    /// Number of unread notifications.
    pub fn unread_count(&self) -> usize {
        self.inner.shared.lock().notifications.unread_count()
    }

    /// Copy of the conversation unread map.
    pub fn unread_map(&self) -> HashMap<String, bool> {
        self.inner.shared.lock().unread.snapshot()
    }

    /// Number of conversations with unread messages.
    pub fn unread_total(&self) -> usize {
        self.inner.shared.lock().unread.total()
    }

    /// Unread flag of one conversation.
    pub fn unread_for_conversation(&self, conversation_id: &str) -> bool {
        self.inner.shared.lock().unread.for_conversation(conversation_id)
    }

    /// True while `message_id` is in the echo ledger.
    pub fn is_own_message(&self, message_id: &str) -> bool {
        self.inner.shared.lock().ledger.is_own(message_id)
    }
}

impl fmt::Debug for SyncService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncService")
            .field("status", &self.status())
            .field("identity", &self.identity())
            .finish()
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}

async fn stop(worker: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = worker.take() {
        handle.abort();
        let _ = handle.await;
    }
}

/// Run a best-effort confirmation. Failures are logged; local state stays.
fn confirm<F>(action: &'static str, confirmation: F)
where
    F: Future<Output = Result<(), RealtimeError>> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                if let Err(e) = confirmation.await {
                    warn!(action, error = %e, "Server confirmation failed");
                }
            });
        }
        Err(_) => warn!(action, "No runtime available, confirmation skipped"),
    }
}
