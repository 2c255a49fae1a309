//! Interfaces of the collaborators the real-time layer consumes.

use crate::error::RealtimeError;
use crate::event::UnreadSnapshot;
use crate::notification::Notification;
use async_trait::async_trait;
use jobsync_types::{deserialize_id, Role};
use serde::{Deserialize, Serialize};

/// Supplies the bearer credential for a role.
pub trait TokenProvider: Send + Sync {
    /// Current access token for `role`, if signed in.
    fn access_token(&self, role: Role) -> Option<String>;
}

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Conversation id.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Whether the caller's side has unread messages.
    #[serde(default, alias = "unread")]
    pub has_unread: bool,
}

/// Builds the unread snapshot applied after a fresh connect.
pub fn snapshot_from(conversations: &[ConversationSummary]) -> UnreadSnapshot {
    UnreadSnapshot::from_pairs(
        conversations
            .iter()
            .map(|c| (c.id.clone(), c.has_unread)),
    )
}

/// Conversation history endpoints.
#[async_trait]
pub trait HistoryService: Send + Sync {
    /// Conversations visible to `role`.
    async fn conversations(&self, role: Role) -> Result<Vec<ConversationSummary>, RealtimeError>;

    /// Confirm a conversation as seen on the `role` side.
    async fn mark_as_seen(&self, role: Role, conversation_id: &str) -> Result<(), RealtimeError>;
}

/// Notification endpoints.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Most recent notifications for `role`, newest first.
    async fn recent(&self, role: Role) -> Result<Vec<Notification>, RealtimeError>;

    /// Confirm one notification read.
    async fn mark_read(&self, role: Role, id: &str) -> Result<(), RealtimeError>;

    /// Confirm every notification read.
    async fn mark_all_read(&self, role: Role) -> Result<(), RealtimeError>;
}
