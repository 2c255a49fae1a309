//! Notifications and the client-side notification store.

use jobsync_types::{deserialize_id, deserialize_optional_id};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// A notification for the signed-in subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Unique notification ID.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Backend notification type (e.g. `NEW_MESSAGE`, `APPLICATION_STATUS`).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Brief title.
    #[serde(default)]
    pub title: String,
    /// Notification body.
    #[serde(default)]
    pub content: String,
    /// Whether the notification has been read.
    #[serde(default, alias = "isRead")]
    pub read: bool,
    /// Server timestamp, as sent.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Conversation the notification refers to, if any.
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub conversation_id: Option<String>,
    /// Subject that caused the notification.
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub sender_id: Option<String>,
    /// Alternative author field used by some notification types.
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub created_by: Option<String>,
    /// Chat message the notification was raised for.
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub message_id: Option<String>,
}

impl Notification {
    /// Create a new unread notification.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            title: title.into(),
            content: String::new(),
            read: false,
            created_at: None,
            conversation_id: None,
            sender_id: None,
            created_by: None,
            message_id: None,
        }
    }

    /// Set the originating chat message.
    pub fn with_message(
        mut self,
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self.message_id = Some(message_id.into());
        self
    }

    /// Set the sender.
    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    /// Mark as read.
    pub fn mark_read(&mut self) {
        self.read = true;
    }

    /// True if the notification was authored by `subject_id`.
    pub fn is_authored_by(&self, subject_id: &str) -> bool {
        self.sender_id.as_deref() == Some(subject_id)
            || self.created_by.as_deref() == Some(subject_id)
    }
}

/// Newest-first notification list with read state.
///
/// Entries are only ever added or marked read; this layer never deletes
/// one except when the whole store is cleared on an identity switch.
#[derive(Debug, Default)]
pub struct NotificationStore {
    items: VecDeque<Notification>,
    ids: HashSet<String>,
}

impl NotificationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the head. Returns false if the id is already present.
    pub fn add(&mut self, notification: Notification) -> bool {
        if !self.ids.insert(notification.id.clone()) {
            return false;
        }
        self.items.push_front(notification);
        true
    }

    /// Merge a newest-first list fetched from the server.
    ///
    /// Unknown entries listed before the first known id are newer than
    /// anything stored and go to the head, in order; the rest are older and
    /// go to the tail. Returns how many were added.
    pub fn merge_recent(&mut self, recent: impl IntoIterator<Item = Notification>) -> usize {
        let mut newer = Vec::new();
        let mut older = Vec::new();
        let mut reached_known = false;

        for notification in recent {
            if self.ids.contains(&notification.id) {
                reached_known = true;
                continue;
            }
            if reached_known {
                older.push(notification);
            } else {
                newer.push(notification);
            }
        }

        let mut added = 0;
        for notification in newer.into_iter().rev() {
            if self.ids.insert(notification.id.clone()) {
                self.items.push_front(notification);
                added += 1;
            }
        }
        for notification in older {
            if self.ids.insert(notification.id.clone()) {
                self.items.push_back(notification);
                added += 1;
            }
        }
        added
    }

    /// Mark one notification read. Returns true if it was unread.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.read => {
                n.mark_read();
                true
            }
            _ => false,
        }
    }

    /// Mark everything read. Returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for n in self.items.iter_mut().filter(|n| !n.read) {
            n.mark_read();
            changed += 1;
        }
        changed
    }

    /// All notifications, newest first.
    pub fn list(&self) -> Vec<Notification> {
        self.items.iter().cloned().collect()
    }

    /// Number of unread notifications.
    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    /// True if a notification with `id` is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of stored notifications.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the store is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.items.clear();
        self.ids.clear();
    }
}
