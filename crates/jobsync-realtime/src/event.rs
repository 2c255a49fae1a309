//! Inbound event types and the frame-body classifier.

use crate::channel::ChannelKind;
use crate::error::ClassifyError;
use crate::notification::Notification;
use jobsync_types::{deserialize_id, Role};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A classified inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A notification pushed to the notification channel.
    Notification(Notification),
    /// A chat message, own or peer.
    ChatMessage(ChatMessage),
    /// Authoritative per-conversation unread value.
    SeenUpdate(SeenUpdate),
    /// Full unread map, fetched after connecting.
    UnreadSnapshot(UnreadSnapshot),
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message id.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Conversation the message belongs to.
    #[serde(deserialize_with = "deserialize_id")]
    pub conversation_id: String,
    /// Sender's subject id.
    #[serde(deserialize_with = "deserialize_id")]
    pub sender_id: String,
    /// Sender's role.
    pub sender_type: Role,
    /// Message text.
    #[serde(default)]
    pub content: String,
    /// Server timestamp, as sent.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Per-role unread value for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenUpdate {
    /// Conversation being updated.
    #[serde(deserialize_with = "deserialize_id")]
    pub conversation_id: String,
    /// Unread value on the job-seeker side.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub unread_for_job_seeker: Option<bool>,
    /// Unread value on the employer side.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub unread_for_employer: Option<bool>,
    /// Unread value for whoever receives the frame.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub unread_for_recipient: Option<bool>,
    /// Server-side totals, if sent.
    #[serde(default, skip_deserializing)]
    pub totals: Option<UnreadTotals>,
}

impl SeenUpdate {
    /// The unread value that applies to `role`.
    pub fn unread_for(&self, role: Role) -> Option<bool> {
        let own = match role {
            Role::JobSeeker => self.unread_for_job_seeker,
            Role::Employer => self.unread_for_employer,
        };
        own.or(self.unread_for_recipient)
    }
}

/// Server-reported count of conversations with unread messages per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnreadTotals {
    /// Job-seeker side.
    pub job_seeker: u64,
    /// Employer side.
    pub employer: u64,
}

impl UnreadTotals {
    /// Total for `role`.
    pub fn for_role(&self, role: Role) -> u64 {
        match role {
            Role::JobSeeker => self.job_seeker,
            Role::Employer => self.employer,
        }
    }
}

/// Full conversation → unread map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnreadSnapshot {
    /// Unread flag per conversation.
    pub entries: HashMap<String, bool>,
}

impl UnreadSnapshot {
    /// Builds a snapshot from `(conversation_id, has_unread)` pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        Self {
            entries: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Accepts booleans or counts; any count above zero is unread.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Count(i64),
    }

    Ok(Option::<Flag>::deserialize(deserializer)?.map(|f| match f {
        Flag::Bool(b) => b,
        Flag::Count(n) => n > 0,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnreadEnvelope {
    #[serde(rename = "type")]
    kind: String,
    unread: SeenUpdate,
    #[serde(default)]
    total_unread_conversations: Option<UnreadTotals>,
}

const MESSAGE_ENVELOPE: &str = "MESSAGE";
const SEEN_UPDATE: &str = "SEEN_UPDATE";
const UNREAD_UPDATE: &str = "UNREAD_UPDATE";

/// Parses a frame body received on `channel`.
pub fn classify(channel: ChannelKind, body: &str) -> Result<InboundEvent, ClassifyError> {
    let malformed = |source| ClassifyError::Malformed { channel, source };

    match channel {
        ChannelKind::Notifications => serde_json::from_str::<Notification>(body)
            .map(InboundEvent::Notification)
            .map_err(malformed),
        ChannelKind::Messages => {
            let mut value: Value = serde_json::from_str(body).map_err(malformed)?;
            if let Some(kind) = value.get("type").and_then(Value::as_str) {
                if kind != MESSAGE_ENVELOPE {
                    return Err(ClassifyError::UnsupportedType {
                        channel,
                        kind: kind.to_string(),
                    });
                }
                if let Some(inner) = value.get_mut("message").map(Value::take) {
                    value = inner;
                }
            }
            serde_json::from_value::<ChatMessage>(value)
                .map(InboundEvent::ChatMessage)
                .map_err(malformed)
        }
        ChannelKind::Unread => {
            let envelope: UnreadEnvelope = serde_json::from_str(body).map_err(malformed)?;
            match envelope.kind.as_str() {
                SEEN_UPDATE | UNREAD_UPDATE => {
                    let mut update = envelope.unread;
                    update.totals = envelope.total_unread_conversations;
                    Ok(InboundEvent::SeenUpdate(update))
                }
                other => Err(ClassifyError::UnsupportedType {
                    channel,
                    kind: other.to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BARE: &str = r#"{"id": 11, "conversationId": 3, "senderId": 8, "senderType": "EMPLOYER", "content": "hello", "createdAt": "2024-05-01T10:00:00"}"#;

    #[test]
    fn test_bare_and_wrapped_messages_normalize_identically() {
        let wrapped = format!(r#"{{"type": "MESSAGE", "message": {BARE}}}"#);

        let a = classify(ChannelKind::Messages, BARE).unwrap();
        let b = classify(ChannelKind::Messages, &wrapped).unwrap();
        assert_eq!(a, b);

        let InboundEvent::ChatMessage(message) = a else {
            panic!("expected chat message");
        };
        assert_eq!(message.id, "11");
        assert_eq!(message.conversation_id, "3");
        assert_eq!(message.sender_type, Role::Employer);
        assert_eq!(message.content, "hello");
    }

    #[test]
    fn test_message_channel_rejects_other_types() {
        let err = classify(ChannelKind::Messages, r#"{"type": "TYPING", "conversationId": 1}"#)
            .unwrap_err();
        assert!(matches!(err, ClassifyError::UnsupportedType { ref kind, .. } if kind == "TYPING"));
    }

    #[test]
    fn test_malformed_bodies() {
        assert!(matches!(
            classify(ChannelKind::Messages, "not json"),
            Err(ClassifyError::Malformed { .. })
        ));
        assert!(matches!(
            classify(ChannelKind::Messages, r#"{"id": 1}"#),
            Err(ClassifyError::Malformed { .. })
        ));
        assert!(matches!(
            classify(ChannelKind::Notifications, "[]"),
            Err(ClassifyError::Malformed { .. })
        ));
    }

    #[test]
    fn test_seen_and_unread_updates() {
        let seen = r#"{"type": "SEEN_UPDATE", "unread": {"conversationId": 5, "unreadForJobSeeker": 0, "unreadForEmployer": 2}, "totalUnreadConversations": {"jobSeeker": 0, "employer": 4}}"#;
        let InboundEvent::SeenUpdate(update) = classify(ChannelKind::Unread, seen).unwrap() else {
            panic!("expected seen update");
        };
        assert_eq!(update.conversation_id, "5");
        assert_eq!(update.unread_for(Role::JobSeeker), Some(false));
        assert_eq!(update.unread_for(Role::Employer), Some(true));
        assert_eq!(update.totals.map(|t| t.for_role(Role::Employer)), Some(4));

        let unread = r#"{"type": "UNREAD_UPDATE", "unread": {"conversationId": "5", "unreadForRecipient": true}}"#;
        let InboundEvent::SeenUpdate(update) = classify(ChannelKind::Unread, unread).unwrap() else {
            panic!("expected seen update");
        };
        assert_eq!(update.unread_for(Role::JobSeeker), Some(true));
        assert_eq!(update.unread_for(Role::Employer), Some(true));
        assert_eq!(update.totals, None);

        assert!(matches!(
            classify(ChannelKind::Unread, r#"{"type": "RESET", "unread": {"conversationId": 1}}"#),
            Err(ClassifyError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_notification_payload() {
        let body = r#"{"id": 90, "type": "NEW_MESSAGE", "title": "New message", "content": "Alice wrote", "isRead": false, "createdAt": "2024-05-01T10:00:00", "conversationId": 3, "messageId": 11, "senderId": 8}"#;
        let InboundEvent::Notification(n) = classify(ChannelKind::Notifications, body).unwrap()
        else {
            panic!("expected notification");
        };
        assert_eq!(n.id, "90");
        assert_eq!(n.kind, "NEW_MESSAGE");
        assert!(!n.read);
        assert_eq!(n.conversation_id.as_deref(), Some("3"));
        assert_eq!(n.message_id.as_deref(), Some("11"));
        assert_eq!(n.sender_id.as_deref(), Some("8"));
        assert_eq!(n.created_by, None);
    }
}
