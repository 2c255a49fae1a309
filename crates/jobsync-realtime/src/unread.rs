//! Per-conversation unread aggregation.
//!
//! Each conversation is either unread or not; the total counts unread
//! conversations, not messages. The total is kept incrementally and always
//! equals a recount of the map.

use crate::event::{ChatMessage, SeenUpdate, UnreadSnapshot};
use crate::ledger::EchoLedger;
use jobsync_types::{Role, SessionIdentity};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Conversation → unread flag, plus the number of unread conversations.
#[derive(Debug, Default, Clone)]
pub struct UnreadAggregate {
    entries: HashMap<String, bool>,
    total: usize,
}

impl UnreadAggregate {
    /// Create an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an inbound chat message. Returns true if state changed.
    ///
    /// Echoes and messages sent by `identity` never raise the count.
    pub fn on_chat_message(
        &mut self,
        message: &ChatMessage,
        identity: &SessionIdentity,
        ledger: &EchoLedger,
    ) -> bool {
        if ledger.is_own(&message.id) || identity.is_sender(&message.sender_id, message.sender_type)
        {
            trace!(message_id = %message.id, "Own message does not count as unread");
            return false;
        }
        self.set(&message.conversation_id, true)
    }

    /// Apply the authoritative value for `role`. Returns true if state changed.
    pub fn on_seen_update(&mut self, update: &SeenUpdate, role: Role) -> bool {
        let Some(unread) = update.unread_for(role) else {
            debug!(
                conversation_id = %update.conversation_id,
                role = %role,
                "Seen update carries no value for role"
            );
            return false;
        };

        let changed = self.set(&update.conversation_id, unread);
        if let Some(totals) = update.totals {
            let remote = totals.for_role(role);
            if remote != self.total as u64 {
                debug!(local = self.total, remote, "Unread total differs from server");
            }
        }
        changed
    }

    /// Replace the whole map and recount.
    pub fn on_snapshot(&mut self, snapshot: UnreadSnapshot) {
        self.entries = snapshot.entries;
        self.total = self.entries.values().filter(|unread| **unread).count();
        debug!(
            conversations = self.entries.len(),
            total = self.total,
            "Applied unread snapshot"
        );
    }

    /// Optimistically mark a conversation seen. Returns true if it was unread.
    pub fn mark_seen_locally(&mut self, conversation_id: &str) -> bool {
        self.set(conversation_id, false)
    }

    /// Number of conversations with unread messages.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Unread flag for one conversation; unknown conversations are read.
    pub fn for_conversation(&self, conversation_id: &str) -> bool {
        self.entries.get(conversation_id).copied().unwrap_or(false)
    }

    /// Copy of the map.
    pub fn snapshot(&self) -> HashMap<String, bool> {
        self.entries.clone()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total = 0;
    }

    fn set(&mut self, conversation_id: &str, unread: bool) -> bool {
        if self.for_conversation(conversation_id) == unread {
            return false;
        }

        self.entries.insert(conversation_id.to_string(), unread);
        if unread {
            self.total += 1;
        } else {
            self.total = self.total.saturating_sub(1);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;
    use std::time::Duration;

    fn identity() -> SessionIdentity {
        SessionIdentity::new("1", Role::JobSeeker)
    }

    fn ledger() -> EchoLedger {
        EchoLedger::new(Duration::from_secs(120), ManualClock::new())
    }

    fn peer_message(id: &str, conversation_id: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: "99".to_string(),
            sender_type: Role::Employer,
            content: "hi".to_string(),
            created_at: None,
        }
    }

    fn seen(conversation_id: &str, job_seeker: Option<bool>, employer: Option<bool>) -> SeenUpdate {
        SeenUpdate {
            conversation_id: conversation_id.to_string(),
            unread_for_job_seeker: job_seeker,
            unread_for_employer: employer,
            ..Default::default()
        }
    }

    #[test]
    fn test_peer_messages_saturate_per_conversation() {
        let mut unread = UnreadAggregate::new();
        let ledger = ledger();

        assert!(unread.on_chat_message(&peer_message("1", "c"), &identity(), &ledger));
        assert_eq!(unread.total(), 1);

        for id in 2..10 {
            let msg = peer_message(&id.to_string(), "c");
            assert!(!unread.on_chat_message(&msg, &identity(), &ledger));
        }
        assert_eq!(unread.total(), 1);
        assert!(unread.for_conversation("c"));

        unread.mark_seen_locally("c");
        assert_eq!(unread.total(), 0);
        assert!(unread.on_chat_message(&peer_message("10", "c"), &identity(), &ledger));
        assert_eq!(unread.total(), 1);
    }

    #[test]
    fn test_own_messages_are_ignored() {
        let mut unread = UnreadAggregate::new();
        let mut ledger = ledger();

        ledger.record("7");
        assert!(!unread.on_chat_message(&peer_message("7", "c"), &identity(), &ledger));

        let mut mine = peer_message("8", "c");
        mine.sender_id = "1".to_string();
        mine.sender_type = Role::JobSeeker;
        assert!(!unread.on_chat_message(&mine, &identity(), &ledger));

        // Same subject id under the other role is a peer.
        let mut other_role = peer_message("9", "c");
        other_role.sender_id = "1".to_string();
        assert!(unread.on_chat_message(&other_role, &identity(), &ledger));

        assert_eq!(unread.total(), 1);
    }

    #[test]
    fn test_seen_update_reads_role_field() {
        let mut unread = UnreadAggregate::new();

        assert!(unread.on_seen_update(&seen("c", Some(false), Some(true)), Role::Employer));
        assert_eq!(unread.total(), 1);

        assert!(!unread.on_seen_update(&seen("c", Some(true), Some(true)), Role::Employer));
        assert!(unread.on_seen_update(&seen("c", Some(true), Some(false)), Role::Employer));
        assert_eq!(unread.total(), 0);

        assert!(!unread.on_seen_update(&seen("c", None, None), Role::Employer));
    }

    #[test]
    fn test_seen_update_falls_back_to_recipient() {
        let mut unread = UnreadAggregate::new();
        let update = SeenUpdate {
            conversation_id: "c".to_string(),
            unread_for_recipient: Some(true),
            ..Default::default()
        };

        assert!(unread.on_seen_update(&update, Role::JobSeeker));
        assert!(unread.for_conversation("c"));
    }

    #[test]
    fn test_snapshot_replaces_and_recounts() {
        let mut unread = UnreadAggregate::new();
        unread.on_seen_update(&seen("9", Some(true), None), Role::JobSeeker);

        unread.on_snapshot(UnreadSnapshot::from_pairs([("1", true), ("2", false), ("3", true)]));

        assert_eq!(unread.total(), 2);
        assert!(unread.for_conversation("1"));
        assert!(!unread.for_conversation("2"));
        assert!(!unread.for_conversation("9"));
    }

    #[test]
    fn test_mark_seen_never_goes_negative() {
        let mut unread = UnreadAggregate::new();
        assert!(!unread.mark_seen_locally("missing"));
        assert!(!unread.mark_seen_locally("missing"));
        assert_eq!(unread.total(), 0);
        assert!(unread.snapshot().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Message(u8),
        Seen(u8, bool),
        MarkSeen(u8),
        Snapshot(Vec<(u8, bool)>),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6).prop_map(Op::Message),
            (0u8..6, any::<bool>()).prop_map(|(c, u)| Op::Seen(c, u)),
            (0u8..6).prop_map(Op::MarkSeen),
            proptest::collection::vec((0u8..6, any::<bool>()), 0..6).prop_map(Op::Snapshot),
        ]
    }

    proptest! {
        #[test]
        fn prop_total_matches_recount(ops in proptest::collection::vec(op(), 0..64)) {
            let mut unread = UnreadAggregate::new();
            let ledger = ledger();
            let identity = identity();

            for (i, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Message(c) => {
                        let message = peer_message(&i.to_string(), &c.to_string());
                        unread.on_chat_message(&message, &identity, &ledger);
                    }
                    Op::Seen(c, u) => {
                        let update = seen(&c.to_string(), Some(u), None);
                        unread.on_seen_update(&update, Role::JobSeeker);
                    }
                    Op::MarkSeen(c) => {
                        unread.mark_seen_locally(&c.to_string());
                    }
                    Op::Snapshot(pairs) => {
                        unread.on_snapshot(UnreadSnapshot::from_pairs(
                            pairs.into_iter().map(|(c, u)| (c.to_string(), u)),
                        ));
                    }
                }
                let recount = unread.snapshot().values().filter(|u| **u).count();
                prop_assert_eq!(unread.total(), recount);
            }
        }
    }
}
