//! # Jobsync Real-time
//!
//! Real-time synchronization layer for the jobsync job-portal client.
//!
//! A single long-lived STOMP 1.2 connection multiplexes three personal
//! channels into consistent client-side state:
//!
//! - **Notifications**: stored newest first, with read state
//! - **Chat messages**: delivered to subscribers, feeding unread flags
//! - **Unread deltas**: authoritative per-conversation unread flags
//!
//! Echoes of the client's own messages are recognized through a short-lived
//! ledger. Switching identity tears down the old connection and clears all
//! state before the new identity's first event is applied.
//!
//! ## Example
//!
//! ```rust,no_run
//! use jobsync_realtime::{Collaborators, RealtimeConfig, SyncService};
//! use jobsync_types::Role;
//!
//! # async fn example(collaborators: Collaborators) {
//! let service = SyncService::new(RealtimeConfig::default(), collaborators);
//!
//! let subscription = service.subscribe_to_messages(|message| {
//!     println!("{}: {}", message.sender_id, message.content);
//! });
//!
//! service.set_identity("42", Role::JobSeeker).await;
//! println!("unread conversations: {}", service.unread_total());
//!
//! subscription.unsubscribe();
//! # }
//! ```
//!
//! ## Wire Protocol
//!
//! ### Outbound
//!
//! ```text
//! SEND
//! destination:/app/chat.send
//! content-type:application/json
//!
//! {"conversationId":"7","content":"Hello"}
//! ```
//!
//! ### Unread channel
//!
//! ```json
//! {
//!   "type": "SEEN_UPDATE",
//!   "unread": {"conversationId": 7, "unreadForJobSeeker": false},
//!   "totalUnreadConversations": {"jobSeeker": 2, "employer": 0}
//! }
//! ```

pub mod backend;
pub mod channel;
pub mod clock;
pub mod config;
mod connection;
pub mod error;
pub mod event;
pub mod ledger;
pub mod notification;
pub mod registry;
mod service;
mod state;
pub mod stomp;
pub mod transport;
pub mod unread;

pub use backend::{
    snapshot_from, ConversationSummary, HistoryService, NotificationService, TokenProvider,
};
pub use channel::{Channel, ChannelKind, ChannelSet};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Destinations, RealtimeConfig};
pub use error::{BoxError, ClassifyError, FrameError, RealtimeError};
pub use event::{classify, ChatMessage, InboundEvent, SeenUpdate, UnreadSnapshot, UnreadTotals};
pub use ledger::EchoLedger;
pub use notification::{Notification, NotificationStore};
pub use registry::{SubscriberRegistry, Subscription};
pub use service::{Collaborators, SyncService};
pub use state::ConnectionStatus;
pub use stomp::{Command, Frame, HeartBeat, Incoming};
pub use transport::{Connector, TransportHandle};
pub use unread::UnreadAggregate;
