//! Logical channels multiplexed over the single STOMP connection.

use crate::config::Destinations;
use crate::stomp::{Command, Frame};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three personal channels the client subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Notification feed.
    Notifications,
    /// Chat messages.
    Messages,
    /// Unread-count deltas.
    Unread,
}

impl ChannelKind {
    /// All channel kinds, in subscription order.
    pub fn all() -> [ChannelKind; 3] {
        [
            ChannelKind::Notifications,
            ChannelKind::Messages,
            ChannelKind::Unread,
        ]
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Notifications => write!(f, "notifications"),
            ChannelKind::Messages => write!(f, "messages"),
            ChannelKind::Unread => write!(f, "unread"),
        }
    }
}

/// A subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// What the channel carries.
    pub kind: ChannelKind,
    /// STOMP destination.
    pub destination: String,
    /// Subscription id sent in SUBSCRIBE and echoed in MESSAGE frames.
    pub subscription_id: String,
}

impl Channel {
    /// SUBSCRIBE frame for this channel.
    pub fn subscribe_frame(&self) -> Frame {
        Frame::new(Command::Subscribe)
            .header("id", self.subscription_id.clone())
            .header("destination", self.destination.clone())
            .header("ack", "auto")
    }
}

/// The channel table for one connection.
#[derive(Debug, Clone)]
pub struct ChannelSet {
    channels: Vec<Channel>,
}

impl ChannelSet {
    /// Builds the table from configured destinations.
    pub fn new(destinations: &Destinations) -> Self {
        let channels = ChannelKind::all()
            .into_iter()
            .enumerate()
            .map(|(index, kind)| {
                let destination = match kind {
                    ChannelKind::Notifications => &destinations.notifications,
                    ChannelKind::Messages => &destinations.messages,
                    ChannelKind::Unread => &destinations.unread,
                };
                Channel {
                    kind,
                    destination: destination.clone(),
                    subscription_id: format!("sub-{index}"),
                }
            })
            .collect();
        Self { channels }
    }

    /// SUBSCRIBE frames for every channel.
    pub fn subscribe_frames(&self) -> Vec<Frame> {
        self.channels.iter().map(Channel::subscribe_frame).collect()
    }

    /// Resolves the channel a MESSAGE frame belongs to.
    ///
    /// The `subscription` header is authoritative; `destination` is used
    /// when a broker omits it.
    pub fn route(&self, frame: &Frame) -> Option<ChannelKind> {
        if frame.command != Command::Message {
            return None;
        }
        if let Some(id) = frame.get("subscription") {
            if let Some(channel) = self.channels.iter().find(|c| c.subscription_id == id) {
                return Some(channel.kind);
            }
        }
        let destination = frame.get("destination")?;
        self.channels
            .iter()
            .find(|c| c.destination == destination)
            .map(|c| c.kind)
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no channels are configured.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
