//! Error types for the real-time module.

use crate::channel::ChannelKind;
use thiserror::Error;

/// Boxed error returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in real-time operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// An outbound operation was attempted while not connected.
    #[error("not connected")]
    NotConnected,

    /// The transport could not be opened or failed mid-session.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server rejected or did not answer the STOMP handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A frame could not be decoded.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A REST collaborator call failed.
    #[error("backend call failed: {0}")]
    Backend(#[source] BoxError),
}

impl RealtimeError {
    /// Wraps a collaborator error.
    pub fn backend(err: impl Into<BoxError>) -> Self {
        RealtimeError::Backend(err.into())
    }
}

/// STOMP frame decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The frame has no command line.
    #[error("empty frame")]
    Empty,

    /// The command is not a STOMP command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A header line has no colon.
    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    /// A header contains an escape sequence STOMP does not define.
    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),

    /// The body is not terminated by a NUL octet.
    #[error("frame is missing its NUL terminator")]
    MissingTerminator,

    /// `content-length` disagrees with the body.
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),

    /// `heart-beat` header is not `<out>,<in>`.
    #[error("invalid heart-beat header: {0}")]
    InvalidHeartBeat(String),
}

/// Reasons an inbound frame body is dropped instead of classified.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The body is not valid JSON for the channel's payload shape.
    #[error("malformed {channel} payload: {source}")]
    Malformed {
        /// Channel the frame arrived on.
        channel: ChannelKind,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The payload carries a `type` this layer does not handle.
    #[error("unsupported {channel} payload type: {kind}")]
    UnsupportedType {
        /// Channel the frame arrived on.
        channel: ChannelKind,
        /// The `type` value.
        kind: String,
    },
}
