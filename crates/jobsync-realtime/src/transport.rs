//! Message transport abstraction.
//!
//! A connected transport is a pair of text channels. Dropping the
//! [`TransportHandle`] closes the transport; the peer closing it ends the
//! inbound stream.

use crate::error::RealtimeError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One open transport.
#[derive(Debug)]
pub struct TransportHandle {
    /// Text messages to the server.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Text messages from the server; `None` once the transport closed.
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport authenticated with `credential`.
    async fn open(&self, credential: &str) -> Result<TransportHandle, RealtimeError>;
}

pub mod memory {
    //! In-process transport used to drive the client without a network.

    use super::{Connector, TransportHandle};
    use crate::error::RealtimeError;
    use crate::stomp::{Command, Frame, Incoming};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Connector whose server side is handed to the test as [`MemoryPeer`]s.
    #[derive(Debug, Clone)]
    pub struct MemoryConnector {
        shared: Arc<Shared>,
    }

    #[derive(Debug)]
    struct Shared {
        accepted: mpsc::UnboundedSender<MemoryPeer>,
        live: Mutex<Vec<mpsc::WeakUnboundedSender<String>>>,
        opened: AtomicUsize,
        max_live: AtomicUsize,
        refuse: AtomicBool,
    }

    /// Receives the server side of each opened transport.
    #[derive(Debug)]
    pub struct MemoryListener {
        accepted: mpsc::UnboundedReceiver<MemoryPeer>,
    }

    impl MemoryConnector {
        /// Create a connector and the listener for its peers.
        pub fn new() -> (Self, MemoryListener) {
            let (tx, rx) = mpsc::unbounded_channel();
            let connector = Self {
                shared: Arc::new(Shared {
                    accepted: tx,
                    live: Mutex::new(Vec::new()),
                    opened: AtomicUsize::new(0),
                    max_live: AtomicUsize::new(0),
                    refuse: AtomicBool::new(false),
                }),
            };
            (connector, MemoryListener { accepted: rx })
        }

        /// Make subsequent `open` calls fail.
        pub fn set_refuse(&self, refuse: bool) {
            self.shared.refuse.store(refuse, Ordering::SeqCst);
        }

        /// Number of transports opened so far.
        pub fn opened(&self) -> usize {
            self.shared.opened.load(Ordering::SeqCst)
        }

        /// Largest number of transports that were open at the same time.
        pub fn max_live(&self) -> usize {
            self.shared.max_live.load(Ordering::SeqCst)
        }

        /// Number of transports currently held open by the client.
        pub fn live(&self) -> usize {
            count_live(&self.shared.live.lock())
        }
    }

    fn count_live(senders: &[mpsc::WeakUnboundedSender<String>]) -> usize {
        senders
            .iter()
            .filter_map(|weak| weak.upgrade())
            .filter(|tx| !tx.is_closed())
            .count()
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn open(&self, credential: &str) -> Result<TransportHandle, RealtimeError> {
            if self.shared.refuse.load(Ordering::SeqCst) {
                return Err(RealtimeError::Transport("connection refused".to_string()));
            }

            let (to_client, inbound) = mpsc::unbounded_channel();
            let (outbound, from_client) = mpsc::unbounded_channel();

            {
                let mut live = self.shared.live.lock();
                live.retain(|weak| weak.upgrade().is_some_and(|tx| !tx.is_closed()));
                live.push(to_client.downgrade());
                self.shared
                    .max_live
                    .fetch_max(count_live(&live), Ordering::SeqCst);
            }
            self.shared.opened.fetch_add(1, Ordering::SeqCst);

            let peer = MemoryPeer {
                credential: credential.to_string(),
                to_client,
                from_client,
            };
            self.shared
                .accepted
                .send(peer)
                .map_err(|_| RealtimeError::Transport("listener dropped".to_string()))?;

            Ok(TransportHandle { outbound, inbound })
        }
    }

    impl MemoryListener {
        /// Wait for the next opened transport.
        pub async fn accept(&mut self) -> Option<MemoryPeer> {
            self.accepted.recv().await
        }
    }

    /// Server side of one in-memory transport. Dropping it closes the
    /// transport from the server's end.
    #[derive(Debug)]
    pub struct MemoryPeer {
        /// Credential the client opened the transport with.
        pub credential: String,
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    impl MemoryPeer {
        /// Send raw text to the client.
        pub fn send_text(&self, text: impl Into<String>) -> bool {
            self.to_client.send(text.into()).is_ok()
        }

        /// Send a frame to the client.
        pub fn send_frame(&self, frame: &Frame) -> bool {
            self.send_text(frame.encode())
        }

        /// Next raw text from the client, heart-beats included.
        pub async fn recv_text(&mut self) -> Option<String> {
            self.from_client.recv().await
        }

        /// Next frame from the client, skipping heart-beats.
        pub async fn recv_frame(&mut self) -> Option<Frame> {
            loop {
                let text = self.from_client.recv().await?;
                match Frame::decode(&text) {
                    Ok(Incoming::Frame(frame)) => return Some(frame),
                    Ok(Incoming::HeartBeat) => continue,
                    Err(_) => continue,
                }
            }
        }

        /// Read CONNECT and answer CONNECTED with heart-beats disabled.
        ///
        /// Returns the CONNECT frame.
        pub async fn accept_handshake(&mut self) -> Option<Frame> {
            self.accept_handshake_with("0,0").await
        }

        /// Read CONNECT and answer CONNECTED with the given heart-beat header.
        pub async fn accept_handshake_with(&mut self, heart_beat: &str) -> Option<Frame> {
            let connect = self.recv_frame().await?;
            if connect.command != Command::Connect {
                return None;
            }
            let connected = Frame::new(Command::Connected)
                .header("version", "1.2")
                .header("heart-beat", heart_beat);
            self.send_frame(&connected);
            Some(connect)
        }

        /// Read CONNECT and then the client's SUBSCRIBE frames.
        ///
        /// Returns the subscription frames.
        pub async fn establish(&mut self, channels: usize) -> Option<Vec<Frame>> {
            self.accept_handshake().await?;
            let mut subscriptions = Vec::with_capacity(channels);
            for _ in 0..channels {
                let frame = self.recv_frame().await?;
                if frame.command != Command::Subscribe {
                    return None;
                }
                subscriptions.push(frame);
            }
            Some(subscriptions)
        }

        /// Deliver a MESSAGE frame on a subscription.
        pub fn deliver(&self, subscription: &str, destination: &str, body: &str) -> bool {
            let frame = Frame::new(Command::Message)
                .header("subscription", subscription)
                .header("destination", destination)
                .header("message-id", uuid::Uuid::new_v4().to_string())
                .header("content-type", "application/json")
                .body(body);
            self.send_frame(&frame)
        }

        /// True while the client holds its end open.
        pub fn is_client_connected(&self) -> bool {
            !self.to_client.is_closed()
        }

        /// Wait until the client drops its end.
        pub async fn closed(&self) {
            self.to_client.closed().await
        }
    }
}
