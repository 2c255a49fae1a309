//! WebSocket transport for the real-time layer.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use jobsync_realtime::{Connector, RealtimeError, TransportHandle};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens STOMP transports as WebSocket connections to one endpoint.
///
/// The upgrade request carries `Authorization: Bearer <token>`. Each open
/// transport is served by a background task that relays text messages
/// between the socket and the [`TransportHandle`] channels.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    /// Connector for `url` (`ws://` or `wss://`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Time allowed for TCP connect plus the upgrade.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

fn transport_error(err: impl std::fmt::Display) -> RealtimeError {
    RealtimeError::Transport(err.to_string())
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, credential: &str) -> Result<TransportHandle, RealtimeError> {
        let mut request = self.url.as_str().into_client_request().map_err(transport_error)?;
        let bearer =
            HeaderValue::from_str(&format!("Bearer {credential}")).map_err(transport_error)?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| RealtimeError::Transport("WebSocket connect timed out".to_string()))?
            .map_err(transport_error)?;
        info!(url = %self.url, status = response.status().as_u16(), "WebSocket connected");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(relay(socket, outbound_rx, inbound_tx));

        Ok(TransportHandle {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Relay until either side goes away.
async fn relay(
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
) {
    let (mut sink, mut source) = socket.split();

    loop {
        tokio::select! {
            text = outbound.recv() => {
                let Some(text) = text else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(text.as_str().to_owned()).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        if inbound.send(text).is_err() {
                            break;
                        }
                    }
                    Err(_) => warn!(len = data.len(), "Dropping non-UTF-8 binary message"),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket read failed");
                    break;
                }
                None => break,
            },
            _ = inbound.closed() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
    debug!("WebSocket relay stopped");
}
