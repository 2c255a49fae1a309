//! Connection manager.
//!
//! One task per bound identity runs [`run`]: obtain a credential, open the
//! transport, perform the STOMP handshake, subscribe, then process frames
//! until the transport drops while state is seeded from the history
//! collaborators in the background of the same loop.
//! After a drop the task sleeps for the reconnect delay and starts over.
//! Every state change is made on behalf of the epoch the task was started
//! for, so a superseded task can never touch the new identity's state.

use crate::backend::snapshot_from;
use crate::channel::ChannelSet;
use crate::config::RealtimeConfig;
use crate::error::RealtimeError;
use crate::event::{classify, InboundEvent};
use crate::service::Collaborators;
use crate::state::{ConnectionStatus, Shared};
use crate::stomp::{Command, Frame, HeartBeat, Incoming, HEARTBEAT};
use crate::transport::TransportHandle;
use jobsync_types::SessionIdentity;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval};
use tracing::{debug, info, trace, warn};

/// Everything a connection task needs, shared with the service.
#[derive(Debug)]
pub(crate) struct Inner {
    pub config: RealtimeConfig,
    pub collaborators: Collaborators,
    pub shared: Shared,
}

/// How an established session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The transport went away; reconnect.
    Dropped,
    /// A newer epoch took over; stop.
    Superseded,
}

/// What to do after one inbound frame.
enum Flow {
    Continue,
    Closed,
    Superseded,
}

/// Connection loop for `identity` under `epoch`.
pub(crate) async fn run(inner: Arc<Inner>, epoch: u64, identity: SessionIdentity) {
    loop {
        let credential = inner
            .collaborators
            .tokens
            .access_token(identity.role)
            .filter(|token| !token.is_empty());
        let Some(credential) = credential else {
            info!(identity = %identity, "No credential available, staying disconnected");
            inner.shared.set_status(epoch, ConnectionStatus::Disconnected);
            return;
        };

        if !inner.shared.set_status(epoch, ConnectionStatus::Connecting) {
            return;
        }

        let next = match session(&inner, epoch, &identity, &credential).await {
            Ok(SessionEnd::Superseded) => return,
            Ok(SessionEnd::Dropped) => ConnectionStatus::Disconnected,
            Err(e) => {
                warn!(identity = %identity, error = %e, "Connection attempt failed");
                ConnectionStatus::Error
            }
        };
        if !inner.shared.set_status(epoch, next) {
            return;
        }

        let delay = inner.config.reconnect_delay();
        debug!(
            identity = %identity,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
        time::sleep(delay).await;

        if !inner.shared.is_current(epoch) {
            return;
        }
    }
}

/// One transport lifetime. Errors mean the attempt failed before CONNECTED.
async fn session(
    inner: &Inner,
    epoch: u64,
    identity: &SessionIdentity,
    credential: &str,
) -> Result<SessionEnd, RealtimeError> {
    let mut transport = inner.collaborators.connector.open(credential).await?;

    let connect = Frame::new(Command::Connect)
        .header("accept-version", "1.2")
        .header("host", inner.config.host.as_str())
        .header("heart-beat", inner.config.heart_beat().to_header())
        .header("Authorization", format!("Bearer {credential}"));
    send(&transport.outbound, connect.encode())?;

    let connected = time::timeout(
        inner.config.handshake_timeout(),
        await_connected(&mut transport.inbound),
    )
    .await
    .map_err(|_| RealtimeError::Handshake("timed out waiting for CONNECTED".to_string()))??;

    let server_beat = match connected.get("heart-beat") {
        Some(header) => HeartBeat::parse(header)?,
        None => HeartBeat::default(),
    };
    let (send_every, expect_within) = inner.config.heart_beat().negotiate(&server_beat);

    let channels = ChannelSet::new(&inner.config.destinations);
    for frame in channels.subscribe_frames() {
        send(&transport.outbound, frame.encode())?;
    }

    if !inner.shared.mark_connected(epoch, transport.outbound.clone()) {
        return Ok(SessionEnd::Superseded);
    }
    info!(
        identity = %identity,
        version = connected.get("version").unwrap_or("1.2"),
        channels = channels.len(),
        "Connected"
    );

    let heart_beats = (send_every, expect_within);
    Ok(pump(inner, epoch, identity, &channels, &mut transport, heart_beats).await)
}

fn send(outbound: &mpsc::UnboundedSender<String>, text: String) -> Result<(), RealtimeError> {
    outbound
        .send(text)
        .map_err(|_| RealtimeError::Transport("transport closed".to_string()))
}

async fn await_connected(
    inbound: &mut mpsc::UnboundedReceiver<String>,
) -> Result<Frame, RealtimeError> {
    while let Some(text) = inbound.recv().await {
        let frame = match Frame::decode(&text)? {
            Incoming::HeartBeat => continue,
            Incoming::Frame(frame) => frame,
        };
        match frame.command {
            Command::Connected => return Ok(frame),
            Command::Error => {
                let reason = frame.get("message").unwrap_or(frame.body.as_str());
                return Err(RealtimeError::Handshake(reason.to_string()));
            }
            other => debug!(command = %other, "Ignoring frame before CONNECTED"),
        }
    }
    Err(RealtimeError::Handshake(
        "transport closed during handshake".to_string(),
    ))
}

/// Fetch the unread snapshot and recent notifications.
///
/// Returns false if the epoch was superseded meanwhile. Fetch failures are
/// logged and leave the current state in place.
async fn load_initial_state(inner: &Inner, epoch: u64, identity: &SessionIdentity) -> bool {
    let role = identity.role;

    match inner.collaborators.history.conversations(role).await {
        Ok(conversations) => {
            let snapshot = InboundEvent::UnreadSnapshot(snapshot_from(&conversations));
            if inner.shared.apply(epoch, snapshot).is_none() {
                return false;
            }
        }
        Err(e) => warn!(identity = %identity, error = %e, "Failed to load unread snapshot"),
    }

    match inner.collaborators.notifications.recent(role).await {
        Ok(recent) => {
            if !inner.shared.seed_notifications(epoch, recent) {
                return false;
            }
        }
        Err(e) => warn!(identity = %identity, error = %e, "Failed to load notifications"),
    }

    inner.shared.is_current(epoch)
}

/// Read loop of an established session.
///
/// The initial fetch runs as one more branch of the loop, so heart-beats
/// and inbound frames keep flowing while it is pending.
async fn pump(
    inner: &Inner,
    epoch: u64,
    identity: &SessionIdentity,
    channels: &ChannelSet,
    transport: &mut TransportHandle,
    (send_every, expect_within): (Option<Duration>, Option<Duration>),
) -> SessionEnd {
    let mut ping = send_every.map(|every| time::interval_at(Instant::now() + every, every));
    // Silence for two incoming intervals drops the transport.
    let idle_limit = expect_within.map(|within| within * 2);
    let mut last_seen = Instant::now();

    let initial = load_initial_state(inner, epoch, identity);
    tokio::pin!(initial);
    let mut loading = true;

    loop {
        let deadline = idle_limit.map(|limit| last_seen + limit);

        tokio::select! {
            loaded = &mut initial, if loading => {
                loading = false;
                if !loaded {
                    return SessionEnd::Superseded;
                }
            }
            received = transport.inbound.recv() => {
                let Some(text) = received else {
                    info!(identity = %identity, "Transport closed");
                    return SessionEnd::Dropped;
                };
                last_seen = Instant::now();
                match handle_text(inner, epoch, channels, &text) {
                    Flow::Continue => {}
                    Flow::Closed => return SessionEnd::Dropped,
                    Flow::Superseded => return SessionEnd::Superseded,
                }
            }
            _ = tick(&mut ping) => {
                trace!("Sending heart-beat");
                if transport.outbound.send(HEARTBEAT.to_string()).is_err() {
                    return SessionEnd::Dropped;
                }
            }
            _ = expire(deadline) => {
                warn!(
                    identity = %identity,
                    "No traffic within heart-beat window, dropping transport"
                );
                return SessionEnd::Dropped;
            }
        }
    }
}

async fn tick(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Decode, route, classify and apply one inbound text message.
fn handle_text(inner: &Inner, epoch: u64, channels: &ChannelSet, text: &str) -> Flow {
    let frame = match Frame::decode(text) {
        Ok(Incoming::HeartBeat) => return Flow::Continue,
        Ok(Incoming::Frame(frame)) => frame,
        Err(e) => {
            warn!(error = %e, "Dropping undecodable frame");
            return Flow::Continue;
        }
    };

    match frame.command {
        Command::Message => {}
        Command::Error => {
            warn!(
                message = frame.get("message").unwrap_or_default(),
                "Server sent ERROR"
            );
            return Flow::Closed;
        }
        Command::Receipt => {
            debug!(receipt = frame.get("receipt-id").unwrap_or_default(), "Receipt");
            return Flow::Continue;
        }
        other => {
            debug!(command = %other, "Ignoring unexpected frame");
            return Flow::Continue;
        }
    }

    let Some(kind) = channels.route(&frame) else {
        warn!(
            subscription = frame.get("subscription").unwrap_or_default(),
            destination = frame.get("destination").unwrap_or_default(),
            "Dropping MESSAGE for unknown subscription"
        );
        return Flow::Continue;
    };

    let event = match classify(kind, &frame.body) {
        Ok(event) => event,
        Err(e) => {
            warn!(channel = %kind, error = %e, "Dropping payload");
            return Flow::Continue;
        }
    };
    trace!(channel = %kind, "Classified inbound event");

    match inner.shared.apply(epoch, event) {
        Some(delivery) => {
            inner.shared.dispatch(delivery);
            Flow::Continue
        }
        None => Flow::Superseded,
    }
}
