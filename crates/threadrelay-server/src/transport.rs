//! WebSocket transport.
//!
//! One task pair per upgraded socket: a reader that feeds inbound frames to
//! the [`Relay`] and a writer that drains the connection's outbound queue and
//! sends periodic pings. When either side stops, or the peer goes quiet for
//! too many heartbeats, the connection is torn down exactly once through
//! [`Relay::disconnect`].

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use threadrelay_proto::UserId;

use crate::{env::Environment, relay::Relay, storage::Storage};

/// Ping cadence and the silence a peer is allowed before eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// Time between pings
    pub interval: Duration,
    /// Consecutive intervals without any inbound frame before the peer is
    /// considered gone
    pub max_missed: u32,
}

impl Heartbeat {
    /// Silence after which a peer is evicted.
    pub fn deadline(&self) -> Duration {
        self.interval * self.max_missed.max(1)
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self { interval: Duration::from_secs(30), max_missed: 3 }
    }
}

/// Tracks when a peer was last heard from.
///
/// Any inbound frame counts, pongs included. Browsers answer pings
/// automatically, so an idle but healthy viewer stays alive.
#[derive(Debug)]
pub struct PeerLiveness<E: Environment> {
    env: E,
    deadline: Duration,
    last_seen: E::Instant,
}

impl<E: Environment> PeerLiveness<E> {
    /// Start tracking a peer that was just heard from.
    pub fn new(env: E, heartbeat: Heartbeat) -> Self {
        let last_seen = env.now();
        Self { env, deadline: heartbeat.deadline(), last_seen }
    }

    /// Record inbound traffic from the peer.
    pub fn observe(&mut self) {
        self.last_seen = self.env.now();
    }

    /// Whether the peer has been silent for the whole deadline.
    pub fn is_stale(&self) -> bool {
        self.env.now() - self.last_seen >= self.deadline
    }
}

/// Drive a single authenticated WebSocket connection until it closes.
pub async fn run_connection<E: Environment, S: Storage>(
    socket: WebSocket,
    relay: Relay<S>,
    env: E,
    user_id: UserId,
    heartbeat: Heartbeat,
) {
    let (mut sink, mut stream) = socket.split();

    let (connection_id, mut outbound) = match relay.connect(user_id.clone()).await {
        Ok(registered) => registered,
        Err(e) => {
            tracing::warn!(%user_id, "refusing connection: {}", e);
            let frame = CloseFrame { code: close_code::AGAIN, reason: e.to_string().into() };
            let _ = sink.send(Message::Close(Some(frame))).await;
            return;
        },
    };

    let writer_env = env.clone();
    let mut writer = tokio::spawn(async move {
        let ping = writer_env.sleep(heartbeat.interval);
        tokio::pin!(ping);

        loop {
            tokio::select! {
                event = outbound.recv() => {
                    let Some(event) = event else { break };
                    let text = match event.encode() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("failed to encode outbound event: {}", e);
                            continue;
                        },
                    };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::debug!("{} write failed: {}", connection_id, e);
                        break;
                    }
                },
                () = &mut ping => {
                    if let Err(e) = sink.send(Message::Ping(axum::body::Bytes::new())).await {
                        tracing::debug!("{} ping failed: {}", connection_id, e);
                        break;
                    }
                    ping.set(writer_env.sleep(heartbeat.interval));
                },
            }
        }

        let _ = sink.send(Message::Close(None)).await;
    });

    let reader = async {
        let mut liveness = PeerLiveness::new(env.clone(), heartbeat);
        let check = env.sleep(heartbeat.interval);
        tokio::pin!(check);

        loop {
            tokio::select! {
                message = stream.next() => {
                    liveness.observe();
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            relay.handle_frame(connection_id, text.as_str().as_bytes()).await;
                        },
                        Some(Ok(Message::Binary(bytes))) => {
                            relay.handle_frame(connection_id, &bytes).await;
                        },
                        Some(Ok(Message::Close(_))) => return "closed by peer".to_string(),
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {},
                        Some(Err(e)) => return format!("read error: {e}"),
                        None => return "stream ended".to_string(),
                    }
                },
                () = &mut check => {
                    if liveness.is_stale() {
                        return format!("no response for {:?}", heartbeat.deadline());
                    }
                    check.set(env.sleep(heartbeat.interval));
                },
            }
        }
    };

    let (reason, writer_done) = tokio::select! {
        reason = reader => (reason, false),
        _ = &mut writer => ("writer stopped".to_string(), true),
    };

    relay.disconnect(connection_id, &reason).await;
    // Dropping the queue sender ends the writer, which sends a close frame.
    // Give it one heartbeat before cutting it off.
    if !writer_done && tokio::time::timeout(heartbeat.interval, &mut writer).await.is_err() {
        writer.abort();
    }

    tracing::info!(%connection_id, %user_id, "connection closed: {}", reason);
}
