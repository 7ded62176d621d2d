//! Socket.IO push channel with tokio mpsc command/notification pattern.
//!
//! The websocket runs in a dedicated tokio task. The application sends
//! [`PushCommand`]s in and receives [`PushNotification`]s out, so the
//! connection (handshake, heartbeats, reconnection) stays fully decoupled
//! from session state.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use nexalog_shared::constants::{RECONNECT_ATTEMPTS, RECONNECT_DELAY_MS};
use nexalog_shared::{ControlSignal, PushEvent};

use crate::error::{NetError, Result};
use crate::packet::{EnginePacket, OpenInfo, SocketPacket};

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the push task.
#[derive(Debug)]
pub enum PushCommand {
    /// Emit a join/leave signal. Dropped while disconnected.
    Emit(ControlSignal),
    /// Close the socket and stop the task.
    Shutdown,
}

/// Notifications sent *from* the push task to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum PushNotification {
    /// The namespace connection was acknowledged. Rooms must be re-joined.
    Connected,
    /// The connection dropped; a reconnection attempt follows.
    Disconnected { reason: String },
    /// A server event arrived.
    Event(PushEvent),
    /// Reconnection attempts are exhausted; the task has stopped.
    GaveUp,
}

/// Configuration for spawning the push task.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Full websocket URL including the Engine.IO query.
    pub url: String,
    /// Bearer token sent in the Socket.IO `auth` payload.
    pub token: String,
    /// Consecutive failed attempts tolerated before giving up.
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl PushConfig {
    pub fn from_api_base(api_base: &str, token: &str) -> Result<Self> {
        Ok(Self {
            url: socket_url(api_base)?,
            token: token.to_string(),
            reconnect_attempts: RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
        })
    }
}

/// Derive the websocket endpoint from the REST API base.
///
/// A base ending in `/api` serves Socket.IO under `/api/socket.io` on the
/// same origin; otherwise it lives at `/socket.io`.
pub fn socket_url(api_base: &str) -> Result<String> {
    let base = api_base.trim().trim_end_matches('/');
    let (origin, path) = match base.strip_suffix("/api") {
        Some(origin) => (origin, "/api/socket.io"),
        None => (base, "/socket.io"),
    };

    let origin = if let Some(rest) = origin.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = origin.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(NetError::InvalidUrl(api_base.to_string()));
    };

    Ok(format!("{origin}{path}/?EIO=4&transport=websocket"))
}

/// Spawn the push channel in a background tokio task.
///
/// Returns `(command_tx, notification_rx)`.
pub fn spawn_push(
    config: PushConfig,
) -> (mpsc::Sender<PushCommand>, mpsc::Receiver<PushNotification>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<PushCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<PushNotification>(256);

    tokio::spawn(async move {
        let mut failures: u32 = 0;

        loop {
            let end = match run_connection(&config, &mut cmd_rx, &notif_tx).await {
                Ok(end) => end,
                Err(e) => {
                    warn!(error = %e, "Push connection failed");
                    SessionEnd::Lost {
                        reason: e.to_string(),
                        was_connected: false,
                    }
                }
            };

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Lost {
                    reason,
                    was_connected,
                } => {
                    if was_connected {
                        failures = 0;
                        if notif_tx
                            .send(PushNotification::Disconnected { reason })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    failures += 1;
                    if failures > config.reconnect_attempts {
                        warn!(attempts = failures - 1, "Giving up on push channel");
                        let _ = notif_tx.send(PushNotification::GaveUp).await;
                        break;
                    }
                }
            }

            debug!(attempt = failures, "Reconnecting push channel");
            let wait = tokio::time::sleep(config.reconnect_delay);
            tokio::pin!(wait);
            let shutdown = loop {
                tokio::select! {
                    _ = &mut wait => break false,
                    cmd = cmd_rx.recv() => match cmd {
                        Some(PushCommand::Emit(signal)) => {
                            debug!(signal = signal.event_name(), "Dropping signal while disconnected");
                        }
                        Some(PushCommand::Shutdown) | None => break true,
                    },
                }
            };
            if shutdown {
                break;
            }
        }

        info!("Push task terminated");
    });

    (cmd_tx, notif_rx)
}

enum SessionEnd {
    Shutdown,
    Lost { reason: String, was_connected: bool },
}

/// One websocket lifetime: handshake, then pump frames and commands until
/// either side goes away.
async fn run_connection(
    config: &PushConfig,
    cmd_rx: &mut mpsc::Receiver<PushCommand>,
    notif_tx: &mpsc::Sender<PushNotification>,
) -> Result<SessionEnd> {
    let (ws, _) = tokio_tungstenite::connect_async(config.url.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    let open = loop {
        match next_engine_packet(&mut stream).await? {
            Some(EnginePacket::Open(info)) => break info,
            Some(other) => debug!(packet = ?other, "Ignoring frame before open"),
            None => {
                return Ok(SessionEnd::Lost {
                    reason: "closed during handshake".into(),
                    was_connected: false,
                })
            }
        }
    };

    let connect = SocketPacket::Connect(Some(json!({ "token": config.token })));
    sink.send(WsMessage::Text(connect.into_frame())).await?;

    loop {
        match next_engine_packet(&mut stream).await? {
            Some(EnginePacket::Message(data)) => match SocketPacket::decode(&data)? {
                SocketPacket::Connect(_) => break,
                SocketPacket::ConnectError(err) => {
                    let message = err
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("connect_error")
                        .to_string();
                    return Err(NetError::ConnectRejected(message));
                }
                other => debug!(packet = ?other, "Ignoring packet before connect ack"),
            },
            Some(EnginePacket::Ping(data)) => {
                sink.send(WsMessage::Text(EnginePacket::Pong(data).encode()))
                    .await?;
            }
            Some(_) => {}
            None => {
                return Ok(SessionEnd::Lost {
                    reason: "closed during connect".into(),
                    was_connected: false,
                })
            }
        }
    }

    info!(sid = %open.sid, "Push channel connected");
    if notif_tx.send(PushNotification::Connected).await.is_err() {
        return Ok(SessionEnd::Shutdown);
    }

    let heartbeat = tokio::time::sleep(heartbeat_window(&open));
    tokio::pin!(heartbeat);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(PushCommand::Emit(signal)) => {
                    debug!(signal = signal.event_name(), payload = %signal.payload(), "Emitting signal");
                    let frame = SocketPacket::event(signal.event_name(), signal.payload()).into_frame();
                    if let Err(e) = sink.send(WsMessage::Text(frame)).await {
                        return Ok(lost(e.to_string()));
                    }
                }
                Some(PushCommand::Shutdown) | None => {
                    info!("Push shutdown requested");
                    let _ = sink.send(WsMessage::Text(SocketPacket::Disconnect.into_frame())).await;
                    let _ = sink.close().await;
                    return Ok(SessionEnd::Shutdown);
                }
            },

            _ = &mut heartbeat => {
                return Ok(lost("ping timeout".into()));
            }

            packet = next_engine_packet(&mut stream) => {
                let packet = match packet {
                    Ok(Some(packet)) => packet,
                    Ok(None) => return Ok(lost("transport close".into())),
                    Err(e) => return Ok(lost(e.to_string())),
                };

                match packet {
                    EnginePacket::Ping(data) => {
                        heartbeat
                            .as_mut()
                            .reset(Instant::now() + heartbeat_window(&open));
                        if let Err(e) = sink.send(WsMessage::Text(EnginePacket::Pong(data).encode())).await {
                            return Ok(lost(e.to_string()));
                        }
                    }
                    EnginePacket::Message(data) => match SocketPacket::decode(&data) {
                        Ok(SocketPacket::Event { name, args, .. }) => {
                            let event = PushEvent::from_socket_event(&name, args.into_iter().next());
                            debug!(event = event.name(), "Push event received");
                            if notif_tx.send(PushNotification::Event(event)).await.is_err() {
                                return Ok(SessionEnd::Shutdown);
                            }
                        }
                        Ok(SocketPacket::Disconnect) => {
                            return Ok(lost("io server disconnect".into()));
                        }
                        Ok(other) => debug!(packet = ?other, "Ignoring socket packet"),
                        Err(e) => warn!(error = %e, "Malformed socket packet"),
                    },
                    EnginePacket::Close => return Ok(lost("server close".into())),
                    _ => {}
                }
            }
        }
    }
}

fn lost(reason: String) -> SessionEnd {
    SessionEnd::Lost {
        reason,
        was_connected: true,
    }
}

fn heartbeat_window(open: &OpenInfo) -> Duration {
    Duration::from_millis(open.ping_interval + open.ping_timeout)
}

/// Read the next Engine.IO packet, skipping websocket control frames.
/// `Ok(None)` means the peer closed the socket.
async fn next_engine_packet<S>(stream: &mut S) -> Result<Option<EnginePacket>>
where
    S: futures::Stream<Item = std::result::Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(frame))) => return EnginePacket::decode(&frame).map(Some),
            Some(Ok(WsMessage::Close(_))) | None => return Ok(None),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}
