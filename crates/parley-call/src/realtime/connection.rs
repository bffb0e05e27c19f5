//! Background WebSocket task: connect, rejoin, heartbeat, reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::handler::{broadcast_frame, classify, heartbeat_frame, join_frame, leave_frame};
use super::types::{ChannelConfig, PhoenixMessage, RealtimeCommand, RealtimeConfig, RealtimeEvent};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

enum SessionEnd {
    /// Socket dropped; reconnect.
    Lost,
    /// Client asked to disconnect or went away.
    Shutdown,
}

// ---------------------------------------------------------------------------
// Connection loop
// ---------------------------------------------------------------------------

/// Runs until the client disconnects or is dropped. Topics joined at any
/// point are rejoined after every reconnect.
pub(crate) async fn connection_loop(
    config: RealtimeConfig,
    connected: Arc<RwLock<bool>>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    mut command_rx: mpsc::Receiver<RealtimeCommand>,
) {
    let mut joined: HashMap<String, ChannelConfig> = HashMap::new();
    let mut delay = config.reconnect_delay_secs.max(1);

    loop {
        let url = config.ws_url();
        info!(url = %url.split('?').next().unwrap_or(""), "Connecting to Supabase Realtime");

        match tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(&url)).await {
            Ok(Ok((ws, _))) => {
                delay = config.reconnect_delay_secs.max(1);
                *connected.write().await = true;
                let _ = event_tx.send(RealtimeEvent::Connected).await;

                let end = run_session(ws, &config, &mut joined, &event_tx, &mut command_rx).await;

                *connected.write().await = false;
                let _ = event_tx.send(RealtimeEvent::Disconnected).await;
                if let SessionEnd::Shutdown = end {
                    info!("Supabase Realtime client shut down");
                    return;
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to Supabase Realtime");
                let _ = event_tx
                    .send(RealtimeEvent::Error(format!("connection failed: {e}")))
                    .await;
            }
            Err(_elapsed) => {
                error!("Supabase Realtime connect timed out");
                let _ = event_tx
                    .send(RealtimeEvent::Error("connection timed out".into()))
                    .await;
            }
        }

        info!(delay, "Reconnecting to Supabase Realtime");
        if !wait_offline(Duration::from_secs(delay), &mut joined, &mut command_rx).await {
            return;
        }
        delay = config.backoff(delay);
    }
}

/// Sleep out the reconnect delay while still tracking joins and leaves.
/// Returns `false` if the client shut down meanwhile.
async fn wait_offline(
    delay: Duration,
    joined: &mut HashMap<String, ChannelConfig>,
    command_rx: &mut mpsc::Receiver<RealtimeCommand>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = command_rx.recv() => match cmd {
                None | Some(RealtimeCommand::Disconnect) => return false,
                Some(RealtimeCommand::Join { topic, config }) => {
                    joined.insert(topic, config);
                }
                Some(RealtimeCommand::Leave { topic }) => {
                    joined.remove(&topic);
                }
                Some(RealtimeCommand::Broadcast { topic, event, .. }) => {
                    warn!(topic = %topic, event = %event, "Broadcast dropped while offline");
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// One connected session
// ---------------------------------------------------------------------------

async fn run_session(
    ws: WsStream,
    config: &RealtimeConfig,
    joined: &mut HashMap<String, ChannelConfig>,
    event_tx: &mpsc::Sender<RealtimeEvent>,
    command_rx: &mut mpsc::Receiver<RealtimeCommand>,
) -> SessionEnd {
    let (mut write, mut read) = ws.split();
    let token = config.access_token.as_deref();

    for (topic, channel) in joined.iter() {
        if !send_frame(&mut write, &join_frame(topic, *channel, token, next_ref())).await {
            return SessionEnd::Lost;
        }
    }

    let mut heartbeat =
        tokio::time::interval(Duration::from_secs(config.heartbeat_interval_secs.max(1)));
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if !send_frame(&mut write, &heartbeat_frame(next_ref())).await {
                    return SessionEnd::Lost;
                }
            }
            cmd = command_rx.recv() => {
                let sent = match cmd {
                    None | Some(RealtimeCommand::Disconnect) => {
                        for topic in joined.keys() {
                            send_frame(&mut write, &leave_frame(topic, next_ref())).await;
                        }
                        let _ = write.send(WsMessage::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                    Some(RealtimeCommand::Join { topic, config: channel }) => {
                        let sent = send_frame(&mut write, &join_frame(&topic, channel, token, next_ref())).await;
                        joined.insert(topic, channel);
                        sent
                    }
                    Some(RealtimeCommand::Leave { topic }) => {
                        if joined.remove(&topic).is_some() {
                            send_frame(&mut write, &leave_frame(&topic, next_ref())).await
                        } else {
                            true
                        }
                    }
                    Some(RealtimeCommand::Broadcast { topic, event, payload }) => {
                        send_frame(&mut write, &broadcast_frame(&topic, &event, payload, next_ref())).await
                    }
                };
                if !sent {
                    return SessionEnd::Lost;
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<PhoenixMessage>(&text) {
                        Ok(msg) => {
                            if let Some(event) = classify(&msg) {
                                let _ = event_tx.send(event).await;
                            }
                        }
                        Err(_) => debug!(text = %text, "Unrecognized frame from Supabase"),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Supabase Realtime closed the connection");
                    return SessionEnd::Lost;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    return SessionEnd::Lost;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Serialize and write one frame. `false` means the socket is gone.
async fn send_frame<S>(write: &mut S, msg: &PhoenixMessage) -> bool
where
    S: Sink<WsMessage> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => write.send(WsMessage::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, event = %msg.event, "Failed to encode Phoenix frame");
            true
        }
    }
}
