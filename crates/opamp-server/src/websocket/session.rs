//! One agent's WebSocket session, from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use opamp_core::protobufs::{AgentToServer, ServerErrorResponse, ServerToAgent};
use opamp_core::{decode_frame, encode_frame};
use opamp_proxy::{AgentConnection, OpAmpProxy, ProxyError};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::heartbeat::Heartbeat;

/// How long a cancelled session waits for its Close frame to be written.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Per-session transport settings.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Ping interval, `None` to disable.
    pub heartbeat_interval: Option<Duration>,
    /// Allowed inbound silence before the session is dropped.
    pub heartbeat_timeout: Duration,
    /// Outbound queue capacity.
    pub max_send_queue: usize,
}

/// Decode one binary frame and produce the reply for it.
///
/// Frames that fail to decode are answered with a `BadRequest` error
/// rather than closing the connection.
pub fn handle_frame(proxy: &OpAmpProxy, conn: &Arc<AgentConnection>, data: &[u8]) -> ServerToAgent {
    match decode_frame::<AgentToServer>(data) {
        Ok(msg) => proxy.on_message(conn, msg),
        Err(e) => {
            warn!(connection_id = %conn.id, error = %e, len = data.len(), "undecodable frame");
            ServerToAgent {
                capabilities: proxy.capabilities(),
                error_response: Some(ServerErrorResponse::bad_request(e.to_string())),
                ..Default::default()
            }
        }
    }
}

/// Answer one binary frame on `conn`, waiting for outbound queue space.
pub async fn respond(
    proxy: &OpAmpProxy,
    conn: &Arc<AgentConnection>,
    data: &[u8],
) -> Result<(), ProxyError> {
    let response = handle_frame(proxy, conn, data);
    conn.send_response(response).await
}

/// Run a session for a connected agent.
///
/// 1. Registers the connection with the proxy
/// 2. Answers every binary frame with exactly one response
/// 3. Forwards proxy-initiated messages and heartbeat pings
/// 4. Reports the disconnect once the socket closes, times out, or the
///    server shuts down
pub async fn run_agent_session(
    ws: WebSocket,
    proxy: Arc<OpAmpProxy>,
    config: SessionConfig,
    cancel: CancellationToken,
) {
    let (conn, send_rx) = AgentConnection::channel(config.max_send_queue.max(1));
    let span = info_span!("agent_session", connection_id = %conn.id);
    session_loop(ws, proxy, conn, send_rx, config, cancel)
        .instrument(span)
        .await;
}

async fn session_loop(
    ws: WebSocket,
    proxy: Arc<OpAmpProxy>,
    conn: Arc<AgentConnection>,
    mut send_rx: tokio::sync::mpsc::Receiver<ServerToAgent>,
    config: SessionConfig,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    if !proxy.on_connect(&conn) {
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    let outbound_conn = Arc::clone(&conn);
    let outbound_cancel = cancel.clone();
    let mut outbound = tokio::spawn(
        async move {
            let mut heartbeat = Heartbeat::new(config.heartbeat_interval, config.heartbeat_timeout);
            loop {
                tokio::select! {
                    msg = send_rx.recv() => {
                        let Some(msg) = msg else { break };
                        let frame = encode_frame(&msg);
                        if ws_tx.send(Message::Binary(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    () = heartbeat.tick() => {
                        let idle = outbound_conn.idle_for();
                        if heartbeat.is_expired(idle) {
                            warn!(idle_secs = idle.as_secs(), "agent unresponsive, disconnecting");
                            break;
                        }
                        if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                    () = outbound_cancel.cancelled() => break,
                }
            }
            let _ = ws_tx.send(Message::Close(None)).await;
        }
        .in_current_span(),
    );

    let mut outbound_done = false;
    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let Some(Ok(msg)) = frame else { break };
                conn.mark_active();
                match msg {
                    Message::Binary(data) => {
                        tokio::select! {
                            sent = respond(&proxy, &conn, &data) => {
                                if let Err(e) = sent {
                                    warn!(error = %e, "failed to enqueue response");
                                    break;
                                }
                            }
                            () = cancel.cancelled() => break,
                        }
                    }
                    Message::Text(_) => {
                        warn!("ignoring text frame, OpAMP requires binary frames");
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => {
                        debug!("agent sent close frame");
                        break;
                    }
                }
            }
            _ = &mut outbound => {
                outbound_done = true;
                break;
            }
            () = cancel.cancelled() => {
                debug!("server shutting down, closing session");
                break;
            }
        }
    }

    if !outbound_done {
        if cancel.is_cancelled() {
            let _ = tokio::time::timeout(CLOSE_GRACE, &mut outbound).await;
        }
        outbound.abort();
    }

    proxy.on_disconnect(&conn);
    info!(
        duration_secs = conn.age().as_secs(),
        dropped_messages = conn.drop_count(),
        "agent session ended"
    );
}
