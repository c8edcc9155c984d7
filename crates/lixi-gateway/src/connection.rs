use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one WebSocket connection until either side goes away.
pub async fn handle_connection(socket: WebSocket, engine: Engine) {
    let (mut sender, mut receiver) = socket.split();

    // Registers the connection and queues `init` ahead of anything else.
    let (conn_id, mut outbox) = engine.connect().await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward queued frames -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = outbox.recv() => {
                    let Some(frame) = frame else { break };
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Connection {} missed {} pongs, dropping", conn_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client. A command that has started is always
    // applied in full; only the wait for the next frame is raced.
    loop {
        tokio::select! {
            _ = &mut send_task => break,
            msg = receiver.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => engine.handle_text(conn_id, text.as_str()).await,
                    Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                    Message::Binary(data) => {
                        debug!("Connection {} sent {} binary bytes, ignoring", conn_id, data.len());
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
    send_task.abort();

    engine.disconnect(conn_id).await;
    info!("Connection {} closed", conn_id);
}
