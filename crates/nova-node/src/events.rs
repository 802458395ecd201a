// SPDX-License-Identifier: Apache-2.0
//! Per-task event websocket (§6, §9): bridges `nova_core::EventBus`'s
//! broadcast channel to JSON text frames, the same upgrade-then-bridge shape
//! the host gateway uses for its control socket. Unlike that socket, this
//! one is read-only from the client's side — the wire carries Task Executor
//! events outward, nothing flows back in but pings and the close frame.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use nova_store::entities::TaskId;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<TaskId>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, task_id))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, task_id: TaskId) {
    match state.store.get_task(task_id).await {
        Ok(task) if task.user == state.user => {}
        Ok(_) => {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        Err(e) => {
            debug!(task = %task_id, error = %e, "event websocket: unknown task");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    }

    let mut events = state.events.subscribe(task_id);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // text/binary frames from the client carry no protocol here
                    Some(Err(e)) => {
                        debug!("event websocket recv error: {e}");
                        break;
                    }
                }
            }
            result = events.recv() => {
                match result {
                    Ok(ev) => {
                        if send_event(&mut socket, &ev).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(task = %task_id, lagged = n, "event websocket subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    debug!(task = %task_id, "event websocket connection closed");
}

async fn send_event(socket: &mut WebSocket, ev: &nova_core::Event) -> Result<(), axum::Error> {
    let json = serde_json::to_string(ev).expect("Event serialization is infallible");
    socket.send(Message::Text(json)).await
}
