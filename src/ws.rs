//! The WebSocket upgrade handler: the live transport for the event
//! protocol. One task pumps outbound `ServerEvent`s to the socket, another
//! pumps inbound frames into the event router; either side exiting tears
//! the connection down.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::{BoardSnapshot, ClientEvent, ServerEvent};
use crate::service::Actor;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(default = "default_display_name")]
    pub name: String,
}

fn default_display_name() -> String {
    "Anonymous".to_string()
}

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.name))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, display_name: String) {
    let conn_id = Uuid::new_v4().to_string();
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();
    state.broadcaster.register(conn_id.clone(), outbound_tx);

    let presence = state.presence.connect(conn_id.clone(), display_name);
    let actor = Actor {
        name: presence.display_name.clone(),
        color: presence.color.clone(),
    };

    let tasks = state.service.get_all_tasks().await.unwrap_or_default();
    let snapshot = BoardSnapshot {
        tasks,
        presence: state.presence.list_active(),
    };
    state.broadcaster.send_private(&conn_id, ServerEvent::BoardSnapshot(snapshot));
    state
        .broadcaster
        .broadcast_except(&conn_id, ServerEvent::PresenceState(state.presence.list_active()));

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "failed to serialize outbound event, dropping");
                    continue;
                }
            };
            if ws_sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let router = state.router.clone();
    let recv_conn_id = conn_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_stream.next().await {
            let Message::Text(text) = msg else { continue };
            match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => router.handle(&recv_conn_id, actor.clone(), event).await,
                Err(e) => debug!(error = %e, "dropped malformed frame"),
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.presence.disconnect(&conn_id);
    state
        .broadcaster
        .broadcast_except(&conn_id, ServerEvent::PresenceState(state.presence.list_active()));
    state.broadcaster.unregister(&conn_id);
}
