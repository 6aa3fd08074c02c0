use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    models::event::{group_channel, inbox_channel},
    services::{members::MemberService, metrics},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    pub group_id: Uuid,
    pub credential: Uuid,
}

/// Realtime subscription: the group's lifecycle topic plus the caller's
/// inbox topic. A session carries no state across reconnects — clients
/// refetch the authoritative snapshot before applying live events.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
) -> Response {
    let member =
        match MemberService::require_member(&state.db, params.group_id, params.credential).await {
            Ok(m) => m,
            Err(e) => return e.into_response(),
        };

    ws.on_upgrade(move |socket| async move {
        info!(
            "realtime session connected: group={} member={}",
            params.group_id, member.name
        );
        handle_socket(socket, state, params.group_id, member.id).await;
    })
}

async fn handle_socket(socket: WebSocket, state: AppState, group_id: Uuid, member_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    // Dedicated pub/sub connection for this session.
    let mut pubsub = match state.redis_client.get_async_pubsub().await {
        Ok(c) => c,
        Err(e) => {
            error!("Redis pubsub error: {e}");
            return;
        }
    };
    for channel in [group_channel(group_id), inbox_channel(member_id)] {
        if let Err(e) = pubsub.subscribe(&channel).await {
            error!("Redis subscribe error on {channel}: {e}");
            return;
        }
    }

    metrics::WS_SESSIONS.inc();

    // Redis Pub/Sub → WebSocket; payloads are already typed event JSON.
    let mut redis_task = tokio::spawn(async move {
        let mut pubsub_stream = pubsub.on_message();
        while let Some(msg) = pubsub_stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(_) => continue,
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // The channel is server→client; inbound frames only matter for close.
    let mut client_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Ping(_) => {}
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut redis_task) => client_task.abort(),
        _ = (&mut client_task) => redis_task.abort(),
    }

    metrics::WS_SESSIONS.dec();
    info!("realtime session disconnected");
}
