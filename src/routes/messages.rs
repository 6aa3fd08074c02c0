use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{
        event::GroupEvent,
        member::CredentialRequest,
        message::{HistoryQuery, MarkReadRequest, SendMessageRequest},
    },
    services::{messages::MessageService, metrics},
    AppState,
};

pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let _guard = state.locks.acquire(id).await;
    let outcome = MessageService::send(&state.db, id, &body).await?;

    let event = GroupEvent::NewMessage {
        message: outcome.out.clone(),
    };
    if outcome.broadcast {
        state.events.publish_group(id, &event).await;
    } else {
        // Recipient plus the sender's own echo.
        for inbox in &outcome.inboxes {
            state.events.publish_inbox(*inbox, &event).await;
        }
    }
    metrics::MESSAGES_SENT.inc();
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(outcome.out).unwrap()),
    ))
}

pub async fn get_message_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let msgs = MessageService::history(&state.db, id, &q).await?;
    Ok(Json(serde_json::to_value(msgs).unwrap()))
}

pub async fn get_unread_counts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<CredentialRequest>,
) -> Result<Json<Value>, ApiError> {
    let counts = MessageService::inbox_counts(&state.db, id, q.credential).await?;
    Ok(Json(serde_json::to_value(counts).unwrap()))
}

pub async fn mark_messages_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MarkReadRequest>,
) -> Result<Json<Value>, ApiError> {
    let _guard = state.locks.acquire(id).await;
    let outcome = MessageService::mark_read(&state.db, id, &body).await?;

    if !outcome.flipped.is_empty() {
        let event = GroupEvent::ReadMessage {
            ids: outcome.flipped.clone(),
        };
        state.events.publish_inbox(outcome.reader_id, &event).await;
        for sender in &outcome.sender_ids {
            state.events.publish_inbox(*sender, &event).await;
        }
    }
    Ok(Json(json!({ "marked": outcome.flipped.len() })))
}
