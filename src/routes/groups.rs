use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{
        event::GroupEvent,
        group::{CreateGroupRequest, UpdateGroupSettingsRequest},
        member::{
            CredentialQuery, CredentialRequest, JoinGroupRequest, KickMemberRequest, MemberOut,
        },
    },
    services::{groups::GroupService, members::MemberService, metrics},
    AppState,
};

pub async fn create_group(
    State(state): State<AppState>,
    Json(body): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let group = GroupService::create(&state.db, &body).await?;
    metrics::GROUPS_CREATED.inc();
    info!("group {} created (capacity {})", group.id, group.capacity);
    Ok((StatusCode::CREATED, Json(json!({ "id": group.id }))))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<CredentialQuery>,
) -> Result<Json<Value>, ApiError> {
    let info = GroupService::info(&state.db, id, q.credential).await?;
    Ok(Json(serde_json::to_value(info).unwrap()))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateGroupSettingsRequest>,
) -> Result<Json<Value>, ApiError> {
    let _guard = state.locks.acquire(id).await;
    let group = GroupService::update_settings(&state.db, id, &body).await?;
    Ok(Json(serde_json::to_value(group).unwrap()))
}

pub async fn toggle_open(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CredentialRequest>,
) -> Result<Json<Value>, ApiError> {
    let _guard = state.locks.acquire(id).await;
    let (group, event) = GroupService::toggle_open(&state.db, id, body.credential).await?;
    state.events.publish_group(id, &event).await;
    Ok(Json(json!({ "is_open": group.is_open })))
}

pub async fn join_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<JoinGroupRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let _guard = state.locks.acquire(id).await;
    let member = MemberService::join(&state.db, id, &body).await?;
    state
        .events
        .publish_group(
            id,
            &GroupEvent::MemberJoined {
                name: member.name.clone(),
                code_name: member.code_name.clone(),
            },
        )
        .await;
    metrics::MEMBERS_JOINED.inc();
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(MemberOut::from(&member)).unwrap()),
    ))
}

pub async fn leave_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CredentialRequest>,
) -> Result<Json<Value>, ApiError> {
    let _guard = state.locks.acquire(id).await;
    let member = MemberService::leave(&state.db, id, body.credential).await?;
    state
        .events
        .publish_group(id, &GroupEvent::MemberLeft { name: member.name })
        .await;
    Ok(Json(json!({ "message": "left the group" })))
}

pub async fn kick_member(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<KickMemberRequest>,
) -> Result<Json<Value>, ApiError> {
    let _guard = state.locks.acquire(id).await;
    let member = MemberService::kick(&state.db, id, body.credential, &body.member_name).await?;
    state
        .events
        .publish_group(id, &GroupEvent::MemberLeft { name: member.name })
        .await;
    Ok(Json(json!({ "message": "member removed" })))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<CredentialRequest>,
) -> Result<StatusCode, ApiError> {
    let _guard = state.locks.acquire(id).await;
    GroupService::delete(&state.db, id, q.credential).await?;
    state.locks.forget(id);
    info!("group {id} deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    // Existence check keeps unknown groups indistinguishable from empty ones.
    GroupService::fetch(&state.db, id).await?;
    let members = MemberService::list(&state.db, id).await?;
    let out: Vec<MemberOut> = members.iter().map(MemberOut::from).collect();
    Ok(Json(serde_json::to_value(out).unwrap()))
}
