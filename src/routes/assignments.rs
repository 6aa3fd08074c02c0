use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{event::GroupEvent, member::CredentialRequest, member::MemberOut},
    services::{
        assignments::AssignmentService, graph::RelationshipGraph, groups::GroupService,
        members::MemberService, metrics,
    },
    AppState,
};

pub async fn assign_santa(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CredentialRequest>,
) -> Result<Json<Value>, ApiError> {
    let _guard = state.locks.acquire(id).await;
    let rows = AssignmentService::assign(&state.db, id, body.credential).await?;
    metrics::DRAWS_PERFORMED.inc();
    state
        .events
        .publish_group(id, &GroupEvent::GroupLocked)
        .await;
    info!("group {id} locked, {} assignments drawn", rows.len());
    Ok(Json(json!({ "assigned": rows.len() })))
}

pub async fn unlock_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CredentialRequest>,
) -> Result<Json<Value>, ApiError> {
    let _guard = state.locks.acquire(id).await;
    let cleared = AssignmentService::reset(&state.db, id, body.credential).await?;
    state
        .events
        .publish_group(id, &GroupEvent::GroupUnlocked)
        .await;
    info!("group {id} unlocked, {cleared} assignments cleared");
    Ok(Json(json!({ "cleared": cleared })))
}

/// Who the caller gives to.
pub async fn my_santa(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<CredentialRequest>,
) -> Result<Json<Value>, ApiError> {
    let me = MemberService::require_member(&state.db, id, q.credential).await?;
    let receiver = AssignmentService::receiver_of(&state.db, id, me.id)
        .await?
        .ok_or(ApiError::NotFrozen)?;
    Ok(Json(json!({ "gives_to": MemberOut::from(&receiver) })))
}

/// The full cycle the caller belongs to, in gifting order.
pub async fn my_chain(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<CredentialRequest>,
) -> Result<Json<Value>, ApiError> {
    let me = MemberService::require_member(&state.db, id, q.credential).await?;
    let members = MemberService::list(&state.db, id).await?;
    let assignments = AssignmentService::list(&state.db, id).await?;
    let graph = RelationshipGraph::build(&members, &assignments);
    let chain = graph.chain_of(me.id);
    Ok(Json(serde_json::to_value(chain).unwrap()))
}

/// Organizer-only dump of every edge and the cycle decomposition.
pub async fn relationships(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<CredentialRequest>,
) -> Result<Json<Value>, ApiError> {
    let group = GroupService::fetch(&state.db, id).await?;
    if !group.is_organizer(q.credential) {
        return Err(ApiError::NotAuthorized);
    }
    let members = MemberService::list(&state.db, id).await?;
    let assignments = AssignmentService::list(&state.db, id).await?;
    let graph = RelationshipGraph::build(&members, &assignments);

    let edges: Vec<Value> = graph
        .edges_sorted()
        .iter()
        .map(|(giver, receiver)| json!({ "giver": giver, "receiver": receiver }))
        .collect();
    Ok(Json(json!({
        "is_frozen": group.is_frozen,
        "edges": edges,
        "cycles": graph.cycles(),
    })))
}
