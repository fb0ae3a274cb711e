pub mod stream;

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sotto_common::{
    event::{MessagePayload, StreamEvent},
    room::RoomId,
};
use tracing::error;

use crate::{
    auth::{jwt::Actor, jwt::JwtAccessTokenService, middleware::require_bearer_auth},
    broker::SubscriberRegistry,
    directory::UserDirectory,
    error::{ApiError, ErrorCode},
    metrics,
    policy::EscalationRateLimiter,
    presence::PresenceStore,
    rooms::{
        gate::{self, UnlockDenied},
        unlocks::SessionUnlockStore,
        LockConfig, LockStore,
    },
};

const MAX_COUNT_ROOMS: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SubscriberRegistry>,
    pub presence: PresenceStore,
    pub locks: LockStore,
    pub unlocks: SessionUnlockStore,
    pub directory: UserDirectory,
    pub escalations: EscalationRateLimiter,
    pub active_window: Duration,
}

pub fn build_router(state: AppState, jwt_service: Arc<JwtAccessTokenService>) -> Router {
    Router::new()
        .route("/v1/stream", get(stream::stream_room))
        .route("/v1/rooms/ping", post(ping_room))
        .route("/v1/rooms/unlock", post(unlock_room))
        .route("/v1/rooms/active_counts", post(active_counts))
        .route("/v1/rooms/{room}/events", post(publish_event))
        .route("/v1/escalations", post(request_escalation))
        .route_layer(middleware::from_fn_with_state(jwt_service, require_bearer_auth))
        .route("/v1/metrics", get(metrics_endpoint))
        .with_state(state)
}

#[derive(Deserialize)]
struct RoomRequest {
    room: RoomId,
}

#[derive(Deserialize)]
struct UnlockRequest {
    room: RoomId,
    password: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct UnlockResponse {
    unlocked: bool,
}

#[derive(Deserialize)]
struct ActiveCountsRequest {
    rooms: Vec<RoomId>,
}

#[derive(Serialize, Deserialize)]
struct ActiveCountsResponse {
    counts: HashMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct PublishResponse {
    delivered: usize,
    dropped: usize,
}

#[derive(Deserialize)]
struct EscalationRequest {
    room: RoomId,
    #[allow(dead_code)]
    reason: Option<String>,
}

/// Resolve the room's lock and check the actor may enter. Shared by every
/// room-scoped endpoint so a denial is indistinguishable across them.
async fn check_room_access(
    state: &AppState,
    actor: &Actor,
    room: RoomId,
) -> Result<LockConfig, ApiError> {
    let lock = state
        .locks
        .get_lock_config(room)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "room not found"))?;

    let admitted = gate::allowed(
        room,
        &lock,
        actor.user_id,
        actor.is_admin,
        actor.session_id,
        &state.unlocks,
    )
    .await;

    if admitted {
        Ok(lock)
    } else {
        let mut denial = ApiError::from_code(ErrorCode::RoomAccessDenied);
        if let Some(message) = &lock.lock_message {
            denial = denial.with_details(json!({ "lock_message": message }));
        }
        Err(denial)
    }
}

async fn ping_room(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<RoomRequest>,
) -> Result<StatusCode, ApiError> {
    check_room_access(&state, &actor, payload.room).await?;
    state.presence.record(payload.room, actor.user_id).await;

    Ok(StatusCode::NO_CONTENT)
}

async fn unlock_room(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<UnlockRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    let lock = state
        .locks
        .get_lock_config(payload.room)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "room not found"))?;

    let outcome = gate::unlock(
        payload.room,
        &lock,
        actor.user_id,
        actor.is_admin,
        actor.session_id,
        payload.password.as_deref(),
        &state.unlocks,
    )
    .await;

    match outcome {
        Ok(()) => Ok(Json(UnlockResponse { unlocked: true })),
        Err(UnlockDenied::WrongPassword) => {
            Err(ApiError::from_code(ErrorCode::LockPasswordIncorrect))
        }
        Err(UnlockDenied::AccessDenied) => {
            let mut denial = ApiError::from_code(ErrorCode::RoomAccessDenied);
            if let Some(message) = &lock.lock_message {
                denial = denial.with_details(json!({ "lock_message": message }));
            }
            Err(denial)
        }
    }
}

async fn active_counts(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    Json(payload): Json<ActiveCountsRequest>,
) -> Result<Json<ActiveCountsResponse>, ApiError> {
    if payload.rooms.is_empty() {
        return Err(ApiError::new(ErrorCode::ValidationFailed, "rooms must not be empty"));
    }
    if payload.rooms.len() > MAX_COUNT_ROOMS {
        return Err(ApiError::new(
            ErrorCode::ValidationFailed,
            format!("at most {MAX_COUNT_ROOMS} rooms per request"),
        ));
    }

    let mut counts = HashMap::with_capacity(payload.rooms.len());
    for room in payload.rooms {
        let count = state
            .directory
            .active_count(room, &state.presence, state.active_window)
            .await
            .map_err(internal_error)?;
        counts.insert(room.to_string(), count);
    }

    Ok(Json(ActiveCountsResponse { counts }))
}

async fn publish_event(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(room): Path<RoomId>,
    Json(mut message): Json<MessagePayload>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    check_room_access(&state, &actor, room).await?;

    if message.content.is_empty() && !message.has_image && !message.has_voice {
        return Err(ApiError::new(ErrorCode::ValidationFailed, "message has no content"));
    }

    // Ownership is decided by each receiving client, never trusted from
    // the publisher.
    message.is_own = false;

    if message.timestamp == 0 {
        message.timestamp = sotto_common::time::epoch_millis(Utc::now());
    }
    if message.formatted_time.is_empty() {
        let at = Utc
            .timestamp_millis_opt(message.timestamp)
            .single()
            .unwrap_or_else(Utc::now);
        message.formatted_time = sotto_common::time::format_timestamp(at);
    }

    let outcome = state
        .registry
        .publish(room, &StreamEvent::Message { message })
        .map_err(internal_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse { delivered: outcome.delivered, dropped: outcome.dropped }),
    ))
}

async fn request_escalation(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<EscalationRequest>,
) -> Result<StatusCode, ApiError> {
    check_room_access(&state, &actor, payload.room).await?;

    state.escalations.check(actor.user_id).map_err(|retry_after| {
        ApiError::new(ErrorCode::RateLimited, "too many escalation requests")
            .with_details(json!({ "retry_after_seconds": retry_after }))
    })?;

    Ok(StatusCode::ACCEPTED)
}

async fn metrics_endpoint() -> ([(&'static str, &'static str); 1], String) {
    ([("content-type", "text/plain; version=0.0.4")], metrics::render())
}

fn internal_error(error: anyhow::Error) -> ApiError {
    error!(error = ?error, "room api internal error");
    ApiError::from_code(ErrorCode::InternalError)
}
