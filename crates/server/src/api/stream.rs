//! The live room stream.
//!
//! One SSE connection per (client, room). The gate is checked before the
//! subscriber is registered, so a denied caller never occupies a channel.
//! The subscription is owned by the response stream; when the client
//! disconnects the stream is dropped and the broker handle unregisters
//! itself.

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Extension, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use sotto_common::room::RoomId;
use tracing::info;

use crate::{api::AppState, auth::jwt::Actor, error::ApiError};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
pub struct StreamQuery {
    room: RoomId,
}

pub async fn stream_room(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    super::check_room_access(&state, &actor, query.room).await?;

    // Opening the stream counts as being in the room.
    state.presence.record(query.room, actor.user_id).await;

    let handle = state.registry.subscribe(query.room);
    info!(room = %query.room, user_id = actor.user_id, "stream opened");

    let events = handle.map(|wire| Ok(Event::default().data(wire)));

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("keep-alive")))
}
