//! Server-Sent Events (SSE) for live poll results.
//!
//! Every stream opens with a `connected` event, then carries
//! `poll_update_{id}` and `poll_deleted_{id}` events from the broadcast
//! hub. A disconnecting client drops its subscription, which removes it
//! from the hub.

use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::stream::{self, Stream};
use tokio_stream::StreamExt;
use tracing::debug;
use webpolls_core::PollEvent;

use crate::middleware::AppState;

fn to_sse(event: &PollEvent) -> Event {
    Event::default().event(event.name()).data(event.data())
}

/// Subscribe to the hub, keeping only events about `poll_id` when given.
fn live_stream(
    state: &AppState,
    poll_id: Option<i32>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let subscription = state.poll_service.subscribe();
    let subscriber = subscription.id();
    debug!(subscriber, ?poll_id, "Live viewer connected");

    let events = subscription
        .filter(move |event| poll_id.is_none_or(|id| event.poll_id() == id))
        .map(|event| Ok(to_sse(&event)));

    let initial = stream::once(async move {
        Ok(Event::default()
            .event("connected")
            .data(serde_json::json!({ "subscriber": subscriber }).to_string()))
    });

    Sse::new(initial.chain(events)).keep_alive(
        KeepAlive::new()
            .interval(state.keep_alive)
            .text("ping"),
    )
}

/// Events for every poll.
async fn all_polls(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    live_stream(&state, None)
}

/// Events for one poll.
pub async fn poll_events(
    State(state): State<AppState>,
    Path(poll_id): Path<i32>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    live_stream(&state, Some(poll_id))
}

/// Create SSE router.
pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(all_polls))
}

