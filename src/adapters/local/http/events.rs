use super::error::ApiError;
use super::AppState;
use crate::domain::jobs::ProgressEvent;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub channel: String,
}

/// Server-sent progress events for one channel.
pub async fn subscribe(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if query.channel.is_empty() {
        return Err(ApiError::bad_request("channel is required"));
    }
    let channel = query.channel;

    // Lagged receivers skip what they missed.
    let stream = BroadcastStream::new(state.hub.subscribe()).filter_map(move |item| {
        let event = item
            .ok()
            .filter(|event: &ProgressEvent| event.channel == channel)
            .map(|event| Ok::<_, Infallible>(to_sse(&event)));
        async move { event }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &ProgressEvent) -> Event {
    Event::default()
        .event(event.event.as_str())
        .data(event.data().to_string())
}
