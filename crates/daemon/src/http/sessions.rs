// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session routes: create-or-join, message/command ingestion, SSE and
//! WebSocket streaming with catch-up-then-tail semantics.

use super::error::ApiError;
use super::SharedState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::Stream;
use pp_core::Envelope;
use pp_engine::{EventFrame, Subscription};
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    pub label: Option<String>,
}

pub async fn create_or_join(
    State(state): State<SharedState>,
    body: Option<Json<CreateSessionBody>>,
) -> Result<impl IntoResponse, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or(CreateSessionBody { session_id: None, label: None });
    let result = state.hub.create_or_join(body.session_id.as_deref(), body.label.as_deref())?;
    let status = if result.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub text: String,
}

pub async fn post_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cursor = state.hub.post_message(&id, &body.text)?;
    Ok(Json(json!({ "cursor": cursor })))
}

pub async fn post_command(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cursor = state.hub.post_command(&id, envelope)?;
    Ok(Json(json!({ "cursor": cursor })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplayQuery {
    pub after: Option<i64>,
    pub limit: Option<usize>,
}

/// Bounded page replay for non-streaming clients.
pub async fn history(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<ReplayQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let events = state.hub.events_after(&id, query.after.unwrap_or(0), query.limit)?;
    let frames: Vec<serde_json::Value> = events
        .iter()
        .map(|e| json!({ "cursor": e.cursor, "envelope": e.envelope }))
        .collect();
    Ok(Json(json!({ "events": frames, "latest": state.hub.latest_cursor(&id)? })))
}

/// SSE stream: replay blocks until exhausted, then switches to live.
/// Each event's data is one JSON line `{cursor, envelope}`.
pub async fn stream_events(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<ReplayQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, ApiError> {
    let subscription = state.hub.subscribe(&id, query.after)?;
    Ok(Sse::new(frame_stream(subscription)).keep_alive(KeepAlive::default()))
}

struct StreamState {
    backlog: VecDeque<EventFrame>,
    subscription: Subscription,
}

fn frame_stream(
    subscription: Subscription,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    let backlog: VecDeque<EventFrame> = subscription
        .backlog
        .iter()
        .map(|record| EventFrame { cursor: record.cursor, envelope: record.envelope.clone() })
        .collect();
    futures_util::stream::unfold(
        StreamState { backlog, subscription },
        |mut st| async move {
            let frame = next_frame(&mut st).await?;
            let data = serde_json::to_string(&frame).unwrap_or_else(|_| "{}".to_string());
            Some((Ok(Event::default().data(data)), st))
        },
    )
}

async fn next_frame(st: &mut StreamState) -> Option<EventFrame> {
    if let Some(frame) = st.backlog.pop_front() {
        return Some(frame);
    }
    loop {
        match st.subscription.live.recv().await {
            Ok(frame) => {
                if let Some(frame) = st.subscription.admit(frame) {
                    return Some(frame);
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // The client's cursor still covers the gap; it reconnects
                // with `after=` to resynchronize.
                warn!(missed, "subscriber lagged; continuing from newest");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// WebSocket: same replay-then-tail semantics, bidirectional. Inbound
/// text frames are posted as command envelopes.
pub async fn ws_events(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<ReplayQuery>,
    upgrade: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    // Subscribe before upgrading so unknown sessions get a clean 404.
    let subscription = state.hub.subscribe(&id, query.after)?;
    Ok(upgrade.on_upgrade(move |socket| ws_loop(state, id, subscription, socket)))
}

async fn ws_loop(
    state: SharedState,
    session_id: String,
    mut subscription: Subscription,
    mut socket: WebSocket,
) {
    // Replay the backlog fully before tailing: broadcast recv is
    // cancel-safe inside select!, a half-drained backlog would not be.
    for record in &subscription.backlog {
        let frame = EventFrame { cursor: record.cursor, envelope: record.envelope.clone() };
        let Ok(text) = serde_json::to_string(&frame) else { continue };
        if socket.send(Message::Text(text)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            received = subscription.live.recv() => {
                match received {
                    Ok(frame) => {
                        let Some(frame) = subscription.admit(frame) else { continue };
                        let Ok(text) = serde_json::to_string(&frame) else { continue };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "ws subscriber lagged; client should resync by cursor");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => {
                                if let Err(e) = state.hub.post_command(&session_id, envelope) {
                                    warn!(error = %e, "ws command rejected");
                                }
                            }
                            Err(e) => debug!(error = %e, "ignoring malformed ws frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}
