//! The `/chat` relay handler.
//!
//! # Request Lifecycle
//! ```text
//! received → validated → streaming → {completed | errored} → closed
//! ```
//!
//! The upstream call is bound to the response body: the body owns the
//! [`CancelHandle`], so a client that disconnects drops the body, which
//! cancels the upstream read loop.
//!
//! # Design Decisions
//! - Headers are committed only once the first chunk (or the end of the
//!   stream) is known, so a failure with nothing sent gets a real 500
//! - Each chunk is its own body frame; hyper flushes frame by frame
//! - A mid-stream failure aborts the body, leaving the client a truncated
//!   response
//! - Bytes are relayed verbatim, no SSE framing is added

use std::io;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::stream;

use crate::http::request::request_id;
use crate::http::server::AppState;
use crate::observability::metrics::{self, StreamGuard};
use crate::upstream::{cancellation, CancelHandle, ChatRequest, ChunkStream, ValidChat};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Relay one chat request to the upstream provider.
pub async fn chat(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = request_id(&headers).to_string();

    let chat = match decode(&body, &state.default_model) {
        Ok(chat) => chat,
        Err((status, reason)) => {
            tracing::debug!(request_id = %request_id, reason, "Rejected chat request");
            metrics::record_request(status.as_u16());
            return (status, reason).into_response();
        }
    };

    tracing::info!(
        request_id = %request_id,
        model = %chat.model,
        upstream = %state.upstream.url(),
        input_bytes = chat.input.len(),
        "Relaying chat request"
    );

    let (cancel, signal) = cancellation();
    let mut chunks = match state.upstream.stream(signal, &chat.input, &chat.model) {
        Ok(chunks) => chunks,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to start upstream stream");
            metrics::record_upstream_error(e.kind());
            return internal_error();
        }
    };
    let guard = metrics::stream_opened();

    let first = chunks.next_chunk().await;
    if first.is_none() {
        if let Some(e) = chunks.take_error() {
            tracing::error!(request_id = %request_id, error = %e, "Error during streaming");
            metrics::record_upstream_error(e.kind());
            return internal_error();
        }
    }

    metrics::record_request(StatusCode::OK.as_u16());
    let relay = Relay {
        chunks,
        pending: first,
        _cancel: cancel,
        guard,
        request_id,
        sent_chunks: 0,
        sent_bytes: 0,
        finished: false,
    };
    event_stream(relay)
}

/// Decode the first JSON value in `body`; anything after it is ignored.
fn decode(body: &[u8], default_model: &str) -> Result<ValidChat, (StatusCode, &'static str)> {
    let request: ChatRequest = serde_json::Deserializer::from_slice(body)
        .into_iter::<ChatRequest>()
        .next()
        .and_then(Result::ok)
        .ok_or((StatusCode::BAD_REQUEST, "invalid json body"))?;
    request
        .validate(default_model)
        .map_err(|_| (StatusCode::BAD_REQUEST, "input is required"))
}

fn internal_error() -> Response {
    metrics::record_request(StatusCode::INTERNAL_SERVER_ERROR.as_u16());
    (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
}

fn event_stream(relay: Relay) -> Response {
    let body = stream::unfold(relay, |mut relay| async move {
        let item = relay.next().await?;
        Some((item, relay))
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// Consumer side of one relay, owned by the response body.
struct Relay {
    chunks: ChunkStream,
    pending: Option<Bytes>,
    _cancel: CancelHandle,
    guard: StreamGuard,
    request_id: String,
    sent_chunks: u64,
    sent_bytes: u64,
    finished: bool,
}

impl Relay {
    async fn next(&mut self) -> Option<Result<Bytes, io::Error>> {
        if self.finished {
            return None;
        }

        let chunk = match self.pending.take() {
            Some(chunk) => Some(chunk),
            None => self.chunks.next_chunk().await,
        };

        if let Some(chunk) = chunk {
            self.sent_chunks += 1;
            self.sent_bytes += chunk.len() as u64;
            metrics::record_chunk(chunk.len());
            return Some(Ok(chunk));
        }

        self.finished = true;
        match self.chunks.take_error() {
            Some(e) => {
                tracing::error!(
                    request_id = %self.request_id,
                    chunks = self.sent_chunks,
                    bytes = self.sent_bytes,
                    error = %e,
                    "Error during streaming; aborting response"
                );
                metrics::record_upstream_error(e.kind());
                Some(Err(io::Error::other(e)))
            }
            None => {
                tracing::info!(
                    request_id = %self.request_id,
                    chunks = self.sent_chunks,
                    bytes = self.sent_bytes,
                    duration_ms = self.guard.elapsed_ms() as u64,
                    "Relay completed"
                );
                None
            }
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!(
                request_id = %self.request_id,
                chunks = self.sent_chunks,
                "Downstream closed; cancelling upstream"
            );
        }
    }
}
