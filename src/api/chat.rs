//! `/v1/chat/completions` handler.
//!
//! Every completion is served as an SSE stream. Failures before the upstream
//! connection is established come back as plain JSON errors; once the client
//! has been promised a stream, faults degrade to a single in-band error frame.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::StreamExt;
use smallvec::SmallVec;

use crate::error::{into_axum_response, ProxyError};
use crate::protocol::openai::ChatCompletionRequest;
use crate::protocol::transcript::build_inference_payload;
use crate::state::AppState;
use crate::stream::sse::error_frame;
use crate::stream::StreamTranslator;

pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Response {
    if let Err(err) = state.authenticate(&headers) {
        return into_axum_response(&err);
    }

    let request: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return into_axum_response(&ProxyError::InvalidRequest(format!(
                "Malformed request body: {err}"
            )));
        }
    };
    if request.messages.is_empty() {
        return into_axum_response(&ProxyError::InvalidRequest(
            "messages must not be empty".into(),
        ));
    }

    let requested = request.model.as_deref().unwrap_or_default();
    let upstream_model = state.config.models.resolve(requested);
    let response_id = state.next_response_id();
    tracing::info!(
        response_id = %response_id,
        requested_model = %requested,
        upstream_model = %upstream_model,
        messages = request.messages.len(),
        "chat completion request"
    );

    let payload = build_inference_payload(&request.messages, upstream_model, &state.config.notion);
    let payload_bytes = match serde_json::to_vec(&payload) {
        Ok(bytes) => bytes::Bytes::from(bytes),
        Err(err) => {
            return into_axum_response(&ProxyError::Internal(format!(
                "Failed to serialize inference payload: {err}"
            )));
        }
    };

    // The client gets HTTP 200 with an SSE body either way; a rejected
    // upstream call becomes a one-frame error stream.
    match state.transport.run_inference(payload_bytes).await {
        Ok(response) => build_translated_stream_response(response, response_id),
        Err(err) => {
            tracing::warn!(response_id = %response_id, error = %err, "inference request failed before streaming");
            sse_ok_response(Body::from(error_frame(&err.to_string())))
        }
    }
}

struct PendingFrames {
    chunks: SmallVec<[bytes::Bytes; 8]>,
    head: usize,
}

impl PendingFrames {
    fn with_capacity(capacity: usize) -> Self {
        let mut chunks = SmallVec::new();
        chunks.reserve(capacity);
        Self { chunks, head: 0 }
    }

    fn pop_front(&mut self) -> Option<bytes::Bytes> {
        if self.head >= self.chunks.len() {
            return None;
        }
        let chunk = std::mem::take(&mut self.chunks[self.head]);
        self.head += 1;
        if self.head == self.chunks.len() {
            self.chunks.clear();
            self.head = 0;
        }
        Some(chunk)
    }

    fn extend_from(&mut self, frames: &mut Vec<bytes::Bytes>) {
        if frames.is_empty() {
            return;
        }
        self.chunks.reserve(frames.len());
        self.chunks.extend(frames.drain(..));
    }
}

fn build_translated_stream_response(response: reqwest::Response, response_id: String) -> Response {
    let byte_stream = response.bytes_stream();
    let translator = StreamTranslator::new(response_id);

    let output_stream = futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            translator,
            Vec::<bytes::Bytes>::with_capacity(8),
            PendingFrames::with_capacity(8),
            false,
        ),
        |(mut upstream, mut translator, mut frames, mut pending, mut done)| async move {
            loop {
                if let Some(chunk) = pending.pop_front() {
                    return Some((chunk, (upstream, translator, frames, pending, done)));
                }
                if done {
                    return None;
                }
                match upstream.as_mut().next().await {
                    Some(Ok(chunk)) => translator.push_chunk(&chunk, &mut frames),
                    Some(Err(err)) => {
                        translator.abort(&format!("Upstream stream error: {err}"), &mut frames);
                        done = true;
                    }
                    None => {
                        translator.finish(&mut frames);
                        done = true;
                    }
                }
                pending.extend_from(&mut frames);
            }
        },
    );

    let body = Body::from_stream(output_stream.map(Ok::<bytes::Bytes, std::convert::Infallible>));
    sse_ok_response(body)
}

fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    // Keeps nginx-style reverse proxies from buffering the stream.
    headers.insert(
        http::HeaderName::from_static("x-accel-buffering"),
        http::HeaderValue::from_static("no"),
    );
    response
}
