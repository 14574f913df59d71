//! OpenAI-style SSE frame construction.
//!
//! Every frame this proxy emits, whether content delta, error, or terminal
//! sentinel, is a `data: <json>\n\n` line; the sentinel is the literal
//! `[DONE]`.

use bytes::Bytes;

/// Fixed model label stamped on every outgoing chunk.
pub const MODEL_LABEL: &str = "notion-ai";

/// Per-stream identifiers shared by all frames of one response.
#[derive(Debug, Clone)]
pub struct FrameContext {
    pub response_id: String,
    pub created: i64,
}

impl FrameContext {
    #[must_use]
    pub fn new(response_id: String) -> Self {
        Self {
            response_id,
            created: chrono::Utc::now().timestamp(),
        }
    }
}

/// Build one `chat.completion.chunk` frame carrying a content delta.
#[must_use]
pub fn delta_frame(ctx: &FrameContext, content: &str) -> Bytes {
    let chunk = serde_json::json!({
        "id": ctx.response_id,
        "object": "chat.completion.chunk",
        "created": ctx.created,
        "model": MODEL_LABEL,
        "choices": [{
            "index": 0,
            "delta": {"content": content},
            "finish_reason": null,
        }],
    });
    Bytes::from(format!("data: {chunk}\n\n"))
}

/// Build one SSE error frame. Errors never surface as HTTP failures once a
/// stream has started; they degrade to this frame.
#[must_use]
pub fn error_frame(message: &str) -> Bytes {
    let body = serde_json::json!({
        "error": {
            "message": message,
            "type": "server_error",
        }
    });
    Bytes::from(format!("data: {body}\n\n"))
}

/// The terminal sentinel frame.
#[must_use]
pub fn done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}
