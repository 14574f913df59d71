//! Stateful translation of the Notion inference stream into OpenAI SSE frames.
//!
//! The upstream sends cumulative text snapshots (not increments) on its
//! streaming channel, repeats content on a fallback full-snapshot channel,
//! and may interleave a legacy patch protocol that is already incremental.
//! The translator normalizes all three into content deltas, each character
//! span emitted exactly once, using a monotone `watermark` of the longest
//! text observed so far.

use std::borrow::Cow;
use std::sync::LazyLock;

use bytes::Bytes;
use regex_lite::Regex;

use crate::protocol::shapes::{InferenceItem, PatchOp, UpstreamMessage};
use crate::stream::extractor::extract_json_candidate;
use crate::stream::sse::{delta_frame, done_frame, error_frame, FrameContext};

static LANG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<lang[^>]*>").expect("lang tag pattern compiles"));

/// Strip upstream `<lang ...>` formatting directives from a text snapshot.
///
/// A snapshot that opens with a `<lang` fragment and contains no `>` at all
/// was split mid-tag by chunking; emitting it would leak garbled partial
/// markup, so it cleans to empty and the next snapshot retries.
fn clean_inference_text(raw: &str) -> Cow<'_, str> {
    if raw.trim_start().starts_with("<lang") && !raw.contains('>') {
        return Cow::Borrowed("");
    }
    LANG_TAG.replace_all(raw, "")
}

/// Per-request stream state. One instance per in-flight request; instances
/// share nothing, so concurrent requests need no coordination.
pub struct StreamTranslator {
    frame: FrameContext,
    /// Unconsumed text awaiting a complete JSON object.
    buffer: String,
    /// Longest cleaned text observed on the live channel, measured in
    /// characters. Never shortened; shorter or equal candidates are stale
    /// snapshots and emit nothing.
    watermark: String,
    /// Latest complete final-answer text from the fallback channel.
    /// Diagnostics only; deltas are always computed against `watermark`.
    accumulated_final: String,
    emitted_deltas: u64,
}

impl StreamTranslator {
    #[must_use]
    pub fn new(response_id: String) -> Self {
        Self {
            frame: FrameContext::new(response_id),
            buffer: String::new(),
            watermark: String::new(),
            accumulated_final: String::new(),
            emitted_deltas: 0,
        }
    }

    /// Feed one raw chunk from the upstream body, appending any resulting
    /// SSE frames to `out`. Chunk boundaries are meaningless: objects split
    /// across reads are buffered until complete.
    pub fn push_chunk(&mut self, chunk: &[u8], out: &mut Vec<Bytes>) {
        let Ok(text) = std::str::from_utf8(chunk) else {
            // A read split inside a UTF-8 sequence; drop the chunk rather
            // than poison the buffer.
            tracing::debug!(len = chunk.len(), "dropping non-UTF-8 upstream chunk");
            return;
        };
        self.buffer.push_str(text);

        while let Some(candidate) = extract_json_candidate(&mut self.buffer) {
            match serde_json::from_str::<UpstreamMessage>(&candidate) {
                Ok(message) => self.handle_message(message, out),
                Err(err) => {
                    tracing::trace!(error = %err, "discarding undecodable JSON candidate");
                }
            }
        }
    }

    fn handle_message(&mut self, message: UpstreamMessage, out: &mut Vec<Bytes>) {
        match message {
            UpstreamMessage::AgentInference { value } => self.handle_inference(&value, out),
            UpstreamMessage::RecordMap { record_map } => {
                if let Some(body) = record_map {
                    if let Some(content) = body.first_inference_text() {
                        if !content.is_empty() {
                            let content = content.to_string();
                            self.emit_beyond_watermark(&content, out);
                            self.accumulated_final = content;
                        }
                    }
                }
            }
            UpstreamMessage::Patch { v } => {
                // Legacy protocol: operations are already incremental, so
                // they bypass the watermark entirely.
                for delta in v.iter().filter_map(PatchOp::delta_text) {
                    out.push(delta_frame(&self.frame, delta));
                    self.emitted_deltas += 1;
                }
            }
            UpstreamMessage::Unrecognized => {}
        }
    }

    fn handle_inference(&mut self, items: &[InferenceItem], out: &mut Vec<Bytes>) {
        for item in items.iter().filter(|item| item.is_text()) {
            let cleaned = clean_inference_text(&item.content);
            if !cleaned.is_empty() {
                self.emit_beyond_watermark(&cleaned, out);
            }
        }
    }

    /// Emit the span of `candidate` past the current watermark, if any, and
    /// advance the watermark. Lengths are measured in characters, not bytes:
    /// snapshots grow by characters, and a multibyte rewrite can shrink the
    /// character count while the byte count grows. Candidates with no more
    /// characters than the watermark emit nothing and leave it untouched.
    fn emit_beyond_watermark(&mut self, candidate: &str, out: &mut Vec<Bytes>) {
        let seen = self.watermark.chars().count();
        if candidate.chars().count() <= seen {
            return;
        }
        if let Some((split, _)) = candidate.char_indices().nth(seen) {
            out.push(delta_frame(&self.frame, &candidate[split..]));
            self.emitted_deltas += 1;
        }
        self.watermark = candidate.to_string();
    }

    /// Upstream EOF: emit the terminal sentinel. A stream that produced no
    /// content is not an error, but it usually means stale credentials, so
    /// it is logged for the operator.
    pub fn finish(&mut self, out: &mut Vec<Bytes>) {
        if self.emitted_deltas == 0 {
            tracing::warn!(
                response_id = %self.frame.response_id,
                "stream completed without extracting any content; check credentials and workspace ids"
            );
        } else {
            tracing::debug!(
                response_id = %self.frame.response_id,
                deltas = self.emitted_deltas,
                final_len = self.accumulated_final.len(),
                "stream complete"
            );
        }
        out.push(done_frame());
    }

    /// Mid-stream fault: emit one error frame. The sequence ends here
    /// without the normal sentinel.
    pub fn abort(&mut self, message: &str, out: &mut Vec<Bytes>) {
        tracing::error!(
            response_id = %self.frame.response_id,
            error = %message,
            "stream aborted"
        );
        out.push(error_frame(message));
    }

    #[must_use]
    pub fn watermark(&self) -> &str {
        &self.watermark
    }
}
