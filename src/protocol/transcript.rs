//! Transcript document construction.
//!
//! Notion's inference endpoint consumes a structured "transcript" rather than
//! a flat role/content list: one `config` entry, one `context` entry, then one
//! entry per conversation turn. Construction is a pure function of its inputs
//! plus the injected clock and id generator, which keeps it byte-reproducible
//! under test.

use serde::Serialize;
use uuid::Uuid;

use crate::config::NotionConfig;
use crate::protocol::openai::{ChatMessage, Role};

const SURFACE: &str = "workflows";

/// One transcript entry. Write-once: fully constructed before the request is
/// sent, never mutated afterward.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TranscriptEntry {
    #[serde(rename = "config")]
    Config { id: String, value: ConfigValue },
    #[serde(rename = "context")]
    Context { id: String, value: ContextValue },
    #[serde(rename = "user")]
    User {
        id: String,
        value: Vec<Vec<String>>,
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "createdAt")]
        created_at: String,
    },
    #[serde(rename = "agent-inference")]
    AgentInference { id: String, value: Vec<TextItem> },
}

/// Model selection and feature flags for the thread.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue {
    #[serde(rename = "type")]
    pub thread_type: String,
    pub model: String,
    #[serde(rename = "useWebSearch")]
    pub use_web_search: bool,
}

/// Caller identity and environment context.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextValue {
    pub timezone: String,
    pub space_id: String,
    pub user_id: String,
    pub user_email: String,
    pub current_datetime: String,
    pub user_name: String,
    pub surface: String,
}

/// A text content item inside an `agent-inference` transcript entry.
#[derive(Debug, Clone, Serialize)]
pub struct TextItem {
    #[serde(rename = "type")]
    kind: &'static str,
    pub content: String,
}

impl TextItem {
    #[must_use]
    pub fn new(content: String) -> Self {
        Self {
            kind: "text",
            content,
        }
    }
}

/// Request body for `POST /api/v3/runInferenceTranscript`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferencePayload {
    pub trace_id: String,
    pub space_id: String,
    pub transcript: Vec<TranscriptEntry>,
    pub create_thread: bool,
    pub is_partial_transcript: bool,
    pub as_patch_response: bool,
    pub generate_title: bool,
    pub save_all_thread_operations: bool,
    pub thread_type: String,
}

/// Build a transcript with an explicit timestamp and id generator.
///
/// Messages with roles outside user/assistant are dropped.
pub fn build_transcript_at(
    messages: &[ChatMessage],
    model: &str,
    notion: &NotionConfig,
    timestamp: &str,
    new_id: &mut dyn FnMut() -> String,
) -> Vec<TranscriptEntry> {
    let mut transcript = Vec::with_capacity(messages.len() + 2);

    transcript.push(TranscriptEntry::Config {
        id: new_id(),
        value: ConfigValue {
            thread_type: notion.thread_type.clone(),
            model: model.to_string(),
            use_web_search: true,
        },
    });
    transcript.push(TranscriptEntry::Context {
        id: new_id(),
        value: ContextValue {
            timezone: notion.timezone.clone(),
            space_id: notion.space_id.clone(),
            user_id: notion.user_id.clone(),
            user_email: notion.user_email.clone(),
            current_datetime: timestamp.to_string(),
            user_name: notion.user_name.clone(),
            surface: SURFACE.to_string(),
        },
    });

    for message in messages {
        match message.role {
            Role::User => transcript.push(TranscriptEntry::User {
                id: new_id(),
                value: vec![vec![message.content.clone()]],
                user_id: notion.user_id.clone(),
                created_at: timestamp.to_string(),
            }),
            Role::Assistant => transcript.push(TranscriptEntry::AgentInference {
                id: new_id(),
                value: vec![TextItem::new(message.content.clone())],
            }),
            Role::Other => {}
        }
    }

    transcript
}

/// Build a transcript using the wall clock and random UUIDs.
#[must_use]
pub fn build_transcript(
    messages: &[ChatMessage],
    model: &str,
    notion: &NotionConfig,
) -> Vec<TranscriptEntry> {
    let timestamp = chrono::Utc::now().to_rfc3339();
    let mut new_id = || Uuid::new_v4().to_string();
    build_transcript_at(messages, model, notion, &timestamp, &mut new_id)
}

/// Build the full inference request payload around a transcript.
#[must_use]
pub fn build_inference_payload(
    messages: &[ChatMessage],
    model: &str,
    notion: &NotionConfig,
) -> InferencePayload {
    InferencePayload {
        trace_id: Uuid::new_v4().to_string(),
        space_id: notion.space_id.clone(),
        transcript: build_transcript(messages, model, notion),
        create_thread: true,
        is_partial_transcript: true,
        as_patch_response: true,
        generate_title: true,
        save_all_thread_operations: true,
        thread_type: notion.thread_type.clone(),
    }
}
