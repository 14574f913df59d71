//! Upstream message envelopes.
//!
//! Notion's inference stream interleaves three envelope formats, dispatched
//! on the top-level `type` discriminator. Anything else deserializes into
//! [`UpstreamMessage::Unrecognized`] and is dropped by the translator.

use std::collections::BTreeMap;

use serde::Deserialize;

/// One decoded top-level object from the inference byte stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum UpstreamMessage {
    /// Streaming channel. Text items carry cumulative snapshots of the turn
    /// generated so far, not increments.
    #[serde(rename = "agent-inference")]
    AgentInference {
        #[serde(default)]
        value: Vec<InferenceItem>,
    },
    /// Fallback full-snapshot channel, generally seen once near stream end.
    #[serde(rename = "record-map")]
    RecordMap {
        #[serde(rename = "recordMap", default)]
        record_map: Option<RecordMapBody>,
    },
    /// Legacy patch protocol; operations carry already-incremental deltas.
    #[serde(rename = "patch")]
    Patch {
        #[serde(default)]
        v: Vec<PatchOp>,
    },
    #[serde(other)]
    Unrecognized,
}

/// One content item inside an `agent-inference` value list.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceItem {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: String,
}

impl InferenceItem {
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }
}

/// The `recordMap` payload of a full-snapshot message.
#[derive(Debug, Deserialize)]
pub struct RecordMapBody {
    #[serde(default)]
    pub thread_message: BTreeMap<String, ThreadMessageRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ThreadMessageRecord {
    #[serde(default)]
    pub value: Option<RecordEnvelope>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordEnvelope {
    #[serde(default)]
    pub value: Option<RecordPayload>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordPayload {
    #[serde(default)]
    pub step: Option<InferenceStep>,
}

/// The `step` node nested under `value.value` of a thread-message record.
/// Non-inference steps carry arbitrary `value` payloads, so the items are
/// only interpreted when the step type matches.
#[derive(Debug, Default, Deserialize)]
pub struct InferenceStep {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl RecordMapBody {
    /// Extract the final-answer text: the first thread-message record whose
    /// step is an `agent-inference` carrying a non-empty text item. Scanning
    /// stops at the first match; multiple records are never aggregated, and
    /// records with only empty text do not terminate the scan.
    #[must_use]
    pub fn first_inference_text(&self) -> Option<&str> {
        self.thread_message.values().find_map(|record| {
            let step = record.value.as_ref()?.value.as_ref()?.step.as_ref()?;
            if step.kind != "agent-inference" {
                return None;
            }
            first_text_content(&step.value)
        })
    }
}

fn first_text_content(items: &serde_json::Value) -> Option<&str> {
    items.as_array()?.iter().find_map(|item| {
        let obj = item.as_object()?;
        if obj.get("type")?.as_str()? != "text" {
            return None;
        }
        obj.get("content")?.as_str().filter(|text| !text.is_empty())
    })
}

/// One operation in a legacy `patch` message.
#[derive(Debug, Clone, Deserialize)]
pub struct PatchOp {
    #[serde(default)]
    pub o: String,
    #[serde(default)]
    pub p: String,
    #[serde(default)]
    pub v: serde_json::Value,
}

impl PatchOp {
    /// A replace/append op targeting a text value path carries a verbatim
    /// incremental delta.
    #[must_use]
    pub fn delta_text(&self) -> Option<&str> {
        if self.o != "x" || !self.p.contains("/value/") {
            return None;
        }
        match self.v.as_str() {
            Some(text) if !text.is_empty() => Some(text),
            _ => None,
        }
    }
}
