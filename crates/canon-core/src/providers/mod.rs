//! Provider event mapping.
//!
//! Each supported provider is one [ProviderKind] tag and one static
//! [ProviderSpec] entry: how its stream ends, and a pure function mapping one
//! provider-native event to zero or more [RawEvent]s. Adding a provider means
//! adding a tag and a table entry; the decoder, text buffer and assemblers do
//! not change.

pub mod anthropic;
pub mod openai;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::decoders::Terminator;
use crate::error::StreamError;
use crate::part::{FinishReason, Usage};

/// Supported provider families.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Chat-completions style: JSON chunks with per-choice deltas, `[DONE]`.
    #[serde(rename = "openai")]
    OpenAi,
    /// Messages style: begin/delta/end content blocks, `message_stop`.
    Anthropic,
}

impl ProviderKind {
    pub fn spec(self) -> &'static ProviderSpec {
        match self {
            ProviderKind::OpenAi => &openai::SPEC,
            ProviderKind::Anthropic => &anthropic::SPEC,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.spec().name)
    }
}

/// Maps one provider-native event. Must not hold state outside `state`.
pub type MapEvent =
    fn(&mut ProviderState, serde_json::Value) -> Result<Vec<RawEvent>, StreamError>;

/// Table entry describing one provider family.
#[derive(Debug)]
pub struct ProviderSpec {
    pub name: &'static str,
    pub terminator: Terminator,
    /// Whether the finish event says which stop sequence was matched. When it
    /// does not, a normal stop is taken to mean a requested stop sequence hit.
    pub reports_stop_sequence: bool,
    pub map_event: MapEvent,
}

/// Provider-level output, before text buffering and tool-call assembly.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Text(String),
    /// A tool-call argument fragment. The first fragment for an index usually
    /// carries the id and name, and may have an empty `fragment`.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        fragment: String,
    },
    /// The provider is done with one tool call.
    ToolCallDone { index: usize },
    /// The provider is done with every open tool call.
    ToolCallsDone,
}

impl RawEvent {
    pub fn text(text: impl Into<String>) -> Self {
        RawEvent::Text(text.into())
    }

    pub fn tool_call_fragment(index: usize, fragment: impl Into<String>) -> Self {
        RawEvent::ToolCallDelta {
            index,
            id: None,
            name: None,
            fragment: fragment.into(),
        }
    }
}

/// Kind of an open content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    ToolUse,
    Other,
}

/// Per-stream state a mapper may update. Never shared between streams.
#[derive(Debug, Default)]
pub struct ProviderState {
    pub blocks: HashMap<usize, BlockKind>,
    pub finish_reason: Option<FinishReason>,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

impl ProviderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The finish reason seen so far, `unknown` if the provider never sent one.
    pub fn finish_reason(&self) -> FinishReason {
        self.finish_reason.unwrap_or(FinishReason::Unknown)
    }
}
