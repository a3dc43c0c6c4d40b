//! The provider-agnostic units a canonical stream is made of.
//!
//! A well-formed stream is zero or more [CanonicalPart::TextDelta],
//! [CanonicalPart::ToolCallDelta] and [CanonicalPart::ToolCall] parts followed
//! by exactly one terminal part, either [CanonicalPart::Finish] or
//! [CanonicalPart::Error].

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::error::StreamError;

/// One unit of the canonical output stream.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CanonicalPart {
    /// A chunk of assistant text.
    TextDelta { text: String },

    /// A fragment of a tool call's JSON arguments, keyed by the stream-local
    /// tool-call index.
    ToolCallDelta {
        index: usize,
        #[serde(rename = "argsFragment")]
        args_fragment: String,
    },

    /// A complete tool call. `args_json` always parses as JSON.
    ToolCall(ToolCall),

    /// Terminal part of a successful stream.
    Finish { reason: FinishReason, usage: Usage },

    /// Terminal part of a failed stream.
    Error { kind: ErrorKind, cause: String },
}

impl CanonicalPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn tool_call_delta(index: usize, args_fragment: impl Into<String>) -> Self {
        Self::ToolCallDelta {
            index,
            args_fragment: args_fragment.into(),
        }
    }

    pub fn finish(reason: FinishReason, usage: Usage) -> Self {
        Self::Finish { reason, usage }
    }

    /// Whether this part ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error { .. })
    }
}

impl From<StreamError> for CanonicalPart {
    fn from(error: StreamError) -> Self {
        Self::Error {
            kind: error.kind(),
            cause: error.to_string(),
        }
    }
}

impl Display for CanonicalPart {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CanonicalPart::TextDelta { text } => write!(f, "{text}"),
            CanonicalPart::ToolCallDelta {
                index,
                args_fragment,
            } => write!(f, "Tool call delta #{index}: {args_fragment}"),
            CanonicalPart::ToolCall(tool_call) => write!(
                f,
                "Tool call: {} {} {}",
                tool_call.name, tool_call.id, tool_call.args_json
            ),
            CanonicalPart::Finish { reason, usage } => write!(
                f,
                "Finish: {reason} (prompt: {}, completion: {})",
                usage.prompt_tokens, usage.completion_tokens
            ),
            CanonicalPart::Error { kind, cause } => write!(f, "Error: {kind:?}: {cause}"),
        }
    }
}

/// A fully assembled tool invocation.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, verbatim as assembled.
    #[serde(rename = "argsJson")]
    pub args_json: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args_json: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args_json: args_json.into(),
        }
    }

    /// Parses the arguments back into a JSON value.
    pub fn arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.args_json)
    }
}

/// Why the model stopped generating.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other,
    #[default]
    Unknown,
}

impl Display for FinishReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content-filter",
            FinishReason::ToolCalls => "tool-calls",
            FinishReason::Error => "error",
            FinishReason::Other => "other",
            FinishReason::Unknown => "unknown",
        };
        f.write_str(reason)
    }
}

/// Token counts for one request/response pair.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Discriminates the terminal [CanonicalPart::Error].
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum ErrorKind {
    /// A frame payload was not valid JSON or not a known event shape.
    ParseError,
    /// A tool call's argument fragments never formed valid JSON.
    IncompleteToolCall,
    /// An embedded-markup tool block was malformed or named an unknown tool.
    ToolParseError,
    /// The byte source failed.
    TransportError,
    /// The provider reported an error in-band.
    ProviderError,
}

impl ErrorKind {
    /// Only transport failures are worth another attempt, and only by the
    /// caller that owns the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransportError)
    }
}
