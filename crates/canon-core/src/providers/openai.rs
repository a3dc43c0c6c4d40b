use serde::{Deserialize, Deserializer};

use super::{ProviderSpec, ProviderState, RawEvent};
use crate::decoders::Terminator;
use crate::error::StreamError;
use crate::part::{FinishReason, Usage};

pub static SPEC: ProviderSpec = ProviderSpec {
    name: "openai",
    terminator: Terminator::Sentinel("[DONE]"),
    reports_stop_sequence: false,
    map_event,
};

// ================================================================
// OpenAI Chat Completions streaming chunks
// ================================================================
#[derive(Deserialize, Debug, Default)]
struct StreamingFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamingToolCall {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: StreamingFunction,
}

#[derive(Deserialize, Debug, Default)]
struct StreamingDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, deserialize_with = "null_or_vec")]
    tool_calls: Vec<StreamingToolCall>,
}

#[derive(Deserialize, Debug)]
struct StreamingChoice {
    #[serde(default)]
    delta: StreamingDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamingUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct StreamingCompletionChunk {
    #[serde(default, deserialize_with = "null_or_vec")]
    choices: Vec<StreamingChoice>,
    #[serde(default)]
    usage: Option<StreamingUsage>,
    #[serde(default)]
    error: Option<ApiError>,
}

fn null_or_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        _ => FinishReason::Other,
    }
}

fn map_event(
    state: &mut ProviderState,
    event: serde_json::Value,
) -> Result<Vec<RawEvent>, StreamError> {
    let chunk: StreamingCompletionChunk = serde_json::from_value(event)?;
    let mut events = Vec::new();

    if let Some(error) = chunk.error {
        return Err(StreamError::Provider(error.message));
    }

    // some providers send a final usage-only chunk with no choices
    if let Some(usage) = chunk.usage {
        state.usage = Usage::new(usage.prompt_tokens, usage.completion_tokens);
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(events);
    };

    if let Some(content) = choice.delta.content
        && !content.is_empty()
    {
        events.push(RawEvent::Text(content));
    }

    for tool_call in choice.delta.tool_calls {
        events.push(RawEvent::ToolCallDelta {
            index: tool_call.index,
            id: tool_call.id.filter(|id| !id.is_empty()),
            name: tool_call.function.name.filter(|name| !name.is_empty()),
            fragment: tool_call.function.arguments.unwrap_or_default(),
        });
    }

    if let Some(reason) = choice.finish_reason {
        state.finish_reason = Some(finish_reason(&reason));
        events.push(RawEvent::ToolCallsDone);
    }

    Ok(events)
}
