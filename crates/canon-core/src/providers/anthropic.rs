use serde::Deserialize;

use super::{BlockKind, ProviderSpec, ProviderState, RawEvent};
use crate::decoders::Terminator;
use crate::error::StreamError;
use crate::part::FinishReason;

pub static SPEC: ProviderSpec = ProviderSpec {
    name: "anthropic",
    terminator: Terminator::Event("message_stop"),
    reports_stop_sequence: true,
    map_event,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamingEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDelta,
        #[serde(default)]
        usage: Option<MessageUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    usage: Option<MessageUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    stop_sequence: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

fn finish_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        _ => FinishReason::Other,
    }
}

fn map_event(
    state: &mut ProviderState,
    event: serde_json::Value,
) -> Result<Vec<RawEvent>, StreamError> {
    let event: StreamingEvent = serde_json::from_value(event)?;

    let events = match event {
        StreamingEvent::MessageStart { message } => {
            if let Some(usage) = message.usage {
                state.usage.prompt_tokens = usage.input_tokens.unwrap_or_default();
                state.usage.completion_tokens = usage.output_tokens.unwrap_or_default();
            }
            vec![]
        }
        StreamingEvent::ContentBlockStart {
            index,
            content_block,
        } => match content_block {
            ContentBlock::Text { text } => {
                state.blocks.insert(index, BlockKind::Text);
                if text.is_empty() {
                    vec![]
                } else {
                    vec![RawEvent::Text(text)]
                }
            }
            ContentBlock::ToolUse { id, name } => {
                state.blocks.insert(index, BlockKind::ToolUse);
                vec![RawEvent::ToolCallDelta {
                    index,
                    id: Some(id),
                    name: Some(name),
                    fragment: String::new(),
                }]
            }
            ContentBlock::Other => {
                state.blocks.insert(index, BlockKind::Other);
                vec![]
            }
        },
        StreamingEvent::ContentBlockDelta { index, delta } => match delta {
            ContentDelta::TextDelta { text } if !text.is_empty() => vec![RawEvent::Text(text)],
            ContentDelta::InputJsonDelta { partial_json } => {
                vec![RawEvent::tool_call_fragment(index, partial_json)]
            }
            _ => vec![],
        },
        StreamingEvent::ContentBlockStop { index } => match state.blocks.remove(&index) {
            Some(BlockKind::ToolUse) => vec![RawEvent::ToolCallDone { index }],
            _ => vec![],
        },
        StreamingEvent::MessageDelta { delta, usage } => {
            if let Some(reason) = delta.stop_reason {
                state.finish_reason = Some(finish_reason(&reason));
            }
            state.stop_sequence = delta.stop_sequence;
            if let Some(usage) = usage {
                // counts are cumulative, so each one replaces the last
                if let Some(input_tokens) = usage.input_tokens {
                    state.usage.prompt_tokens = input_tokens;
                }
                if let Some(output_tokens) = usage.output_tokens {
                    state.usage.completion_tokens = output_tokens;
                }
            }
            vec![]
        }
        StreamingEvent::MessageStop | StreamingEvent::Ping => vec![],
        StreamingEvent::Error { error } => {
            return Err(StreamError::Provider(format!(
                "{}: {}",
                error.kind, error.message
            )));
        }
        StreamingEvent::Unknown => {
            tracing::debug!(target: "canon::providers", "Ignoring unknown event type");
            vec![]
        }
    };

    Ok(events)
}
