//! Messages-style event streams, end to end: bytes in, canonical parts out.

use canon::markup::{self, STOP_SEQUENCE};
use canon::transport::from_chunks;
use canon::{
    CanonicalPart, CanonicalStream, ErrorKind, FinishReason, ProviderKind, ToolCall,
    ToolDefinition, ToolMode, Usage,
};
use serde_json::json;

fn message_start() -> String {
    r#"data: {"type":"message_start","message":{"id":"msg_01KfpJoAEabmH2iHRRFjQMAG","type":"message","role":"assistant","content":[],"model":"claude-3-haiku-20240307","stop_reason":null,"stop_sequence":null,"usage":{"input_tokens":17,"output_tokens":1}}      }

"#
    .to_string()
}

fn text_delta(text: &str) -> String {
    let payload = json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}});
    format!("data: {payload}\n\n")
}

fn text_stream(content: &[&str], stop: serde_json::Value) -> Vec<String> {
    let mut chunks = vec![
        message_start(),
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}          }\n\n".to_string(),
        "data: {\"type\": \"ping\"}\n\n".to_string(),
    ];
    chunks.extend(content.iter().map(|text| text_delta(text)));
    chunks.push("data: {\"type\":\"content_block_stop\",\"index\":0             }\n\n".to_string());
    chunks.push(format!(
        "data: {}\n\n",
        json!({"type": "message_delta", "delta": stop, "usage": {"output_tokens": 227}})
    ));
    chunks.push("data: {\"type\":\"message_stop\"           }\n\n".to_string());
    chunks
}

#[tokio::test]
async fn streams_text_deltas() -> anyhow::Result<()> {
    let chunks = text_stream(
        &["Hello", ", ", "World!"],
        json!({"stop_reason": "end_turn", "stop_sequence": null}),
    );

    let (parts, aggregate) = CanonicalStream::builder(ProviderKind::Anthropic)
        .build(from_chunks(chunks))
        .collect()
        .await;

    assert_eq!(
        parts,
        vec![
            CanonicalPart::text("Hello"),
            CanonicalPart::text(", "),
            CanonicalPart::text("World!"),
            CanonicalPart::finish(FinishReason::Stop, Usage::new(17, 227)),
        ]
    );
    assert_eq!(aggregate.text, "Hello, World!");
    Ok(())
}

#[tokio::test]
async fn same_parts_for_any_chunking() -> anyhow::Result<()> {
    let body = text_stream(
        &["Grüße", " aus ", "Köln", " \n"],
        json!({"stop_reason": "end_turn", "stop_sequence": null}),
    )
    .concat();

    let whole = CanonicalStream::builder(ProviderKind::Anthropic)
        .build(from_chunks(vec![body.clone()]))
        .collect()
        .await
        .0;
    let bytewise: Vec<bytes::Bytes> = body
        .as_bytes()
        .chunks(1)
        .map(bytes::Bytes::copy_from_slice)
        .collect();
    let split = CanonicalStream::builder(ProviderKind::Anthropic)
        .build(from_chunks(bytewise))
        .collect()
        .await
        .0;

    assert_eq!(whole, split);
    assert_eq!(
        whole.last(),
        Some(&CanonicalPart::finish(FinishReason::Stop, Usage::new(17, 227)))
    );
    let text: String = whole
        .iter()
        .filter_map(|part| match part {
            CanonicalPart::TextDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Grüße aus Köln");
    Ok(())
}

#[tokio::test]
async fn truncated_final_frame_is_a_parse_error() -> anyhow::Result<()> {
    let chunks = vec![
        message_start(),
        text_delta("Hello"),
        r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_01","na"#.to_string(),
    ];

    let (parts, aggregate) = CanonicalStream::builder(ProviderKind::Anthropic)
        .build(from_chunks(chunks))
        .collect()
        .await;

    assert_eq!(parts.len(), 2);
    assert_eq!(parts.first(), Some(&CanonicalPart::text("Hello")));
    assert!(matches!(
        parts.last(),
        Some(CanonicalPart::Error { kind: ErrorKind::ParseError, .. })
    ));
    assert!(aggregate.tool_calls.is_empty());
    assert_eq!(aggregate.finish_reason, FinishReason::Error);
    Ok(())
}

#[tokio::test]
async fn assembles_native_tool_use() -> anyhow::Result<()> {
    let chunks = vec![
        message_start(),
        text_delta("Checking the weather."),
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n".to_string(),
        "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_01T1x1fJ34qAmk2tNTrN7Up6\",\"name\":\"get_weather\",\"input\":{}}}\n\n".to_string(),
        "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\"}}\n\n".to_string(),
        "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"location\\\": \\\"San Fra\"}}\n\n".to_string(),
        "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"ncisco, CA\\\"}\"}}\n\n".to_string(),
        "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n".to_string(),
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\",\"stop_sequence\":null},\"usage\":{\"output_tokens\":89}}\n\n".to_string(),
        "data: {\"type\":\"message_stop\"}\n\n".to_string(),
    ];

    let (parts, aggregate) = CanonicalStream::builder(ProviderKind::Anthropic)
        .build(from_chunks(chunks))
        .collect()
        .await;

    let tool_call = ToolCall::new(
        "toolu_01T1x1fJ34qAmk2tNTrN7Up6",
        "get_weather",
        "{\"location\": \"San Francisco, CA\"}",
    );
    assert_eq!(
        parts,
        vec![
            CanonicalPart::text("Checking the weather."),
            CanonicalPart::tool_call_delta(1, "{\"location\": \"San Fra"),
            CanonicalPart::tool_call_delta(1, "ncisco, CA\"}"),
            CanonicalPart::ToolCall(tool_call.clone()),
            CanonicalPart::finish(FinishReason::ToolCalls, Usage::new(17, 89)),
        ]
    );
    assert_eq!(aggregate.tool_calls, vec![tool_call]);
    assert_eq!(
        aggregate.tool_calls.first().map(|call| call.arguments().ok()),
        Some(Some(json!({"location": "San Francisco, CA"})))
    );
    Ok(())
}

#[tokio::test]
async fn extracts_embedded_tool_calls() -> anyhow::Result<()> {
    let tool = ToolDefinition::new(
        "test-tool",
        json!({
            "type": "object",
            "properties": { "value": { "type": "string" } },
            "required": ["value"],
            "additionalProperties": false,
            "$schema": "http://json-schema.org/draft-07/schema#"
        }),
    );
    assert!(markup::system_prompt(std::slice::from_ref(&tool)).contains("<name>value</name>"));

    let chunks = text_stream(
        &[
            "Some text\n\n",
            "<function_calls>\n<invoke>\n",
            "<tool_name>test-tool</tool_name>\n",
            "<parameters>\n<value>example value</value>\n</parameters>\n",
            "</invoke>\n",
        ],
        json!({"stop_reason": "stop_sequence", "stop_sequence": STOP_SEQUENCE}),
    );

    let stream = CanonicalStream::builder(ProviderKind::Anthropic)
        .tools([tool])
        .tool_mode(ToolMode::Embedded)
        .build(from_chunks(chunks));
    let handle = stream.aggregate();
    let (parts, _) = stream.collect().await;

    assert_eq!(
        parts,
        vec![
            CanonicalPart::text("Some text\n\n"),
            CanonicalPart::ToolCall(ToolCall::new(
                "0",
                "test-tool",
                "{\"value\":\"example value\"}"
            )),
            CanonicalPart::finish(FinishReason::ToolCalls, Usage::new(17, 227)),
        ]
    );
    assert_eq!(handle.text().await?, "Some text\n\n");
    assert_eq!(handle.finish_reason().await?, FinishReason::ToolCalls);
    Ok(())
}

#[tokio::test]
async fn embedded_values_are_plain_text_in_schema_order() -> anyhow::Result<()> {
    let tool = ToolDefinition::new(
        "search",
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer" }
            },
            "required": ["query"]
        }),
    );
    let prompt = markup::system_prompt(std::slice::from_ref(&tool));
    let query_at = prompt.find("<name>query</name>");
    let limit_at = prompt.find("<name>limit</name>");
    assert!(query_at.is_some() && query_at < limit_at);

    let chunks = text_stream(
        &[
            "Searching.",
            "<function_calls>\n<invoke>\n<tool_name>search</tool_name>\n<parameters>\n",
            "<query>AT&T fees where 1 <",
            " 2</query>\n<limit>3</limit>\n</parameters>\n</invoke>\n",
        ],
        json!({"stop_reason": "stop_sequence", "stop_sequence": STOP_SEQUENCE}),
    );

    let (parts, aggregate) = CanonicalStream::builder(ProviderKind::Anthropic)
        .tools([tool])
        .tool_mode(ToolMode::Embedded)
        .build(from_chunks(chunks))
        .collect()
        .await;

    assert_eq!(
        parts,
        vec![
            CanonicalPart::text("Searching."),
            CanonicalPart::ToolCall(ToolCall::new(
                "0",
                "search",
                r#"{"query":"AT&T fees where 1 < 2","limit":3}"#
            )),
            CanonicalPart::finish(FinishReason::ToolCalls, Usage::new(17, 227)),
        ]
    );
    assert!(aggregate.error.is_none());
    Ok(())
}

#[tokio::test]
async fn overloaded_error_event() -> anyhow::Result<()> {
    let chunks = vec![
        message_start(),
        "event: error\ndata: {\"type\": \"error\", \"error\": {\"type\": \"overloaded_error\", \"message\": \"Overloaded\"}}\n\n".to_string(),
    ];

    let (parts, _) = CanonicalStream::builder(ProviderKind::Anthropic)
        .build(from_chunks(chunks))
        .collect()
        .await;

    assert_eq!(
        parts,
        vec![CanonicalPart::Error {
            kind: ErrorKind::ProviderError,
            cause: "ProviderError: overloaded_error: Overloaded".into(),
        }]
    );
    Ok(())
}
