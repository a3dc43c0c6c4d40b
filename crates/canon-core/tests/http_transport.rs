//! Reading a real HTTP response body through the reqwest adapter.

use canon::{CanonicalPart, CanonicalStream, FinishReason, ProviderKind, Usage, transport};
use futures::StreamExt;
use httpmock::MockServer;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const RECORDED_STREAM: &str = "\
event: message_start
data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"type\":\"message\",\"role\":\"assistant\",\"content\":[],\"model\":\"claude-3-haiku-20240307\",\"stop_reason\":null,\"stop_sequence\":null,\"usage\":{\"input_tokens\":12,\"output_tokens\":1}}}

event: content_block_start
data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}

event: ping
data: {\"type\": \"ping\"}

event: content_block_delta
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi there\"}}

event: content_block_delta
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"!\"}}

event: content_block_stop
data: {\"type\":\"content_block_stop\",\"index\":0}

event: message_delta
data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\",\"stop_sequence\":null},\"usage\":{\"output_tokens\":6}}

event: message_stop
data: {\"type\":\"message_stop\"}

";

#[tokio::test]
async fn streams_a_recorded_response() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(httpmock::Method::POST).path("/v1/messages");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(RECORDED_STREAM);
        })
        .await;

    let response = reqwest::Client::new()
        .post(server.url("/v1/messages"))
        .body("{}")
        .send()
        .await?;

    let stream = CanonicalStream::builder(ProviderKind::Anthropic)
        .build(transport::from_response(response));
    let handle = stream.aggregate();
    let (parts, _) = stream.collect().await;

    mock.assert_async().await;
    assert_eq!(
        parts,
        vec![
            CanonicalPart::text("Hi there"),
            CanonicalPart::text("!"),
            CanonicalPart::finish(FinishReason::Stop, Usage::new(12, 6)),
        ]
    );
    assert_eq!(handle.usage().await?, Usage::new(12, 6));
    Ok(())
}

#[tokio::test]
async fn cancelling_mid_stream() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(httpmock::Method::GET).path("/stream");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(RECORDED_STREAM);
        })
        .await;

    let response = reqwest::get(server.url("/stream")).await?;
    let mut stream = CanonicalStream::builder(ProviderKind::Anthropic)
        .build(transport::from_response(response));
    let handle = stream.aggregate();

    assert_eq!(stream.next().await, Some(CanonicalPart::text("Hi there")));
    stream.cancel();

    assert!(stream.is_finished());
    assert_eq!(stream.next().await, None);
    assert!(handle.wait().await.is_err());
    Ok(())
}
