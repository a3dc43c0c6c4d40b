//! The canonical stream: a lazy, single-pass sequence of [CanonicalPart]s
//! plus aggregate results derived from exactly the parts it yields.
//!
//! ```ignore
//! let mut stream = CanonicalStream::builder(ProviderKind::Anthropic)
//!     .build(transport::from_response(response));
//! let aggregate = stream.aggregate();
//!
//! while let Some(part) = stream.next().await {
//!     print!("{part}");
//! }
//! let usage = aggregate.usage().await?;
//! ```

use bytes::Bytes;
use futures::stream::{AbortHandle, Abortable};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::watch;
use tracing::info_span;
use tracing_futures::Instrument;

use crate::canonicalizer::Canonicalizer;
use crate::decoders::decode_frames;
use crate::error::BoxError;
use crate::id::{Counter, IdGenerator};
use crate::part::{CanonicalPart, ErrorKind, FinishReason, ToolCall, Usage};
use crate::providers::ProviderKind;
use crate::tool::{ToolDefinition, ToolMode};
use crate::transport;

/// Boxed stream of canonical parts, before cancellation and aggregation are
/// layered on.
pub type PartStream = Pin<Box<dyn Stream<Item = CanonicalPart> + Send>>;

/// Configures one canonical stream.
pub struct StreamBuilder {
    provider: ProviderKind,
    tools: Vec<ToolDefinition>,
    tool_mode: ToolMode,
    id_generator: Box<dyn IdGenerator>,
}

impl StreamBuilder {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            tools: Vec::new(),
            tool_mode: ToolMode::default(),
            id_generator: Box::new(Counter::new()),
        }
    }

    /// Tools the request offered. Only embedded-markup tool calling needs
    /// them.
    pub fn tools(mut self, tools: impl IntoIterator<Item = ToolDefinition>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn tool_mode(mut self, tool_mode: ToolMode) -> Self {
        self.tool_mode = tool_mode;
        self
    }

    /// Replaces the default per-stream [Counter].
    pub fn id_generator(mut self, id_generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// Wraps one response body. Nothing is read until the stream is polled.
    pub fn build<S, B, E>(self, source: S) -> CanonicalStream
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: Into<Bytes>,
        E: Into<BoxError>,
    {
        let source = transport::from_stream(source);
        let provider = self.provider.spec();
        let span = info_span!(
            target: "canon::streaming",
            "canonical_stream",
            provider = provider.name,
            canon.finish_reason = tracing::field::Empty,
            canon.usage.prompt_tokens = tracing::field::Empty,
            canon.usage.completion_tokens = tracing::field::Empty,
            canon.usage.total_tokens = tracing::field::Empty,
        );

        let mut canonicalizer = Canonicalizer::new(
            self.provider,
            self.tool_mode,
            self.tools,
            self.id_generator,
        );

        let parts = async_stream::stream! {
            let span = tracing::Span::current();
            let mut frames = std::pin::pin!(decode_frames(source, provider.terminator));

            while !canonicalizer.is_done() {
                let parts = match frames.next().await {
                    Some(frame) => canonicalizer.frame(frame),
                    None => canonicalizer.end_of_input(),
                };

                for part in parts {
                    if let CanonicalPart::Finish { reason, usage } = &part {
                        span.record("canon.finish_reason", tracing::field::display(reason));
                        span.record("canon.usage.prompt_tokens", usage.prompt_tokens);
                        span.record("canon.usage.completion_tokens", usage.completion_tokens);
                        span.record("canon.usage.total_tokens", usage.total_tokens());
                    }
                    yield part;
                }
            }
        }
        .instrument(span);

        CanonicalStream::new(Box::pin(parts))
    }
}

/// A failed stream's terminal error, as seen by the aggregates.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub cause: String,
}

/// Everything a finished stream produced, folded together.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Aggregate {
    /// All text deltas, concatenated in order.
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// `error` when the stream ended with an error part.
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub error: Option<Failure>,
}

impl Aggregate {
    fn record(&mut self, part: &CanonicalPart) {
        match part {
            CanonicalPart::TextDelta { text } => self.text.push_str(text),
            CanonicalPart::ToolCallDelta { .. } => {}
            CanonicalPart::ToolCall(tool_call) => self.tool_calls.push(tool_call.clone()),
            CanonicalPart::Finish { reason, usage } => {
                self.finish_reason = *reason;
                self.usage = *usage;
            }
            CanonicalPart::Error { kind, cause } => {
                self.finish_reason = FinishReason::Error;
                self.error = Some(Failure {
                    kind: *kind,
                    cause: cause.clone(),
                });
            }
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum AggregateError {
    #[error("the stream was cancelled before its terminal part")]
    Cancelled,
}

#[derive(Debug, Clone)]
enum AggregateState {
    Pending,
    Ready(Arc<Aggregate>),
    Cancelled,
}

/// Resolves once the stream's terminal part has been yielded. Cheap to clone
/// and usable from other tasks.
#[derive(Debug, Clone)]
pub struct AggregateHandle {
    receiver: watch::Receiver<AggregateState>,
}

impl AggregateHandle {
    /// The whole aggregate.
    pub async fn wait(&self) -> Result<Arc<Aggregate>, AggregateError> {
        let mut receiver = self.receiver.clone();
        let state = receiver
            .wait_for(|state| !matches!(state, AggregateState::Pending))
            .await
            .map_err(|_| AggregateError::Cancelled)?;

        match &*state {
            AggregateState::Ready(aggregate) => Ok(Arc::clone(aggregate)),
            AggregateState::Pending | AggregateState::Cancelled => Err(AggregateError::Cancelled),
        }
    }

    pub async fn text(&self) -> Result<String, AggregateError> {
        Ok(self.wait().await?.text.clone())
    }

    pub async fn tool_calls(&self) -> Result<Vec<ToolCall>, AggregateError> {
        Ok(self.wait().await?.tool_calls.clone())
    }

    pub async fn finish_reason(&self) -> Result<FinishReason, AggregateError> {
        Ok(self.wait().await?.finish_reason)
    }

    pub async fn usage(&self) -> Result<Usage, AggregateError> {
        Ok(self.wait().await?.usage)
    }
}

/// Canonical parts of one provider response.
///
/// Pull-based: each poll does at most the work needed for the next part, and
/// the byte source is only read when buffered frames run out. Exactly one
/// terminal part ([CanonicalPart::Finish] or [CanonicalPart::Error]) ends the
/// stream unless it is cancelled first.
pub struct CanonicalStream {
    inner: Option<Abortable<PartStream>>,
    abort_handle: AbortHandle,
    aggregate: Aggregate,
    aggregate_tx: watch::Sender<AggregateState>,
}

impl std::fmt::Debug for CanonicalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanonicalStream")
            .field("finished", &self.is_finished())
            .field("aggregate", &self.aggregate)
            .finish_non_exhaustive()
    }
}

impl CanonicalStream {
    pub fn builder(provider: ProviderKind) -> StreamBuilder {
        StreamBuilder::new(provider)
    }

    /// Wraps an already canonical part stream, adding cancellation and
    /// aggregation.
    pub fn new(parts: PartStream) -> Self {
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let (aggregate_tx, _) = watch::channel(AggregateState::Pending);

        Self {
            inner: Some(Abortable::new(parts, abort_registration)),
            abort_handle,
            aggregate: Aggregate::default(),
            aggregate_tx,
        }
    }

    /// Whether the stream has ended, by terminal part or cancellation.
    pub fn is_finished(&self) -> bool {
        self.inner.is_none()
    }

    pub fn aggregate(&self) -> AggregateHandle {
        AggregateHandle {
            receiver: self.aggregate_tx.subscribe(),
        }
    }

    /// A handle that cancels this stream from anywhere. The stream notices on
    /// its next poll.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Stops the stream now. The byte source is dropped, which closes the
    /// underlying connection instead of draining it.
    pub fn cancel(&mut self) {
        self.abort_handle.abort();
        if self.inner.take().is_some() {
            tracing::debug!(target: "canon::streaming", "Stream cancelled");
        }
        self.publish_cancelled();
    }

    /// Drains the stream, returning every part and the final aggregate.
    pub async fn collect(mut self) -> (Vec<CanonicalPart>, Aggregate) {
        let mut parts = Vec::new();
        while let Some(part) = self.next().await {
            parts.push(part);
        }
        (parts, std::mem::take(&mut self.aggregate))
    }

    fn publish_cancelled(&self) {
        self.aggregate_tx.send_if_modified(|state| {
            if matches!(state, AggregateState::Pending) {
                *state = AggregateState::Cancelled;
                true
            } else {
                false
            }
        });
    }
}

impl Stream for CanonicalStream {
    type Item = CanonicalPart;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let stream = self.get_mut();
        let Some(inner) = stream.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                // only cancellation ends the inner stream without a terminal part
                tracing::debug!(target: "canon::streaming", "Stream cancelled");
                stream.inner = None;
                stream.publish_cancelled();
                Poll::Ready(None)
            }
            Poll::Ready(Some(part)) => {
                stream.aggregate.record(&part);
                if part.is_terminal() {
                    stream.inner = None;
                    stream
                        .aggregate_tx
                        .send_replace(AggregateState::Ready(Arc::new(stream.aggregate.clone())));
                }
                Poll::Ready(Some(part))
            }
        }
    }
}
