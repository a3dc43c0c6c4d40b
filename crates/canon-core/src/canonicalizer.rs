//! The synchronous heart of a canonical stream.
//!
//! Frames go in, canonical parts come out. Provider events pass through the
//! text buffer and the tool-call assemblers here, and this is the one place
//! that decides when the stream ends and with which terminal part. Async
//! plumbing lives in [crate::streaming].

use crate::decoders::Frame;
use crate::error::StreamError;
use crate::id::IdGenerator;
use crate::markup::{MarkupAssembler, STOP_SEQUENCE, Segment};
use crate::part::{CanonicalPart, FinishReason, ToolCall};
use crate::providers::{ProviderKind, ProviderSpec, ProviderState, RawEvent};
use crate::text_buffer::TextBuffer;
use crate::tool::{ToolDefinition, ToolMode};
use crate::tool_call::ToolCallAssembler;

pub struct Canonicalizer {
    provider: &'static ProviderSpec,
    state: ProviderState,
    text_buffer: TextBuffer,
    tool_calls: ToolCallAssembler,
    markup: Option<MarkupAssembler>,
    markup_calls: usize,
    ids: Box<dyn IdGenerator>,
    done: bool,
}

impl std::fmt::Debug for Canonicalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canonicalizer")
            .field("provider", &self.provider.name)
            .field("state", &self.state)
            .field("markup_calls", &self.markup_calls)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl Canonicalizer {
    pub fn new(
        provider: ProviderKind,
        tool_mode: ToolMode,
        tools: Vec<ToolDefinition>,
        ids: Box<dyn IdGenerator>,
    ) -> Self {
        let markup = match tool_mode {
            ToolMode::Native => None,
            ToolMode::Embedded => Some(MarkupAssembler::new(tools)),
        };

        Self {
            provider: provider.spec(),
            state: ProviderState::new(),
            text_buffer: TextBuffer::new(),
            tool_calls: ToolCallAssembler::new(),
            markup,
            markup_calls: 0,
            ids,
            done: false,
        }
    }

    /// Whether a terminal part has been produced. Nothing follows it.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds one decoded frame, or the error that replaced it.
    pub fn frame(&mut self, frame: Result<Frame, StreamError>) -> Vec<CanonicalPart> {
        let mut parts = Vec::new();
        if self.done {
            return parts;
        }

        match frame {
            Ok(Frame::Payload(payload)) => {
                match (self.provider.map_event)(&mut self.state, payload) {
                    Ok(events) => {
                        for event in events {
                            if let Err(error) = self.on_event(event, &mut parts) {
                                self.fail(error, &mut parts);
                                break;
                            }
                        }
                    }
                    Err(error) => self.fail(error, &mut parts),
                }
            }
            Ok(Frame::End) => self.finish(&mut parts),
            Err(error) => self.fail(error, &mut parts),
        }

        parts
    }

    /// The byte source ran out. Without a terminator this is still a normal
    /// end, with whatever finish reason and usage were seen.
    pub fn end_of_input(&mut self) -> Vec<CanonicalPart> {
        let mut parts = Vec::new();
        if !self.done {
            tracing::debug!(
                target: "canon::streaming",
                provider = self.provider.name,
                "Byte source ended without a terminator"
            );
            self.finish(&mut parts);
        }
        parts
    }

    fn on_event(
        &mut self,
        event: RawEvent,
        parts: &mut Vec<CanonicalPart>,
    ) -> Result<(), StreamError> {
        match event {
            RawEvent::Text(text) => self.on_text(text, parts)?,
            RawEvent::ToolCallDelta {
                index,
                id,
                name,
                fragment,
            } => {
                self.tool_calls.push(index, id, name, &fragment);
                if !fragment.is_empty() {
                    self.emit(CanonicalPart::tool_call_delta(index, fragment), parts);
                }
            }
            RawEvent::ToolCallDone { index } => {
                if let Some(call) = self.tool_calls.complete(index, self.ids.as_mut())? {
                    self.emit(CanonicalPart::ToolCall(call), parts);
                }
            }
            RawEvent::ToolCallsDone => {
                for call in self.tool_calls.complete_all(self.ids.as_mut())? {
                    self.emit(CanonicalPart::ToolCall(call), parts);
                }
            }
        }

        Ok(())
    }

    fn on_text(&mut self, text: String, parts: &mut Vec<CanonicalPart>) -> Result<(), StreamError> {
        let Some(markup) = self.markup.as_mut() else {
            self.push_text(text, parts);
            return Ok(());
        };

        for segment in markup.push(&text) {
            match segment {
                Segment::Text(text) => self.push_text(text, parts),
                Segment::Block(body) => self.on_block(&body, parts)?,
            }
        }

        Ok(())
    }

    fn on_block(&mut self, body: &str, parts: &mut Vec<CanonicalPart>) -> Result<(), StreamError> {
        let Some(markup) = self.markup.as_ref() else {
            return Ok(());
        };

        for call in markup.extract(body)? {
            let id = self.tool_calls.next_id(self.ids.as_mut());
            self.markup_calls += 1;
            self.emit(
                CanonicalPart::ToolCall(ToolCall::new(id, call.name, call.args_json)),
                parts,
            );
        }

        Ok(())
    }

    fn push_text(&mut self, text: String, parts: &mut Vec<CanonicalPart>) {
        parts.extend(self.text_buffer.push(text).into_iter().map(CanonicalPart::text));
    }

    /// Emits a non-text part. Held text comes first, since it preceded the
    /// part in the provider's output.
    fn emit(&mut self, part: CanonicalPart, parts: &mut Vec<CanonicalPart>) {
        parts.extend(self.text_buffer.release().into_iter().map(CanonicalPart::text));
        parts.push(part);
    }

    /// Completes everything still open before the terminal part.
    fn close(&mut self, parts: &mut Vec<CanonicalPart>) -> Result<(), StreamError> {
        if self.tool_calls.has_pending() {
            tracing::debug!(
                target: "canon::streaming",
                provider = self.provider.name,
                "Completing tool calls left open at termination"
            );
        }
        for call in self.tool_calls.complete_all(self.ids.as_mut())? {
            self.emit(CanonicalPart::ToolCall(call), parts);
        }

        let Some(markup) = self.markup.as_mut() else {
            return Ok(());
        };
        let remainder = markup.finish();
        let opened = markup.has_opened_block();

        if let Some(text) = remainder.text {
            self.push_text(text, parts);
        }

        let stopped_at_tag = self.state.stop_sequence.as_deref() == Some(STOP_SEQUENCE);
        match remainder.open_block {
            Some(body) => {
                let complete = stopped_at_tag
                    || (!self.provider.reports_stop_sequence
                        && self.state.finish_reason == Some(FinishReason::Stop));
                if !complete {
                    return Err(StreamError::ToolParse(
                        "unterminated <function_calls> block".into(),
                    ));
                }
                self.on_block(&body, parts)?;
            }
            None if stopped_at_tag && !opened => {
                return Err(StreamError::ToolParse(
                    "stopped at </function_calls> without an opening <function_calls>".into(),
                ));
            }
            None => {}
        }

        Ok(())
    }

    fn finish(&mut self, parts: &mut Vec<CanonicalPart>) {
        if let Err(error) = self.close(parts) {
            self.fail(error, parts);
            return;
        }

        parts.extend(self.text_buffer.finish().map(CanonicalPart::text));

        let reason = if self.markup_calls > 0 {
            FinishReason::ToolCalls
        } else {
            self.state.finish_reason()
        };
        tracing::debug!(
            target: "canon::streaming",
            provider = self.provider.name,
            %reason,
            prompt_tokens = self.state.usage.prompt_tokens,
            completion_tokens = self.state.usage.completion_tokens,
            total_tokens = self.state.usage.total_tokens(),
            "Stream finished"
        );

        parts.push(CanonicalPart::finish(reason, self.state.usage));
        self.done = true;
    }

    fn fail(&mut self, error: StreamError, parts: &mut Vec<CanonicalPart>) {
        tracing::warn!(
            target: "canon::streaming",
            provider = self.provider.name,
            %error,
            "Stream failed"
        );

        parts.extend(self.text_buffer.finish().map(CanonicalPart::text));
        parts.push(CanonicalPart::from(error));
        self.done = true;
    }
}
