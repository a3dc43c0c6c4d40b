use super::line::LineDecoder;
use crate::error::StreamError;
use crate::transport::ByteStream;
use futures::{Stream, StreamExt};

/// Server-Sent Event with its optional event name and joined data lines
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSentEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Turns SSE lines into events; a blank line closes the current event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    data: Vec<String>,
    event: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a line of SSE text, returning an event if it completed one
    pub fn decode(&mut self, line: &str) -> Option<ServerSentEvent> {
        if line.is_empty() {
            if self.event.is_none() && self.data.is_empty() {
                return None;
            }

            return Some(ServerSentEvent {
                event: self.event.take(),
                data: std::mem::take(&mut self.data).join("\n"),
            });
        }

        // comment
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }

        None
    }

    /// Closes an event left open by a missing final blank line.
    pub fn flush(&mut self) -> Option<ServerSentEvent> {
        self.decode("")
    }
}

/// How a provider marks the end of its event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// A literal data line, e.g. `[DONE]`. Not a JSON payload itself.
    Sentinel(&'static str),
    /// A structured event whose `type` (or SSE event name) matches. The event
    /// is still delivered before decoding stops.
    Event(&'static str),
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Payload(serde_json::Value),
    /// The provider's terminator was seen; nothing after it is decoded.
    End,
}

/// Synchronous core of the frame decoder: bytes in, frames out.
#[derive(Debug)]
pub struct FrameDecoder {
    lines: LineDecoder,
    events: SseDecoder,
    terminator: Terminator,
    done: bool,
}

impl FrameDecoder {
    pub fn new(terminator: Terminator) -> Self {
        Self {
            lines: LineDecoder::new(),
            events: SseDecoder::new(),
            terminator,
            done: false,
        }
    }

    /// Whether the terminator (or a malformed frame) has ended decoding.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Frame, StreamError>> {
        let mut frames = Vec::new();
        if self.done {
            tracing::debug!(
                target: "canon::decoders",
                bytes = chunk.len(),
                "Ignoring bytes after end of stream"
            );
            return frames;
        }

        for line in self.lines.decode(chunk) {
            if let Some(event) = self.events.decode(&line) {
                self.accept(event, &mut frames);
            }
            if self.done {
                break;
            }
        }

        frames
    }

    /// Called at end of input: a trailing frame without its blank line is
    /// still decoded, so a truncated payload surfaces as a parse error.
    pub fn finish(&mut self) -> Vec<Result<Frame, StreamError>> {
        let mut frames = Vec::new();
        if self.done {
            return frames;
        }

        if let Some(line) = self.lines.flush()
            && let Some(event) = self.events.decode(&line)
        {
            self.accept(event, &mut frames);
        }
        if !self.done
            && let Some(event) = self.events.flush()
        {
            self.accept(event, &mut frames);
        }

        frames
    }

    fn accept(&mut self, event: ServerSentEvent, frames: &mut Vec<Result<Frame, StreamError>>) {
        if self.done {
            return;
        }

        let data = event.data.trim();
        if data.is_empty() {
            return;
        }

        tracing::trace!(target: "canon::decoders", event = ?event.event, data, "SSE frame");

        if let Terminator::Sentinel(sentinel) = self.terminator
            && data == sentinel
        {
            self.done = true;
            frames.push(Ok(Frame::End));
            return;
        }

        let payload = match serde_json::from_str::<serde_json::Value>(data) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(target: "canon::decoders", %error, data, "Malformed frame payload");
                self.done = true;
                frames.push(Err(StreamError::from(error)));
                return;
            }
        };

        let is_stop_event = match self.terminator {
            Terminator::Event(stop) => {
                event.event.as_deref() == Some(stop)
                    || payload.get("type").and_then(serde_json::Value::as_str) == Some(stop)
            }
            Terminator::Sentinel(_) => false,
        };

        frames.push(Ok(Frame::Payload(payload)));
        if is_stop_event {
            self.done = true;
            frames.push(Ok(Frame::End));
        }
    }
}

/// Decodes a byte source into frames, lazily: a chunk is only read when the
/// consumer asks for a frame the buffered bytes cannot supply.
///
/// Decoding stops after the terminator, after a malformed payload, and after
/// a transport error; remaining bytes are never read.
pub fn decode_frames(
    mut source: ByteStream,
    terminator: Terminator,
) -> impl Stream<Item = Result<Frame, StreamError>> + Send {
    async_stream::stream! {
        let mut decoder = FrameDecoder::new(terminator);

        while let Some(chunk) = source.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    yield Err(StreamError::Transport(error));
                    return;
                }
            };

            for frame in decoder.push(&chunk) {
                yield frame;
            }

            if decoder.is_done() {
                return;
            }
        }

        for frame in decoder.finish() {
            yield frame;
        }
    }
}
