//! Frame decoding: raw response bytes to provider-native JSON payloads.

pub mod line;
pub mod sse;

pub use line::LineDecoder;
pub use sse::{Frame, FrameDecoder, ServerSentEvent, SseDecoder, Terminator, decode_frames};
