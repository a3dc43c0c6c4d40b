#![cfg_attr(docsrs, feature(doc_cfg))]
//! Canon turns a provider's streamed chat response into one
//! provider-agnostic sequence of [CanonicalPart]s: text deltas, tool-call
//! deltas, complete tool calls, and exactly one terminal finish or error.
//!
//! The pipeline is
//!
//! ```text
//! bytes -> frame decoder -> provider event mapper -> text buffer / tool-call assemblers -> CanonicalStream
//! ```
//!
//! and everything in it is pulled by the consumer: nothing is read from the
//! byte source until a part is asked for.
//!
//! # Example
//! ```ignore
//! use canon::{CanonicalStream, ProviderKind, transport};
//! use futures::StreamExt;
//!
//! let response = reqwest::Client::new()
//!     .post("https://api.anthropic.com/v1/messages")
//!     .json(&request)
//!     .send()
//!     .await?;
//!
//! let mut stream = CanonicalStream::builder(ProviderKind::Anthropic)
//!     .build(transport::from_response(response));
//! let aggregate = stream.aggregate();
//!
//! while let Some(part) = stream.next().await {
//!     println!("{part}");
//! }
//!
//! println!("{:?}", aggregate.usage().await?);
//! ```
//!
//! # Tool calls in markup
//! Models without native tool calling can be given [markup::system_prompt]
//! and [markup::STOP_SEQUENCE]; build the stream with
//! [ToolMode::Embedded] and the tools offered, and the markup comes back as
//! ordinary [ToolCall] parts.

pub mod canonicalizer;
pub mod decoders;
pub mod error;
pub mod id;
pub mod markup;
pub mod part;
pub mod providers;
pub mod streaming;
pub mod text_buffer;
pub mod tool;
pub mod tool_call;
pub mod transport;

pub use error::StreamError;
pub use id::{Counter, IdGenerator, NanoId};
pub use part::{CanonicalPart, ErrorKind, FinishReason, ToolCall, Usage};
pub use providers::ProviderKind;
pub use streaming::{
    Aggregate, AggregateError, AggregateHandle, CanonicalStream, Failure, StreamBuilder,
};
pub use tool::{ParameterType, ToolDefinition, ToolMode};
