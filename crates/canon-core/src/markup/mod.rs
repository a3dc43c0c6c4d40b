//! Tool calling through embedded markup, for models without native tool
//! calls.
//!
//! The request carries [system_prompt] and stops at [STOP_SEQUENCE]. The
//! model then answers with ordinary text, optionally followed by a block like
//!
//! ```text
//! <function_calls>
//! <invoke>
//! <tool_name>test-tool</tool_name>
//! <parameters>
//! <value>example value</value>
//! </parameters>
//! </invoke>
//! </function_calls>
//! ```
//!
//! whose closing tag is usually swallowed by the stop sequence. Text before
//! the block stays text; the block itself becomes tool calls.

pub mod parser;
pub mod prompt;
pub mod scanner;

pub use parser::{Invocation, MarkupError, parse_block};
pub use prompt::system_prompt;
pub use scanner::{MarkupScanner, Remainder, Segment};

use crate::error::StreamError;
use crate::tool::ToolDefinition;

/// Opening tag of an invocation block.
pub const OPEN_TAG: &str = "<function_calls>";

/// Closing tag of an invocation block. Requests should stop generation here.
pub const STOP_SEQUENCE: &str = "</function_calls>";

/// A tool call extracted from markup, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCall {
    pub name: String,
    pub args_json: String,
}

/// Scans streamed text for invocation blocks and turns closed blocks into
/// tool calls, checked against the caller's tool definitions.
#[derive(Debug, Default)]
pub struct MarkupAssembler {
    scanner: MarkupScanner,
    tools: Vec<ToolDefinition>,
}

impl MarkupAssembler {
    pub fn new(tools: Vec<ToolDefinition>) -> Self {
        Self {
            scanner: MarkupScanner::new(),
            tools,
        }
    }

    pub fn push(&mut self, text: &str) -> Vec<Segment> {
        self.scanner.push(text)
    }

    pub fn finish(&mut self) -> Remainder {
        self.scanner.finish()
    }

    /// Whether an opening tag has been seen at any point in the stream.
    pub fn has_opened_block(&self) -> bool {
        self.scanner.blocks_opened() > 0
    }

    /// Parses one block body into calls. Fails as a whole: a block never
    /// yields some of its calls and an error.
    pub fn extract(&self, body: &str) -> Result<Vec<ExtractedCall>, StreamError> {
        let invocations = parse_block(body)?;
        invocations
            .iter()
            .map(|invocation| -> Result<ExtractedCall, StreamError> {
                Ok(ExtractedCall {
                    name: invocation.tool_name.clone(),
                    args_json: invocation.to_args_json(&self.tools)?,
                })
            })
            .collect()
    }
}

impl From<MarkupError> for StreamError {
    fn from(error: MarkupError) -> Self {
        StreamError::ToolParse(error.to_string())
    }
}
