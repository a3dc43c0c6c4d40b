use thiserror::Error;

use crate::part::ErrorKind;

/// Boxed error coming out of a byte source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can end a canonical stream early.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A frame payload was not valid JSON, or not an event the provider
    /// mapper understands
    #[error("ParseError: {0}")]
    Parse(String),

    /// The accumulated arguments for a tool call did not form valid JSON
    /// when the provider signalled completion
    #[error("IncompleteToolCall: tool call #{index}: {cause}")]
    IncompleteToolCall { index: usize, cause: String },

    /// An embedded-markup tool block could not be turned into a tool call
    #[error("ToolParseError: {0}")]
    ToolParse(String),

    /// The byte source failed (connection reset, timeout, ...)
    #[error("TransportError: {0}")]
    Transport(#[source] BoxError),

    /// The provider reported an error inside the stream
    #[error("ProviderError: {0}")]
    Provider(String),
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::Parse(_) => ErrorKind::ParseError,
            StreamError::IncompleteToolCall { .. } => ErrorKind::IncompleteToolCall,
            StreamError::ToolParse(_) => ErrorKind::ToolParseError,
            StreamError::Transport(_) => ErrorKind::TransportError,
            StreamError::Provider(_) => ErrorKind::ProviderError,
        }
    }

    pub fn transport(error: impl Into<BoxError>) -> Self {
        StreamError::Transport(error.into())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(error: serde_json::Error) -> Self {
        StreamError::Parse(error.to_string())
    }
}
