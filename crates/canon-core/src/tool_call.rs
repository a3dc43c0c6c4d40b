//! Tool-call assembly for providers with native, incremental-JSON tool calls.
//!
//! Argument fragments are concatenated per stream-local index in arrival
//! order. Nothing is parsed until the provider says the call is done, since a
//! half-delivered argument string is never valid JSON on its own.

use std::collections::{BTreeMap, HashSet};

use crate::error::StreamError;
use crate::id::IdGenerator;
use crate::part::ToolCall;

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Per-stream fragment table keyed by tool-call index.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    pending: BTreeMap<usize, PendingToolCall>,
    emitted_ids: HashSet<String>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any call is still waiting for its completion signal.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Records one fragment. The id and name are kept from the first fragment
    /// that carries them.
    pub fn push(
        &mut self,
        index: usize,
        id: Option<String>,
        name: Option<String>,
        fragment: &str,
    ) {
        let call = self.pending.entry(index).or_default();

        if call.id.is_none() {
            call.id = id;
        }
        if call.name.is_none() {
            call.name = name;
        }
        call.arguments.push_str(fragment);
    }

    /// Completes the call at `index`. Returns `None` if nothing was pending
    /// there.
    pub fn complete(
        &mut self,
        index: usize,
        ids: &mut dyn IdGenerator,
    ) -> Result<Option<ToolCall>, StreamError> {
        let Some(call) = self.pending.remove(&index) else {
            return Ok(None);
        };
        self.finalize(index, call, ids).map(Some)
    }

    /// Completes every pending call, lowest index first.
    pub fn complete_all(&mut self, ids: &mut dyn IdGenerator) -> Result<Vec<ToolCall>, StreamError> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .map(|(index, call)| self.finalize(index, call, ids))
            .collect()
    }

    fn finalize(
        &mut self,
        index: usize,
        call: PendingToolCall,
        ids: &mut dyn IdGenerator,
    ) -> Result<ToolCall, StreamError> {
        let Some(name) = call.name else {
            return Err(StreamError::IncompleteToolCall {
                index,
                cause: "no tool name was received".into(),
            });
        };

        // tools without parameters may stream no argument fragments at all
        let args_json = if call.arguments.trim().is_empty() {
            "{}".to_string()
        } else {
            call.arguments
        };

        if let Err(error) = serde_json::from_str::<serde::de::IgnoredAny>(&args_json) {
            return Err(StreamError::IncompleteToolCall {
                index,
                cause: error.to_string(),
            });
        }

        let id = match call.id {
            Some(id) if !self.emitted_ids.contains(&id) => id,
            Some(id) => {
                let replacement = self.unique_id(ids);
                tracing::debug!(
                    target: "canon::streaming",
                    duplicate = %id,
                    replacement = %replacement,
                    "Replacing duplicate tool call id"
                );
                replacement
            }
            None => self.unique_id(ids),
        };
        self.emitted_ids.insert(id.clone());

        Ok(ToolCall::new(id, name, args_json))
    }

    fn unique_id(&self, ids: &mut dyn IdGenerator) -> String {
        let id = ids.next_id();
        if !self.emitted_ids.contains(&id) {
            return id;
        }

        // a generator may well produce an id the provider already used
        (1u64..)
            .map(|n| format!("{id}-{n}"))
            .find(|candidate| !self.emitted_ids.contains(candidate))
            .unwrap_or(id)
    }

    /// Issues a fresh id unique within this stream.
    pub fn next_id(&mut self, ids: &mut dyn IdGenerator) -> String {
        let id = self.unique_id(ids);
        self.emitted_ids.insert(id.clone());
        id
    }
}
