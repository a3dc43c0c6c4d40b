//! Tool-call identifier generation.
//!
//! Every stream owns its own generator, so ids are unique within a stream and
//! reproducible under test. There is no process-wide counter.

/// Produces identifiers for tool calls that arrive without a provider id.
pub trait IdGenerator: Send {
    fn next_id(&mut self) -> String;
}

impl<F> IdGenerator for F
where
    F: FnMut() -> String + Send,
{
    fn next_id(&mut self) -> String {
        self()
    }
}

/// Counts up from zero: `"0"`, `"1"`, `"2"`, ...
#[derive(Debug, Clone, Default)]
pub struct Counter {
    prefix: String,
    next: u64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends `prefix` to every id, e.g. `"call_0"`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }
}

impl IdGenerator for Counter {
    fn next_id(&mut self) -> String {
        let id = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}

/// Random, url-safe ids for when determinism is not wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NanoId;

impl IdGenerator for NanoId {
    fn next_id(&mut self) -> String {
        nanoid::nanoid!()
    }
}
