//! Stop-sequence-aware text buffering.
//!
//! Providers sometimes flush whitespace as its own chunk right before a stop
//! sequence is recognised. That whitespace belongs to the text only if more
//! text follows, so a fragment ending in whitespace is held back until the
//! next fragment decides its fate. Held fragments are released with their
//! original boundaries; only at termination is the held run trimmed.

/// Holds back a trailing whitespace run until more text (or termination)
/// arrives.
#[derive(Debug, Default)]
pub struct TextBuffer {
    held: Vec<String>,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any text is being held back.
    pub fn is_holding(&self) -> bool {
        !self.held.is_empty()
    }

    /// Accepts one text fragment and returns the fragments that can be
    /// emitted now, in order.
    pub fn push(&mut self, text: String) -> Vec<String> {
        if text.is_empty() {
            return vec![];
        }

        if !text.ends_with(char::is_whitespace) {
            let mut ready = self.release();
            ready.push(text);
            return ready;
        }

        // a pure whitespace fragment extends the held run
        if self.is_holding() && text.trim_end().is_empty() {
            self.held.push(text);
            return vec![];
        }

        let ready = self.release();
        self.held.push(text);
        ready
    }

    /// Releases everything held, unchanged. Used when a non-text part is
    /// about to be emitted.
    pub fn release(&mut self) -> Vec<String> {
        std::mem::take(&mut self.held)
    }

    /// Ends the text: the held run is emitted without its trailing
    /// whitespace, or not at all if nothing else remains.
    pub fn finish(&mut self) -> Option<String> {
        let held = std::mem::take(&mut self.held);
        // only the first held fragment can carry non-whitespace
        let first = held.into_iter().next()?;
        let trimmed = first.trim_end();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(fragments: &[&str]) -> Vec<String> {
        let mut buffer = TextBuffer::new();
        let mut out: Vec<String> = fragments
            .iter()
            .flat_map(|fragment| buffer.push(fragment.to_string()))
            .collect();
        out.extend(buffer.finish());
        out
    }

    #[test]
    fn test_fragments_keep_their_boundaries() {
        assert_eq!(run(&["Hello", ", ", "World!"]), vec!["Hello", ", ", "World!"]);
    }

    #[test]
    fn test_trailing_whitespace_run_is_elided() {
        assert_eq!(run(&["Hello", " world", "\n", "\n"]), vec!["Hello", " world"]);
        assert_eq!(run(&["one two  "]), vec!["one two"]);
        assert_eq!(run(&["done", "   "]), vec!["done"]);
    }

    #[test]
    fn test_only_whitespace() {
        assert!(run(&["  ", "\n"]).is_empty());
    }

    #[test]
    fn test_whitespace_is_kept_when_text_follows() {
        assert_eq!(
            run(&["a ", "\n", "b", "c \n", "d"]),
            vec!["a ", "\n", "b", "c \n", "d"]
        );
    }

    #[test]
    fn test_new_trailing_whitespace_releases_previous_run() {
        let mut buffer = TextBuffer::new();
        assert!(buffer.push("a ".into()).is_empty());
        assert_eq!(buffer.push("b ".into()), vec!["a "]);
        assert!(buffer.is_holding());
        assert_eq!(buffer.finish(), Some("b".into()));
        assert!(!buffer.is_holding());
    }

    #[test]
    fn test_release_is_verbatim() {
        let mut buffer = TextBuffer::new();
        buffer.push("Some text\n".into());
        buffer.push("\n".into());
        assert_eq!(buffer.release(), vec!["Some text\n", "\n"]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_concatenation_property() {
        let fragments = ["The ", "quick", " brown ", "", "fox", " \t", "\n "];
        let emitted = run(&fragments).concat();
        assert_eq!(emitted, fragments.concat().trim_end());
    }
}
