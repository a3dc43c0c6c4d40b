use super::{OPEN_TAG, STOP_SEQUENCE};

/// A piece of streamed text, split around invocation blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Ordinary text, outside any block.
    Text(String),
    /// The body of a closed `<function_calls>` block, without its tags.
    Block(String),
}

/// What was left over when the text ended.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Remainder {
    /// Held-back text that never became an opening tag.
    pub text: Option<String>,
    /// The body of a block that was opened but never closed.
    pub open_block: Option<String>,
}

/// Splits streamed text into plain text and invocation blocks.
///
/// A suffix that could still grow into the opening tag is held back, so the
/// tag never leaks out as text when it straddles two fragments.
#[derive(Debug, Default)]
pub struct MarkupScanner {
    pending: String,
    in_block: bool,
    blocks_opened: usize,
}

impl MarkupScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of opening tags seen so far.
    pub fn blocks_opened(&self) -> usize {
        self.blocks_opened
    }

    pub fn push(&mut self, text: &str) -> Vec<Segment> {
        self.pending.push_str(text);
        let mut segments = Vec::new();

        loop {
            if self.in_block {
                let Some((body, rest)) = self.pending.split_once(STOP_SEQUENCE) else {
                    break;
                };
                let (body, rest) = (body.to_string(), rest.to_string());
                segments.push(Segment::Block(body));
                self.pending = rest;
                self.in_block = false;
                continue;
            }

            if let Some((before, rest)) = self.pending.split_once(OPEN_TAG) {
                let (before, rest) = (before.to_string(), rest.to_string());
                if !before.is_empty() {
                    segments.push(Segment::Text(before));
                }
                self.pending = rest;
                self.in_block = true;
                self.blocks_opened += 1;
                continue;
            }

            let keep = partial_tag_len(&self.pending);
            let ready_len = self.pending.len() - keep;
            if ready_len > 0 {
                let held = self.pending.split_off(ready_len);
                segments.push(Segment::Text(std::mem::replace(&mut self.pending, held)));
            }
            break;
        }

        segments
    }

    pub fn finish(&mut self) -> Remainder {
        let pending = std::mem::take(&mut self.pending);
        if std::mem::take(&mut self.in_block) {
            Remainder {
                text: None,
                open_block: Some(pending),
            }
        } else {
            Remainder {
                text: (!pending.is_empty()).then_some(pending),
                open_block: None,
            }
        }
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of the
/// opening tag.
fn partial_tag_len(text: &str) -> usize {
    (1..OPEN_TAG.len())
        .rev()
        .find(|&len| {
            OPEN_TAG
                .get(..len)
                .is_some_and(|prefix| text.ends_with(prefix))
        })
        .unwrap_or(0)
}
