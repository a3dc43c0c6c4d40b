/// Incrementally splits a byte stream into lines.
///
/// Accepts `\n`, `\r` and `\r\n` terminators, including a `\r\n` pair split
/// across two chunks. Bytes are held until a terminator arrives, so multi-byte
/// UTF-8 sequences split across chunks decode intact.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    after_carriage_return: bool,
}

const NEWLINE: u8 = b'\n';
const CARRIAGE: u8 = b'\r';

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk, returning every line it completed.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            match byte {
                NEWLINE if self.after_carriage_return => {
                    // second half of a `\r\n`, the line was already taken
                    self.after_carriage_return = false;
                }
                NEWLINE => lines.push(self.take_line()),
                CARRIAGE => {
                    lines.push(self.take_line());
                    self.after_carriage_return = true;
                }
                _ => {
                    self.after_carriage_return = false;
                    self.buffer.push(byte);
                }
            }
        }

        lines
    }

    /// Returns the unterminated remainder, if any, as a final line.
    pub fn flush(&mut self) -> Option<String> {
        self.after_carriage_return = false;
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.take_line())
    }

    fn take_line(&mut self) -> String {
        let bytes = std::mem::take(&mut self.buffer);
        match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}
