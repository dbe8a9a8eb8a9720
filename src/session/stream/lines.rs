//! Line reassembly across arbitrary read boundaries.

/// Accumulates raw bytes and yields complete lines.
///
/// Bytes are kept until a `\n` arrives, so multi-byte UTF-8 sequences split across reads
/// decode intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Append a chunk and drain every line it completes, without line terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(decode(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Take the unterminated remainder at end of input, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode(&rest))
    }
}

fn decode(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_split_across_pushes() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        assert_eq!(buffer.push(b":1}\n\ndata: x"), vec!["data: {\"a\":1}", ""]);
        assert_eq!(buffer.finish().as_deref(), Some("data: x"));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"one\r\ntwo\r\n"), vec!["one", "two"]);
    }

    #[test]
    fn test_utf8_split_mid_character() {
        let bytes = "héllo\n".as_bytes();
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(&bytes[..2]).is_empty());
        assert_eq!(buffer.push(&bytes[2..]), vec!["héllo"]);
    }
}
