//! Line framing for the workflow event stream
//!
//! The endpoint speaks a loose SSE dialect: each message is one line holding a
//! JSON object, sometimes prefixed with `data: `, separated by blank lines.
//! Chunks from the network can split a line (or a UTF-8 sequence) anywhere, so
//! bytes are buffered until a newline arrives.

/// Maximum bytes held while waiting for a newline
pub const MAX_LINE_BUFFER_SIZE: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferOverflow {
    pub size: usize,
}

/// Accumulates chunks and yields complete event payloads
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the payloads of every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, BufferOverflow> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(payload) = payload_of(&String::from_utf8_lossy(&line)) {
                payloads.push(payload);
            }
        }

        if self.buffer.len() > MAX_LINE_BUFFER_SIZE {
            return Err(BufferOverflow {
                size: self.buffer.len(),
            });
        }

        Ok(payloads)
    }

    /// Flush a final line that ended without a newline
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        payload_of(&String::from_utf8_lossy(&rest))
    }
}

/// Strip SSE framing from one line; `None` for blank, comment and non-data fields
fn payload_of(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    if let Some(data) = line.strip_prefix("data:") {
        let data = data.trim_start();
        return (!data.is_empty()).then(|| data.to_string());
    }

    // Other SSE fields carry nothing we use
    for field in ["event:", "id:", "retry:"] {
        if line.starts_with(field) {
            return None;
        }
    }

    Some(line.to_string())
}
