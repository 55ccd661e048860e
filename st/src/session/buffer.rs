//! Append-only accumulator of streamed text

/// Raw text received so far for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBuffer {
    text: String,
    chunks: usize,
}

impl RawBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk in arrival order
    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        self.chunks += 1;
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of chunks appended so far
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_arrival_order() {
        let mut buffer = RawBuffer::new();
        assert!(buffer.is_empty());

        buffer.push("{\"st");
        buffer.push("");
        buffer.push("eps\":[");
        assert_eq!(buffer.as_str(), "{\"steps\":[");
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.chunk_count(), 3);
        assert!(!buffer.is_empty());
    }
}
