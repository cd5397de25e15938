//! Streaming word encoder

use super::{encode_word, parse_word, CodecError, WORD_SIZE};
use std::io::Write;

/// Appends parsed words to the binary artifact in arrival order
pub struct WordEncoder<W: Write> {
    sink: W,
    words_written: u64,
    preview_words: u64,
}

impl<W: Write> WordEncoder<W> {
    /// Create an encoder that logs the first `preview_words` words in binary
    pub fn new(sink: W, preview_words: u64) -> Self {
        Self {
            sink,
            words_written: 0,
            preview_words,
        }
    }

    /// Parse `payload` and append its 4 big-endian bytes to the sink
    pub fn encode(&mut self, payload: &str) -> Result<u32, CodecError> {
        let word = parse_word(payload)?;
        self.sink.write_all(&encode_word(word))?;

        if self.words_written < self.preview_words {
            tracing::info!("{word:032b}");
        }
        self.words_written += 1;

        Ok(word)
    }

    /// Number of words appended so far
    pub fn words_written(&self) -> u64 {
        self.words_written
    }

    /// Bytes appended so far
    pub fn bytes_written(&self) -> u64 {
        self.words_written * WORD_SIZE as u64
    }

    /// Flush buffered words to the sink
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.sink.flush()
    }

    /// Flush and hand back the sink
    pub fn finish(mut self) -> std::io::Result<W> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_are_appended_in_order() {
        let lines = ["0000000a", "0000000b", "deadbeef", "ffffffff"];
        let mut encoder = WordEncoder::new(Vec::new(), 10);
        for line in lines {
            encoder.encode(line).unwrap();
        }
        assert_eq!(encoder.words_written(), 4);
        assert_eq!(encoder.bytes_written(), 16);

        let bytes = encoder.finish().unwrap();
        assert_eq!(bytes.len(), 4 * lines.len());
        for (k, line) in lines.iter().enumerate() {
            let expected = u32::from_str_radix(line, 16).unwrap().to_be_bytes();
            assert_eq!(&bytes[4 * k..4 * k + 4], &expected);
        }
    }

    #[test]
    fn test_malformed_word_writes_nothing() {
        let mut encoder = WordEncoder::new(Vec::new(), 0);
        encoder.encode("01").unwrap();
        assert!(matches!(encoder.encode("zz"), Err(CodecError::Malformed(_))));
        assert!(matches!(encoder.encode("123456789"), Err(CodecError::Malformed(_))));
        encoder.encode("02").unwrap();

        assert_eq!(encoder.finish().unwrap(), vec![0, 0, 0, 1, 0, 0, 0, 2]);
    }
}
