//! Word-stream codec
//!
//! Payload lines received in word-stream mode carry one hex-encoded 32-bit
//! word each. They are written to the binary artifact as raw big-endian
//! values with no header or framing.

mod word;

pub use word::WordEncoder;

use std::num::ParseIntError;

/// Size of one encoded word in the artifact
pub const WORD_SIZE: usize = 4;

/// Payload line that is not a 32-bit hex value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed word {payload:?}: {source}")]
pub struct MalformedWordError {
    /// Offending payload
    pub payload: String,
    /// Parse failure (empty, invalid digit or more than 32 bits)
    #[source]
    pub source: ParseIntError,
}

/// Word encoding errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Payload could not be parsed
    #[error(transparent)]
    Malformed(#[from] MalformedWordError),

    /// Output sink rejected the write
    #[error("Word sink write failed: {0}")]
    Sink(#[from] std::io::Error),
}

/// Parse a hex payload into a word.
///
/// Surrounding whitespace and a `0x`/`0X` prefix are accepted.
pub fn parse_word(payload: &str) -> Result<u32, MalformedWordError> {
    let trimmed = payload.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 16).map_err(|source| MalformedWordError {
        payload: payload.to_string(),
        source,
    })
}

/// Big-endian artifact encoding of one word
pub fn encode_word(word: u32) -> [u8; WORD_SIZE] {
    word.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::IntErrorKind;

    #[test]
    fn test_parse_word() {
        assert_eq!(parse_word("deadbeef").unwrap(), 0xDEAD_BEEF);
        assert_eq!(parse_word("0000000A").unwrap(), 10);
        assert_eq!(parse_word("0xff").unwrap(), 0xFF);
        assert_eq!(parse_word(" 1 ").unwrap(), 1);
        assert_eq!(parse_word("ffffffff").unwrap(), u32::MAX);
    }

    #[test]
    fn test_parse_word_rejects() {
        let err = parse_word("100000000").unwrap_err();
        assert_eq!(err.source.kind(), &IntErrorKind::PosOverflow);
        assert_eq!(err.payload, "100000000");

        assert_eq!(parse_word("xyz").unwrap_err().source.kind(), &IntErrorKind::InvalidDigit);
        assert_eq!(parse_word("").unwrap_err().source.kind(), &IntErrorKind::Empty);
        assert!(parse_word("garbage").is_err());
    }

    #[test]
    fn test_encode_word_round_trip() {
        let bytes = encode_word(parse_word("deadbeef").unwrap());
        assert_eq!(bytes, [0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(u32::from_be_bytes(bytes), 0xDEAD_BEEF);
    }
}
