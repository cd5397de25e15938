//! Line protocol spoken by the device under test
//!
//! Each line is one of a closed set of control literals, a counted-block
//! marker (`Start cscnt <n>`), or an opaque payload whose meaning depends on
//! the current [`ParseMode`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Session start literal
pub const SESSION_START: &str = "Start test";
/// Device-side failure literal
pub const SESSION_ERROR: &str = "ERROR!";
/// Session end literal
pub const SESSION_END: &str = "End test";
/// Announces that the next payload is a tick count
pub const TIMING_MARKER: &str = "Time passed";
/// Device could not find a match; informational only
pub const FAILED_MARKER: &str = "Failed";
/// Prefix of the counted-block marker
pub const COUNTED_BLOCK_PREFIX: &str = "Start cscnt ";

/// Interpretation currently assigned to bare payload lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParseMode {
    /// No marker seen yet
    #[default]
    Unset,
    /// Payload lines are hex-encoded 32-bit words
    WordStream,
    /// Payload lines are decimal tick counts
    Timing,
}

impl fmt::Display for ParseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "unset"),
            Self::WordStream => write!(f, "word-stream"),
            Self::Timing => write!(f, "timing"),
        }
    }
}

/// Classified protocol line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `Start test`
    SessionStart,
    /// `ERROR!`
    SessionError,
    /// `End test`
    SessionEnd,
    /// `Time passed`
    TimingMarker,
    /// `Failed`
    FailedMarker,
    /// `Start cscnt <count>`
    CountedBlockMarker(u64),
    /// Anything else
    Payload(String),
}

impl Token {
    /// Whether this token ends the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionError | Self::SessionEnd)
    }
}

/// Classification failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// The block count is all digits but does not fit in 64 bits
    #[error("Block count out of range: {0}")]
    CountOutOfRange(String),
}

/// Classify a terminator-stripped line.
///
/// Control literals and counted-block markers are recognised regardless of
/// `mode`; `mode` only qualifies what the returned payload means to the caller.
pub fn classify(line: &str, _mode: ParseMode) -> Result<Token, ClassifyError> {
    let token = match line {
        SESSION_START => Token::SessionStart,
        SESSION_ERROR => Token::SessionError,
        SESSION_END => Token::SessionEnd,
        TIMING_MARKER => Token::TimingMarker,
        FAILED_MARKER => Token::FailedMarker,
        _ => match counted_block_digits(line) {
            Some(digits) => Token::CountedBlockMarker(
                digits
                    .parse()
                    .map_err(|_| ClassifyError::CountOutOfRange(digits.to_string()))?,
            ),
            None => Token::Payload(line.to_string()),
        },
    };
    Ok(token)
}

/// Digits of a `Start cscnt <digits>` line, if the line has exactly that shape
fn counted_block_digits(line: &str) -> Option<&str> {
    let digits = line.strip_prefix(COUNTED_BLOCK_PREFIX)?;
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}
