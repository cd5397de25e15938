//! Per-line error containment
//!
//! Failures while handling a single line never escape that line: they are
//! logged with the raw line, the line's effect is dropped and the loop pauses
//! briefly before reading on. Parse mode and everything already written are
//! kept as they are.

use crate::core::codec::CodecError;
use crate::core::protocol::ClassifyError;
use crate::core::throughput::ThroughputError;
use crate::core::transport::LineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure while classifying or dispatching one line
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Line looked like a control marker but could not be tokenized
    #[error("Classification failed: {0}")]
    Classify(#[from] ClassifyError),

    /// Word-stream payload rejected
    #[error("Word rejected: {0}")]
    Word(#[from] CodecError),

    /// Timing payload rejected
    #[error("Throughput rejected: {0}")]
    Throughput(#[from] ThroughputError),
}

impl ProcessError {
    /// Whether the failure came from an output sink rather than the line itself
    pub fn is_sink_failure(&self) -> bool {
        matches!(
            self,
            Self::Word(CodecError::Sink(_)) | Self::Throughput(ThroughputError::Sink(_))
        )
    }
}

/// How contained failures are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryPolicy {
    /// Pause after a processing failure, in milliseconds
    pub pause_ms: u64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self { pause_ms: 3 }
    }
}

impl RecoveryPolicy {
    /// Pause applied after a processing failure
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    /// Log a line that could not be decoded; the line is skipped
    pub fn on_decode_error(&self, error: &LineError) {
        tracing::warn!(
            line = %error.raw_line().unwrap_or_default(),
            error = %error,
            "Skipping undecodable line"
        );
    }

    /// Log a failed line and pause before the next read
    pub fn on_process_error(&self, line: &str, error: &ProcessError) {
        tracing::warn!(
            line = %line,
            error = %error,
            sink = error.is_sink_failure(),
            "Line dropped, continuing"
        );
        if self.pause_ms > 0 {
            std::thread::sleep(self.pause());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::parse_word;
    use crate::core::throughput::MalformedTickCountError;

    #[test]
    fn test_default_pause() {
        assert_eq!(RecoveryPolicy::default().pause(), Duration::from_millis(3));
    }

    #[test]
    fn test_sink_failures_are_distinguished() {
        let malformed: ProcessError = CodecError::from(parse_word("xyz").unwrap_err()).into();
        assert!(!malformed.is_sink_failure());

        let zero: ProcessError = ThroughputError::from(MalformedTickCountError::Zero).into();
        assert!(!zero.is_sink_failure());

        let io = std::io::Error::new(std::io::ErrorKind::WriteZero, "disk full");
        let sink: ProcessError = CodecError::Sink(io).into();
        assert!(sink.is_sink_failure());
    }

    #[test]
    fn test_decode_error_keeps_raw_line() {
        let err = LineError::from(String::from_utf8(b"00\xff0a".to_vec()).unwrap_err());
        assert_eq!(err.raw_line().as_deref(), Some("00\u{fffd}0a"));
        RecoveryPolicy { pause_ms: 0 }.on_decode_error(&err);
    }

    #[test]
    fn test_contained_errors_do_not_panic() {
        let policy = RecoveryPolicy { pause_ms: 0 };
        let err: ProcessError = ClassifyError::CountOutOfRange("9".repeat(30)).into();
        policy.on_process_error("Start cscnt 999", &err);
    }
}
