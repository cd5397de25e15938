//! Capture session
//!
//! Drives one test session: reads lines, classifies them, updates the
//! [`SessionContext`] and dispatches payloads to the word encoder or the
//! throughput calculator. Processing failures are contained per line by the
//! [`RecoveryPolicy`].

use crate::core::capture::CaptureError;
use crate::core::codec::WordEncoder;
use crate::core::protocol::{classify, ParseMode};
use crate::core::recovery::{ProcessError, RecoveryPolicy};
use crate::core::state_machine::{Action, SessionContext, SessionState, TerminationReason};
use crate::core::throughput::{ThroughputCalculator, ThroughputConstants};
use crate::core::transport::{LineError, LineSource};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Session behaviour settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Return to unset mode after each timing payload instead of staying in timing mode
    pub reset_mode_after_timing: bool,
    /// Number of leading words logged as binary strings
    pub preview_words: u64,
    /// Text written after each throughput record
    pub record_separator: String,
    /// Suffix appended to the output path for the throughput record file
    pub throughput_suffix: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reset_mode_after_timing: false,
            preview_words: 10,
            record_separator: String::new(),
            throughput_suffix: "_throughput".to_string(),
        }
    }
}

/// Summary of a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Why the session stopped
    pub termination: Option<TerminationReason>,
    /// Final lifecycle state
    pub state: SessionState,
    /// Parse mode at the end of the session
    pub mode: ParseMode,
    /// Lines received, including those discarded while waiting
    pub lines_read: u64,
    /// Words appended to the binary artifact
    pub words_written: u64,
    /// Throughput records appended
    pub throughput_records: u64,
    /// Count announced by the last `Start cscnt` marker
    pub last_block_count: Option<u64>,
    /// Lines that were not valid text
    pub decode_errors: u64,
    /// Lines dropped because their payload was malformed
    pub malformed_lines: u64,
    /// Lines dropped because a sink write failed
    pub sink_errors: u64,
    /// Payloads before any mode marker and repeated session starts
    pub anomalies: u64,
    /// `Failed` markers from the device
    pub failed_markers: u64,
    /// When the session object was created
    pub started_at: DateTime<Local>,
    /// When the session stopped
    pub finished_at: Option<DateTime<Local>>,
}

impl SessionReport {
    fn new() -> Self {
        Self {
            termination: None,
            state: SessionState::Waiting,
            mode: ParseMode::Unset,
            lines_read: 0,
            words_written: 0,
            throughput_records: 0,
            last_block_count: None,
            decode_errors: 0,
            malformed_lines: 0,
            sink_errors: 0,
            anomalies: 0,
            failed_markers: 0,
            started_at: Local::now(),
            finished_at: None,
        }
    }

    /// Whether the device completed the test normally
    pub fn is_complete(&self) -> bool {
        self.termination == Some(TerminationReason::Completed)
    }
}

/// Result of a finished session: the report and the flushed sinks
#[derive(Debug)]
pub struct Capture<W, T> {
    /// Session summary
    pub report: SessionReport,
    /// Word sink
    pub words: W,
    /// Throughput record sink
    pub records: T,
}

/// One capture session owning both output sinks
pub struct CaptureSession<W: Write, T: Write> {
    context: SessionContext,
    words: WordEncoder<W>,
    throughput: ThroughputCalculator<T>,
    policy: RecoveryPolicy,
    report: SessionReport,
}

impl<W: Write, T: Write> CaptureSession<W, T> {
    /// Create a session writing words to `words` and records to `records`
    pub fn new(
        words: W,
        records: T,
        settings: &SessionSettings,
        constants: ThroughputConstants,
        policy: RecoveryPolicy,
    ) -> Self {
        Self {
            context: SessionContext::new().reset_mode_after_timing(settings.reset_mode_after_timing),
            words: WordEncoder::new(words, settings.preview_words),
            throughput: ThroughputCalculator::new(records, constants)
                .with_separator(&settings.record_separator),
            policy,
            report: SessionReport::new(),
        }
    }

    /// Current session context
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Counters so far
    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    /// Process one line under the recovery policy
    pub fn handle_line(&mut self, line: &str) {
        self.report.lines_read += 1;
        if let Err(e) = self.process_line(line) {
            if e.is_sink_failure() {
                self.report.sink_errors += 1;
            } else {
                self.report.malformed_lines += 1;
            }
            self.policy.on_process_error(line, &e);
        }
    }

    /// Classify one line and apply it; errors are returned, not contained
    pub fn process_line(&mut self, line: &str) -> Result<(), ProcessError> {
        let token = match classify(line, self.context.mode()) {
            Ok(token) => token,
            // Only `Start test` matters before the session starts.
            Err(_) if self.context.state() == SessionState::Waiting => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match self.context.apply(token) {
            Action::None => {}
            Action::BlockStarted(count) => {
                self.report.last_block_count = Some(count);
                tracing::info!(count, "Counted block started");
            }
            Action::EncodeWord(raw) => {
                self.words.encode(&raw)?;
                self.report.words_written = self.words.words_written();
                if self.context.word_accepted() {
                    tracing::debug!(
                        words = self.context.words_in_block(),
                        "Counted block complete"
                    );
                }
            }
            Action::RecordThroughput(raw) => {
                self.throughput.record(&raw)?;
                self.report.throughput_records = self.throughput.records();
            }
            Action::UnsetPayload(raw) => {
                self.report.anomalies += 1;
                tracing::warn!(line = %raw, "Payload before any mode marker, ignored");
            }
            Action::Failed => {
                self.report.failed_markers += 1;
                tracing::warn!("Failed, no match found");
            }
            Action::UnexpectedStart => {
                self.report.anomalies += 1;
                tracing::warn!("Start test received while already running, ignored");
            }
            Action::Terminate(TerminationReason::DeviceError) => {
                tracing::error!("Device reported an error, ending session");
            }
            Action::Terminate(reason) => {
                tracing::info!(?reason, "Session ended");
            }
        }
        Ok(())
    }

    /// Read lines from `source` until the session terminates or the source
    /// closes, then flush and return both sinks.
    pub fn run<S: LineSource + ?Sized>(
        mut self,
        source: &mut S,
    ) -> Result<Capture<W, T>, CaptureError> {
        tracing::info!("waiting...");

        while !self.context.state().is_terminal() {
            match source.read_line() {
                Ok(Some(line)) => self.handle_line(&line),
                Ok(None) => {
                    tracing::warn!(state = %self.context.state(), "Transport closed");
                    self.context.terminate(TerminationReason::TransportClosed);
                }
                Err(LineError::Cancelled) => {
                    tracing::warn!("Capture cancelled");
                    self.context.terminate(TerminationReason::Cancelled);
                }
                Err(e) if e.is_recoverable() => {
                    self.report.decode_errors += 1;
                    self.policy.on_decode_error(&e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Transport lost");
                    if let Err(flush_err) = self.flush() {
                        tracing::warn!(error = %flush_err, "Flush after transport loss failed");
                    }
                    return Err(CaptureError::TransportLost(e));
                }
            }
        }

        self.finish().map_err(CaptureError::Flush)
    }

    /// Flush both sinks without closing them
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.words.flush()?;
        self.throughput.flush()
    }

    /// Flush both sinks and hand them back with the final report
    pub fn finish(self) -> std::io::Result<Capture<W, T>> {
        let mut report = self.report;
        report.termination = self.context.termination();
        report.state = self.context.state();
        report.mode = self.context.mode();
        report.finished_at = Some(Local::now());

        let words = self.words.finish()?;
        let records = self.throughput.finish()?;
        tracing::info!(
            words = report.words_written,
            records = report.throughput_records,
            "done"
        );
        Ok(Capture {
            report,
            words,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::MockLineSource;
    use mockall::Sequence;

    fn session() -> CaptureSession<Vec<u8>, Vec<u8>> {
        CaptureSession::new(
            Vec::new(),
            Vec::new(),
            &SessionSettings::default(),
            ThroughputConstants::default(),
            RecoveryPolicy { pause_ms: 0 },
        )
    }

    /// Sink that accepts whole writes only while they fit in `room` bytes
    #[derive(Default)]
    struct BoundedSink {
        data: Vec<u8>,
        room: usize,
    }

    impl Write for BoundedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if buf.len() > self.room {
                return Err(std::io::Error::new(std::io::ErrorKind::WriteZero, "disk full"));
            }
            self.room -= buf.len();
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Sink that buffers writes but cannot flush them
    #[derive(Default)]
    struct UnflushableSink(Vec<u8>);

    impl Write for UnflushableSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "device gone"))
        }
    }

    fn scripted(lines: &[&str]) -> MockLineSource {
        let mut source = MockLineSource::new();
        let mut seq = Sequence::new();
        for line in lines {
            let line = (*line).to_string();
            source
                .expect_read_line()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move || Ok(Some(line.clone())));
        }
        source
    }

    #[test]
    fn test_end_to_end_scenario() {
        // Any read past `End test` would fail the mock expectation.
        let mut source = scripted(&[
            "Start test",
            "Start cscnt 2",
            "0000000a",
            "0000000b",
            "Time passed",
            "1000",
            "End test",
        ]);

        let capture = session().run(&mut source).unwrap();
        assert_eq!(capture.words, vec![0, 0, 0, 0x0a, 0, 0, 0, 0x0b]);
        assert_eq!(capture.records, b"Throughput: 13.4218 Gb/s".to_vec());

        let report = capture.report;
        assert_eq!(report.termination, Some(TerminationReason::Completed));
        assert_eq!(report.state, SessionState::Terminated);
        assert_eq!(report.lines_read, 7);
        assert_eq!(report.words_written, 2);
        assert_eq!(report.throughput_records, 1);
        assert_eq!(report.last_block_count, Some(2));
        assert!(report.is_complete());
    }

    #[test]
    fn test_lines_before_start_are_discarded() {
        let mut source = scripted(&["0000000a", "Start cscnt 1", "End test", "Start test", "ERROR!"]);

        let capture = session().run(&mut source).unwrap();
        assert!(capture.words.is_empty());
        assert_eq!(capture.report.termination, Some(TerminationReason::DeviceError));
        assert_eq!(capture.report.last_block_count, None);
    }

    #[test]
    fn test_unset_payload_is_tolerated() {
        let mut s = session();
        s.handle_line("Start test");
        s.handle_line("garbage");
        assert_eq!(s.report().anomalies, 1);
        assert_eq!(s.context().state(), SessionState::Running);

        let capture = s.finish().unwrap();
        assert!(capture.words.is_empty());
        assert!(capture.records.is_empty());
    }

    #[test]
    fn test_malformed_payloads_are_dropped() {
        let mut s = session();
        for line in ["Start test", "Start cscnt 3", "00000001", "nothex", "00000002"] {
            s.handle_line(line);
        }
        for line in ["Time passed", "0", "abc", "2000", "Failed"] {
            s.handle_line(line);
        }
        let report = s.report();
        assert_eq!(report.malformed_lines, 3);
        assert_eq!(report.failed_markers, 1);
        assert_eq!(s.context().mode(), ParseMode::Timing);

        let capture = s.finish().unwrap();
        assert_eq!(capture.words, vec![0, 0, 0, 1, 0, 0, 0, 2]);
        assert_eq!(capture.records, b"Throughput: 6.71089 Gb/s".to_vec());
    }

    #[test]
    fn test_oversized_block_count_is_contained() {
        let mut s = session();
        s.handle_line("Start test");
        s.handle_line("Start cscnt 123456789012345678901234567890");
        assert_eq!(s.report().malformed_lines, 1);
        assert_eq!(s.context().mode(), ParseMode::Unset);
    }

    #[test]
    fn test_decode_error_skips_line() {
        let mut source = MockLineSource::new();
        let mut seq = Sequence::new();
        source
            .expect_read_line()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some("Start test".to_string())));
        source
            .expect_read_line()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(LineError::Decode(String::from_utf8(vec![0xff]).unwrap_err())));
        source
            .expect_read_line()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some("End test".to_string())));

        let capture = session().run(&mut source).unwrap();
        assert_eq!(capture.report.decode_errors, 1);
        assert!(capture.report.is_complete());
    }

    #[test]
    fn test_transport_closed_and_lost() {
        let mut source = MockLineSource::new();
        source.expect_read_line().times(1).returning(|| Ok(None));
        let capture = session().run(&mut source).unwrap();
        assert_eq!(capture.report.termination, Some(TerminationReason::TransportClosed));

        let mut source = MockLineSource::new();
        source.expect_read_line().times(1).returning(|| {
            Err(LineError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "unplugged",
            )))
        });
        assert!(matches!(
            session().run(&mut source),
            Err(CaptureError::TransportLost(LineError::Io(_)))
        ));
    }

    #[test]
    fn test_cancelled() {
        let mut source = MockLineSource::new();
        source.expect_read_line().times(1).returning(|| Err(LineError::Cancelled));
        let capture = session().run(&mut source).unwrap();
        assert_eq!(capture.report.termination, Some(TerminationReason::Cancelled));
    }

    #[test]
    fn test_rejected_record_leaves_no_partial_text() {
        let settings = SessionSettings {
            record_separator: "\n".to_string(),
            ..Default::default()
        };
        // Room for "Throughput: 13.4218 Gb/s" but not its separator.
        let mut s = CaptureSession::new(
            Vec::new(),
            BoundedSink { room: 24, ..Default::default() },
            &settings,
            ThroughputConstants::default(),
            RecoveryPolicy { pause_ms: 0 },
        );
        for line in ["Start test", "Time passed", "1000"] {
            s.handle_line(line);
        }
        assert_eq!(s.report().throughput_records, 0);
        assert_eq!(s.report().sink_errors, 1);
        assert_eq!(s.context().mode(), ParseMode::Timing);

        let capture = s.finish().unwrap();
        assert!(capture.records.data.is_empty());
    }

    #[test]
    fn test_record_fits_after_rejection() {
        let settings = SessionSettings {
            record_separator: "\n".to_string(),
            ..Default::default()
        };
        let mut s = CaptureSession::new(
            Vec::new(),
            BoundedSink { room: 25, ..Default::default() },
            &settings,
            ThroughputConstants::default(),
            RecoveryPolicy { pause_ms: 0 },
        );
        for line in ["Start test", "Time passed", "1000", "2000"] {
            s.handle_line(line);
        }
        assert_eq!(s.report().throughput_records, 1);
        assert_eq!(s.report().sink_errors, 1);

        let capture = s.finish().unwrap();
        assert_eq!(capture.records.data, b"Throughput: 13.4218 Gb/s\n".to_vec());
    }

    #[test]
    fn test_failed_final_flush_is_reported() {
        let mut source = scripted(&["Start test", "Start cscnt 1", "0000000a", "End test"]);
        let s = CaptureSession::new(
            UnflushableSink::default(),
            Vec::new(),
            &SessionSettings::default(),
            ThroughputConstants::default(),
            RecoveryPolicy { pause_ms: 0 },
        );
        assert!(matches!(s.run(&mut source), Err(CaptureError::Flush(_))));
    }
}
