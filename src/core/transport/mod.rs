//! Transport layer feeding the capture pipeline
//!
//! Supports:
//! - Serial ports (RS-232, USB-Serial)
//! - Any byte stream implementing [`std::io::Read`] (recorded logs, stdin, tests)
//!
//! Both are exposed through [`LineSource`], which yields one decoded text line
//! per call.

mod serial;

pub use serial::{list_ports, SerialConfig, SerialFlowControl, SerialParity, SerialTransport};

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::string::FromUtf8Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Error produced by a single [`LineSource::read_line`] call
#[derive(Error, Debug)]
pub enum LineError {
    /// The bytes of one line were not valid UTF-8. Only that line is lost.
    #[error("Line is not valid UTF-8: {0}")]
    Decode(#[from] FromUtf8Error),

    /// The underlying transport failed
    #[error("Transport read failed: {0}")]
    Io(#[from] std::io::Error),

    /// Reading stopped because shutdown was requested
    #[error("Capture cancelled")]
    Cancelled,
}

impl LineError {
    /// Whether the sequence of lines may continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    /// The offending line for decode errors, with invalid bytes replaced
    pub fn raw_line(&self) -> Option<String> {
        match self {
            Self::Decode(e) => {
                Some(strip_terminators(&String::from_utf8_lossy(e.as_bytes())).to_string())
            }
            Self::Io(_) | Self::Cancelled => None,
        }
    }
}

/// Lazy, unbounded sequence of text lines read from a byte transport.
///
/// Bytes are consumed irreversibly. `Ok(None)` signals that the transport
/// closed and no further lines will arrive.
#[cfg_attr(test, mockall::automock)]
pub trait LineSource {
    /// Block until the next complete line is available
    fn read_line(&mut self) -> Result<Option<String>, LineError>;
}

/// Strip line terminators the way the device emits them (`\r\n`, `\n`, stray `\r`)
pub fn strip_terminators(line: &str) -> &str {
    line.trim_matches(|c| c == '\r' || c == '\n')
}

/// Line source over any blocking reader
pub struct StreamLineSource<R: Read> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    shutdown: Option<Arc<AtomicBool>>,
}

impl<R: Read> StreamLineSource<R> {
    /// Create a new line source
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::with_capacity(64),
            shutdown: None,
        }
    }

    /// Report [`LineError::Cancelled`] at the next read timeout once `flag` is set
    #[must_use]
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn take_line(&mut self) -> Result<String, LineError> {
        let bytes = std::mem::take(&mut self.pending);
        let text = String::from_utf8(bytes)?;
        Ok(strip_terminators(&text).to_string())
    }
}

impl<R: Read> LineSource for StreamLineSource<R> {
    fn read_line(&mut self) -> Result<Option<String>, LineError> {
        loop {
            if self.shutdown_requested() {
                return Err(LineError::Cancelled);
            }

            // read_until keeps the bytes it already consumed in `pending` when
            // it fails, so a timeout in the middle of a line loses nothing.
            match self.reader.read_until(b'\n', &mut self.pending) {
                Ok(0) => {
                    if self.pending.is_empty() {
                        return Ok(None);
                    }
                    return self.take_line().map(Some);
                }
                Ok(_) => {
                    if self.pending.last() == Some(&b'\n') {
                        return self.take_line().map(Some);
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    tracing::trace!("Transport read timed out, waiting");
                }
                Err(e) => return Err(LineError::Io(e)),
            }
        }
    }
}
