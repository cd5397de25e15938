//! Capture artifacts
//!
//! A capture writes two files: the binary word artifact at the requested
//! path, and a text file of throughput records next to it. The word artifact
//! must not exist beforehand.

use crate::config::CaptureConfig;
use crate::core::session::{CaptureSession, SessionReport};
use crate::core::transport::{LineError, LineSource, TransportError};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Capture failures that abort the whole run
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The word artifact is already there
    #[error("Output already exists: {}", .0.display())]
    OutputExists(PathBuf),

    /// An artifact could not be opened
    #[error("Cannot open {}: {source}", path.display())]
    Open {
        /// Artifact path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The transport could not be opened
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The transport failed mid-session
    #[error("Transport lost: {0}")]
    TransportLost(#[source] LineError),

    /// Buffered output could not be written out at the end of the session
    #[error("Failed to flush capture output: {0}")]
    Flush(#[source] std::io::Error),
}

/// Fail with [`CaptureError::OutputExists`] if `output` is already present
pub fn ensure_absent(output: &Path) -> Result<(), CaptureError> {
    if output.exists() {
        return Err(CaptureError::OutputExists(output.to_path_buf()));
    }
    Ok(())
}

/// Path of the throughput record file for `output`
pub fn throughput_path(output: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Both capture sinks, opened
pub struct CaptureFiles {
    /// Binary word artifact
    pub words: BufWriter<File>,
    /// Throughput record file, opened for appending
    pub records: BufWriter<File>,
    /// Path of the word artifact
    pub words_path: PathBuf,
    /// Path of the record file
    pub records_path: PathBuf,
}

impl CaptureFiles {
    /// Open the record file for appending, then create the word artifact (never overwriting).
    ///
    /// The artifact is created last so that a record file that cannot be
    /// opened leaves nothing behind to block the next run.
    pub fn open(output: &Path, throughput_suffix: &str) -> Result<Self, CaptureError> {
        ensure_absent(output)?;

        let records_path = throughput_path(output, throughput_suffix);
        let records = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&records_path)
            .map_err(|source| CaptureError::Open {
                path: records_path.clone(),
                source,
            })?;

        let words = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(output)
            .map_err(|source| match source.kind() {
                ErrorKind::AlreadyExists => CaptureError::OutputExists(output.to_path_buf()),
                _ => CaptureError::Open {
                    path: output.to_path_buf(),
                    source,
                },
            })?;

        tracing::debug!(
            words = %output.display(),
            records = %records_path.display(),
            "Capture files opened"
        );

        Ok(Self {
            words: BufWriter::new(words),
            records: BufWriter::new(records),
            words_path: output.to_path_buf(),
            records_path,
        })
    }
}

/// Run one capture session from `source` into files at `output`
pub fn capture_to_files<S: LineSource + ?Sized>(
    source: &mut S,
    output: &Path,
    config: &CaptureConfig,
) -> Result<SessionReport, CaptureError> {
    let files = CaptureFiles::open(output, &config.session.throughput_suffix)?;
    let session = CaptureSession::new(
        files.words,
        files.records,
        &config.session,
        config.throughput,
        config.recovery,
    );
    let capture = session.run(source)?;
    Ok(capture.report)
}
