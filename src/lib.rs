//! # Uartcap Core Library
//!
//! Captures a hardware test session conducted over a serial link:
//! - Recognises the device's line protocol (`Start test`, `Start cscnt <n>`, `Time passed`, ...)
//! - Writes hex-encoded 32-bit words to a raw big-endian binary artifact
//! - Turns reported tick counts into throughput records
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use uartcap_core::{capture_to_files, CaptureConfig, SerialTransport};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = CaptureConfig::default();
//!     let output = Path::new("rand.bin");
//!
//!     uartcap_core::core::capture::ensure_absent(output)?;
//!     let mut source = SerialTransport::new(config.serial.clone()).connect()?;
//!     let report = capture_to_files(&mut source, output, &config)?;
//!
//!     println!("{} words captured", report.words_written);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes};
pub use crate::config::{CaptureConfig, ConfigError};
pub use crate::core::capture::{capture_to_files, CaptureError, CaptureFiles};
pub use crate::core::protocol::{classify, ParseMode, Token};
pub use crate::core::session::{CaptureSession, SessionReport, SessionSettings};
pub use crate::core::state_machine::{SessionState, TerminationReason};
pub use crate::core::throughput::{EngFormatter, SiFormatter, ThroughputConstants};
pub use crate::core::transport::{LineSource, SerialConfig, SerialTransport, StreamLineSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
