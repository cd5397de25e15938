//! Core module containing the capture pipeline
//!
//! This module provides:
//! - Transport layer yielding decoded lines (serial port or any byte stream)
//! - Protocol classifier for the device's line protocol
//! - Session state machine and the capture loop
//! - Word encoder for the binary artifact
//! - Throughput calculator and engineering-unit formatting
//! - Per-line error recovery policy
//! - Capture artifact preflight and opening

pub mod capture;
pub mod codec;
pub mod protocol;
pub mod recovery;
pub mod session;
pub mod state_machine;
pub mod throughput;
pub mod transport;
