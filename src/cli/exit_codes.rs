//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::capture::CaptureError;
use crate::core::state_machine::TerminationReason;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Connection failed or lost
    pub const CONNECTION_FAILED: u8 = 3;

    /// Output artifact already exists
    pub const OUTPUT_EXISTS: u8 = 6;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Device reported `ERROR!`
    pub const DEVICE_ERROR: u8 = 9;

    /// Transport closed before `End test`
    pub const INCOMPLETE: u8 = 10;

    /// User cancelled
    pub const CANCELLED: u8 = 11;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success
    Success,

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Outcome of a session that ran to a termination reason
    pub fn from_termination(reason: Option<TerminationReason>) -> Self {
        match reason {
            Some(TerminationReason::Completed) => Self::success(),
            Some(TerminationReason::DeviceError) => {
                Self::error(ExitCodes::DEVICE_ERROR, "Device reported an error")
            }
            Some(TerminationReason::Cancelled) => Self::error(ExitCodes::CANCELLED, "Capture cancelled"),
            Some(TerminationReason::TransportClosed) | None => {
                Self::error(ExitCodes::INCOMPLETE, "Transport closed before the test ended")
            }
        }
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Error(_, msg) => Some(msg),
            Self::Success => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<&TransportError> for CliResult {
    fn from(err: &TransportError) -> Self {
        let code = match err {
            TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
            TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
            TransportError::ConnectionFailed(_) | TransportError::IoError(_) => {
                ExitCodes::CONNECTION_FAILED
            }
        };
        Self::Error(code, err.to_string())
    }
}

impl From<&CaptureError> for CliResult {
    fn from(err: &CaptureError) -> Self {
        match err {
            CaptureError::OutputExists(_) => Self::Error(ExitCodes::OUTPUT_EXISTS, err.to_string()),
            CaptureError::Transport(e) => e.into(),
            CaptureError::TransportLost(_) => {
                Self::Error(ExitCodes::CONNECTION_FAILED, err.to_string())
            }
            CaptureError::Open { source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                Self::Error(ExitCodes::PERMISSION_DENIED, err.to_string())
            }
            CaptureError::Open { .. } | CaptureError::Flush(_) => {
                Self::Error(ExitCodes::ERROR, err.to_string())
            }
        }
    }
}

impl From<&ConfigError> for CliResult {
    fn from(err: &ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        3 => "Connection failed",
        6 => "Output already exists",
        7 => "Permission denied",
        8 => "Configuration error",
        9 => "Device reported an error",
        10 => "Session incomplete",
        11 => "Operation cancelled",
        14 => "Port not found",
        _ => "Unknown error",
    }
}
