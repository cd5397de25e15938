//! CLI Module
//!
//! Provides command-line support functionality including:
//! - Exit codes for automation
//! - Logging initialisation

pub mod exit_codes;
pub mod logging;

pub use exit_codes::{exit_code_description, CliResult, ExitCodes};
pub use logging::{init_logging, LogGuard, Verbosity};
