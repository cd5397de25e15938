//! Session State Machine
//!
//! Tracks the lifecycle of one test session and the parse mode applied to
//! payload lines. All state lives in [`SessionContext`]; nothing is global.

use crate::core::protocol::{ParseMode, Token};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// Discarding lines until `Start test`
    #[default]
    Waiting,
    /// Processing tokens
    Running,
    /// Session over; no further lines are consumed
    Terminated,
}

impl SessionState {
    /// Check if state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Check if a transition to `to` is allowed
    pub fn can_transition_to(&self, to: SessionState) -> bool {
        matches!(
            (self, to),
            (Self::Waiting, Self::Running) | (Self::Running, Self::Terminated)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Running => write!(f, "running"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Why a session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Device sent `End test`
    Completed,
    /// Device sent `ERROR!`
    DeviceError,
    /// Transport closed before the session ended
    TransportClosed,
    /// Operator interrupted the capture
    Cancelled,
}

/// Invalid state transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid state transition: {from} -> {to}")]
pub struct TransitionError {
    /// Current state
    pub from: SessionState,
    /// Requested state
    pub to: SessionState,
}

/// What the caller must do with a token after the context absorbed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do (line discarded or only state changed)
    None,
    /// `Start cscnt` announced a block of this many words
    BlockStarted(u64),
    /// Append the payload to the word stream
    EncodeWord(String),
    /// Compute a throughput record from the payload
    RecordThroughput(String),
    /// Payload arrived before any mode marker
    UnsetPayload(String),
    /// `Failed` from the device
    Failed,
    /// `Start test` while already running
    UnexpectedStart,
    /// Session ended
    Terminate(TerminationReason),
}

/// Session context: lifecycle state plus payload interpretation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    state: SessionState,
    mode: ParseMode,
    reset_mode_after_timing: bool,
    block_count: Option<u64>,
    words_in_block: u64,
    termination: Option<TerminationReason>,
}

impl SessionContext {
    /// Create a context in the waiting state
    pub fn new() -> Self {
        Self::default()
    }

    /// Return to [`ParseMode::Unset`] after each timing payload
    #[must_use]
    pub fn reset_mode_after_timing(mut self, enable: bool) -> Self {
        self.reset_mode_after_timing = enable;
        self
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current parse mode
    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    /// Count announced by the last `Start cscnt` marker
    pub fn block_count(&self) -> Option<u64> {
        self.block_count
    }

    /// Words accepted since the last `Start cscnt` marker
    pub fn words_in_block(&self) -> u64 {
        self.words_in_block
    }

    /// Why the session ended, once terminated
    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    /// Move to `to`, rejecting anything but Waiting -> Running -> Terminated
    pub fn transition(&mut self, to: SessionState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError { from: self.state, to });
        }
        tracing::debug!("Session state: {} -> {}", self.state, to);
        self.state = to;
        Ok(())
    }

    /// End the session from whatever non-terminal state it is in
    pub fn terminate(&mut self, reason: TerminationReason) {
        if self.state.is_terminal() {
            return;
        }
        tracing::debug!("Session state: {} -> terminated ({reason:?})", self.state);
        self.state = SessionState::Terminated;
        self.termination = Some(reason);
    }

    /// Absorb one token and tell the caller what to do with it
    pub fn apply(&mut self, token: Token) -> Action {
        match self.state {
            SessionState::Waiting => {
                if token == Token::SessionStart && self.transition(SessionState::Running).is_ok() {
                    tracing::info!("start test");
                }
                Action::None
            }
            SessionState::Terminated => Action::None,
            SessionState::Running => self.apply_running(token),
        }
    }

    fn apply_running(&mut self, token: Token) -> Action {
        match token {
            Token::SessionStart => Action::UnexpectedStart,
            Token::SessionError => {
                self.terminate(TerminationReason::DeviceError);
                Action::Terminate(TerminationReason::DeviceError)
            }
            Token::SessionEnd => {
                self.terminate(TerminationReason::Completed);
                Action::Terminate(TerminationReason::Completed)
            }
            Token::TimingMarker => {
                self.mode = ParseMode::Timing;
                Action::None
            }
            Token::FailedMarker => Action::Failed,
            Token::CountedBlockMarker(count) => {
                self.mode = ParseMode::WordStream;
                self.block_count = Some(count);
                self.words_in_block = 0;
                Action::BlockStarted(count)
            }
            Token::Payload(raw) => match self.mode {
                ParseMode::WordStream => Action::EncodeWord(raw),
                ParseMode::Timing => {
                    if self.reset_mode_after_timing {
                        self.mode = ParseMode::Unset;
                    }
                    Action::RecordThroughput(raw)
                }
                ParseMode::Unset => Action::UnsetPayload(raw),
            },
        }
    }

    /// Note one accepted word; true when the announced block is now complete
    pub fn word_accepted(&mut self) -> bool {
        self.words_in_block += 1;
        self.block_count == Some(self.words_in_block)
    }
}
