//! Error types for the request sequencer
//!
//! Only misuse of the sequencer is reported through these types. Failures of the
//! sequenced work itself travel as [`Outcome::Error`](crate::Outcome::Error).

use thiserror::Error;

use crate::operation::OperationId;

/// Main error type for sequencer operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequencerError {
    #[error("Operation {0} has already been started")]
    AlreadyStarted(OperationId),

    #[error("Operation {0} is not queued")]
    NotQueued(OperationId),

    #[error("Invalid sequencer mode {0:?}, expected \"latest\" or \"every\"")]
    InvalidMode(String),

    #[error("Invalid reset policy {0:?}, expected \"cancel-queued\" or \"detach\"")]
    InvalidResetPolicy(String),
}

/// Result type alias for sequencer operations
pub type SequencerResult<T> = Result<T, SequencerError>;

impl SequencerError {
    /// Create an invalid mode error
    pub fn invalid_mode<S: Into<String>>(mode: S) -> Self {
        SequencerError::InvalidMode(mode.into())
    }

    /// Create an invalid reset policy error
    pub fn invalid_reset_policy<S: Into<String>>(policy: S) -> Self {
        SequencerError::InvalidResetPolicy(policy.into())
    }

    /// The operation this error refers to, if any
    pub fn operation(&self) -> Option<OperationId> {
        match self {
            SequencerError::AlreadyStarted(id) | SequencerError::NotQueued(id) => Some(*id),
            SequencerError::InvalidMode(_) | SequencerError::InvalidResetPolicy(_) => None,
        }
    }
}
