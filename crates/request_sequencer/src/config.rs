//! Configuration for a [`Sequencer`](crate::Sequencer)

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SequencerError;

/// What the driver does with an in-flight operation when its context is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Retire the operation on teardown, so only the latest request can land
    #[default]
    Latest,
    /// Let every operation keep racing after teardown
    Every,
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Latest => f.write_str("latest"),
            Mode::Every => f.write_str("every"),
        }
    }
}

impl FromStr for Mode {
    type Err = SequencerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(Mode::Latest),
            "every" => Ok(Mode::Every),
            other => Err(SequencerError::invalid_mode(other)),
        }
    }
}

/// What a reset does with operations that are still queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResetPolicy {
    /// Cancel them, so none of them can deliver a result
    #[default]
    CancelQueued,
    /// Forget them without canceling
    Detach,
}

impl Display for ResetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetPolicy::CancelQueued => f.write_str("cancel-queued"),
            ResetPolicy::Detach => f.write_str("detach"),
        }
    }
}

impl FromStr for ResetPolicy {
    type Err = SequencerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cancel-queued" => Ok(ResetPolicy::CancelQueued),
            "detach" => Ok(ResetPolicy::Detach),
            other => Err(SequencerError::invalid_reset_policy(other)),
        }
    }
}

/// Configuration for a sequencer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Teardown behavior of the driver
    pub mode: Mode,

    /// Behavior of [`reset`](crate::Sequencer::reset) towards queued operations
    pub reset_policy: ResetPolicy,

    /// Name attached to log events, useful when several sequencers run side by side
    pub name: Option<String>,
}

impl SequencerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that retires superseded operations on teardown
    pub fn latest() -> Self {
        Self::new().with_mode(Mode::Latest)
    }

    /// Configuration that lets every operation race to completion
    pub fn every() -> Self {
        Self::new().with_mode(Mode::Every)
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_reset_policy(mut self, reset_policy: ResetPolicy) -> Self {
        self.reset_policy = reset_policy;
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }
}
