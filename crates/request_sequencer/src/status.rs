//! Status projection of a request queue

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::queue::{Outcome, RequestQueue};

/// Overall condition of a sequenced request slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCondition {
    /// Nothing submitted and nothing settled
    Initial,
    /// At least one operation is still in flight
    Pending,
    /// The most recent settled operation succeeded
    Success,
    /// The most recent settled operation failed
    Error,
}

impl StatusCondition {
    /// Check if the condition reflects a settled operation
    pub fn is_settled(&self) -> bool {
        matches!(self, StatusCondition::Success | StatusCondition::Error)
    }
}

impl Display for StatusCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCondition::Initial => "INITIAL",
            StatusCondition::Pending => "PENDING",
            StatusCondition::Success => "SUCCESS",
            StatusCondition::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Borrowed view of a [`RequestQueue`]
///
/// While `status` is [`StatusCondition::Pending`] the `error` and `value` fields may
/// still hold an earlier result and should not be relied upon.
#[derive(Debug, PartialEq, Eq)]
pub struct Projection<'a, T, E> {
    pub error: Option<&'a E>,
    pub value: Option<&'a T>,
    pub status: StatusCondition,
}

impl<T, E> Clone for Projection<'_, T, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, E> Copy for Projection<'_, T, E> {}

impl<T: Clone, E: Clone> Projection<'_, T, E> {
    /// Take an owned copy of the view
    pub fn to_snapshot(&self) -> Snapshot<T, E> {
        Snapshot {
            error: self.error.cloned(),
            value: self.value.cloned(),
            status: self.status,
        }
    }
}

/// Owned view of a [`RequestQueue`], as published to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot<T, E> {
    pub error: Option<E>,
    pub value: Option<T>,
    pub status: StatusCondition,
}

impl<T, E> Default for Snapshot<T, E> {
    fn default() -> Self {
        Self {
            error: None,
            value: None,
            status: StatusCondition::Initial,
        }
    }
}

impl<T, E> Snapshot<T, E> {
    pub fn into_parts(self) -> (Option<E>, Option<T>, StatusCondition) {
        (self.error, self.value, self.status)
    }
}

/// Derive `(error, value, status)` from the queue state.
///
/// Pending always wins: a non-empty queue reports [`StatusCondition::Pending`] even
/// when an earlier result is available.
pub fn project<T, E>(queue: &RequestQueue<T, E>) -> Projection<'_, T, E> {
    let completed = queue.completed();
    let status = if !queue.is_empty() {
        StatusCondition::Pending
    } else {
        completed.map_or(StatusCondition::Initial, Outcome::status)
    };

    Projection {
        error: completed.and_then(Outcome::error),
        value: completed.and_then(Outcome::value),
        status,
    }
}
