//! The request queue state machine
//!
//! [`RequestQueue`] holds the operations still in flight, in submission order, and
//! the most recent settled [`Outcome`]. It changes only through the four
//! [`Transition`]s. When an operation completes, every operation submitted before it
//! is stale: those are canceled and retired on the spot, so they can never overwrite the
//! fresher result later. Operations submitted after the completer stay queued because
//! they may still produce a newer result.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ResetPolicy;
use crate::error::{SequencerError, SequencerResult};
use crate::operation::{CancelableOperation, Launch, OperationFuture, OperationId};
use crate::status::{self, Projection, StatusCondition};

/// How an operation settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome<T, E> {
    /// The operation produced a value
    Success(T),
    /// The operation failed with an error
    Error(E),
}

impl<T, E> Outcome<T, E> {
    /// The status this outcome projects to
    pub fn status(&self) -> StatusCondition {
        match self {
            Outcome::Success(_) => StatusCondition::Success,
            Outcome::Error(_) => StatusCondition::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Error(error) => Some(error),
        }
    }

    /// Convert back into a standard Result
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Error(error) => Err(error),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(error) => Outcome::Error(error),
        }
    }
}

/// A state change of the [`RequestQueue`]
#[derive(Debug)]
pub enum Transition<T, E> {
    /// Track a newly submitted operation
    Add(CancelableOperation<T, E>),
    /// An operation settled
    Complete { id: OperationId, outcome: Outcome<T, E> },
    /// Retire an operation whose context went away before it settled
    Cleanup(OperationId),
    /// Return to the empty state
    Reset,
}

/// Operations in flight plus the last settled outcome
#[derive(Debug)]
pub struct RequestQueue<T, E> {
    completed: Option<Outcome<T, E>>,
    queued: Vec<CancelableOperation<T, E>>,
    reset_policy: ResetPolicy,
}

impl<T, E> Default for RequestQueue<T, E> {
    fn default() -> Self {
        Self::new(ResetPolicy::default())
    }
}

impl<T, E> RequestQueue<T, E> {
    /// Create an empty queue
    pub fn new(reset_policy: ResetPolicy) -> Self {
        Self {
            completed: None,
            queued: Vec::new(),
            reset_policy,
        }
    }

    /// The most recent settled outcome, if any
    pub fn completed(&self) -> Option<&Outcome<T, E>> {
        self.completed.as_ref()
    }

    /// Identities of the operations in flight, oldest first
    pub fn queued_ids(&self) -> impl Iterator<Item = OperationId> + '_ {
        self.queued.iter().map(|op| op.id())
    }

    /// Number of operations in flight
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    /// Check if no operation is in flight
    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Check if `id` is still queued
    pub fn contains(&self, id: OperationId) -> bool {
        self.position(id).is_some()
    }

    /// What [`reset`](Self::reset) does with queued operations
    pub fn reset_policy(&self) -> ResetPolicy {
        self.reset_policy
    }

    /// Derive the caller-facing view of this state
    pub fn project(&self) -> Projection<'_, T, E> {
        status::project(self)
    }

    fn position(&self, id: OperationId) -> Option<usize> {
        self.queued.iter().position(|op| op.id() == id)
    }
}

impl<T, E> RequestQueue<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Apply `transition` to `self` and return the resulting state
    pub fn reduce(mut self, transition: Transition<T, E>) -> Self {
        self.apply(transition);
        self
    }

    /// Apply `transition` in place
    pub fn apply(&mut self, transition: Transition<T, E>) {
        match transition {
            Transition::Add(op) => self.add(op),
            Transition::Complete { id, outcome } => self.complete(id, outcome),
            Transition::Cleanup(id) => self.cleanup(id),
            Transition::Reset => self.reset(),
        }
    }

    /// Append an operation to the end of the queue
    pub fn add(&mut self, op: CancelableOperation<T, E>) {
        debug!(operation = %op.id(), queued = self.queued.len() + 1, "queued operation");
        self.queued.push(op);
    }

    /// Start a queued operation. It must be added before it is started.
    pub fn start(&mut self, id: OperationId) -> SequencerResult<OperationFuture<T, E>> {
        Ok(self.launch(id)?.run())
    }

    /// Take the starter of a queued operation without invoking it yet
    pub fn launch(&mut self, id: OperationId) -> SequencerResult<Launch<T, E>> {
        let index = self.position(id).ok_or(SequencerError::NotQueued(id))?;
        self.queued[index].launch()
    }

    /// Record the outcome of `id`, retiring it and every operation submitted before it
    pub fn complete(&mut self, id: OperationId, outcome: Outcome<T, E>) {
        let Some(index) = self.position(id) else {
            debug!(operation = %id, "ignoring completion of an operation that is not queued");
            return;
        };

        let mut retired: Vec<_> = self.queued.drain(..=index).collect();
        retired.pop();
        for stale in &mut retired {
            stale.cancel();
        }

        debug!(
            operation = %id,
            status = ?outcome.status(),
            stale = retired.len(),
            queued = self.queued.len(),
            "operation completed"
        );
        self.completed = Some(outcome);
    }

    /// Cancel and remove `id` if it is still queued
    pub fn cleanup(&mut self, id: OperationId) {
        let Some(index) = self.position(id) else {
            return;
        };
        self.queued.remove(index).cancel();
        debug!(operation = %id, queued = self.queued.len(), "cleaned up operation");
    }

    /// Return to the empty state, canceling queued operations unless the reset policy
    /// detaches them
    pub fn reset(&mut self) {
        if self.reset_policy == ResetPolicy::CancelQueued {
            for op in &mut self.queued {
                op.cancel();
            }
        }
        debug!(
            dropped = self.queued.len(),
            policy = %self.reset_policy,
            "reset request queue"
        );
        self.queued.clear();
        self.completed = None;
    }
}
