//! Shared entry point for driving a request queue
//!
//! A [`Sequencer`] owns one [`RequestQueue`] behind a lock and exposes the calls a
//! driver needs: submit a new request, tear one down, reset, and observe the current
//! [`Snapshot`]. Each transition is applied under the lock and the resulting snapshot is
//! published to subscribers before the lock is released. Starters are invoked after the
//! lock is released.

use std::fmt::{self, Debug};
use std::future::{Future, IntoFuture};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::config::{Mode, SequencerConfig};
use crate::error::{SequencerError, SequencerResult};
use crate::operation::{CancelableOperation, OperationFuture, OperationId, RawOperation};
use crate::queue::{Outcome, RequestQueue, Transition};
use crate::status::{Snapshot, StatusCondition};

struct Inner<T, E> {
    queue: Mutex<RequestQueue<T, E>>,
    snapshots: watch::Sender<Snapshot<T, E>>,
    config: SequencerConfig,
}

/// Cloneable handle to one sequencing session
///
/// Cancel hooks run while the queue lock is held and must not call back into the same
/// sequencer.
pub struct Sequencer<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for Sequencer<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Default for Sequencer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Sequencer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a new sequencer with default configuration
    pub fn new() -> Self {
        Self::with_config(SequencerConfig::default())
    }

    /// Create a new sequencer with custom configuration
    pub fn with_config(config: SequencerConfig) -> Self {
        let (snapshots, _) = watch::channel(Snapshot::default());
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(RequestQueue::new(config.reset_policy)),
                snapshots,
                config,
            }),
        }
    }

    /// The configuration this sequencer was created with
    pub fn config(&self) -> &SequencerConfig {
        &self.inner.config
    }

    /// Begin a new request whose result is suppressed once it is superseded
    pub fn submit<F, Fut>(&self, starter: F) -> SequencerResult<Submission<T, E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.track(CancelableOperation::new(starter))
    }

    /// Begin a new request whose cancellation is delegated to `hook`
    pub fn submit_with_cancel_hook<F, Fut, H>(
        &self,
        starter: F,
        hook: H,
    ) -> SequencerResult<Submission<T, E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        H: FnOnce(RawOperation<T, E>) + Send + 'static,
    {
        self.track(CancelableOperation::with_cancel_hook(starter, hook))
    }

    /// Add an operation to the queue and start it.
    ///
    /// The operation must not have been started yet. Its starter is invoked outside the
    /// queue lock, so it may observe the sequencer, for example through [`status`](Self::status).
    pub fn track(&self, op: CancelableOperation<T, E>) -> SequencerResult<Submission<T, E>> {
        let id = op.id();
        if op.is_started() {
            return Err(SequencerError::AlreadyStarted(id));
        }

        let launch = self.dispatch(|queue| {
            queue.add(op);
            queue.launch(id)
        })?;
        // The starter runs after the lock is released so it may read this sequencer.
        let future = launch.run();
        debug!(sequencer = ?self.inner.config.name, operation = %id, "submitted request");

        Ok(Submission {
            id,
            future,
            sequencer: self.clone(),
        })
    }

    /// Called when the context of `id` is torn down before it settled.
    ///
    /// In [`Mode::Latest`] the operation is cleaned up and `true` is returned. In
    /// [`Mode::Every`] it keeps racing and nothing happens.
    pub fn teardown(&self, id: OperationId) -> bool {
        match self.inner.config.mode {
            Mode::Latest => {
                self.cleanup(id);
                true
            }
            Mode::Every => {
                debug!(sequencer = ?self.inner.config.name, operation = %id, "leaving request to race");
                false
            }
        }
    }

    /// Record the outcome of `id` and publish the new snapshot
    pub fn complete(&self, id: OperationId, outcome: Outcome<T, E>) {
        self.dispatch(|queue| queue.apply(Transition::Complete { id, outcome }));
    }

    /// Cancel and retire `id` if it is still queued
    pub fn cleanup(&self, id: OperationId) {
        self.dispatch(|queue| queue.apply(Transition::Cleanup(id)));
    }

    /// Return to the initial state, applying the configured reset policy
    pub fn reset(&self) {
        self.dispatch(|queue| queue.apply(Transition::Reset));
    }

    /// React to a new request source: reset when there is none, submit otherwise
    pub fn replace<F, Fut>(&self, source: Option<F>) -> SequencerResult<Option<Submission<T, E>>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        match source {
            Some(starter) => self.submit(starter).map(Some),
            None => {
                self.reset();
                Ok(None)
            }
        }
    }

    /// The current `(error, value, status)` view
    pub fn snapshot(&self) -> Snapshot<T, E> {
        self.inner.queue.lock().project().to_snapshot()
    }

    /// Current status without cloning the value or error
    pub fn status(&self) -> StatusCondition {
        self.inner.queue.lock().project().status
    }

    /// Receive a new snapshot after every transition
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T, E>> {
        self.inner.snapshots.subscribe()
    }

    fn dispatch<R>(&self, f: impl FnOnce(&mut RequestQueue<T, E>) -> R) -> R {
        let mut queue = self.inner.queue.lock();
        let result = f(&mut queue);
        self.inner.snapshots.send_replace(queue.project().to_snapshot());
        result
    }
}

impl<T, E> Debug for Sequencer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("config", &self.inner.config)
            .field("queued", &self.inner.queue.lock().len())
            .finish()
    }
}

/// A started request
///
/// Awaiting a submission drives the operation and records its outcome in the
/// sequencer. A submission that was superseded or torn down never resolves. Dropping a
/// submission without awaiting it leaves the operation queued until it is cleaned up or
/// the sequencer is reset.
#[must_use = "the outcome is only recorded when the submission is awaited"]
pub struct Submission<T, E> {
    id: OperationId,
    future: OperationFuture<T, E>,
    sequencer: Sequencer<T, E>,
}

impl<T, E> Submission<T, E> {
    /// Identity of the submitted operation
    pub fn id(&self) -> OperationId {
        self.id
    }
}

impl<T, E> IntoFuture for Submission<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    type Output = Outcome<T, E>;
    type IntoFuture = BoxFuture<'static, Outcome<T, E>>;

    fn into_future(self) -> Self::IntoFuture {
        let Submission {
            id,
            future,
            sequencer,
        } = self;

        async move {
            let outcome = Outcome::from(future.await);
            sequencer.complete(id, outcome.clone());
            outcome
        }
        .boxed()
    }
}

impl<T, E> Debug for Submission<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::future;
    use tokio::sync::oneshot;

    use super::*;
    use crate::config::ResetPolicy;

    type Reply = oneshot::Sender<Result<i32, String>>;

    /// Submit a request that settles when the returned sender fires
    fn controlled(sequencer: &Sequencer<i32, String>) -> (Submission<i32, String>, Reply) {
        let (tx, rx) = oneshot::channel();
        let submission = sequencer
            .submit(move || async move {
                rx.await.unwrap_or_else(|_| Err("sender dropped".to_string()))
            })
            .unwrap();
        (submission, tx)
    }

    #[tokio::test]
    async fn test_newer_request_wins_out_of_order() {
        let sequencer = Sequencer::new();
        let (a, reply_a) = controlled(&sequencer);
        let (b, reply_b) = controlled(&sequencer);
        assert_eq!(sequencer.status(), StatusCondition::Pending);

        reply_b.send(Ok(2)).unwrap();
        assert_eq!(b.await, Outcome::Success(2));
        assert_eq!(
            sequencer.snapshot(),
            Snapshot {
                error: None,
                value: Some(2),
                status: StatusCondition::Success,
            }
        );

        reply_a.send(Ok(1)).unwrap();
        let mut a = a.into_future();
        assert!((&mut a).now_or_never().is_none());
        assert_eq!(sequencer.snapshot().value, Some(2));
    }

    #[tokio::test]
    async fn test_older_request_settling_first_keeps_newer_pending() {
        let sequencer = Sequencer::new();
        let (a, reply_a) = controlled(&sequencer);
        let (b, reply_b) = controlled(&sequencer);

        reply_a.send(Ok(1)).unwrap();
        assert_eq!(a.await, Outcome::Success(1));
        let snapshot = sequencer.snapshot();
        assert_eq!(snapshot.status, StatusCondition::Pending);
        assert_eq!(snapshot.value, Some(1));

        reply_b.send(Ok(2)).unwrap();
        assert_eq!(b.await, Outcome::Success(2));
        assert_eq!(sequencer.snapshot().value, Some(2));
        assert_eq!(sequencer.status(), StatusCondition::Success);
    }

    #[tokio::test]
    async fn test_producer_error_surfaces_as_error_status() {
        let sequencer = Sequencer::new();
        let (a, reply_a) = controlled(&sequencer);

        reply_a.send(Err("not found".to_string())).unwrap();
        assert_eq!(a.await, Outcome::Error("not found".to_string()));

        let (error, value, status) = sequencer.snapshot().into_parts();
        assert_eq!(error, Some("not found".to_string()));
        assert_eq!(value, None);
        assert_eq!(status, StatusCondition::Error);
    }

    #[tokio::test]
    async fn test_teardown_in_latest_mode_retires_request() {
        let sequencer = Sequencer::with_config(SequencerConfig::latest());
        let (a, reply_a) = controlled(&sequencer);

        assert!(sequencer.teardown(a.id()));
        assert_eq!(sequencer.status(), StatusCondition::Initial);

        reply_a.send(Ok(1)).unwrap();
        let mut a = a.into_future();
        assert!((&mut a).now_or_never().is_none());
        assert_eq!(sequencer.snapshot(), Snapshot::default());
    }

    #[tokio::test]
    async fn test_teardown_in_every_mode_lets_requests_race() {
        let sequencer = Sequencer::with_config(SequencerConfig::every());
        let (a, reply_a) = controlled(&sequencer);
        let (b, reply_b) = controlled(&sequencer);

        assert!(!sequencer.teardown(a.id()));
        assert!(!sequencer.teardown(b.id()));
        assert_eq!(sequencer.status(), StatusCondition::Pending);

        reply_a.send(Ok(1)).unwrap();
        assert_eq!(a.await, Outcome::Success(1));
        reply_b.send(Ok(2)).unwrap();
        assert_eq!(b.await, Outcome::Success(2));

        assert_eq!(sequencer.snapshot().value, Some(2));
        assert_eq!(sequencer.status(), StatusCondition::Success);
    }

    #[tokio::test]
    async fn test_reset_suppresses_in_flight_requests() {
        let sequencer = Sequencer::new();
        let (a, reply_a) = controlled(&sequencer);

        sequencer.reset();
        reply_a.send(Ok(1)).unwrap();

        let mut a = a.into_future();
        assert!((&mut a).now_or_never().is_none());
        assert_eq!(sequencer.snapshot(), Snapshot::default());
    }

    #[tokio::test]
    async fn test_reset_detach_lets_late_result_be_ignored() {
        let sequencer =
            Sequencer::with_config(SequencerConfig::new().with_reset_policy(ResetPolicy::Detach));
        let (a, reply_a) = controlled(&sequencer);

        sequencer.reset();
        reply_a.send(Ok(1)).unwrap();

        // The operation still settles, but its completion no longer matches a queued entry.
        assert_eq!(a.await, Outcome::Success(1));
        assert_eq!(sequencer.snapshot(), Snapshot::default());
    }

    #[tokio::test]
    async fn test_replace_resets_without_source() {
        let sequencer: Sequencer<i32, String> = Sequencer::new();
        let submission = sequencer
            .replace(Some(|| future::ready(Ok(3))))
            .unwrap()
            .expect("a source should submit a request");
        assert_eq!(submission.await, Outcome::Success(3));
        assert_eq!(sequencer.status(), StatusCondition::Success);

        let none = sequencer
            .replace(None::<fn() -> future::Ready<Result<i32, String>>>)
            .unwrap();
        assert!(none.is_none());
        assert_eq!(sequencer.snapshot(), Snapshot::default());
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let sequencer = Sequencer::new();
        let mut snapshots = sequencer.subscribe();
        assert_eq!(snapshots.borrow().status, StatusCondition::Initial);

        let (a, reply_a) = controlled(&sequencer);
        assert!(snapshots.has_changed().unwrap());
        assert_eq!(snapshots.borrow_and_update().status, StatusCondition::Pending);

        reply_a.send(Ok(8)).unwrap();
        let _ = a.await;
        snapshots.changed().await.unwrap();
        let latest = snapshots.borrow_and_update().clone();
        assert_eq!(latest.status, StatusCondition::Success);
        assert_eq!(latest.value, Some(8));
    }

    #[tokio::test]
    async fn test_cancel_hook_runs_on_teardown() {
        let sequencer: Sequencer<i32, String> = Sequencer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = calls.clone();

        let submission = sequencer
            .submit_with_cancel_hook(future::pending, move |_| {
                hook_calls.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        sequencer.teardown(submission.id());
        sequencer.teardown(submission.id());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sequencer.status(), StatusCondition::Initial);
    }

    #[test]
    fn test_starter_may_read_sequencer_state() {
        let sequencer: Sequencer<i32, String> = Sequencer::new();
        let observer = sequencer.clone();
        let (tx, rx) = std::sync::mpsc::channel();

        // A starter invoked under the queue lock would block this thread forever.
        std::thread::spawn(move || {
            let _submission = sequencer.submit(move || {
                let _ = tx.send(observer.status());
                future::pending()
            });
        });

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)),
            Ok(StatusCondition::Pending)
        );
    }

    #[tokio::test]
    async fn test_track_rejects_started_operation() {
        let sequencer: Sequencer<i32, String> = Sequencer::new();
        let mut op = CancelableOperation::new(|| future::ready(Ok(1)));
        let _started = op.start().unwrap();
        let id = op.id();

        assert_eq!(
            sequencer.track(op).err(),
            Some(SequencerError::AlreadyStarted(id))
        );
        assert_eq!(sequencer.status(), StatusCondition::Initial);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawned_requests_settle_to_latest() {
        let sequencer: Sequencer<&'static str, String> = Sequencer::new();

        let slow = sequencer
            .submit(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok("slow")
            })
            .unwrap();
        let fast = sequencer.submit(|| async { Ok("fast") }).unwrap();

        let slow = tokio::spawn(slow.into_future());
        let fast = tokio::spawn(fast.into_future());

        assert_eq!(fast.await.unwrap(), Outcome::Success("fast"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!slow.is_finished());
        slow.abort();

        assert_eq!(sequencer.snapshot().value, Some("fast"));
        assert_eq!(sequencer.status(), StatusCondition::Success);
    }
}
