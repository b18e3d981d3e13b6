//! Cancelable operations
//!
//! A [`CancelableOperation`] wraps a zero-argument starter. Starting it yields a future
//! that settles with the starter's outcome, unless the operation was canceled before
//! that outcome was observed. A canceled future never settles. Cancellation never stops
//! the underlying work, it only keeps the result from reaching anyone.

use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;
use uuid::Uuid;

use crate::error::{SequencerError, SequencerResult};

/// Unique identifier for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    /// Generate a new unique operation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The future returned by [`CancelableOperation::start`]
pub type OperationFuture<T, E> = BoxFuture<'static, Result<T, E>>;

/// The raw, unwrapped future of a started operation, as handed to a cancel hook
pub type RawOperation<T, E> = Shared<OperationFuture<T, E>>;

/// A caller-provided cancellation mechanism, invoked with the raw operation
pub type CancelHook<T, E> = Box<dyn FnOnce(RawOperation<T, E>) + Send>;

type Starter<T, E> = Box<dyn FnOnce() -> OperationFuture<T, E> + Send>;

/// Flag checked by a started operation before it delivers its settlement
#[derive(Debug, Clone, Default)]
pub struct CancelSwitch(Arc<AtomicBool>);

impl CancelSwitch {
    /// Create a switch that has not been tripped
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the switch. Once tripped it stays tripped.
    pub fn trip(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check if the switch has been tripped
    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Hook state shared by an operation and its [`Launch`]
struct HookSlot<T, E> {
    hook: Option<CancelHook<T, E>>,
    /// Set once the launch has run, unless canceled first
    instance: Option<RawOperation<T, E>>,
    canceled: bool,
}

enum Cancellation<T, E> {
    /// Suppress delivery of the settlement
    Suppress(CancelSwitch),
    /// Delegate to a caller-provided hook
    Hook(Arc<Mutex<HookSlot<T, E>>>),
}

impl<T, E> Clone for Cancellation<T, E> {
    fn clone(&self) -> Self {
        match self {
            Cancellation::Suppress(switch) => Cancellation::Suppress(switch.clone()),
            Cancellation::Hook(slot) => Cancellation::Hook(slot.clone()),
        }
    }
}

/// One unit of asynchronous work tracked by the sequencer
pub struct CancelableOperation<T, E> {
    id: OperationId,
    starter: Option<Starter<T, E>>,
    canceled: bool,
    cancellation: Cancellation<T, E>,
}

impl<T, E> CancelableOperation<T, E> {
    /// The stable identity of this operation
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Check if the starter has already been taken
    pub fn is_started(&self) -> bool {
        self.starter.is_none()
    }

    /// Check if the operation has been canceled
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Check if cancellation is delegated to a caller-provided hook
    pub fn has_cancel_hook(&self) -> bool {
        matches!(self.cancellation, Cancellation::Hook(_))
    }
}

impl<T, E> CancelableOperation<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wrap a starter whose settlement is suppressed once canceled
    pub fn new<F, Fut>(starter: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::with_cancellation(starter, Cancellation::Suppress(CancelSwitch::new()))
    }

    /// Wrap a starter whose cancellation is delegated to `hook`.
    ///
    /// In this mode [`start`](Self::start) returns the raw future without any
    /// suppression, and [`cancel`](Self::cancel) calls `hook` with the raw instance
    /// instead. If the operation is canceled before it is started, the hook runs as soon
    /// as the instance exists.
    pub fn with_cancel_hook<F, Fut, H>(starter: F, hook: H) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        H: FnOnce(RawOperation<T, E>) + Send + 'static,
    {
        let slot = HookSlot {
            hook: Some(Box::new(hook)),
            instance: None,
            canceled: false,
        };
        Self::with_cancellation(starter, Cancellation::Hook(Arc::new(Mutex::new(slot))))
    }

    fn with_cancellation<F, Fut>(starter: F, cancellation: Cancellation<T, E>) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            id: OperationId::new(),
            starter: Some(Box::new(move || starter().boxed())),
            canceled: false,
            cancellation,
        }
    }

    /// Invoke the starter and return a future for its outcome.
    ///
    /// The starter runs exactly once; a second call is a misuse and fails with
    /// [`SequencerError::AlreadyStarted`].
    pub fn start(&mut self) -> SequencerResult<OperationFuture<T, E>> {
        Ok(self.launch()?.run())
    }

    /// Take the starter out without invoking it yet.
    ///
    /// The returned [`Launch`] invokes it later, so the caller can release whatever lock
    /// guards this operation first. A cancel issued in between is still honored.
    pub fn launch(&mut self) -> SequencerResult<Launch<T, E>> {
        let starter = self
            .starter
            .take()
            .ok_or(SequencerError::AlreadyStarted(self.id))?;
        Ok(Launch {
            id: self.id,
            starter,
            cancellation: self.cancellation.clone(),
        })
    }

    /// Mark the operation as canceled. Repeated calls have no further effect.
    pub fn cancel(&mut self) {
        if self.canceled {
            return;
        }
        self.canceled = true;
        trace!(operation = %self.id, "canceled operation");

        match &self.cancellation {
            Cancellation::Suppress(switch) => switch.trip(),
            Cancellation::Hook(slot) => {
                let pending = {
                    let mut slot = slot.lock();
                    slot.canceled = true;
                    match slot.instance.take() {
                        Some(instance) => slot.hook.take().map(|hook| (hook, instance)),
                        None => None,
                    }
                };
                if let Some((hook, instance)) = pending {
                    hook(instance);
                }
            }
        }
    }
}

/// An operation whose starter has been taken but not yet invoked
pub struct Launch<T, E> {
    id: OperationId,
    starter: Starter<T, E>,
    cancellation: Cancellation<T, E>,
}

impl<T, E> Launch<T, E> {
    /// Identity of the operation this launch belongs to
    pub fn id(&self) -> OperationId {
        self.id
    }
}

impl<T, E> Launch<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Invoke the starter and return a future for its outcome
    pub fn run(self) -> OperationFuture<T, E> {
        let raw = (self.starter)();
        trace!(operation = %self.id, "started operation");

        match self.cancellation {
            Cancellation::Suppress(switch) => async move {
                let settled = raw.await;
                if switch.is_tripped() {
                    return future::pending::<Result<T, E>>().await;
                }
                settled
            }
            .boxed(),
            Cancellation::Hook(slot) => {
                let raw = raw.shared();
                let hook = {
                    let mut slot = slot.lock();
                    if slot.canceled {
                        slot.hook.take()
                    } else {
                        slot.instance = Some(raw.clone());
                        None
                    }
                };
                if let Some(hook) = hook {
                    hook(raw.clone());
                }
                raw.boxed()
            }
        }
    }
}

impl<T, E> Debug for Launch<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Launch").field("id", &self.id).finish()
    }
}

impl<T, E> Debug for CancelableOperation<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelableOperation")
            .field("id", &self.id)
            .field("started", &self.starter.is_none())
            .field("canceled", &self.canceled)
            .field("cancel_hook", &matches!(self.cancellation, Cancellation::Hook(_)))
            .finish()
    }
}
