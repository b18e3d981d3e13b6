//! Request Sequencer - latest-result-wins coordination for async requests
//!
//! When a newer request can start before an older one has settled (search as you
//! type, refetching on input change), naive code lets whichever finishes last overwrite
//! the result, even if it is stale. This crate keeps a single consistent result slot:
//!
//! - Every submitted request becomes a [`CancelableOperation`], whose settlement can be
//!   suppressed without stopping the underlying work
//! - A [`RequestQueue`] tracks operations in submission order. When one completes, every
//!   older operation is canceled and retired, so it can never overwrite the newer result
//! - [`project`] derives an `(error, value, status)` view, where a pending request always
//!   reports [`StatusCondition::Pending`]
//! - A [`Sequencer`] wires the above together for drivers running on an async runtime
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use request_sequencer::{Outcome, Sequencer, SequencerError, StatusCondition};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SequencerError> {
//!     let sequencer: Sequencer<String, String> = Sequencer::new();
//!
//!     let slow = sequencer.submit(|| async {
//!         tokio::time::sleep(Duration::from_millis(50)).await;
//!         Ok("stale".to_string())
//!     })?;
//!     let fast = sequencer.submit(|| async { Ok("fresh".to_string()) })?;
//!
//!     assert_eq!(fast.await, Outcome::Success("fresh".to_string()));
//!
//!     // `slow` was submitted earlier and has been retired; awaiting it would never finish.
//!     drop(slow);
//!     let snapshot = sequencer.snapshot();
//!     assert_eq!(snapshot.value.as_deref(), Some("fresh"));
//!     assert_eq!(snapshot.status, StatusCondition::Success);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod operation;
pub mod queue;
pub mod sequencer;
pub mod status;

pub use config::{Mode, ResetPolicy, SequencerConfig};
pub use error::{SequencerError, SequencerResult};
pub use operation::{
    CancelHook, CancelSwitch, CancelableOperation, Launch, OperationFuture, OperationId,
    RawOperation,
};
pub use queue::{Outcome, RequestQueue, Transition};
pub use sequencer::{Sequencer, Submission};
pub use status::{project, Projection, Snapshot, StatusCondition};
