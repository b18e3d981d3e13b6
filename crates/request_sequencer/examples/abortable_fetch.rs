//! Cancel hook example
//!
//! By default a retired request keeps running and only its result is ignored. A cancel
//! hook lets the caller stop the work for real. Here each fetch is wrapped with
//! `futures::future::abortable`, and the hook aborts it when the user navigates away.

use std::future::IntoFuture;
use std::time::Duration;

use futures::future;
use request_sequencer::{Outcome, Sequencer, SequencerConfig, StatusCondition, Submission};

async fn fetch_item(id: u32, latency: Duration) -> Result<String, String> {
    tokio::time::sleep(latency).await;
    Ok(format!("item #{id}"))
}

fn open_item(
    sequencer: &Sequencer<String, String>,
    id: u32,
    latency: Duration,
) -> Result<Submission<String, String>, request_sequencer::SequencerError> {
    let (fetch, abort_handle) = future::abortable(fetch_item(id, latency));

    sequencer.submit_with_cancel_hook(
        move || async move {
            fetch
                .await
                .unwrap_or_else(|_| Err(format!("fetch of item #{id} aborted")))
        },
        move |_raw| {
            println!("aborting fetch of item #{id}");
            abort_handle.abort();
        },
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("=== Abortable Fetch ===\n");

    let sequencer = Sequencer::with_config(SequencerConfig::latest().with_name("detail-view"));

    println!("opening item #1 (slow)");
    let first = open_item(&sequencer, 1, Duration::from_secs(5))?;

    println!("navigating to item #2 before item #1 arrived");
    sequencer.teardown(first.id());
    let second = open_item(&sequencer, 2, Duration::from_millis(50))?;

    let first = tokio::spawn(first.into_future());
    let second = tokio::spawn(second.into_future());

    // The aborted fetch settles right away, but it is no longer queued, so its
    // completion does not touch the result slot.
    let first = first.await?;
    println!("item #1 settled with {:?}", first);
    assert!(matches!(first, Outcome::Error(_)));

    let second = second.await?;
    println!("item #2 settled with {:?}", second);

    let snapshot = sequencer.snapshot();
    assert_eq!(snapshot.status, StatusCondition::Success);
    assert_eq!(snapshot.value.as_deref(), Some("item #2"));
    println!("\nshowing: {:?}", snapshot.value);

    Ok(())
}
