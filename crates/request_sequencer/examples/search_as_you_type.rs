//! Search-as-you-type example
//!
//! Simulates a user typing a query one keystroke at a time. Every keystroke fires a
//! lookup, and shorter queries take longer to answer, so responses arrive out of order.
//! Only the freshest response ends up in the result slot.

use std::future::IntoFuture;
use std::time::Duration;

use request_sequencer::{Outcome, Sequencer, SequencerConfig, StatusCondition};

const WORDS: &[&str] = &["ruby", "runtime", "rust", "rustacean", "rusty"];

/// A fake backend lookup: short prefixes match more words and are slower
async fn lookup(query: String) -> Result<Vec<String>, String> {
    let latency = Duration::from_millis(200 / query.len() as u64);
    tokio::time::sleep(latency).await;

    Ok(WORDS
        .iter()
        .filter(|word| word.starts_with(&query))
        .map(|word| word.to_string())
        .collect())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("=== Search As You Type ===\n");

    let sequencer: Sequencer<Vec<String>, String> =
        Sequencer::with_config(SequencerConfig::latest().with_name("search"));

    let mut updates = sequencer.subscribe();
    let watcher = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            println!("  -> {} {:?}", snapshot.status, snapshot.value);
        }
    });

    let mut handles = Vec::new();
    let typed = "rust";
    for end in 1..=typed.len() {
        let query = typed[..end].to_string();
        println!("typed {:?}", query);

        let submission = sequencer.submit(move || lookup(query))?;
        handles.push(tokio::spawn(submission.into_future()));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // The last keystroke is never superseded, so its lookup always lands.
    let latest = handles.pop().expect("at least one keystroke").await?;
    if let Outcome::Success(words) = &latest {
        println!("\nlatest response: {:?}", words);
    }

    // Superseded lookups never resolve; stop waiting on them.
    for handle in handles {
        handle.abort();
    }

    let snapshot = sequencer.snapshot();
    assert_eq!(snapshot.status, StatusCondition::Success);
    println!("final result: {:?}", snapshot.value);

    watcher.abort();
    Ok(())
}
