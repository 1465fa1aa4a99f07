//! Search example binary
//!
//! Types a query one keystroke at a time, faster than the debounce window,
//! so only the final query reaches the backend.

use reducer_kit_core::SystemClock;
use reducer_kit_runtime::Store;
use search::{InMemorySearchClient, SearchAction, SearchEnvironment, SearchReducer, SearchState};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const WORDS: [&str; 8] = [
    "reducer", "redux", "ready", "rust", "runtime", "ruby", "store", "stream",
];

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "search=debug,reducer_kit_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Search Example ===\n");

    let env = SearchEnvironment::new(
        Arc::new(SystemClock),
        Arc::new(InMemorySearchClient::new(WORDS)),
    );
    let store = Store::new(SearchState::default(), SearchReducer, env);
    let mut responses = store.subscribe_actions();

    let mut query = String::new();
    for ch in "re".chars() {
        query.push(ch);
        println!(">>> Typed: {query:?}");
        if let Err(error) = store.send(SearchAction::QueryChanged(query.clone())).await {
            tracing::error!(%error, "Store rejected action");
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    match tokio::time::timeout(Duration::from_secs(2), responses.recv()).await {
        Ok(Ok(action)) => println!("<<< Received: {action:?}"),
        Ok(Err(error)) => tracing::warn!(%error, "Action stream closed"),
        Err(_) => tracing::warn!("No search response within 2s"),
    }

    let state = store.snapshot().await;
    println!("    results for {:?}: {:?}", state.query, state.results);

    if let Err(error) = store.shutdown_with_default_timeout().await {
        tracing::error!(%error, "Shutdown failed");
    }
}
