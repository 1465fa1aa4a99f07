//! Counter example binary
//!
//! Drives the counter feature through a real store on the system clock.

use counter::{CounterAction, CounterEnvironment, CounterReducer, CounterState};
use reducer_kit_core::SystemClock;
use reducer_kit_runtime::Store;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter=debug,reducer_kit_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Counter Example ===\n");

    let env = CounterEnvironment::new(Arc::new(SystemClock));
    let store = Store::new(CounterState::default(), CounterReducer, env);

    let script = [
        CounterAction::Increment,
        CounterAction::Increment,
        CounterAction::Add(40),
        CounterAction::Decrement,
        CounterAction::Reset,
    ];

    for action in script {
        println!(">>> Sending: {action:?}");
        if let Err(error) = store.send(action).await {
            tracing::error!(%error, "Store rejected action");
            return;
        }
        let state = store.snapshot().await;
        println!("    count = {} (last changed: {:?})", state.count, state.last_changed);
    }

    if let Err(error) = store.shutdown_with_default_timeout().await {
        tracing::error!(%error, "Shutdown failed");
    }
}
