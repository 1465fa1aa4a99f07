//! Todos example binary
//!
//! Adds a few rows, toggles two of them, deletes one before its save lands,
//! then prints the list once the debounced sort has run.

use reducer_kit_core::SystemClock;
use reducer_kit_runtime::Store;
use std::sync::Arc;
use std::time::Duration;
use todos::{SORT_DEBOUNCE, TodoAction, TodosAction, TodosEnvironment, TodosState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todos=debug,reducer_kit_core=debug,reducer_kit_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Todos Example ===\n");

    let env = TodosEnvironment::new(Arc::new(SystemClock));
    let store = Store::new(TodosState::default(), todos::reducer(), env);

    let script = [
        TodosAction::Add("Buy milk".into()),
        TodosAction::Add("Walk the dog".into()),
        TodosAction::Add("Read a book".into()),
        TodosAction::Todo(0, TodoAction::ToggleCompleted),
        TodosAction::Todo(1, TodoAction::ToggleCompleted),
        TodosAction::Delete(1),
    ];

    for action in script {
        println!(">>> Sending: {action:?}");
        if let Err(error) = store.send(action).await {
            tracing::error!(%error, "Store rejected action");
            return;
        }
    }

    tokio::time::sleep(SORT_DEBOUNCE + Duration::from_millis(100)).await;

    for todo in store.state(|s| s.todos.clone()).await {
        let mark = if todo.is_complete { "x" } else { " " };
        println!("    [{mark}] {} {}", todo.id, todo.title);
    }

    if let Err(error) = store.shutdown_with_default_timeout().await {
        tracing::error!(%error, "Shutdown failed");
    }
}
