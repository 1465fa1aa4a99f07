//! Integration tests for Counter with Store and TestStore

#![allow(clippy::unwrap_used, clippy::panic)] // Tests are allowed to panic on failures
#![allow(missing_docs)]

use counter::{CounterAction, CounterEnvironment, CounterReducer, CounterState};
use proptest::prelude::*;
use reducer_kit_core::diagnostics::{CollectingReporter, IssueKind, Severity};
use reducer_kit_runtime::Store;
use reducer_kit_testing::properties::{action_sequence, reduce_all};
use reducer_kit_testing::{TestStore, test_clock, test_epoch};
use std::sync::Arc;
use std::time::Duration;

fn env() -> CounterEnvironment {
    CounterEnvironment::new(Arc::new(test_clock()))
}

#[tokio::test]
async fn test_counter_with_test_store() {
    let mut store = TestStore::new(CounterState::default(), CounterReducer, env());

    store
        .send(CounterAction::Increment, |s| {
            s.count = 1;
            s.last_changed = Some(test_epoch());
        })
        .await;
    store.send(CounterAction::Add(41), |s| s.count = 42).await;
    store.send(CounterAction::Decrement, |s| s.count = 41).await;
    store.send(CounterAction::Reset, |s| s.count = 0).await;
    store.send_unchanged(CounterAction::Reset).await;

    store.finish().await;
}

#[tokio::test]
async fn test_change_timestamps_follow_the_clock() {
    let clock = test_clock();
    let mut store = TestStore::new(
        CounterState::default(),
        CounterReducer,
        CounterEnvironment::new(Arc::new(clock.clone())),
    );

    store
        .send(CounterAction::Increment, |s| {
            s.count = 1;
            s.last_changed = Some(test_epoch());
        })
        .await;

    clock.advance(Duration::from_secs(60)).await;
    store
        .send(CounterAction::Increment, |s| {
            s.count = 2;
            s.last_changed = Some(test_epoch() + chrono::Duration::seconds(60));
        })
        .await;

    store.finish().await;
}

#[tokio::test]
async fn test_unexpected_change_is_a_state_mismatch() {
    let reporter = CollectingReporter::new();
    let mut store = TestStore::new(CounterState::default(), CounterReducer, env()).with_reporter(reporter.clone());

    // Increment changes the count, so claiming nothing changed must fail.
    store.send_unchanged(CounterAction::Increment).await;
    store.finish().await;

    let failures = reporter.with_severity(Severity::Failure);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, IssueKind::StateMismatch);
}

#[tokio::test]
async fn test_concurrent_increments() {
    let store = Store::new(CounterState::default(), CounterReducer, env());

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let _ = store.send(CounterAction::Increment).await;
            })
        })
        .collect();

    for handle in handles {
        if let Err(e) = handle.await {
            panic!("concurrent increment task panicked: {e}");
        }
    }

    assert_eq!(store.state(|s| s.count).await, 10);
}

fn counter_action() -> impl Strategy<Value = CounterAction> {
    prop_oneof![
        Just(CounterAction::Increment),
        Just(CounterAction::Decrement),
        Just(CounterAction::Reset),
        (-1000_i64..1000).prop_map(CounterAction::Add),
    ]
}

proptest! {
    #[test]
    fn store_agrees_with_reducer(actions in action_sequence(counter_action(), 50)) {
        let env = env();
        let expected = reduce_all(&CounterReducer, CounterState::default(), actions.clone(), &env);

        let actual = tokio_test::block_on(async {
            let store = Store::new(CounterState::default(), CounterReducer, env.clone());
            for action in actions {
                store.send(action).await.unwrap();
            }
            store.snapshot().await
        });

        prop_assert_eq!(actual, expected);
    }
}
