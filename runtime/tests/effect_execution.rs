//! Integration tests for effect execution against a virtual clock
//!
//! Every time-based effect here runs on a `TestClock`, so the tests only
//! advance time explicitly and never wait on wall-clock delays.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic
#![allow(missing_docs)]

use reducer_kit_core::{Clock, Effect, EffectId, Reducer, SmallVec, smallvec};
use reducer_kit_runtime::{Store, StoreConfig};
use reducer_kit_testing::helpers::settle;
use reducer_kit_testing::{TestClock, test_clock};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
enum Action {
    Stream(Vec<u32>),
    Item(u32),
    Finished,
    Fetch { fail: bool },
    Loaded(u32),
    Failed(String),
    Ping,
    Slow { limit: Duration },
    SlowDone,
    Scroll(u32),
    Scrolled(u32),
    StopScrolling,
    Search(String),
    Searched(String),
    Type(u32),
    Typed(u32),
    Remind,
    Reminder,
    StopAll,
}

#[derive(Clone, Debug, Default)]
struct State {
    log: Vec<Action>,
}

struct Env {
    clock: Arc<dyn Clock>,
}

struct Feature;

fn scroll_id() -> EffectId {
    EffectId::new("scroll")
}

fn search_id() -> EffectId {
    EffectId::new("search")
}

impl Reducer for Feature {
    type State = State;
    type Action = Action;
    type Environment = Env;

    fn reduce(&self, state: &mut State, action: Action, env: &Env) -> SmallVec<[Effect<Action>; 4]> {
        state.log.push(action.clone());
        let clock = Arc::clone(&env.clock);

        match action {
            Action::Stream(items) => smallvec![Effect::run(move |send| async move {
                for item in items {
                    let _ = send.send(Action::Item(item));
                }
                let _ = send.send(Action::Finished);
            })],
            Action::Fetch { fail } => smallvec![Effect::try_run(
                move |send| async move {
                    if fail {
                        return Err("connection refused".to_owned());
                    }
                    let _ = send.send(Action::Loaded(7));
                    Ok(())
                },
                |error, send| {
                    let _ = send.send(Action::Failed(error));
                },
            )],
            Action::Ping => smallvec![Effect::send(42_u32).map(Action::Loaded)],
            Action::Slow { limit } => {
                let work = Arc::clone(&clock);
                smallvec![
                    Effect::run(move |send| async move {
                        work.sleep(Duration::from_secs(10)).await;
                        let _ = send.send(Action::SlowDone);
                    })
                    .timeout(limit, clock)
                ]
            },
            Action::Scroll(offset) => smallvec![Effect::send(Action::Scrolled(offset)).throttle(
                scroll_id(),
                Duration::from_secs(1),
                clock,
                true,
            )],
            Action::StopScrolling => smallvec![Effect::cancel(scroll_id())],
            Action::Search(query) => smallvec![Effect::send(Action::Searched(query)).debounce(
                search_id(),
                Duration::from_millis(300),
                clock,
            )],
            Action::Type(key) => smallvec![Effect::send(Action::Typed(key)).debounce(
                EffectId::new("typing"),
                Duration::from_secs(5),
                clock,
            )],
            Action::Remind => smallvec![Effect::delay(Duration::from_secs(5), Action::Reminder)],
            Action::StopAll => smallvec![Effect::cancel_all()],
            Action::Item(_)
            | Action::Finished
            | Action::Loaded(_)
            | Action::Failed(_)
            | Action::SlowDone
            | Action::Scrolled(_)
            | Action::Searched(_)
            | Action::Typed(_)
            | Action::Reminder => smallvec![],
        }
    }
}

fn store_on(clock: &TestClock) -> Store<State, Action, Env, Feature> {
    let clock: Arc<dyn Clock> = Arc::new(clock.clone());
    Store::with_config(
        State::default(),
        Feature,
        Env {
            clock: Arc::clone(&clock),
        },
        StoreConfig::default().with_clock(clock),
    )
}

async fn log(store: &Store<State, Action, Env, Feature>) -> Vec<Action> {
    store.state(|s| s.log.clone()).await
}

#[tokio::test]
async fn test_run_emits_actions_in_order() {
    let store = store_on(&test_clock());

    let mut handle = store.send(Action::Stream(vec![1, 2, 3])).await.unwrap();
    handle.wait().await;

    assert_eq!(
        log(&store).await,
        vec![
            Action::Stream(vec![1, 2, 3]),
            Action::Item(1),
            Action::Item(2),
            Action::Item(3),
            Action::Finished,
        ]
    );
}

#[tokio::test]
async fn test_try_run_turns_failure_into_action() {
    let store = store_on(&test_clock());

    let mut ok = store.send(Action::Fetch { fail: false }).await.unwrap();
    ok.wait().await;
    let mut failed = store.send(Action::Fetch { fail: true }).await.unwrap();
    failed.wait().await;

    let log = log(&store).await;
    assert!(log.contains(&Action::Loaded(7)));
    assert!(log.contains(&Action::Failed("connection refused".to_owned())));
}

#[tokio::test]
async fn test_mapped_effect_embeds_action() {
    let store = store_on(&test_clock());

    let mut handle = store.send(Action::Ping).await.unwrap();
    handle.wait().await;

    assert_eq!(log(&store).await, vec![Action::Ping, Action::Loaded(42)]);
}

#[tokio::test]
async fn test_delay_waits_for_store_clock() {
    let clock = test_clock();
    let store = store_on(&clock);

    store.send(Action::Remind).await.unwrap();
    clock.advance(Duration::from_secs(4)).await;
    assert!(!log(&store).await.contains(&Action::Reminder));

    clock.advance(Duration::from_secs(1)).await;
    assert_eq!(log(&store).await, vec![Action::Remind, Action::Reminder]);
}

#[tokio::test]
async fn test_timeout_cancels_slow_effect() {
    let clock = test_clock();
    let store = store_on(&clock);

    store
        .send(Action::Slow {
            limit: Duration::from_secs(1),
        })
        .await
        .unwrap();
    clock.advance(Duration::from_secs(1)).await;
    clock.run().await;

    assert!(!log(&store).await.contains(&Action::SlowDone));
    assert_eq!(store.pending_effects(), 0);
}

#[tokio::test]
async fn test_timeout_is_disarmed_when_effect_finishes() {
    let clock = test_clock();
    let store = store_on(&clock);

    store
        .send(Action::Slow {
            limit: Duration::from_secs(60),
        })
        .await
        .unwrap();
    clock.advance(Duration::from_secs(10)).await;

    assert!(log(&store).await.contains(&Action::SlowDone));
    settle().await;
    assert_eq!(clock.pending_sleepers(), 0);
    assert_eq!(store.pending_effects(), 0);
}

#[tokio::test]
async fn test_throttle_emits_first_and_latest() {
    let clock = test_clock();
    let store = store_on(&clock);

    for offset in 1..=3 {
        store.send(Action::Scroll(offset)).await.unwrap();
        settle().await;
    }
    let scrolled = |log: Vec<Action>| {
        log.into_iter()
            .filter(|a| matches!(a, Action::Scrolled(_)))
            .collect::<Vec<_>>()
    };
    assert_eq!(scrolled(log(&store).await), vec![Action::Scrolled(1)]);

    clock.advance(Duration::from_secs(1)).await;
    assert_eq!(
        scrolled(log(&store).await),
        vec![Action::Scrolled(1), Action::Scrolled(3)]
    );

    // A quiet window emits immediately again.
    clock.advance(Duration::from_secs(1)).await;
    store.send(Action::Scroll(4)).await.unwrap();
    settle().await;
    assert_eq!(scrolled(log(&store).await).last(), Some(&Action::Scrolled(4)));
}

#[tokio::test]
async fn test_throttle_flushes_latest_at_window_end() {
    let clock = test_clock();
    let store = store_on(&clock);
    let scrolled = |log: Vec<Action>| {
        log.into_iter()
            .filter(|a| matches!(a, Action::Scrolled(_)))
            .collect::<Vec<_>>()
    };

    store.send(Action::Scroll(1)).await.unwrap();
    clock.advance(Duration::from_millis(250)).await;
    store.send(Action::Scroll(2)).await.unwrap();
    clock.advance(Duration::from_millis(500)).await;
    store.send(Action::Scroll(3)).await.unwrap();

    clock.advance(Duration::from_millis(249)).await;
    assert_eq!(scrolled(log(&store).await), vec![Action::Scrolled(1)]);

    clock.advance(Duration::from_millis(1)).await;
    assert_eq!(
        scrolled(log(&store).await),
        vec![Action::Scrolled(1), Action::Scrolled(3)]
    );
}

#[tokio::test]
async fn test_cancelling_throttle_discards_buffered_action() {
    let clock = test_clock();
    let store = store_on(&clock);

    store.send(Action::Scroll(1)).await.unwrap();
    settle().await;
    store.send(Action::Scroll(2)).await.unwrap();
    settle().await;
    store.send(Action::StopScrolling).await.unwrap();

    clock.run().await;
    assert!(!log(&store).await.contains(&Action::Scrolled(2)));
    assert_eq!(store.pending_effects(), 0);
}

#[tokio::test]
async fn test_debounce_keeps_last_query() {
    let clock = test_clock();
    let store = store_on(&clock);

    store.send(Action::Search("r".into())).await.unwrap();
    clock.advance(Duration::from_millis(100)).await;
    store.send(Action::Search("ru".into())).await.unwrap();
    clock.advance(Duration::from_millis(100)).await;
    store.send(Action::Search("rust".into())).await.unwrap();

    clock.advance(Duration::from_millis(300)).await;

    let searched: Vec<_> = log(&store)
        .await
        .into_iter()
        .filter(|a| matches!(a, Action::Searched(_)))
        .collect();
    assert_eq!(searched, vec![Action::Searched("rust".into())]);
}

#[tokio::test]
async fn test_debounce_fires_once_after_last_input() {
    let clock = test_clock();
    let store = store_on(&clock);
    let typed = |log: Vec<Action>| {
        log.into_iter()
            .filter(|a| matches!(a, Action::Typed(_)))
            .collect::<Vec<_>>()
    };

    for key in 1..=3 {
        if key > 1 {
            clock.advance(Duration::from_secs(1)).await;
        }
        store.send(Action::Type(key)).await.unwrap();
    }

    // Last input at 2s, so nothing before 7s.
    clock.advance(Duration::from_millis(4999)).await;
    assert!(typed(log(&store).await).is_empty());

    clock.advance(Duration::from_millis(1)).await;
    assert_eq!(typed(log(&store).await), vec![Action::Typed(3)]);

    clock.run().await;
    assert_eq!(typed(log(&store).await), vec![Action::Typed(3)]);
}

#[tokio::test]
async fn test_cancel_all_stops_identified_effects_only() {
    let clock = test_clock();
    let store = store_on(&clock);

    store.send(Action::Search("rust".into())).await.unwrap();
    store.send(Action::Remind).await.unwrap();
    store.send(Action::StopAll).await.unwrap();

    clock.run().await;

    let log = log(&store).await;
    assert!(!log.iter().any(|a| matches!(a, Action::Searched(_))));
    assert!(log.contains(&Action::Reminder));
    assert!(store.registry().is_empty());
}

#[tokio::test]
async fn test_cancel_in_flight_effects_stops_everything() {
    let clock = test_clock();
    let store = store_on(&clock);

    store.send(Action::Search("rust".into())).await.unwrap();
    store.send(Action::Remind).await.unwrap();
    settle().await;
    store.cancel_in_flight_effects();

    clock.run().await;

    assert_eq!(
        log(&store).await,
        vec![Action::Search("rust".into()), Action::Remind]
    );
    assert_eq!(store.pending_effects(), 0);
}
