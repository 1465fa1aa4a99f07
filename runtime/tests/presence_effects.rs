//! Child effects under `if_let` and `for_each`, run by a real store.
//!
//! A child's effects must never outlive the child they were started for,
//! and children sharing an identifier must not cancel each other.

#![allow(clippy::unwrap_used, clippy::panic)] // Tests are allowed to panic on failures
#![allow(missing_docs)]

use reducer_kit_core::composition::{ActionPrism, Identifiable, Reduce, for_each, if_let};
use reducer_kit_core::{Clock, Effect, EffectId, Reducer, SmallVec, smallvec};
use reducer_kit_runtime::{Store, StoreConfig};
use reducer_kit_testing::{TestClock, test_clock};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
struct Row {
    id: u32,
    ticks: u32,
}

impl Row {
    const fn new(id: u32) -> Self {
        Self { id, ticks: 0 }
    }
}

impl Identifiable for Row {
    type Id = u32;

    fn id(&self) -> u32 {
        self.id
    }
}

#[derive(Clone, Debug, PartialEq)]
enum RowAction {
    Start,
    Tick,
}

struct Env {
    clock: Arc<dyn Clock>,
}

struct RowReducer;

impl Reducer for RowReducer {
    type State = Row;
    type Action = RowAction;
    type Environment = Env;

    fn reduce(&self, row: &mut Row, action: RowAction, env: &Env) -> SmallVec<[Effect<RowAction>; 4]> {
        match action {
            // Every row debounces under the same identifier.
            RowAction::Start => smallvec![Effect::send(RowAction::Tick).debounce(
                EffectId::new("tick"),
                Duration::from_secs(1),
                Arc::clone(&env.clock),
            )],
            RowAction::Tick => {
                row.ticks += 1;
                smallvec![]
            },
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Screen {
    detail: Option<Row>,
    rows: Vec<Row>,
}

#[derive(Clone, Debug, PartialEq)]
enum Action {
    Detail(RowAction),
    Row(u32, RowAction),
    Present(u32),
    Close,
}

fn detail_prism() -> ActionPrism<Action, RowAction> {
    ActionPrism::new(
        |action| match action {
            Action::Detail(a) => Some(a.clone()),
            _ => None,
        },
        Action::Detail,
    )
}

fn row_prism() -> ActionPrism<Action, (u32, RowAction)> {
    ActionPrism::new(
        |action| match action {
            Action::Row(id, a) => Some((*id, a.clone())),
            _ => None,
        },
        |(id, a)| Action::Row(id, a),
    )
}

fn screen() -> impl Reducer<State = Screen, Action = Action, Environment = Env> + Send + Sync + 'static {
    let parent = Reduce::new(|state: &mut Screen, action: Action, _env: &Env| {
        match action {
            Action::Present(id) => state.detail = Some(Row::new(id)),
            Action::Close => state.detail = None,
            Action::Detail(_) | Action::Row(..) => {},
        }
        smallvec![]
    });
    let detail = if_let(parent, RowReducer, "detail", |s: &mut Screen| &mut s.detail, detail_prism())
        .tolerate_missing_state();
    for_each(detail, RowReducer, "rows", |s: &mut Screen| &mut s.rows, row_prism())
}

fn store_on(
    clock: &TestClock,
    state: Screen,
) -> Store<Screen, Action, Env, impl Reducer<State = Screen, Action = Action, Environment = Env> + Send + Sync + 'static>
{
    let clock: Arc<dyn Clock> = Arc::new(clock.clone());
    Store::with_config(
        state,
        screen(),
        Env {
            clock: Arc::clone(&clock),
        },
        StoreConfig::default().with_clock(clock),
    )
}

#[tokio::test]
async fn test_replaced_detail_does_not_receive_old_ticks() {
    let clock = test_clock();
    let store = store_on(&clock, Screen::default());

    store.send(Action::Present(1)).await.unwrap();
    store.send(Action::Detail(RowAction::Start)).await.unwrap();
    clock.settle().await;

    store.send(Action::Present(2)).await.unwrap();
    clock.advance(Duration::from_secs(2)).await;

    assert_eq!(store.state(|s| s.detail.clone()).await, Some(Row::new(2)));
}

#[tokio::test]
async fn test_closing_detail_cancels_its_ticks() {
    let clock = test_clock();
    let store = store_on(&clock, Screen::default());

    store.send(Action::Present(1)).await.unwrap();
    store.send(Action::Detail(RowAction::Start)).await.unwrap();
    store.send(Action::Close).await.unwrap();
    clock.run().await;

    assert_eq!(store.state(|s| s.detail.clone()).await, None);
    assert!(store.registry().is_empty());
}

#[tokio::test]
async fn test_same_detail_keeps_its_ticks() {
    let clock = test_clock();
    let store = store_on(&clock, Screen::default());

    store.send(Action::Present(1)).await.unwrap();
    store.send(Action::Detail(RowAction::Start)).await.unwrap();
    clock.settle().await;

    // Re-presenting the same identity is not a dismissal.
    store.send(Action::Present(1)).await.unwrap();
    clock.advance(Duration::from_secs(1)).await;

    assert_eq!(store.state(|s| s.detail.as_ref().map(|d| d.ticks)).await, Some(1));
}

#[tokio::test]
async fn test_rows_sharing_an_identifier_tick_independently() {
    let clock = test_clock();
    let store = store_on(
        &clock,
        Screen {
            rows: vec![Row::new(1), Row::new(2)],
            ..Screen::default()
        },
    );

    store.send(Action::Row(1, RowAction::Start)).await.unwrap();
    store.send(Action::Row(2, RowAction::Start)).await.unwrap();
    clock.advance(Duration::from_secs(1)).await;

    let ticks = store.state(|s| s.rows.iter().map(|r| r.ticks).collect::<Vec<_>>()).await;
    assert_eq!(ticks, vec![1, 1]);
}

#[tokio::test]
async fn test_restarting_one_row_debounces_only_that_row() {
    let clock = test_clock();
    let store = store_on(
        &clock,
        Screen {
            rows: vec![Row::new(1), Row::new(2)],
            ..Screen::default()
        },
    );

    store.send(Action::Row(1, RowAction::Start)).await.unwrap();
    store.send(Action::Row(2, RowAction::Start)).await.unwrap();
    clock.advance(Duration::from_millis(500)).await;
    store.send(Action::Row(1, RowAction::Start)).await.unwrap();

    clock.advance(Duration::from_millis(500)).await;
    let ticks = store.state(|s| s.rows.iter().map(|r| r.ticks).collect::<Vec<_>>()).await;
    assert_eq!(ticks, vec![0, 1]);

    clock.advance(Duration::from_millis(500)).await;
    let ticks = store.state(|s| s.rows.iter().map(|r| r.ticks).collect::<Vec<_>>()).await;
    assert_eq!(ticks, vec![1, 1]);
}
