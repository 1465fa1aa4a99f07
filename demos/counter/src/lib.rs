//! # Counter Example
//!
//! A counter feature demonstrating the Reducer Kit architecture.
//!
//! This example showcases:
//! - A pure state machine (no effects)
//! - Dependency injection through the environment (a [`Clock`])
//! - Store usage and state queries
//! - Exhaustive testing with `TestStore`
//!
//! ## Example
//!
//! ```
//! use counter::{CounterAction, CounterEnvironment, CounterReducer, CounterState};
//! use reducer_kit_runtime::Store;
//! use reducer_kit_testing::test_clock;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let env = CounterEnvironment::new(Arc::new(test_clock()));
//! let store = Store::new(CounterState::default(), CounterReducer, env);
//!
//! let _ = store.send(CounterAction::Increment).await;
//! let count = store.state(|s| s.count).await;
//! assert_eq!(count, 1);
//! # });
//! ```

use chrono::{DateTime, Utc};
use reducer_kit_core::{effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec};
use std::sync::Arc;

/// Counter state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterState {
    /// Current count value
    pub count: i64,
    /// When the count last changed
    pub last_changed: Option<DateTime<Utc>>,
}

/// Counter actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterAction {
    /// Increment the counter by 1
    Increment,
    /// Decrement the counter by 1
    Decrement,
    /// Add an arbitrary amount
    Add(i64),
    /// Reset the counter to 0
    Reset,
}

/// Counter environment
///
/// Only a clock, used to stamp changes. Reading the clock keeps the reducer
/// deterministic as long as tests inject a `TestClock`.
#[derive(Clone)]
pub struct CounterEnvironment {
    /// Clock for change timestamps
    pub clock: Arc<dyn Clock>,
}

impl CounterEnvironment {
    /// Create a new counter environment with the given clock
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl std::fmt::Debug for CounterEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterEnvironment")
            .field("now", &self.clock.now())
            .finish()
    }
}

/// Counter reducer
///
/// Pure: every action only changes state and no effect is returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterReducer;

impl Reducer for CounterReducer {
    type State = CounterState;
    type Action = CounterAction;
    type Environment = CounterEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let previous = state.count;
        match action {
            CounterAction::Increment => state.count = state.count.saturating_add(1),
            CounterAction::Decrement => state.count = state.count.saturating_sub(1),
            CounterAction::Add(amount) => state.count = state.count.saturating_add(amount),
            CounterAction::Reset => state.count = 0,
        }

        if state.count != previous {
            state.last_changed = Some(env.clock.now());
        }
        smallvec![]
    }
}
