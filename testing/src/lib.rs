//! # Reducer Kit Testing
//!
//! Testing utilities and helpers for the Reducer Kit architecture.
//!
//! This crate provides:
//! - [`TestStore`]: drives a store one action at a time and asserts on every
//!   state change and every action effects feed back
//! - [`TestClock`] and [`ImmediateClock`]: deterministic clocks
//! - [`ReducerTest`]: Given/When/Then tests for a single reducer call
//! - Property-based testing utilities
//!
//! ## Example
//!
//! ```ignore
//! use reducer_kit_testing::{test_clock, TestStore};
//!
//! #[tokio::test]
//! async fn search_is_debounced() {
//!     let clock = test_clock();
//!     let mut store = TestStore::new(SearchState::default(), SearchReducer, env(&clock));
//!
//!     store.send(SearchAction::QueryChanged("rust".into()), |s| s.query = "rust".into()).await;
//!     clock.advance(Duration::from_millis(300)).await;
//!     store.receive(SearchAction::Results(vec!["rust".into()]), |s| s.results = vec!["rust".into()]).await;
//!     store.finish().await;
//! }
//! ```

use chrono::{DateTime, Utc};
use reducer_kit_core::environment::Clock;

mod test_store;

pub use reducer_test::{ReducerTest, assertions};
pub use test_store::{Exhaustivity, TestStore, TestStoreTask};

/// Deterministic clocks
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use crate::helpers::settle;
    use futures::future::BoxFuture;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn after(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(duration)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Sleepers are ordered by deadline, then by registration.
    type SleeperKey = (DateTime<Utc>, u64);

    struct ClockState {
        now: DateTime<Utc>,
        next_id: u64,
        sleepers: BTreeMap<SleeperKey, oneshot::Sender<()>>,
    }

    /// Removes a sleeper whose future was dropped before it fired.
    struct SleeperGuard {
        state: Weak<Mutex<ClockState>>,
        key: SleeperKey,
    }

    impl Drop for SleeperGuard {
        fn drop(&mut self) {
            if let Some(state) = self.state.upgrade() {
                lock(&state).sleepers.remove(&self.key);
            }
        }
    }

    /// Manually advanced virtual clock.
    ///
    /// Time only moves when a test calls [`advance`](TestClock::advance) or
    /// [`run`](TestClock::run). Sleepers are registered when `sleep` is
    /// called and fire in deadline order; after each one fires the clock
    /// yields so woken effects can run and register new sleepers.
    ///
    /// Clones share the same timeline.
    ///
    /// # Example
    ///
    /// ```
    /// use reducer_kit_core::environment::Clock;
    /// use reducer_kit_testing::test_clock;
    /// use std::time::Duration;
    ///
    /// # tokio_test::block_on(async {
    /// let clock = test_clock();
    /// let start = clock.now();
    ///
    /// clock.advance(Duration::from_secs(5)).await;
    /// assert_eq!((clock.now() - start).num_seconds(), 5);
    /// # });
    /// ```
    #[derive(Clone)]
    pub struct TestClock {
        state: Arc<Mutex<ClockState>>,
    }

    impl TestClock {
        /// Create a clock stopped at `start`
        #[must_use]
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                state: Arc::new(Mutex::new(ClockState {
                    now: start,
                    next_id: 0,
                    sleepers: BTreeMap::new(),
                })),
            }
        }

        /// Number of sleeps waiting for time to advance
        #[must_use]
        pub fn pending_sleepers(&self) -> usize {
            lock(&self.state).sleepers.len()
        }

        /// Move time forward by `by`, firing every sleeper that falls due.
        pub async fn advance(&self, by: Duration) {
            settle().await;
            let target = after(self.now(), by);

            while let Some(wake) = self.pop_due(Some(target)) {
                let _ = wake.send(());
                settle().await;
            }

            {
                let mut state = lock(&self.state);
                if state.now < target {
                    state.now = target;
                }
            }
            settle().await;
        }

        /// Advance until no sleeper is left.
        pub async fn run(&self) {
            settle().await;
            while let Some(wake) = self.pop_due(None) {
                let _ = wake.send(());
                settle().await;
            }
        }

        /// Let spawned effects run up to their next sleep without moving time.
        pub async fn settle(&self) {
            settle().await;
        }

        /// Pop the earliest sleeper due at or before `target`, moving time
        /// to its deadline.
        fn pop_due(&self, target: Option<DateTime<Utc>>) -> Option<oneshot::Sender<()>> {
            let mut state = lock(&self.state);
            let (deadline, _) = *state.sleepers.first_key_value()?.0;
            if target.is_some_and(|target| deadline > target) {
                return None;
            }

            let (_, wake) = state.sleepers.pop_first()?;
            if state.now < deadline {
                state.now = deadline;
            }
            Some(wake)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            lock(&self.state).now
        }

        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            if duration.is_zero() {
                return Box::pin(std::future::ready(()));
            }

            let (wake, woken) = oneshot::channel();
            let key = {
                let mut state = lock(&self.state);
                let key = (after(state.now, duration), state.next_id);
                state.next_id += 1;
                state.sleepers.insert(key, wake);
                key
            };
            let guard = SleeperGuard {
                state: Arc::downgrade(&self.state),
                key,
            };

            Box::pin(async move {
                let _guard = guard;
                let _ = woken.await;
            })
        }
    }

    impl std::fmt::Debug for TestClock {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let state = lock(&self.state);
            f.debug_struct("TestClock")
                .field("now", &state.now)
                .field("pending_sleepers", &state.sleepers.len())
                .finish()
        }
    }

    /// A clock whose sleeps complete at once.
    ///
    /// Each sleep moves `now` forward by its duration, so code that measures
    /// elapsed time still sees it pass.
    #[derive(Debug, Clone)]
    pub struct ImmediateClock {
        now: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ImmediateClock {
        /// Create a clock starting at `start`
        #[must_use]
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Arc::new(Mutex::new(start)),
            }
        }
    }

    impl Clock for ImmediateClock {
        fn now(&self) -> DateTime<Utc> {
            *lock(&self.now)
        }

        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            let mut now = lock(&self.now);
            *now = after(*now, duration);
            Box::pin(std::future::ready(()))
        }
    }

    /// Start of every test timeline: 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a test clock stopped at [`test_epoch`]
    #[must_use]
    pub fn test_clock() -> TestClock {
        TestClock::new(test_epoch())
    }
}

/// Test helpers and utilities
pub mod helpers {
    /// Scheduler yields per [`settle`] call.
    const SETTLE_YIELDS: usize = 64;

    /// Yield to the runtime until spawned effect tasks have had a chance to
    /// make progress.
    ///
    /// Deterministic on the current-thread runtime used by `#[tokio::test]`.
    pub async fn settle() {
        for _ in 0..SETTLE_YIELDS {
            tokio::task::yield_now().await;
        }
    }

    /// Install a `tracing` subscriber that honours `RUST_LOG`.
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::strategy::Strategy;
    use reducer_kit_core::reducer::Reducer;

    /// Sequences of up to `max_len` actions drawn from `action`.
    pub fn action_sequence<S: Strategy>(action: S, max_len: usize) -> impl Strategy<Value = Vec<S::Value>> {
        proptest::collection::vec(action, 0..=max_len)
    }

    /// Fold `actions` through `reducer` directly, ignoring effects.
    ///
    /// The reference model a store must agree with.
    pub fn reduce_all<R, I>(reducer: &R, mut state: R::State, actions: I, env: &R::Environment) -> R::State
    where
        R: Reducer,
        I: IntoIterator<Item = R::Action>,
    {
        for action in actions {
            let _ = reducer.reduce(&mut state, action, env);
        }
        state
    }
}

// Re-export commonly used items
pub use mocks::{ImmediateClock, TestClock, test_clock, test_epoch};
