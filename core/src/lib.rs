//! # Reducer Kit Core
//!
//! Core traits and types for the Reducer Kit architecture.
//!
//! This crate provides the fundamental abstractions for building applications
//! around unidirectional data flow: composable reducers drive state
//! transitions, and effects describe the asynchronous work those transitions
//! start.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature
//! - **Action**: All possible inputs to a reducer (user intents, effect results)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Unidirectional Data Flow
//! - Explicit Effects (no hidden I/O)
//! - Explicit cancellation through [`EffectId`]s
//!
//! ## Example
//!
//! ```
//! use reducer_kit_core::{smallvec, Effect, Reducer, SmallVec};
//!
//! #[derive(Clone, Debug, Default, PartialEq)]
//! struct CounterState {
//!     count: i64,
//! }
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum CounterAction {
//!     Increment,
//!     Decrement,
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = CounterState;
//!     type Action = CounterAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CounterState,
//!         action: CounterAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CounterAction>; 4]> {
//!         match action {
//!             CounterAction::Increment => state.count += 1,
//!             CounterAction::Decrement => state.count -= 1,
//!         }
//!         smallvec![]
//!     }
//! }
//!
//! let mut state = CounterState::default();
//! let _ = CounterReducer.reduce(&mut state, CounterAction::Increment, &());
//! assert_eq!(state.count, 1);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

pub use cancellation::{CancellationRegistry, CancellationToken};
pub use effect::{ActionSender, Effect};
pub use effect_id::EffectId;
pub use environment::{Clock, SystemClock};
pub use reducer::Reducer;

pub mod cancellation;
pub mod composition;
pub mod diagnostics;
pub mod effect;
pub mod effect_id;
mod effect_macros;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// Most reducers return zero to a handful of effects, so effects are
    /// collected in a `SmallVec` that stays on the stack for up to four.
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Updates state in place
        /// 2. Returns effect descriptions to be executed
        ///
        /// It must not perform I/O; anything asynchronous belongs in an
        /// effect.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }

    impl<R: Reducer + ?Sized> Reducer for Box<R> {
        type State = R::State;
        type Action = R::Action;
        type Environment = R::Environment;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            (**self).reduce(state, action, env)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter. The runtime itself only depends on
/// [`Clock`](environment::Clock).
pub mod environment {
    use crate::cancellation::CancellationToken;
    use chrono::{DateTime, Utc};
    use futures::future::BoxFuture;
    use std::sync::Arc;
    use std::time::Duration;

    /// Clock trait - abstracts time operations for testability
    ///
    /// Everything time-based in the runtime (delays, debounce, throttle,
    /// timeouts) is measured on a `Clock`, so tests can substitute a virtual
    /// clock and advance it by hand.
    ///
    /// # Examples
    ///
    /// ```
    /// use reducer_kit_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// A future that resolves after `duration` has elapsed on this clock.
        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;

        /// Run `task` after `after` has elapsed, unless the returned token is
        /// cancelled first.
        ///
        /// The default implementation spawns a tokio task around
        /// [`Clock::sleep`] and must be called from within a runtime.
        fn schedule(&self, after: Duration, task: Box<dyn FnOnce() + Send>) -> CancellationToken {
            let token = CancellationToken::new();
            let guard = token.clone();
            let sleep = self.sleep(after);

            tokio::spawn(async move {
                tokio::select! {
                    () = guard.cancelled() => {},
                    () = sleep => {
                        if !guard.is_cancelled() {
                            task();
                        }
                    },
                }
            });

            token
        }
    }

    impl<C: Clock + ?Sized> Clock for Arc<C> {
        fn now(&self) -> DateTime<Utc> {
            (**self).now()
        }

        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            (**self).sleep(duration)
        }

        fn schedule(&self, after: Duration, task: Box<dyn FnOnce() + Send>) -> CancellationToken {
            (**self).schedule(after, task)
        }
    }

    /// Wall-clock time backed by tokio timers.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }

        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            Box::pin(tokio::time::sleep(duration))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn system_clock_schedule_runs_task_after_delay() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let _token = SystemClock.schedule(
            Duration::from_millis(50),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!ran.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancelled_schedule_never_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let token = SystemClock.schedule(
            Duration::from_millis(20),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        token.cancel();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn boxed_reducers_are_reducers() {
        struct Add;

        impl Reducer for Add {
            type State = i32;
            type Action = i32;
            type Environment = ();

            fn reduce(&self, state: &mut i32, action: i32, _env: &()) -> SmallVec<[Effect<i32>; 4]> {
                *state += action;
                smallvec![]
            }
        }

        let boxed: Box<dyn Reducer<State = i32, Action = i32, Environment = ()>> = Box::new(Add);
        let mut state = 1;
        let _ = boxed.reduce(&mut state, 2, &());
        assert_eq!(state, 3);
    }
}
