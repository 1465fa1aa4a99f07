//! # Reducer Kit Runtime
//!
//! Runtime implementation for the Reducer Kit architecture.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Cancellation**: Every effect runs under a [`CancellationToken`]; identified
//!   effects are registered in the store's [`CancellationRegistry`]
//! - **Scoped stores**: Live projections of a store onto a child feature
//!
//! ## Example
//!
//! ```
//! use reducer_kit_core::{smallvec, Effect, Reducer, SmallVec};
//! use reducer_kit_runtime::Store;
//!
//! #[derive(Clone, Debug, Default)]
//! struct CounterState {
//!     count: i64,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Increment,
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
//!         _action: CounterAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CounterAction>; 4]> {
//!         state.count += 1;
//!         smallvec![]
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let store = Store::new(CounterState::default(), CounterReducer, ());
//!
//! // Send an action
//! let _ = store.send(CounterAction::Increment).await;
//!
//! // Read state
//! let count = store.state(|s| s.count).await;
//! assert_eq!(count, 1);
//! # });
//! ```

use futures::future::BoxFuture;
use reducer_kit_core::cancellation::{CancellationRegistry, CancellationToken};
use reducer_kit_core::environment::{Clock, SystemClock};
use reducer_kit_core::{effect::Effect, reducer::Reducer};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, RwLock, watch};

/// Prometheus metrics for observability
pub mod metrics;

mod scope;
mod throttle;

pub use scope::ScopedStore;

use crate::metrics::StoreMetrics;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    ///
    /// Effects never surface errors here: a failing effect is expected to
    /// turn its failure into an action (see `Effect::try_run`).
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// A spawned task failed to join
        ///
        /// This typically means a spawned task panicked.
        #[error("Task failed during effect execution: {0}")]
        TaskJoinError(#[from] tokio::task::JoinError),

        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Configuration for Store instances
///
/// # Example
///
/// ```
/// use reducer_kit_core::environment::SystemClock;
/// use reducer_kit_runtime::StoreConfig;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let config = StoreConfig::default()
///     .with_clock(Arc::new(SystemClock))
///     .with_broadcast_capacity(64)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.broadcast_capacity, 64);
/// ```
#[derive(Clone)]
pub struct StoreConfig {
    /// Clock used for `Effect::Delay` and throttle windows
    pub clock: Arc<dyn Clock>,
    /// Cancellation registry for identified effects
    ///
    /// `Default` creates a fresh registry; cloning a config shares it.
    pub registry: CancellationRegistry,
    /// Capacity of the action broadcast channel
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Set the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use an existing cancellation registry
    #[must_use]
    pub fn with_registry(mut self, registry: CancellationRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the action broadcast capacity
    ///
    /// Slow subscribers lag and miss actions once more than `capacity`
    /// actions are buffered.
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            registry: CancellationRegistry::new(),
            broadcast_capacity: 16,
            default_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("registered_ids", &self.registry.len())
            .field("broadcast_capacity", &self.broadcast_capacity)
            .field("default_shutdown_timeout", &self.default_shutdown_timeout)
            .finish_non_exhaustive()
    }
}

/// Effect tracking mode - controls how effects are tracked for completion
///
/// # Modes
///
/// - **Direct**: Tracks only immediate effects (default)
/// - **Cascading**: Tracks effects transitively, following the entire effect tree
#[derive(Debug, Clone)]
pub enum TrackingMode {
    /// Track only immediate effects spawned by this action
    Direct,

    /// Track effects transitively - any effects produced by feedback actions
    /// are also tracked as children
    Cascading {
        /// Child effect handles that need to complete before this handle is done
        children: Arc<Mutex<Vec<EffectHandle>>>,
    },
}

impl TrackingMode {
    /// A cascading mode with no children yet
    #[must_use]
    pub fn cascading() -> Self {
        Self::Cascading {
            children: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn for_feedback(&self) -> Self {
        match self {
            Self::Direct => Self::Direct,
            Self::Cascading { .. } => Self::cascading(),
        }
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for, or cancelling, the
/// effects started by one action.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // All effects from Action::Start are now complete
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    mode: TrackingMode,
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
    token: CancellationToken,
}

impl EffectHandle {
    fn new(mode: TrackingMode, token: CancellationToken) -> (Self, EffectTracking) {
        let tracking = EffectTracking::new();
        let handle = Self {
            mode,
            effects: Arc::clone(&tracking.counter),
            completion: tracking.notifier.subscribe(),
            token,
        };
        (handle, tracking)
    }

    /// Create a handle that's already complete
    ///
    /// Useful for initialization in loops where you need a `last_handle`.
    #[must_use]
    pub fn completed() -> Self {
        let (handle, _tracking) = Self::new(TrackingMode::Direct, CancellationToken::new());
        handle
    }

    /// Wait for all effects to complete
    ///
    /// In cascading mode this also waits for the effects of every action
    /// fed back by those effects.
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }

        if let TrackingMode::Cascading { children } = &self.mode {
            loop {
                let handles = {
                    let mut guard = lock(children);
                    if guard.is_empty() {
                        break;
                    }
                    guard.drain(..).collect::<Vec<_>>()
                };

                for mut handle in handles {
                    Box::pin(handle.wait()).await;
                }
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ())
    }

    /// Cancel every effect started by this action.
    ///
    /// Actions those effects emit from now on are dropped.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether every tracked effect has finished.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        if self.effects.load(Ordering::SeqCst) > 0 {
            return false;
        }
        match &self.mode {
            TrackingMode::Direct => true,
            TrackingMode::Cascading { children } => {
                lock(children).iter().all(EffectHandle::is_complete)
            },
        }
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("mode", &self.mode)
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Internal: counter of running effect tasks with a change notification
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn new() -> Self {
        let (notifier, _) = watch::channel(());
        Self {
            counter: Arc::new(AtomicUsize::new(0)),
            notifier: Arc::new(notifier),
        }
    }

    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notifier.send_replace(());
        }
    }

    /// Resolves once no tracked effect is running.
    async fn idle(&self) {
        let mut changes = self.notifier.subscribe();
        while self.counter.load(Ordering::SeqCst) > 0 {
            if changes.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        let remaining = self.0.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        StoreMetrics::record_pending(remaining);
    }
}

/// FIFO of actions produced by effects, awaiting manual reduction.
///
/// A store created with [`Store::with_feedback_queue`] pushes effect actions
/// here instead of reducing them. Each entry remembers the token of the
/// effect that produced it; entries whose effect has since been cancelled
/// are skipped.
pub struct ActionQueue<A> {
    entries: Mutex<VecDeque<(A, CancellationToken)>>,
    notify: Notify,
}

impl<A> ActionQueue<A> {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Append an action produced by the effect owning `token`
    pub fn push(&self, action: A, token: CancellationToken) {
        lock(&self.entries).push_back((action, token));
        self.notify.notify_waiters();
    }

    /// Remove the oldest action whose effect is still live
    pub fn pop(&self) -> Option<A> {
        let mut entries = lock(&self.entries);
        while let Some((action, token)) = entries.pop_front() {
            if token.is_cancelled() {
                tracing::trace!("Dropping queued action from a cancelled effect");
                StoreMetrics::record_dropped_action();
                continue;
            }
            return Some(action);
        }
        None
    }

    /// Number of queued actions whose effect is still live
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|(_, token)| !token.is_cancelled())
            .count()
    }

    /// Whether no live action is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait up to `timeout` for the next live action
    pub async fn next(&self, timeout: Duration) -> Option<A> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Registered before `pop` so a push in between still wakes us.
            let notified = self.notify.notified();
            if let Some(action) = self.pop() {
                return Some(action);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.pop();
            }
        }
    }

    /// Remove and return every live action
    pub fn drain(&self) -> Vec<A> {
        std::mem::take(&mut *lock(&self.entries))
            .into_iter()
            .filter(|(_, token)| !token.is_cancelled())
            .map(|(action, _)| action)
            .collect()
    }
}

impl<A> Default for ActionQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for ActionQueue<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Internal: Destination for actions produced by effects
///
/// - Auto: Send back to the Store automatically (production)
/// - Queued: Push to a queue for manual processing (testing)
enum FeedbackDestination<A> {
    Auto,
    Queued(Arc<ActionQueue<A>>),
}

impl<A> Clone for FeedbackDestination<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Auto => Self::Auto,
            Self::Queued(queue) => Self::Queued(Arc::clone(queue)),
        }
    }
}

/// Where a running effect hands its actions; the token is the emitting
/// effect's.
type ActionSink<A> = Arc<dyn Fn(A, CancellationToken) -> BoxFuture<'static, ()> + Send + Sync>;

/// Internal: everything an effect needs while it runs
struct ExecContext<A> {
    tracking: EffectTracking,
    token: CancellationToken,
    sink: ActionSink<A>,
}

impl<A> Clone for ExecContext<A> {
    fn clone(&self) -> Self {
        Self {
            tracking: self.tracking.clone(),
            token: self.token.clone(),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<A> ExecContext<A> {
    fn nested(&self, token: CancellationToken) -> Self {
        Self {
            tracking: EffectTracking::new(),
            token,
            sink: Arc::clone(&self.sink),
        }
    }
}

/// Store module - The runtime for reducers
///
/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        ActionQueue, ActionSink, Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, BoxFuture,
        CancellationRegistry, CancellationToken, Clock, DecrementGuard, Duration, Effect,
        EffectHandle, EffectTracking, ExecContext, FeedbackDestination, Mutex, Ordering, Reducer,
        RwLock, ScopedStore, StoreConfig, StoreError, StoreMetrics, TrackingMode, lock,
    };
    use crate::throttle::{Offer, ThrottleWindows};
    use reducer_kit_core::effect::ActionSender;
    use reducer_kit_core::effect_id::EffectId;
    use std::future::Future;
    use tokio::sync::{broadcast, mpsc};

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    ///
    /// Cloning a store yields another handle to the same state, effects and
    /// registry.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        clock: Arc<dyn Clock>,
        registry: CancellationRegistry,
        /// Parent of every effect token; replaced by `cancel_in_flight_effects`.
        root_token: Arc<Mutex<CancellationToken>>,
        feedback: FeedbackDestination<A>,
        throttles: ThrottleWindows<A>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Every action produced by an effect, before it is reduced.
        action_broadcast: broadcast::Sender<A>,
        default_shutdown_timeout: Duration,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Uses [`StoreConfig::default`]: the system clock, a fresh
        /// cancellation registry and a broadcast capacity of 16.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new store with custom configuration
        #[must_use]
        pub fn with_config(initial_state: S, reducer: R, environment: E, config: StoreConfig) -> Self {
            Self::build(initial_state, reducer, environment, config, FeedbackDestination::Auto)
        }

        /// Create a store whose effect actions are queued instead of reduced
        ///
        /// Used by the test harness to reduce effect actions one at a time.
        #[must_use]
        pub fn with_feedback_queue(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> (Self, Arc<ActionQueue<A>>) {
            let queue = Arc::new(ActionQueue::new());
            let store = Self::build(
                initial_state,
                reducer,
                environment,
                config,
                FeedbackDestination::Queued(Arc::clone(&queue)),
            );
            (store, queue)
        }

        fn build(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
            feedback: FeedbackDestination<A>,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                clock: config.clock,
                registry: config.registry,
                root_token: Arc::new(Mutex::new(CancellationToken::new())),
                feedback,
                throttles: ThrottleWindows::default(),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
                default_shutdown_timeout: config.default_shutdown_timeout,
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects as tokio tasks
        /// 4. Effects may produce more actions (feedback loop)
        ///
        /// `send()` returns after starting effect execution, not completion.
        /// Concurrent sends serialize at the reducer in call order; effects
        /// may complete in any order.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        ///
        /// # Panics
        ///
        /// If the reducer panics, the panic propagates to the caller.
        /// A panicking effect only ends its own task.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            self.send_internal(action, TrackingMode::Direct, None).await
        }

        /// Send an action and track the effects of its feedback actions too
        ///
        /// The returned handle completes once the whole effect tree started
        /// by `action` has finished.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send_cascading")]
        pub async fn send_cascading(&self, action: A) -> Result<EffectHandle, StoreError> {
            self.send_internal(action, TrackingMode::cascading(), None).await
        }

        /// Internal send implementation with tracking control
        ///
        /// `origin` is the token of the effect that emitted `action`; the
        /// action is dropped if that effect was cancelled while the action
        /// waited for the write lock.
        async fn send_internal(
            &self,
            action: A,
            tracking_mode: TrackingMode,
            origin: Option<&CancellationToken>,
        ) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            let token = lock(&self.root_token).child_token();
            let (handle, tracking) = EffectHandle::new(tracking_mode.clone(), token.clone());

            let effects = {
                let mut state = self.state.write().await;
                tracing::trace!("Acquired write lock on state");

                if origin.is_some_and(CancellationToken::is_cancelled) {
                    tracing::trace!("Dropping action emitted by a cancelled effect");
                    StoreMetrics::record_dropped_action();
                    return Ok(handle);
                }

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut state, action, &self.environment);
                StoreMetrics::record_action(start.elapsed(), effects.len());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            let ctx = ExecContext {
                tracking,
                token,
                sink: self.feedback_sink(&tracking_mode),
            };
            for effect in effects {
                self.execute(effect, &ctx);
            }

            Ok(handle)
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let todo_count = store.state(|s| s.todos.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// A copy of the current state
        pub async fn snapshot(&self) -> S
        where
            S: Clone,
        {
            self.state.read().await.clone()
        }

        /// Project this store onto a child feature.
        ///
        /// The scoped store derives its state from this store's state on
        /// every read and embeds its actions into this store's action type,
        /// so it always observes the same reductions.
        #[must_use]
        pub fn scope<CS, CA, F, G>(&self, to_child: F, embed: G) -> ScopedStore<CS, CA>
        where
            CS: Send + 'static,
            CA: Send + 'static,
            F: Fn(&S) -> CS + Send + Sync + 'static,
            G: Fn(CA) -> A + Send + Sync + 'static,
        {
            let state = Arc::clone(&self.state);
            let to_child = Arc::new(to_child);
            let read = Arc::new(move || {
                let state = Arc::clone(&state);
                let to_child = Arc::clone(&to_child);
                Box::pin(async move {
                    let state = state.read().await;
                    to_child(&*state)
                }) as BoxFuture<'static, CS>
            });

            let store = self.clone();
            let embed = Arc::new(embed);
            let send = Arc::new(move |action: CA| {
                let store = store.clone();
                let action = embed(action);
                Box::pin(async move { store.send(action).await })
                    as BoxFuture<'static, Result<EffectHandle, StoreError>>
            });

            ScopedStore::new(read, send)
        }

        /// Cancel every in-flight effect registered under `id`.
        ///
        /// Returns the number of effects cancelled.
        pub fn cancel(&self, id: &EffectId) -> usize {
            let count = self.registry.cancel(id);
            StoreMetrics::record_cancelled(count);
            count
        }

        /// Cancel every running effect of this store, identified or not.
        ///
        /// Effects started after this call run normally.
        pub fn cancel_in_flight_effects(&self) {
            let previous = std::mem::take(&mut *lock(&self.root_token));
            previous.cancel();
            let count = self.registry.cancel_all();
            StoreMetrics::record_cancelled(count);
            tracing::debug!(registered = count, "Cancelled all in-flight effects");
        }

        /// Subscribe to actions produced by effects
        ///
        /// Every action an effect emits is broadcast before it is reduced.
        /// Actions sent directly through [`Store::send`] are not broadcast.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Number of effect tasks currently running
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// The clock this store measures delays and throttle windows on
        #[must_use]
        pub fn clock(&self) -> &Arc<dyn Clock> {
            &self.clock
        }

        /// The cancellation registry of this store
        #[must_use]
        pub const fn registry(&self) -> &CancellationRegistry {
            &self.registry
        }

        /// Initiate graceful shutdown
        ///
        /// 1. Stops accepting new actions (`send` fails with `ShutdownInProgress`)
        /// 2. Waits for running effects to finish
        /// 3. Times out after `timeout` if effects don't complete
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let start = tokio::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout: {pending} effects still running");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tracing::debug!(
                    pending_effects = pending,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Waiting for effects to complete"
                );

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Graceful shutdown with the configured default timeout
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
        /// when the timeout expires.
        pub async fn shutdown_with_default_timeout(&self) -> Result<(), StoreError> {
            self.shutdown(self.default_shutdown_timeout).await
        }

        fn feedback_sink(&self, tracking_mode: &TrackingMode) -> ActionSink<A> {
            let store = self.clone();
            let tracking_mode = tracking_mode.clone();
            Arc::new(move |action: A, origin: CancellationToken| -> BoxFuture<'static, ()> {
                let store = store.clone();
                let tracking_mode = tracking_mode.clone();
                Box::pin(async move { store.deliver(action, origin, tracking_mode).await })
            })
        }

        /// Hand an effect action back to the store.
        async fn deliver(&self, action: A, origin: CancellationToken, tracking_mode: TrackingMode) {
            if origin.is_cancelled() {
                tracing::trace!("Dropping action emitted by a cancelled effect");
                StoreMetrics::record_dropped_action();
                return;
            }

            let _ = self.action_broadcast.send(action.clone());

            match &self.feedback {
                FeedbackDestination::Auto => {
                    match self
                        .send_internal(action, tracking_mode.for_feedback(), Some(&origin))
                        .await
                    {
                        Ok(handle) => {
                            if let TrackingMode::Cascading { children } = &tracking_mode {
                                lock(children).push(handle);
                            }
                        },
                        Err(error) => {
                            tracing::debug!(%error, "Effect action rejected");
                        },
                    }
                },
                FeedbackDestination::Queued(queue) => queue.push(action, origin),
            }
        }

        /// Spawn an effect task counted by `tracking` and by the store.
        fn spawn_tracked<F>(&self, tracking: &EffectTracking, task: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            tracking.increment();
            let pending = self.pending_effects.fetch_add(1, Ordering::SeqCst) + 1;
            StoreMetrics::record_pending(pending);

            let guard = DecrementGuard(tracking.clone());
            let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

            tokio::spawn(async move {
                let _guard = guard;
                let _pending_guard = pending_guard;
                task.await;
            });
        }

        /// Execute an effect
        ///
        /// Starts the work described by `effect` and returns immediately;
        /// every asynchronous step runs in a task tracked by `ctx`.
        #[allow(clippy::too_many_lines)] // One arm per effect variant
        fn execute(&self, effect: Effect<A>, ctx: &ExecContext<A>) {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                },
                Effect::Future(future) => {
                    tracing::trace!("Executing Effect::Future");
                    StoreMetrics::record_effect("future");

                    let token = ctx.token.clone();
                    let sink = Arc::clone(&ctx.sink);
                    self.spawn_tracked(&ctx.tracking, async move {
                        let output = tokio::select! {
                            biased;
                            () = token.cancelled() => None,
                            output = future => output,
                        };
                        if let Some(action) = output {
                            tracing::trace!("Effect::Future produced an action");
                            sink(action, token).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    tracing::trace!("Executing Effect::Delay (duration: {:?})", duration);
                    StoreMetrics::record_effect("delay");

                    let token = ctx.token.clone();
                    let sink = Arc::clone(&ctx.sink);
                    let sleep = self.clock.sleep(duration);
                    self.spawn_tracked(&ctx.tracking, async move {
                        tokio::select! {
                            biased;
                            () = token.cancelled() => return,
                            () = sleep => {},
                        }
                        sink(*action, token).await;
                    });
                },
                Effect::Run(operation) => {
                    tracing::trace!("Executing Effect::Run");
                    StoreMetrics::record_effect("run");

                    let token = ctx.token.clone();
                    let sink = Arc::clone(&ctx.sink);
                    self.spawn_tracked(&ctx.tracking, async move {
                        let (tx, mut rx) = mpsc::unbounded_channel();
                        let sender = ActionSender::new(token.clone(), move |action| tx.send(action).is_ok());
                        let mut body = operation(sender);

                        loop {
                            tokio::select! {
                                biased;
                                () = token.cancelled() => break,
                                Some(action) = rx.recv() => sink(action, token.clone()).await,
                                () = &mut body => {
                                    while let Ok(action) = rx.try_recv() {
                                        sink(action, token.clone()).await;
                                    }
                                    break;
                                },
                            }
                        }
                    });
                },
                Effect::Parallel(effects) => {
                    tracing::trace!("Executing Effect::Parallel with {} effects", effects.len());
                    StoreMetrics::record_effect("parallel");

                    for effect in effects {
                        self.execute(effect, ctx);
                    }
                },
                Effect::Sequential(effects) => {
                    let effect_count = effects.len();
                    tracing::trace!("Executing Effect::Sequential with {} effects", effect_count);
                    StoreMetrics::record_effect("sequential");

                    let store = self.clone();
                    let outer = ctx.clone();
                    self.spawn_tracked(&ctx.tracking, async move {
                        for (idx, effect) in effects.into_iter().enumerate() {
                            if outer.token.is_cancelled() {
                                tracing::trace!("Effect::Sequential cancelled before step {}", idx + 1);
                                break;
                            }
                            tracing::trace!("Executing sequential effect {} of {}", idx + 1, effect_count);

                            let step = outer.nested(outer.token.clone());
                            store.execute(effect, &step);
                            step.tracking.idle().await;
                        }
                    });
                },
                Effect::Cancellable {
                    id,
                    cancel_in_flight,
                    effect,
                } => {
                    tracing::trace!(%id, cancel_in_flight, "Executing Effect::Cancellable");
                    StoreMetrics::record_effect("cancellable");

                    if cancel_in_flight {
                        StoreMetrics::record_cancelled(self.registry.cancel(&id));
                    }

                    let token = ctx.token.child_token();
                    self.registry.register(id.clone(), token.clone());

                    let inner = ctx.nested(token.clone());
                    self.execute(*effect, &inner);

                    let registry = self.registry.clone();
                    let tracking = inner.tracking;
                    self.spawn_tracked(&ctx.tracking, async move {
                        tracking.idle().await;
                        registry.deregister(&id, &token);
                    });
                },
                Effect::Cancel(id) => {
                    tracing::debug!(%id, "Executing Effect::Cancel");
                    StoreMetrics::record_effect("cancel");
                    self.cancel(&id);
                },
                Effect::CancelAll => {
                    tracing::debug!("Executing Effect::CancelAll");
                    StoreMetrics::record_effect("cancel_all");
                    StoreMetrics::record_cancelled(self.registry.cancel_all());
                },
                Effect::Throttle {
                    id,
                    interval,
                    clock,
                    latest,
                    effect,
                } => {
                    tracing::trace!(%id, ?interval, latest, "Executing Effect::Throttle");
                    StoreMetrics::record_effect("throttle");

                    let inner = ExecContext {
                        tracking: ctx.tracking.clone(),
                        token: ctx.token.clone(),
                        sink: self.throttle_sink(ctx, id, interval, clock, latest),
                    };
                    self.execute(*effect, &inner);
                },
                Effect::Timeout {
                    duration,
                    clock,
                    effect,
                } => {
                    tracing::trace!(?duration, "Executing Effect::Timeout");
                    StoreMetrics::record_effect("timeout");

                    let token = ctx.token.child_token();
                    let inner = ctx.nested(token.clone());
                    self.execute(*effect, &inner);

                    let deadline = clock.schedule(
                        duration,
                        Box::new(move || {
                            if !token.is_cancelled() {
                                tracing::debug!(?duration, "Effect timed out");
                                token.cancel();
                            }
                        }),
                    );
                    let tracking = inner.tracking;
                    self.spawn_tracked(&ctx.tracking, async move {
                        tracking.idle().await;
                        deadline.cancel();
                    });
                },
            }
        }

        /// A sink that rate-limits actions per `id` before handing them on.
        fn throttle_sink(
            &self,
            ctx: &ExecContext<A>,
            id: EffectId,
            interval: Duration,
            clock: Arc<dyn Clock>,
            latest: bool,
        ) -> ActionSink<A> {
            let store = self.clone();
            let tracking = ctx.tracking.clone();
            let downstream = Arc::clone(&ctx.sink);

            Arc::new(move |action: A, origin: CancellationToken| -> BoxFuture<'static, ()> {
                match store.throttles.offer(&id, action, clock.now(), interval, latest) {
                    Offer::EmitNow(action) => downstream(action, origin),
                    Offer::Buffered => Box::pin(async {}),
                    Offer::ScheduleFlush { after } => {
                        store.schedule_flush(
                            &tracking,
                            id.clone(),
                            after,
                            Arc::clone(&clock),
                            Arc::clone(&downstream),
                            &origin,
                        );
                        Box::pin(async {})
                    },
                }
            })
        }

        /// Emit the buffered action of a throttle window once it reopens.
        ///
        /// The flush is registered under the throttle `id`, so cancelling the
        /// id discards the buffered action.
        fn schedule_flush(
            &self,
            tracking: &EffectTracking,
            id: EffectId,
            after: Duration,
            clock: Arc<dyn Clock>,
            downstream: ActionSink<A>,
            origin: &CancellationToken,
        ) {
            let flush = origin.child_token();
            self.registry.register(id.clone(), flush.clone());

            let throttles = self.throttles.clone();
            let registry = self.registry.clone();
            let sleep = clock.sleep(after);

            self.spawn_tracked(tracking, async move {
                tokio::select! {
                    biased;
                    () = flush.cancelled() => {
                        throttles.discard_pending(&id);
                        registry.deregister(&id, &flush);
                        return;
                    },
                    () = sleep => {},
                }

                registry.deregister(&id, &flush);
                if let Some(action) = throttles.take_pending(&id, clock.now()) {
                    tracing::trace!(%id, "Flushing throttled action");
                    downstream(action, flush).await;
                }
            });
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                clock: Arc::clone(&self.clock),
                registry: self.registry.clone(),
                root_token: Arc::clone(&self.root_token),
                feedback: self.feedback.clone(),
                throttles: self.throttles.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
                default_shutdown_timeout: self.default_shutdown_timeout,
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;

// Test module
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Tests are allowed to panic on failures
mod tests {
    use super::*;
    use reducer_kit_core::effect_id::EffectId;
    use reducer_kit_core::{smallvec, SmallVec};

    // Test state
    #[derive(Debug, Clone)]
    struct TestState {
        value: i32,
    }

    // Test action
    #[derive(Debug, Clone, PartialEq)]
    enum TestAction {
        Increment,
        Decrement,
        NoOp,
        ProduceEffect,
        ProduceDelayedAction,
        ProduceParallelEffects,
        ProduceSequentialEffects,
        ProducePanickingEffect,
        StartSlowIncrement,
        CancelSlowIncrement,
    }

    // Test environment
    #[derive(Debug, Clone)]
    struct TestEnv;

    // Test reducer
    #[derive(Debug, Clone)]
    struct TestReducer;

    fn slow_increment_id() -> EffectId {
        EffectId::new("slow-increment")
    }

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.value += 1;
                    smallvec![Effect::None]
                },
                TestAction::Decrement => {
                    state.value -= 1;
                    smallvec![Effect::None]
                },
                TestAction::NoOp => smallvec![Effect::None],
                TestAction::ProduceEffect => {
                    smallvec![Effect::send(TestAction::Increment)]
                },
                TestAction::ProduceDelayedAction => {
                    smallvec![Effect::delay(Duration::from_millis(10), TestAction::Increment)]
                },
                TestAction::ProduceParallelEffects => {
                    smallvec![Effect::merge(vec![
                        Effect::send(TestAction::Increment),
                        Effect::send(TestAction::Increment),
                        Effect::send(TestAction::Increment),
                    ])]
                },
                TestAction::ProduceSequentialEffects => {
                    // Net result: +1 +1 -1
                    smallvec![Effect::concatenate(vec![
                        Effect::send(TestAction::Increment),
                        Effect::send(TestAction::Increment),
                        Effect::send(TestAction::Decrement),
                    ])]
                },
                TestAction::ProducePanickingEffect => {
                    smallvec![Effect::Future(Box::pin(async {
                        panic!("Intentional panic in effect for testing");
                    }))]
                },
                TestAction::StartSlowIncrement => {
                    smallvec![
                        Effect::delay(Duration::from_millis(100), TestAction::Increment)
                            .cancellable(slow_increment_id(), true)
                    ]
                },
                TestAction::CancelSlowIncrement => {
                    smallvec![Effect::cancel(slow_increment_id())]
                },
            }
        }
    }

    fn test_store() -> Store<TestState, TestAction, TestEnv, TestReducer> {
        Store::new(TestState { value: 0 }, TestReducer, TestEnv)
    }

    #[tokio::test]
    async fn test_store_creation() {
        let store = test_store();

        let value = store.state(|s| s.value).await;
        assert_eq!(value, 0);
    }

    #[tokio::test]
    async fn test_send_action() {
        let store = test_store();

        let _ = store.send(TestAction::Increment).await;
        let value = store.state(|s| s.value).await;
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_multiple_actions() {
        let store = test_store();

        let _ = store.send(TestAction::Increment).await;
        let _ = store.send(TestAction::Increment).await;
        let _ = store.send(TestAction::Decrement).await;

        let value = store.state(|s| s.value).await;
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_effect_none() {
        let store = test_store();

        let handle = store.send(TestAction::NoOp).await.unwrap();
        assert!(handle.is_complete());
        assert_eq!(store.state(|s| s.value).await, 0);
    }

    #[tokio::test]
    async fn test_effect_future() {
        let store = test_store();

        let mut handle = store.send(TestAction::ProduceEffect).await.unwrap();
        handle.wait().await;

        // The effect produced an Increment action that was reduced
        let value = store.state(|s| s.value).await;
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_effect_delay() {
        let store = test_store();

        let _ = store.send(TestAction::ProduceDelayedAction).await;

        // Value should still be 0 immediately
        let value = store.state(|s| s.value).await;
        assert_eq!(value, 0);

        // Wait for delay to complete
        tokio::time::sleep(Duration::from_millis(50)).await;

        let value = store.state(|s| s.value).await;
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_effect_parallel() {
        let store = test_store();

        let mut handle = store.send(TestAction::ProduceParallelEffects).await.unwrap();
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        // All three increments should have completed
        let value = store.state(|s| s.value).await;
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_effect_sequential() {
        let store = test_store();

        let mut handle = store.send(TestAction::ProduceSequentialEffects).await.unwrap();
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        let value = store.state(|s| s.value).await;
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_concurrent_sends() {
        let store = test_store();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let _ = store.send(TestAction::Increment).await;
                })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                panic!("concurrent send task panicked: {e}");
            }
        }

        // All increments should have been applied
        let value = store.state(|s| s.value).await;
        assert_eq!(value, 10);
    }

    #[tokio::test]
    async fn test_store_clone() {
        let store1 = test_store();
        let store2 = store1.clone();

        // Both stores should share the same state
        let _ = store1.send(TestAction::Increment).await;
        let value2 = store2.state(|s| s.value).await;
        assert_eq!(value2, 1);

        let _ = store2.send(TestAction::Increment).await;
        let value1 = store1.state(|s| s.value).await;
        assert_eq!(value1, 2);
    }

    #[tokio::test]
    async fn test_effect_panic_isolation() -> Result<(), StoreError> {
        let store = test_store();

        let mut handle = store.send(TestAction::ProducePanickingEffect).await?;

        // The panic is isolated in the spawned task; the guard still
        // completes the handle.
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.pending_effects(), 0);

        // Store should still be functional after effect panic
        let _ = store.send(TestAction::Increment).await?;
        let _ = store.send(TestAction::Increment).await?;
        let value = store.state(|s| s.value).await;
        assert_eq!(value, 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_by_id_drops_the_delayed_action() -> Result<(), StoreError> {
        let store = test_store();

        let mut slow = store.send(TestAction::StartSlowIncrement).await?;
        assert!(store.registry().is_registered(&slow_increment_id()));

        let _ = store.send(TestAction::CancelSlowIncrement).await?;
        slow.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.state(|s| s.value).await, 0);
        assert!(!store.registry().is_registered(&slow_increment_id()));

        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_in_flight_replaces_previous_effect() -> Result<(), StoreError> {
        let store = test_store();

        let _ = store.send(TestAction::StartSlowIncrement).await?;
        let mut second = store.send(TestAction::StartSlowIncrement).await?;
        second.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        assert_eq!(store.state(|s| s.value).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_handle_cancel_stops_its_effects() -> Result<(), StoreError> {
        let store = test_store();

        let mut handle = store.send(TestAction::ProduceDelayedAction).await?;
        handle.cancel();
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.state(|s| s.value).await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_in_flight_effects_stops_everything() -> Result<(), StoreError> {
        let store = test_store();

        let mut delayed = store.send(TestAction::ProduceDelayedAction).await?;
        let mut slow = store.send(TestAction::StartSlowIncrement).await?;
        store.cancel_in_flight_effects();

        delayed.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
        slow.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 0);

        // New effects are unaffected.
        let mut handle = store.send(TestAction::ProduceEffect).await?;
        handle.wait().await;
        assert_eq!(store.state(|s| s.value).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_send_cascading_waits_for_feedback_effects() -> Result<(), StoreError> {
        let store = test_store();

        // ProduceEffect -> Increment; the cascading handle covers both.
        let mut handle = store.send_cascading(TestAction::ProduceEffect).await?;
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        assert!(handle.is_complete());
        assert_eq!(store.state(|s| s.value).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_effect_actions_are_broadcast() -> Result<(), StoreError> {
        let store = test_store();
        let mut actions = store.subscribe_actions();

        let _ = store.send(TestAction::ProduceEffect).await?;
        let action = tokio::time::timeout(Duration::from_secs(1), actions.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(action, TestAction::Increment);
        Ok(())
    }

    #[tokio::test]
    async fn test_completed_handle() {
        let mut handle = EffectHandle::completed();
        assert!(handle.is_complete());
        handle.wait_with_timeout(Duration::from_millis(10)).await.unwrap();
    }

    mod action_queue_tests {
        use super::*;

        #[test]
        fn test_pop_skips_cancelled_entries() {
            let queue = ActionQueue::new();
            let cancelled = CancellationToken::new();
            queue.push(1, CancellationToken::new());
            queue.push(2, cancelled.clone());
            queue.push(3, CancellationToken::new());
            cancelled.cancel();

            assert_eq!(queue.len(), 2);
            assert_eq!(queue.pop(), Some(1));
            assert_eq!(queue.pop(), Some(3));
            assert_eq!(queue.pop(), None);
            assert!(queue.is_empty());
        }

        #[tokio::test]
        async fn test_next_waits_for_push() {
            let queue = Arc::new(ActionQueue::new());

            let producer = Arc::clone(&queue);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                producer.push("ready", CancellationToken::new());
            });

            assert_eq!(queue.next(Duration::from_secs(1)).await, Some("ready"));
        }

        #[tokio::test]
        async fn test_next_times_out_when_empty() {
            let queue: ActionQueue<u8> = ActionQueue::new();
            assert_eq!(queue.next(Duration::from_millis(10)).await, None);
        }

        #[test]
        fn test_drain_returns_live_actions_in_order() {
            let queue = ActionQueue::new();
            queue.push('a', CancellationToken::new());
            queue.push('b', CancellationToken::new());

            assert_eq!(queue.drain(), vec!['a', 'b']);
            assert!(queue.is_empty());
        }
    }

    /// Tests for graceful shutdown
    mod shutdown_tests {
        use super::*;

        #[tokio::test]
        async fn test_shutdown_with_no_pending_effects() -> Result<(), StoreError> {
            let store = test_store();

            let result = store.shutdown(Duration::from_secs(5)).await;
            assert!(result.is_ok());

            Ok(())
        }

        #[tokio::test]
        async fn test_shutdown_rejects_new_actions() -> Result<(), StoreError> {
            let store = test_store();

            store.shutdown(Duration::from_secs(1)).await?;

            let result = store.send(TestAction::Increment).await;
            assert!(matches!(result, Err(StoreError::ShutdownInProgress)));

            Ok(())
        }

        #[tokio::test]
        async fn test_shutdown_waits_for_effects() -> Result<(), StoreError> {
            let store = test_store();

            let _handle = store.send(TestAction::ProduceDelayedAction).await?;

            let result = store.shutdown(Duration::from_secs(5)).await;
            assert!(result.is_ok());
            assert_eq!(store.pending_effects(), 0);

            Ok(())
        }

        #[tokio::test]
        async fn test_shutdown_timeout() -> Result<(), StoreError> {
            let store = test_store();

            // The slow increment takes 100ms
            let _handle = store.send(TestAction::StartSlowIncrement).await?;

            let result = store.shutdown(Duration::from_millis(20)).await;

            assert!(matches!(result, Err(StoreError::ShutdownTimeout(_))), "Expected ShutdownTimeout, got: {result:?}");
            if let Err(StoreError::ShutdownTimeout(pending)) = result {
                assert!(pending > 0, "Should report pending effects");
            }

            Ok(())
        }

        #[tokio::test]
        async fn test_shutdown_idempotent() -> Result<(), StoreError> {
            let store = test_store();

            let result1 = store.shutdown(Duration::from_secs(1)).await;
            assert!(result1.is_ok());

            let result2 = store.shutdown_with_default_timeout().await;
            assert!(result2.is_ok());

            Ok(())
        }
    }

    mod config_tests {
        use super::*;

        #[test]
        fn test_store_config_default() {
            let config = StoreConfig::default();
            assert_eq!(config.broadcast_capacity, 16);
            assert_eq!(config.default_shutdown_timeout, Duration::from_secs(30));
            assert!(config.registry.is_empty());
        }

        #[test]
        fn test_store_config_builder_pattern() {
            let registry = CancellationRegistry::new();
            let config = StoreConfig::default()
                .with_registry(registry.clone())
                .with_broadcast_capacity(128)
                .with_shutdown_timeout(Duration::from_secs(2));

            assert_eq!(config.broadcast_capacity, 128);
            assert_eq!(config.default_shutdown_timeout, Duration::from_secs(2));

            registry.register(EffectId::new("shared"), CancellationToken::new());
            assert!(config.registry.is_registered(&EffectId::new("shared")));
        }

        #[tokio::test]
        async fn test_stores_have_isolated_registries() -> Result<(), StoreError> {
            let first = test_store();
            let second = test_store();

            let _ = first.send(TestAction::StartSlowIncrement).await?;

            assert!(first.registry().is_registered(&slow_increment_id()));
            assert!(!second.registry().is_registered(&slow_increment_id()));
            assert_eq!(second.cancel(&slow_increment_id()), 0);

            first.cancel_in_flight_effects();
            Ok(())
        }

        #[test]
        fn test_store_config_debug() {
            let rendered = format!("{:?}", StoreConfig::default());
            assert!(rendered.contains("broadcast_capacity: 16"));
        }
    }
}
