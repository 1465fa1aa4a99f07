//! Step-by-step store testing.
//!
//! A [`TestStore`] wraps a real [`Store`] whose effect actions are queued
//! rather than reduced. Every `send` and `receive` reduces exactly one action
//! and checks the resulting state against the test's expectation, so a test
//! reads as the complete story of a feature.

#![allow(clippy::module_name_repetitions)] // TestStore is the natural name

use crate::helpers::settle;
use pretty_assertions::Comparison;
use reducer_kit_core::diagnostics::{Issue, IssueKind, IssueReporter, PanicReporter, Severity};
use reducer_kit_core::reducer::Reducer;
use reducer_kit_runtime::{ActionQueue, EffectHandle, Store, StoreConfig};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// How long `receive` and `finish` wait for effects by default.
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// How strictly a [`TestStore`] checks the test's assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Exhaustivity {
    /// Every state change, received action and in-flight effect must be
    /// asserted.
    #[default]
    On,
    /// Only what the test asserts is checked; everything else is skipped.
    Off {
        /// Report skipped assertions as [`Severity::Info`] issues.
        show_skipped_assertions: bool,
    },
}

/// A test harness that reduces one action at a time.
///
/// # Example
///
/// ```
/// use reducer_kit_core::composition::Reduce;
/// use reducer_kit_core::{smallvec, Effect};
/// use reducer_kit_testing::TestStore;
///
/// #[derive(Clone, Debug, PartialEq)]
/// enum Action {
///     Increment,
///     Doubled,
/// }
///
/// let reducer = Reduce::new(|count: &mut i64, action: Action, _env: &()| match action {
///     Action::Increment => {
///         *count += 1;
///         smallvec![Effect::send(Action::Doubled)]
///     },
///     Action::Doubled => {
///         *count *= 2;
///         smallvec![]
///     },
/// });
///
/// # tokio_test::block_on(async {
/// let mut store = TestStore::new(0_i64, reducer, ());
///
/// store.send(Action::Increment, |count| *count = 1).await;
/// store.receive(Action::Doubled, |count| *count = 2).await;
/// store.finish().await;
/// # });
/// ```
pub struct TestStore<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Clone + PartialEq + Debug + Send + Sync + 'static,
    A: Clone + PartialEq + Debug + Send + 'static,
    E: Send + Sync + 'static,
{
    store: Store<S, A, E, R>,
    received: Arc<ActionQueue<A>>,
    state: S,
    timeout: Duration,
    exhaustivity: Exhaustivity,
    reporter: Arc<dyn IssueReporter>,
    finished: bool,
}

impl<S, A, E, R> TestStore<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Clone + PartialEq + Debug + Send + Sync + 'static,
    A: Clone + PartialEq + Debug + Send + 'static,
    E: Send + Sync + 'static,
{
    /// Create a test store on the system clock
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self::with_config(initial_state, reducer, environment, StoreConfig::default())
    }

    /// Create a test store with a custom configuration, typically to run
    /// delays on a [`TestClock`](crate::TestClock)
    #[must_use]
    pub fn with_config(initial_state: S, reducer: R, environment: E, config: StoreConfig) -> Self {
        let state = initial_state.clone();
        let (store, received) = Store::with_feedback_queue(initial_state, reducer, environment, config);

        Self {
            store,
            received,
            state,
            timeout: DEFAULT_TIMEOUT,
            exhaustivity: Exhaustivity::On,
            reporter: Arc::new(PanicReporter),
            finished: false,
        }
    }

    /// How long to wait for effect actions and effect completion
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the exhaustivity
    #[must_use]
    pub fn with_exhaustivity(mut self, exhaustivity: Exhaustivity) -> Self {
        self.exhaustivity = exhaustivity;
        self
    }

    /// Route failures somewhere other than a panic
    #[must_use]
    pub fn with_reporter(mut self, reporter: impl IssueReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// The state as the test last asserted it
    #[must_use]
    pub const fn state(&self) -> &S {
        &self.state
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &Store<S, A, E, R> {
        &self.store
    }

    /// Change the exhaustivity mid-test
    pub const fn set_exhaustivity(&mut self, exhaustivity: Exhaustivity) {
        self.exhaustivity = exhaustivity;
    }

    /// Send an action and assert the state it produces.
    ///
    /// `update` receives the previous state and must turn it into the
    /// expected one.
    pub async fn send(&mut self, action: A, update: impl FnOnce(&mut S)) -> TestStoreTask {
        self.send_asserting(action, Some(update)).await
    }

    /// Send an action that must not change the state.
    pub async fn send_unchanged(&mut self, action: A) -> TestStoreTask {
        self.send_asserting(action, None::<fn(&mut S)>).await
    }

    async fn send_asserting<F>(&mut self, action: A, update: Option<F>) -> TestStoreTask
    where
        F: FnOnce(&mut S),
    {
        settle().await;
        let unreceived = self.received.len();
        if unreceived > 0 {
            if self.is_exhaustive() {
                self.fail(
                    IssueKind::UnreceivedActions,
                    format!(
                        "Must handle {unreceived} received action(s) before sending an action: {:#?}",
                        self.received.drain()
                    ),
                );
            } else {
                self.skip_received_actions().await;
            }
        }

        tracing::debug!(?action, "TestStore send");
        let handle = self.reduce(action).await;
        self.assert_state(update).await;

        TestStoreTask {
            handle,
            reporter: Arc::clone(&self.reporter),
            timeout: self.timeout,
        }
    }

    /// Wait for the effect action `expected` and assert the state it produces.
    pub async fn receive(&mut self, expected: A, update: impl FnOnce(&mut S)) {
        self.receive_asserting(|action| *action == expected, &expected, Some(update))
            .await;
    }

    /// Wait for the effect action `expected`, which must not change the state.
    pub async fn receive_unchanged(&mut self, expected: A) {
        self.receive_asserting(|action| *action == expected, &expected, None::<fn(&mut S)>)
            .await;
    }

    /// Wait for an effect action matching `matches` and assert the state it
    /// produces.
    ///
    /// Useful when the action carries data the test cannot predict.
    pub async fn receive_where(&mut self, matches: impl Fn(&A) -> bool, update: impl FnOnce(&mut S)) {
        self.receive_asserting(matches, &"<action matching predicate>", Some(update))
            .await;
    }

    async fn receive_asserting<P, F>(&mut self, matches: P, expected: &dyn Debug, update: Option<F>)
    where
        P: Fn(&A) -> bool,
        F: FnOnce(&mut S),
    {
        loop {
            let Some(action) = self.received.next(self.timeout).await else {
                self.fail(
                    IssueKind::ReceiveMismatch,
                    format!(
                        "Expected to receive {expected:?}, but received none after waiting {:?}",
                        self.timeout
                    ),
                );
                return;
            };

            if matches(&action) {
                tracing::debug!(?action, "TestStore receive");
                let _ = self.reduce(action).await;
                self.assert_state(update).await;
                return;
            }

            if self.is_exhaustive() {
                self.fail(
                    IssueKind::ReceiveMismatch,
                    format!(
                        "Received unexpected action:\n{}",
                        Comparison::new(expected, &action)
                    ),
                );
                let _ = self.reduce(action).await;
                self.state = self.store.snapshot().await;
                return;
            }

            self.skipped(format!("Skipped receiving {action:?}"));
            let _ = self.reduce(action).await;
            self.state = self.store.snapshot().await;
        }
    }

    /// Assert on the current state without sending anything.
    ///
    /// Mostly useful with [`Exhaustivity::Off`].
    pub async fn assert(&mut self, update: impl FnOnce(&mut S)) {
        settle().await;
        let actual = self.store.snapshot().await;

        if self.is_exhaustive() {
            let mut expected = self.state.clone();
            update(&mut expected);
            self.check_exact(&expected, &actual, false);
            self.state = actual;
        } else {
            let mut expected = actual.clone();
            update(&mut expected);
            self.check_partial(expected, actual);
        }
    }

    /// Reduce every queued effect action without asserting on it.
    pub async fn skip_received_actions(&mut self) {
        for action in self.received.drain() {
            self.skipped(format!("Skipped receiving {action:?}"));
            let _ = self.reduce(action).await;
        }
        self.state = self.store.snapshot().await;
    }

    /// Cancel every effect still running.
    pub fn skip_in_flight_effects(&mut self) {
        let pending = self.store.pending_effects();
        if pending > 0 {
            self.skipped(format!("Skipped {pending} in-flight effect(s)"));
        }
        self.store.cancel_in_flight_effects();
    }

    /// End the test, asserting that every effect action was received and
    /// every effect finished.
    ///
    /// Waits up to the configured timeout for running effects.
    pub async fn finish(mut self) {
        self.finished = true;

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            settle().await;
            if self.store.pending_effects() == 0 || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        self.check_completion();
    }

    fn check_completion(&mut self) {
        let unreceived = self.received.drain();
        if !unreceived.is_empty() {
            self.report_strict(
                IssueKind::UnreceivedActions,
                format!(
                    "The store received {} unexpected action(s) after this one: {unreceived:#?}",
                    unreceived.len()
                ),
            );
        }

        let pending = self.store.pending_effects();
        if pending > 0 {
            self.report_strict(
                IssueKind::InFlightEffects,
                format!("An effect returned for this action is still running ({pending} in flight)"),
            );
        }

        self.store.cancel_in_flight_effects();
    }

    async fn reduce(&self, action: A) -> EffectHandle {
        match self.store.send(action).await {
            Ok(handle) => handle,
            Err(error) => {
                self.reporter.report(Issue::failure(
                    IssueKind::EffectFailed,
                    format!("The store rejected an action: {error}"),
                ));
                EffectHandle::completed()
            },
        }
    }

    async fn assert_state<F>(&mut self, update: Option<F>)
    where
        F: FnOnce(&mut S),
    {
        let actual = self.store.snapshot().await;

        if self.is_exhaustive() {
            let mut expected = self.state.clone();
            let asserted_change = update.is_some();
            if let Some(update) = update {
                update(&mut expected);
            }
            self.check_exact(&expected, &actual, asserted_change);
        } else {
            let mut expected = actual.clone();
            if let Some(update) = update {
                update(&mut expected);
            }
            self.check_partial(expected, actual.clone());
        }

        self.state = actual;
    }

    fn check_exact(&self, expected: &S, actual: &S, asserted_change: bool) {
        if expected != actual {
            self.fail(
                IssueKind::StateMismatch,
                format!(
                    "A state change does not match expectation (expected: left, actual: right):\n{}",
                    Comparison::new(expected, actual)
                ),
            );
        } else if asserted_change && *expected == self.state {
            self.fail(
                IssueKind::ExpectedStateChange,
                "Expected state to change, but no change occurred. \
                 Use the unchanged variant if no change is expected.",
            );
        }
    }

    fn check_partial(&mut self, expected: S, actual: S) {
        if expected == actual {
            if actual != self.state {
                self.skipped("Skipped asserting on unasserted state changes".to_owned());
            }
            self.state = actual;
            return;
        }

        self.fail(
            IssueKind::StateMismatch,
            format!(
                "A state change does not match expectation (expected: left, actual: right):\n{}",
                Comparison::new(&expected, &actual)
            ),
        );
        self.state = actual;
    }

    const fn is_exhaustive(&self) -> bool {
        matches!(self.exhaustivity, Exhaustivity::On)
    }

    fn fail(&self, kind: IssueKind, message: impl Into<String>) {
        self.reporter.report(Issue::failure(kind, message));
    }

    /// A failure when exhaustive, a skipped notice otherwise.
    fn report_strict(&self, kind: IssueKind, message: String) {
        if self.is_exhaustive() {
            self.fail(kind, message);
        } else {
            self.skipped(message);
        }
    }

    fn skipped(&self, message: String) {
        if let Exhaustivity::Off {
            show_skipped_assertions: true,
        } = self.exhaustivity
        {
            self.reporter
                .report(Issue::new(Severity::Info, IssueKind::Skipped, message));
        }
    }
}

impl<S, A, E, R> Drop for TestStore<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Clone + PartialEq + Debug + Send + Sync + 'static,
    A: Clone + PartialEq + Debug + Send + 'static,
    E: Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.finished || std::thread::panicking() {
            self.store.cancel_in_flight_effects();
            return;
        }
        self.finished = true;
        self.check_completion();
    }
}

impl<S, A, E, R> Debug for TestStore<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Clone + PartialEq + Debug + Send + Sync + 'static,
    A: Clone + PartialEq + Debug + Send + 'static,
    E: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestStore")
            .field("state", &self.state)
            .field("received", &self.received.len())
            .field("exhaustivity", &self.exhaustivity)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// The effects started by one [`TestStore::send`].
pub struct TestStoreTask {
    handle: EffectHandle,
    reporter: Arc<dyn IssueReporter>,
    timeout: Duration,
}

impl TestStoreTask {
    /// Cancel the effects of this action.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Whether every effect of this action has finished.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.handle.is_complete()
    }

    /// Wait for the effects of this action, failing after the store's
    /// timeout.
    pub async fn finish(mut self) {
        if self.handle.wait_with_timeout(self.timeout).await.is_err() {
            self.reporter.report(Issue::failure(
                IssueKind::InFlightEffects,
                format!("An effect of this task did not finish within {:?}", self.timeout),
            ));
        }
    }
}

impl Debug for TestStoreTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestStoreTask")
            .field("handle", &self.handle)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
