//! Effect module - Side effect descriptions
//!
//! Effects describe side effects to be performed by the runtime. They are
//! values, not execution: a reducer returns them and the `Store` runs them.
//! Every effect may feed actions back into the store that started it.
//!
//! # Composition
//!
//! - [`Effect::merge`] runs effects concurrently; actions interleave in
//!   completion order.
//! - [`Effect::concatenate`] runs effects one after another.
//! - [`Effect::map`] transforms the actions an effect emits.
//! - [`Effect::cancellable`], [`Effect::cancel`], [`Effect::debounce`],
//!   [`Effect::throttle`] and [`Effect::timeout`] control the lifetime of an
//!   effect through an [`EffectId`].
//!
//! # Example
//!
//! ```
//! use reducer_kit_core::effect::Effect;
//! use reducer_kit_core::effect_id::EffectId;
//! use reducer_kit_core::environment::SystemClock;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[derive(Clone, Debug)]
//! enum Action {
//!     Search(String),
//!     Results(Vec<String>),
//! }
//!
//! let query = String::from("rust");
//! let effect: Effect<Action> = Effect::future(async move {
//!     Some(Action::Results(vec![query]))
//! })
//! .debounce(
//!     EffectId::new("search"),
//!     Duration::from_millis(300),
//!     Arc::new(SystemClock),
//! );
//! # let _ = effect;
//! ```

use crate::cancellation::CancellationToken;
use crate::effect_id::EffectId;
use crate::environment::Clock;
use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Body of an [`Effect::Run`] effect.
pub type RunFn<Action> = Box<dyn FnOnce(ActionSender<Action>) -> BoxFuture<'static, ()> + Send>;

/// Effect type - describes a side effect to be executed
///
/// Effects are NOT executed immediately. They are descriptions of what should
/// happen, returned from reducers and executed by the Store runtime.
pub enum Effect<Action> {
    /// No-op effect
    None,

    /// Run effects concurrently
    Parallel(Vec<Effect<Action>>),

    /// Run effects one after another; the next starts after the previous
    /// one, including everything it spawned, has finished
    Sequential(Vec<Effect<Action>>),

    /// Delayed action, measured on the store's clock
    Delay {
        /// How long to wait
        duration: Duration,
        /// Action to dispatch after delay
        action: Box<Action>,
    },

    /// Arbitrary async computation
    ///
    /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
    Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

    /// Async body that may emit any number of actions through an [`ActionSender`]
    Run(RunFn<Action>),

    /// Register the inner effect under `id` so it can be cancelled
    Cancellable {
        /// Identifier the effect is registered under
        id: EffectId,
        /// Cancel every effect already registered under `id` before starting
        cancel_in_flight: bool,
        /// The wrapped effect
        effect: Box<Effect<Action>>,
    },

    /// Cancel every in-flight effect registered under the identifier
    Cancel(EffectId),

    /// Cancel every registered in-flight effect of the store
    CancelAll,

    /// Rate-limit the actions of the inner effect per `id`
    Throttle {
        /// Identifier of the throttle window
        id: EffectId,
        /// Minimum spacing between emitted actions
        interval: Duration,
        /// Clock the window is measured on
        clock: Arc<dyn Clock>,
        /// `true` keeps the latest buffered action, `false` the first one
        latest: bool,
        /// The wrapped effect
        effect: Box<Effect<Action>>,
    },

    /// Cancel the inner effect if it is still running after `duration`
    Timeout {
        /// Deadline relative to the start of the effect
        duration: Duration,
        /// Clock the deadline is measured on
        clock: Arc<dyn Clock>,
        /// The wrapped effect
        effect: Box<Effect<Action>>,
    },
}

// Manual Debug implementation since Future doesn't implement Debug
impl<Action> std::fmt::Debug for Effect<Action>
where
    Action: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::None => write!(f, "Effect::None"),
            Effect::Parallel(effects) => f.debug_tuple("Effect::Parallel").field(effects).finish(),
            Effect::Sequential(effects) => {
                f.debug_tuple("Effect::Sequential").field(effects).finish()
            },
            Effect::Delay { duration, action } => f
                .debug_struct("Effect::Delay")
                .field("duration", duration)
                .field("action", action)
                .finish(),
            Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            Effect::Run(_) => write!(f, "Effect::Run(<operation>)"),
            Effect::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => f
                .debug_struct("Effect::Cancellable")
                .field("id", id)
                .field("cancel_in_flight", cancel_in_flight)
                .field("effect", effect)
                .finish(),
            Effect::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            Effect::CancelAll => write!(f, "Effect::CancelAll"),
            Effect::Throttle {
                id,
                interval,
                latest,
                effect,
                ..
            } => f
                .debug_struct("Effect::Throttle")
                .field("id", id)
                .field("interval", interval)
                .field("latest", latest)
                .field("effect", effect)
                .finish_non_exhaustive(),
            Effect::Timeout {
                duration, effect, ..
            } => f
                .debug_struct("Effect::Timeout")
                .field("duration", duration)
                .field("effect", effect)
                .finish_non_exhaustive(),
        }
    }
}

impl<Action> Effect<Action> {
    /// The no-op effect.
    #[must_use]
    pub const fn none() -> Self {
        Effect::None
    }

    /// Whether this is [`Effect::None`].
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Effect::None)
    }

    /// Combine effects to run in parallel
    #[must_use]
    pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
        Effect::Parallel(effects)
    }

    /// Combine effects to run one after another
    #[must_use]
    pub const fn concatenate(effects: Vec<Effect<Action>>) -> Effect<Action> {
        Effect::Sequential(effects)
    }

    /// Alias for [`Effect::concatenate`]
    #[must_use]
    pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
        Effect::Sequential(effects)
    }

    /// Cancel every in-flight effect registered under `id`.
    ///
    /// Idempotent: cancelling an identifier with nothing in flight does nothing.
    #[must_use]
    pub const fn cancel(id: EffectId) -> Self {
        Effect::Cancel(id)
    }

    /// Cancel every registered in-flight effect.
    #[must_use]
    pub const fn cancel_all() -> Self {
        Effect::CancelAll
    }

    /// Dispatch `action` after `duration`.
    #[must_use]
    pub fn delay(duration: Duration, action: Action) -> Self {
        Effect::Delay {
            duration,
            action: Box::new(action),
        }
    }

    /// Make this effect cancellable under `id`.
    ///
    /// With `cancel_in_flight`, every effect already registered under `id` is
    /// cancelled before this one starts.
    #[must_use]
    pub fn cancellable(self, id: EffectId, cancel_in_flight: bool) -> Self {
        Effect::Cancellable {
            id,
            cancel_in_flight,
            effect: Box::new(self),
        }
    }

    /// Throttle the actions this effect emits.
    ///
    /// The first action of a quiescent window is emitted immediately. Actions
    /// arriving inside the window are buffered (the latest one when `latest`,
    /// otherwise the first one) and emitted at `last emission + interval`.
    #[must_use]
    pub fn throttle(
        self,
        id: EffectId,
        interval: Duration,
        clock: Arc<dyn Clock>,
        latest: bool,
    ) -> Self {
        Effect::Throttle {
            id,
            interval,
            clock,
            latest,
            effect: Box::new(self),
        }
    }

    /// Cancel this effect if it is still running after `duration`.
    #[must_use]
    pub fn timeout(self, duration: Duration, clock: Arc<dyn Clock>) -> Self {
        Effect::Timeout {
            duration,
            clock,
            effect: Box::new(self),
        }
    }
}

impl<Action: Send + 'static> Effect<Action> {
    /// Feed `action` back into the store immediately.
    #[must_use]
    pub fn send(action: Action) -> Self {
        Effect::Future(Box::pin(async move { Some(action) }))
    }

    /// Await `future` and feed its output back into the store.
    #[must_use]
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Option<Action>> + Send + 'static,
    {
        Effect::Future(Box::pin(future))
    }

    /// Run an async body that can emit any number of actions.
    ///
    /// The body receives an [`ActionSender`]; actions sent after the effect
    /// has been cancelled are dropped.
    #[must_use]
    pub fn run<F, Fut>(operation: F) -> Self
    where
        F: FnOnce(ActionSender<Action>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Effect::Run(Box::new(move |sender| Box::pin(operation(sender))))
    }

    /// Run a fallible async body.
    ///
    /// When `operation` fails, `catch` receives the error and the sender so it
    /// can turn the failure into actions. A body that fails after its effect
    /// was cancelled is ignored.
    #[must_use]
    pub fn try_run<F, Fut, E, C>(operation: F, catch: C) -> Self
    where
        F: FnOnce(ActionSender<Action>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
        C: FnOnce(E, &ActionSender<Action>) + Send + 'static,
    {
        Self::run(move |sender| async move {
            if let Err(error) = operation(sender.clone()).await {
                if !sender.is_cancelled() {
                    catch(error, &sender);
                }
            }
        })
    }

    /// Sleep for `duration` on `clock` without emitting anything.
    #[must_use]
    pub fn sleep(clock: Arc<dyn Clock>, duration: Duration) -> Self {
        Self::run(move |_| clock.sleep(duration))
    }

    /// Debounce this effect.
    ///
    /// Cancels any pending effect under `id`, waits `delay` on `clock`, then
    /// runs. A newer debounced effect with the same `id` arriving during the
    /// wait replaces this one.
    #[must_use]
    pub fn debounce(self, id: EffectId, delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Effect::Sequential(vec![Self::sleep(clock, delay), self]).cancellable(id, true)
    }

    /// Transform every action this effect emits.
    ///
    /// Ordering, cancellation identifiers and timing are preserved.
    #[must_use]
    pub fn map<B, F>(self, f: F) -> Effect<B>
    where
        B: Send + 'static,
        F: Fn(Action) -> B + Send + Sync + 'static,
    {
        self.map_shared(&(Arc::new(f) as Arc<dyn Fn(Action) -> B + Send + Sync>))
    }

    fn map_shared<B: Send + 'static>(
        self,
        f: &Arc<dyn Fn(Action) -> B + Send + Sync>,
    ) -> Effect<B> {
        match self {
            Effect::None => Effect::None,
            Effect::Parallel(effects) => {
                Effect::Parallel(effects.into_iter().map(|e| e.map_shared(f)).collect())
            },
            Effect::Sequential(effects) => {
                Effect::Sequential(effects.into_iter().map(|e| e.map_shared(f)).collect())
            },
            Effect::Delay { duration, action } => Effect::Delay {
                duration,
                action: Box::new(f(*action)),
            },
            Effect::Future(future) => {
                let f = Arc::clone(f);
                Effect::Future(Box::pin(async move { future.await.map(|action| f(action)) }))
            },
            Effect::Run(operation) => {
                let f = Arc::clone(f);
                Effect::Run(Box::new(move |sender: ActionSender<B>| {
                    operation(sender.contramap(move |action| f(action)))
                }))
            },
            Effect::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => Effect::Cancellable {
                id,
                cancel_in_flight,
                effect: Box::new(effect.map_shared(f)),
            },
            Effect::Cancel(id) => Effect::Cancel(id),
            Effect::CancelAll => Effect::CancelAll,
            Effect::Throttle {
                id,
                interval,
                clock,
                latest,
                effect,
            } => Effect::Throttle {
                id,
                interval,
                clock,
                latest,
                effect: Box::new(effect.map_shared(f)),
            },
            Effect::Timeout {
                duration,
                clock,
                effect,
            } => Effect::Timeout {
                duration,
                clock,
                effect: Box::new(effect.map_shared(f)),
            },
        }
    }
}

/// Handle through which a running effect emits actions.
///
/// Cloneable; all clones share the effect's cancellation token.
pub struct ActionSender<Action> {
    emit: Arc<dyn Fn(Action) -> bool + Send + Sync>,
    token: CancellationToken,
}

impl<Action> Clone for ActionSender<Action> {
    fn clone(&self) -> Self {
        Self {
            emit: Arc::clone(&self.emit),
            token: self.token.clone(),
        }
    }
}

impl<Action> std::fmt::Debug for ActionSender<Action> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSender")
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<Action: Send + 'static> ActionSender<Action> {
    /// Create a sender that forwards actions to `emit` until `token` is cancelled.
    ///
    /// `emit` returns `false` when the destination no longer accepts actions.
    pub fn new<F>(token: CancellationToken, emit: F) -> Self
    where
        F: Fn(Action) -> bool + Send + Sync + 'static,
    {
        Self {
            emit: Arc::new(emit),
            token,
        }
    }

    /// Emit an action.
    ///
    /// Returns `false` if the effect has been cancelled or the store is gone;
    /// the action is dropped in that case.
    pub fn send(&self, action: Action) -> bool {
        if self.token.is_cancelled() {
            tracing::trace!("Dropping action sent by a cancelled effect");
            return false;
        }
        (self.emit)(action)
    }

    /// Whether the effect has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the effect has been cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// The cancellation token of the effect.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// A sender for another action type that converts into this one.
    #[must_use]
    pub fn contramap<B, F>(self, f: F) -> ActionSender<B>
    where
        B: Send + 'static,
        F: Fn(B) -> Action + Send + Sync + 'static,
    {
        let emit = self.emit;
        ActionSender {
            emit: Arc::new(move |action| emit(f(action))),
            token: self.token,
        }
    }
}
