//! Reducer composition utilities
//!
//! This module provides utilities for composing reducers in various ways:
//! - **`combine_reducers`**: Run multiple reducers on the same state/action
//! - **`scope_reducer`**: Lift a child reducer into a parent domain
//! - **`if_let`**, **`for_each`**, **`if_case_let`**: Run a child reducer on
//!   optional, collection-element or enum-case state, tearing down the
//!   child's effects when its state disappears
//! - **`Reduce`**, **`EmptyReducer`**, **`FilterReducer`**, **`OnChange`**,
//!   **`TracingReducer`**: small building blocks
//!
//! Accessors are plain function pointers. There is no reflection: a parent
//! names its child state with `fn(&mut Parent) -> &mut Child` and its child
//! actions with an [`ActionPrism`].
//!
//! # Examples
//!
//! ## Combining Reducers
//!
//! ```
//! use reducer_kit_core::{smallvec, Effect, Reducer, SmallVec};
//! use reducer_kit_core::composition::combine_reducers;
//!
//! #[derive(Clone, Default)]
//! struct AppState {
//!     counter: i32,
//!     logged: bool,
//! }
//!
//! #[derive(Clone)]
//! enum AppAction {
//!     Increment,
//!     Log,
//! }
//!
//! struct CounterReducer;
//! struct LoggingReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = AppState;
//!     type Action = AppAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut AppState, action: AppAction, _env: &()) -> SmallVec<[Effect<AppAction>; 4]> {
//!         if matches!(action, AppAction::Increment) {
//!             state.counter += 1;
//!         }
//!         smallvec![]
//!     }
//! }
//!
//! impl Reducer for LoggingReducer {
//!     type State = AppState;
//!     type Action = AppAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut AppState, action: AppAction, _env: &()) -> SmallVec<[Effect<AppAction>; 4]> {
//!         if matches!(action, AppAction::Log) {
//!             state.logged = true;
//!         }
//!         smallvec![]
//!     }
//! }
//!
//! let combined = combine_reducers(vec![Box::new(CounterReducer), Box::new(LoggingReducer)]);
//!
//! let mut state = AppState::default();
//! let _ = combined.reduce(&mut state, AppAction::Increment, &());
//! assert_eq!(state.counter, 1);
//! ```

use crate::diagnostics::{Issue, IssueKind, IssueReporter, TracingReporter};
use crate::effect::Effect;
use crate::effect_id::EffectId;
use crate::reducer::Reducer;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

type Effects<A> = SmallVec<[Effect<A>; 4]>;

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer is run in declared order; every mutation applies and all
/// effects are merged.
#[must_use]
pub fn combine_reducers<S, A, E>(
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>>,
) -> CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    CombinedReducer { reducers }
}

/// A combined reducer that runs multiple reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>>,
}

impl<S, A, E> Reducer for CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        let mut all_effects = SmallVec::new();

        for reducer in &self.reducers {
            let effects = reducer.reduce(state, action.clone(), env);
            all_effects.extend(effects);
        }

        all_effects
    }
}

/// Explicit bidirectional mapping between a parent action and a child action.
///
/// `extract` recognises the child case of a parent action, `embed` wraps a
/// child action back into the parent.
pub struct ActionPrism<A, CA> {
    /// Returns the child action if `action` is the child case.
    pub extract: fn(&A) -> Option<CA>,
    /// Wraps a child action into the parent action type.
    pub embed: fn(CA) -> A,
}

impl<A, CA> ActionPrism<A, CA> {
    /// Create a prism from its two halves.
    #[must_use]
    pub const fn new(extract: fn(&A) -> Option<CA>, embed: fn(CA) -> A) -> Self {
        Self { extract, embed }
    }
}

impl<A, CA> Clone for ActionPrism<A, CA> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, CA> Copy for ActionPrism<A, CA> {}

/// Scopes a child reducer into a parent domain.
///
/// Parent actions the prism does not recognise are ignored; recognised ones
/// run the child on `state(parent)` in place, and the child's effects are
/// mapped back into parent actions.
///
/// # Examples
///
/// ```
/// use reducer_kit_core::{smallvec, Effect, Reducer, SmallVec};
/// use reducer_kit_core::composition::{scope_reducer, ActionPrism};
///
/// #[derive(Clone, Default)]
/// struct CounterState {
///     count: i32,
/// }
///
/// #[derive(Clone)]
/// enum CounterAction {
///     Increment,
/// }
///
/// struct CounterReducer;
///
/// impl Reducer for CounterReducer {
///     type State = CounterState;
///     type Action = CounterAction;
///     type Environment = ();
///
///     fn reduce(&self, state: &mut CounterState, action: CounterAction, _env: &()) -> SmallVec<[Effect<CounterAction>; 4]> {
///         match action {
///             CounterAction::Increment => state.count += 1,
///         }
///         smallvec![]
///     }
/// }
///
/// #[derive(Clone, Default)]
/// struct AppState {
///     counter: CounterState,
/// }
///
/// #[derive(Clone)]
/// enum AppAction {
///     Counter(CounterAction),
/// }
///
/// let scoped = scope_reducer(
///     CounterReducer,
///     |app: &mut AppState| &mut app.counter,
///     ActionPrism::new(
///         |action: &AppAction| match action {
///             AppAction::Counter(a) => Some(a.clone()),
///         },
///         AppAction::Counter,
///     ),
/// );
///
/// let mut state = AppState::default();
/// let _ = scoped.reduce(&mut state, AppAction::Counter(CounterAction::Increment), &());
/// assert_eq!(state.counter.count, 1);
/// ```
pub fn scope_reducer<S, A, R>(
    reducer: R,
    state: fn(&mut S) -> &mut R::State,
    action: ActionPrism<A, R::Action>,
) -> ScopedReducer<S, A, R>
where
    R: Reducer,
{
    ScopedReducer {
        reducer,
        state,
        action,
    }
}

/// A child reducer lifted into a parent domain.
///
/// Created by [`scope_reducer`].
pub struct ScopedReducer<S, A, R>
where
    R: Reducer,
{
    reducer: R,
    state: fn(&mut S) -> &mut R::State,
    action: ActionPrism<A, R::Action>,
}

impl<S, A, R> Reducer for ScopedReducer<S, A, R>
where
    R: Reducer,
    A: Send + 'static,
    R::Action: Send + 'static,
{
    type State = S;
    type Action = A;
    type Environment = R::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        let Some(child_action) = (self.action.extract)(&action) else {
            return SmallVec::new();
        };

        let effects = self.reducer.reduce((self.state)(state), child_action, env);
        lift_effects(effects, self.action.embed, None)
    }
}

/// Map child effects into the parent, optionally tagging each one with
/// `tag` so it can be torn down later.
///
/// A tagged child also has every identifier it registers, cancels or
/// throttles under scoped to `tag`, so siblings using the same identifier
/// stay independent.
fn lift_effects<CA, A, F>(effects: Effects<CA>, embed: F, tag: Option<&EffectId>) -> Effects<A>
where
    CA: Send + 'static,
    A: Send + 'static,
    F: Fn(CA) -> A + Clone + Send + Sync + 'static,
{
    effects
        .into_iter()
        .filter(|effect| !effect.is_none())
        .map(|effect| {
            let effect = effect.map(embed.clone());
            match tag {
                Some(id) => scope_ids(effect, id).cancellable(id.clone(), false),
                None => effect,
            }
        })
        .collect()
}

/// Rewrite every identifier inside `effect` into `scope`'s namespace.
fn scope_ids<A>(effect: Effect<A>, scope: &EffectId) -> Effect<A> {
    match effect {
        Effect::Parallel(effects) => {
            Effect::Parallel(effects.into_iter().map(|e| scope_ids(e, scope)).collect())
        },
        Effect::Sequential(effects) => {
            Effect::Sequential(effects.into_iter().map(|e| scope_ids(e, scope)).collect())
        },
        Effect::Cancellable {
            id,
            cancel_in_flight,
            effect,
        } => Effect::Cancellable {
            id: id.scoped(scope),
            cancel_in_flight,
            effect: Box::new(scope_ids(*effect, scope)),
        },
        Effect::Cancel(id) => Effect::Cancel(id.scoped(scope)),
        Effect::Throttle {
            id,
            interval,
            clock,
            latest,
            effect,
        } => Effect::Throttle {
            id: id.scoped(scope),
            interval,
            clock,
            latest,
            effect: Box::new(scope_ids(*effect, scope)),
        },
        Effect::Timeout {
            duration,
            clock,
            effect,
        } => Effect::Timeout {
            duration,
            clock,
            effect: Box::new(scope_ids(*effect, scope)),
        },
        // CancelAll stays store-wide.
        other => other,
    }
}

/// Identity of a presented child, as used in its structural tag.
fn identity_of<T: Identifiable>(child: &T) -> EffectId {
    EffectId::new(child.id())
}

/// What a presence reducer does with a child action whose state is absent.
#[derive(Clone)]
struct MissingStatePolicy {
    reporter: Arc<dyn IssueReporter>,
    tolerate: bool,
}

impl Default for MissingStatePolicy {
    fn default() -> Self {
        Self {
            reporter: Arc::new(TracingReporter),
            tolerate: false,
        }
    }
}

impl MissingStatePolicy {
    fn report(&self, message: String) {
        if self.tolerate {
            tracing::trace!("{message}");
            return;
        }
        self.reporter
            .report(Issue::warning(IssueKind::MissingChildState, message));
    }
}

/// Builder methods shared by the presence reducers.
macro_rules! presence_builders {
    () => {
        /// Route missing-state diagnostics to `reporter`.
        #[must_use]
        pub fn with_reporter(mut self, reporter: impl IssueReporter + 'static) -> Self {
            self.missing.reporter = Arc::new(reporter);
            self
        }

        /// Silently drop child actions that arrive while the child state is
        /// absent. Useful when the child is routinely dismissed while its
        /// effects are still finishing.
        #[must_use]
        pub fn tolerate_missing_state(mut self) -> Self {
            self.missing.tolerate = true;
            self
        }
    };
}

/// Runs a child reducer on optional child state.
///
/// Created by [`if_let`]. The child runs first, and only while its state is
/// `Some`. Every effect the child starts is tagged with
/// `EffectId::structural(label, EffectId::new(child.id()))`. When the parent
/// sets the state to `None`, or replaces it with a child of another
/// identity, the old child's effects are cancelled.
///
/// A child whose `Identifiable::Id` is `()` is tracked by presence alone:
/// replacing it keeps its effects running.
pub struct IfLet<P, R>
where
    P: Reducer,
    R: Reducer,
{
    parent: P,
    child: R,
    label: &'static str,
    state: fn(&mut P::State) -> &mut Option<R::State>,
    identity: fn(&R::State) -> EffectId,
    action: ActionPrism<P::Action, R::Action>,
    missing: MissingStatePolicy,
}

/// Embed a child reducer that operates on `Option<Child>` state.
pub fn if_let<P, R>(
    parent: P,
    child: R,
    label: &'static str,
    state: fn(&mut P::State) -> &mut Option<R::State>,
    action: ActionPrism<P::Action, R::Action>,
) -> IfLet<P, R>
where
    P: Reducer,
    R: Reducer<Environment = P::Environment>,
    R::State: Identifiable,
{
    IfLet {
        parent,
        child,
        label,
        state,
        identity: identity_of::<R::State>,
        action,
        missing: MissingStatePolicy::default(),
    }
}

impl<P, R> IfLet<P, R>
where
    P: Reducer,
    R: Reducer,
{
    presence_builders!();

    fn effect_id(&self, child: &R::State) -> EffectId {
        EffectId::structural(self.label, (self.identity)(child))
    }

    fn presented(&self, state: &mut P::State) -> Option<EffectId> {
        (self.state)(state).as_ref().map(|child| self.effect_id(child))
    }
}

impl<P, R> Reducer for IfLet<P, R>
where
    P: Reducer,
    R: Reducer<Environment = P::Environment>,
    P::Action: Send + 'static,
    R::Action: Send + 'static,
{
    type State = P::State;
    type Action = P::Action;
    type Environment = P::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        let mut effects = SmallVec::new();

        if let Some(child_action) = (self.action.extract)(&action) {
            match (self.state)(state).as_mut() {
                Some(child_state) => {
                    let child_effects = self.child.reduce(child_state, child_action, env);
                    let tag = self.effect_id(child_state);
                    effects = lift_effects(child_effects, self.action.embed, Some(&tag));
                },
                None => self.missing.report(format!(
                    "An \"if_let\" reducer at \"{}\" received a child action while its state was \
                     absent. The action was dropped. Make sure child actions are only sent while \
                     the child state is present, and that child effects are torn down before the \
                     state is cleared.",
                    self.label
                )),
            }
        }

        let before = self.presented(state);
        effects.extend(self.parent.reduce(state, action, env));
        let after = self.presented(state);

        if let Some(gone) = before.filter(|id| after.as_ref() != Some(id)) {
            tracing::debug!(label = self.label, child = %gone, "Child state dismissed, cancelling its effects");
            effects.push(Effect::Cancel(gone));
        }

        effects
    }
}

/// Runs a child reducer on one case of an enum state.
///
/// Created by [`if_case_let`]. Like [`IfLet`], but the child state is present
/// when `case` returns `Some`. Leaving the case, or entering it again with
/// a child of another identity, cancels the old child's effects.
pub struct IfCaseLet<P, R>
where
    P: Reducer,
    R: Reducer,
{
    parent: P,
    child: R,
    label: &'static str,
    case: fn(&mut P::State) -> Option<&mut R::State>,
    identity: fn(&R::State) -> EffectId,
    action: ActionPrism<P::Action, R::Action>,
    missing: MissingStatePolicy,
}

/// Embed a child reducer that operates on one case of an enum state.
pub fn if_case_let<P, R>(
    parent: P,
    child: R,
    label: &'static str,
    case: fn(&mut P::State) -> Option<&mut R::State>,
    action: ActionPrism<P::Action, R::Action>,
) -> IfCaseLet<P, R>
where
    P: Reducer,
    R: Reducer<Environment = P::Environment>,
    R::State: Identifiable,
{
    IfCaseLet {
        parent,
        child,
        label,
        case,
        identity: identity_of::<R::State>,
        action,
        missing: MissingStatePolicy::default(),
    }
}

impl<P, R> IfCaseLet<P, R>
where
    P: Reducer,
    R: Reducer,
{
    presence_builders!();

    fn effect_id(&self, child: &R::State) -> EffectId {
        EffectId::structural(self.label, (self.identity)(child))
    }

    fn presented(&self, state: &mut P::State) -> Option<EffectId> {
        (self.case)(state).map(|child| self.effect_id(child))
    }
}

impl<P, R> Reducer for IfCaseLet<P, R>
where
    P: Reducer,
    R: Reducer<Environment = P::Environment>,
    P::Action: Send + 'static,
    R::Action: Send + 'static,
{
    type State = P::State;
    type Action = P::Action;
    type Environment = P::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        let mut effects = SmallVec::new();

        if let Some(child_action) = (self.action.extract)(&action) {
            match (self.case)(state) {
                Some(child_state) => {
                    let child_effects = self.child.reduce(child_state, child_action, env);
                    let tag = self.effect_id(child_state);
                    effects = lift_effects(child_effects, self.action.embed, Some(&tag));
                },
                None => self.missing.report(format!(
                    "An \"if_case_let\" reducer at \"{}\" received a child action while the state \
                     was in a different case. The action was dropped.",
                    self.label
                )),
            }
        }

        let before = self.presented(state);
        effects.extend(self.parent.reduce(state, action, env));
        let after = self.presented(state);

        if let Some(gone) = before.filter(|id| after.as_ref() != Some(id)) {
            tracing::debug!(label = self.label, child = %gone, "State left its case, cancelling child effects");
            effects.push(Effect::Cancel(gone));
        }

        effects
    }
}

/// A value with a stable identity.
pub trait Identifiable {
    /// The identifier type.
    type Id: Clone + Hash + Eq + Debug + Send + Sync + 'static;

    /// This value's identifier.
    fn id(&self) -> Self::Id;
}

/// A collection whose elements can be looked up by identifier.
pub trait IdentifiedCollection {
    /// The identifier type.
    type Id: Clone + Hash + Eq + Debug + Send + Sync + 'static;
    /// The element type.
    type Element;

    /// Mutable access to the element with the given identifier.
    fn element_mut(&mut self, id: &Self::Id) -> Option<&mut Self::Element>;

    /// Identifiers of every element, in iteration order.
    fn ids(&self) -> Vec<Self::Id>;
}

impl<T: Identifiable> IdentifiedCollection for Vec<T> {
    type Id = T::Id;
    type Element = T;

    fn element_mut(&mut self, id: &Self::Id) -> Option<&mut T> {
        self.iter_mut().find(|element| element.id() == *id)
    }

    fn ids(&self) -> Vec<Self::Id> {
        self.iter().map(Identifiable::id).collect()
    }
}

impl<K, V> IdentifiedCollection for BTreeMap<K, V>
where
    K: Ord + Clone + Hash + Eq + Debug + Send + Sync + 'static,
{
    type Id = K;
    type Element = V;

    fn element_mut(&mut self, id: &K) -> Option<&mut V> {
        self.get_mut(id)
    }

    fn ids(&self) -> Vec<K> {
        self.keys().cloned().collect()
    }
}

impl<K, V, H> IdentifiedCollection for HashMap<K, V, H>
where
    K: Clone + Hash + Eq + Debug + Send + Sync + 'static,
    H: std::hash::BuildHasher,
{
    type Id = K;
    type Element = V;

    fn element_mut(&mut self, id: &K) -> Option<&mut V> {
        self.get_mut(id)
    }

    fn ids(&self) -> Vec<K> {
        self.keys().cloned().collect()
    }
}

/// Runs a child reducer on individual elements of an identified collection.
///
/// Created by [`for_each`]. Child actions are addressed by `(id, action)`.
/// Effects of each element are tagged with `EffectId::structural(label, id)`,
/// and the identifiers the element uses itself are scoped under that tag.
/// When the parent removes an element, only that element's effects are
/// cancelled.
pub struct ForEach<P, R, C>
where
    P: Reducer,
    R: Reducer,
    C: IdentifiedCollection<Element = R::State>,
{
    parent: P,
    child: R,
    label: &'static str,
    elements: fn(&mut P::State) -> &mut C,
    action: ActionPrism<P::Action, (C::Id, R::Action)>,
    missing: MissingStatePolicy,
}

/// Embed a child reducer that operates on each element of a collection.
pub fn for_each<P, R, C>(
    parent: P,
    child: R,
    label: &'static str,
    elements: fn(&mut P::State) -> &mut C,
    action: ActionPrism<P::Action, (C::Id, R::Action)>,
) -> ForEach<P, R, C>
where
    P: Reducer,
    R: Reducer<Environment = P::Environment>,
    C: IdentifiedCollection<Element = R::State>,
{
    ForEach {
        parent,
        child,
        label,
        elements,
        action,
        missing: MissingStatePolicy::default(),
    }
}

impl<P, R, C> ForEach<P, R, C>
where
    P: Reducer,
    R: Reducer,
    C: IdentifiedCollection<Element = R::State>,
{
    presence_builders!();
}

impl<P, R, C> Reducer for ForEach<P, R, C>
where
    P: Reducer,
    R: Reducer<Environment = P::Environment>,
    C: IdentifiedCollection<Element = R::State>,
    P::Action: Send + 'static,
    R::Action: Send + 'static,
{
    type State = P::State;
    type Action = P::Action;
    type Environment = P::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        let mut effects: Effects<Self::Action> = SmallVec::new();

        if let Some((id, child_action)) = (self.action.extract)(&action) {
            match (self.elements)(state).element_mut(&id) {
                Some(element) => {
                    let child_effects = self.child.reduce(element, child_action, env);
                    let tag = EffectId::structural(self.label, id.clone());
                    let embed = self.action.embed;
                    let element_id = id.clone();
                    effects = lift_effects(
                        child_effects,
                        move |child: R::Action| embed((element_id.clone(), child)),
                        Some(&tag),
                    );
                },
                None => self.missing.report(format!(
                    "A \"for_each\" reducer at \"{}\" received an action for element {id:?}, \
                     which is not in the collection. The action was dropped.",
                    self.label
                )),
            }
        }

        let ids_before = (self.elements)(state).ids();
        effects.extend(self.parent.reduce(state, action, env));
        let ids_after = (self.elements)(state).ids();

        if ids_before != ids_after {
            let remaining: HashSet<_> = ids_after.into_iter().collect();
            for removed in ids_before.into_iter().filter(|id| !remaining.contains(id)) {
                tracing::debug!(label = self.label, id = ?removed, "Element removed, cancelling its effects");
                effects.push(Effect::Cancel(EffectId::structural(self.label, removed)));
            }
        }

        effects
    }
}

/// A reducer built from a closure.
///
/// # Examples
///
/// ```
/// use reducer_kit_core::{smallvec, Reducer};
/// use reducer_kit_core::composition::Reduce;
///
/// let double = Reduce::new(|count: &mut i32, factor: i32, _env: &()| {
///     *count *= factor;
///     smallvec![]
/// });
///
/// let mut count = 2;
/// let _ = double.reduce(&mut count, 3, &());
/// assert_eq!(count, 6);
/// ```
pub struct Reduce<S, A, E, F> {
    f: F,
    _phantom: PhantomData<fn(&mut S, A, &E)>,
}

impl<S, A, E, F> Reduce<S, A, E, F>
where
    F: Fn(&mut S, A, &E) -> Effects<A>,
{
    /// Wrap a closure as a reducer.
    pub const fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

impl<S, A, E, F> Reducer for Reduce<S, A, E, F>
where
    F: Fn(&mut S, A, &E) -> Effects<A>,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(&self, state: &mut S, action: A, env: &E) -> Effects<A> {
        (self.f)(state, action, env)
    }
}

/// A reducer that does nothing.
pub struct EmptyReducer<S, A, E> {
    _phantom: PhantomData<fn(&mut S, A, &E)>,
}

impl<S, A, E> EmptyReducer<S, A, E> {
    /// Create the empty reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<S, A, E> Default for EmptyReducer<S, A, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, A, E> Reducer for EmptyReducer<S, A, E> {
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(&self, _state: &mut S, _action: A, _env: &E) -> Effects<A> {
        SmallVec::new()
    }
}

/// Runs the inner reducer only when `predicate` holds for the current state
/// and incoming action.
pub struct FilterReducer<R, F> {
    reducer: R,
    predicate: F,
}

impl<R, F> FilterReducer<R, F>
where
    R: Reducer,
    F: Fn(&R::State, &R::Action) -> bool,
{
    /// Guard `reducer` with `predicate`.
    pub const fn new(reducer: R, predicate: F) -> Self {
        Self { reducer, predicate }
    }
}

impl<R, F> Reducer for FilterReducer<R, F>
where
    R: Reducer,
    F: Fn(&R::State, &R::Action) -> bool,
{
    type State = R::State;
    type Action = R::Action;
    type Environment = R::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        if (self.predicate)(state, &action) {
            self.reducer.reduce(state, action, env)
        } else {
            SmallVec::new()
        }
    }
}

/// Runs a follow-up whenever a value derived from state changes.
///
/// After the inner reducer runs, `of` is compared before and after; if it
/// differs, `then(old, new, state, env)` runs and its effects are appended.
pub struct OnChange<R, V, F>
where
    R: Reducer,
{
    reducer: R,
    of: fn(&R::State) -> V,
    then: F,
}

impl<R, V, F> OnChange<R, V, F>
where
    R: Reducer,
    V: PartialEq,
    F: Fn(&V, &V, &mut R::State, &R::Environment) -> Effects<R::Action>,
{
    /// Watch `of` on the state produced by `reducer`.
    pub const fn new(reducer: R, of: fn(&R::State) -> V, then: F) -> Self {
        Self { reducer, of, then }
    }
}

impl<R, V, F> Reducer for OnChange<R, V, F>
where
    R: Reducer,
    V: PartialEq,
    F: Fn(&V, &V, &mut R::State, &R::Environment) -> Effects<R::Action>,
{
    type State = R::State;
    type Action = R::Action;
    type Environment = R::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        let old = (self.of)(state);
        let mut effects = self.reducer.reduce(state, action, env);
        let new = (self.of)(state);

        if old != new {
            effects.extend((self.then)(&old, &new, state, env));
        }
        effects
    }
}

/// Logs every action and the resulting state change through `tracing`.
///
/// State is only cloned for comparison when `DEBUG` is enabled.
pub struct TracingReducer<R> {
    reducer: R,
    name: &'static str,
}

impl<R: Reducer> TracingReducer<R> {
    /// Wrap `reducer`, logging under `name`.
    pub const fn new(name: &'static str, reducer: R) -> Self {
        Self { reducer, name }
    }
}

impl<R> Reducer for TracingReducer<R>
where
    R: Reducer,
    R::State: Clone + PartialEq + Debug,
    R::Action: Debug,
{
    type State = R::State;
    type Action = R::Action;
    type Environment = R::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return self.reducer.reduce(state, action, env);
        }

        tracing::debug!(reducer = self.name, action = ?action, "Received action");
        let before = state.clone();
        let effects = self.reducer.reduce(state, action, env);

        if before == *state {
            tracing::debug!(reducer = self.name, "No state changes");
        } else {
            tracing::debug!(reducer = self.name, ?before, after = ?state, "State changed");
        }
        tracing::trace!(reducer = self.name, effects = effects.len(), "Effects returned");

        effects
    }
}
