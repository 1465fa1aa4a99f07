//! # Todos Example
//!
//! A todo list where every row runs its own reducer.
//!
//! This example showcases:
//! - `for_each`: a row reducer embedded over an identified collection
//! - Per-row effects: toggling a row saves it after a debounce, and removing
//!   the row cancels its pending save
//! - A parent-level debounced effect (re-sorting) that outlives any one row
//!
//! ## Example
//!
//! ```
//! use reducer_kit_runtime::Store;
//! use reducer_kit_testing::test_clock;
//! use std::sync::Arc;
//! use todos::{TodosAction, TodosEnvironment, TodosState};
//!
//! # tokio_test::block_on(async {
//! let env = TodosEnvironment::new(Arc::new(test_clock()));
//! let store = Store::new(TodosState::default(), todos::reducer(), env);
//!
//! let _ = store.send(TodosAction::Add("Write docs".into())).await;
//! assert_eq!(store.state(|s| s.todos.len()).await, 1);
//! # });
//! ```

use reducer_kit_core::composition::{ActionPrism, ForEach, Identifiable, for_each};
use reducer_kit_core::{Clock, Effect, EffectId, Reducer, SmallVec, smallvec};
use std::sync::Arc;
use std::time::Duration;

/// Delay between the last toggle of a row and its save
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Delay between the last toggle anywhere and re-sorting the list
pub const SORT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Label under which row effects are tagged
pub const ROWS: &str = "todos";

/// A single todo row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    /// Stable row identifier
    pub id: u64,
    /// What needs doing
    pub title: String,
    /// Whether it is done
    pub is_complete: bool,
    /// Whether a save is pending
    pub is_saving: bool,
}

impl Todo {
    /// A new, incomplete todo
    #[must_use]
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            is_complete: false,
            is_saving: false,
        }
    }
}

impl Identifiable for Todo {
    type Id = u64;

    fn id(&self) -> u64 {
        self.id
    }
}

/// Actions of a single row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoAction {
    /// Flip the completion flag
    ToggleCompleted,
    /// The pending save went through
    Saved,
}

/// Shared environment
#[derive(Clone)]
pub struct TodosEnvironment {
    /// Clock driving both debounces
    pub clock: Arc<dyn Clock>,
}

impl TodosEnvironment {
    /// Create an environment on `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Identifies a row's pending save; each row gets its own under [`ROWS`].
struct SaveRequest;

/// Reducer for a single row
#[derive(Debug, Clone, Copy, Default)]
pub struct TodoReducer;

impl Reducer for TodoReducer {
    type State = Todo;
    type Action = TodoAction;
    type Environment = TodosEnvironment;

    fn reduce(
        &self,
        todo: &mut Todo,
        action: TodoAction,
        env: &TodosEnvironment,
    ) -> SmallVec<[Effect<TodoAction>; 4]> {
        match action {
            TodoAction::ToggleCompleted => {
                todo.is_complete = !todo.is_complete;
                todo.is_saving = true;
                smallvec![Effect::send(TodoAction::Saved).debounce(
                    EffectId::of::<SaveRequest>(),
                    SAVE_DEBOUNCE,
                    Arc::clone(&env.clock),
                )]
            },
            TodoAction::Saved => {
                todo.is_saving = false;
                smallvec![]
            },
        }
    }
}

/// List state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodosState {
    /// Rows in display order
    pub todos: Vec<Todo>,
    /// Identifier handed to the next added row
    pub next_id: u64,
}

/// List actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodosAction {
    /// Append a row
    Add(String),
    /// Remove a row
    Delete(u64),
    /// Remove every completed row
    ClearCompleted,
    /// Move completed rows below incomplete ones
    SortCompleted,
    /// An action addressed to one row
    Todo(u64, TodoAction),
}

struct SortRequest;

/// List-level logic; rows are handled by [`TodoReducer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TodosCore;

impl Reducer for TodosCore {
    type State = TodosState;
    type Action = TodosAction;
    type Environment = TodosEnvironment;

    fn reduce(
        &self,
        state: &mut TodosState,
        action: TodosAction,
        env: &TodosEnvironment,
    ) -> SmallVec<[Effect<TodosAction>; 4]> {
        match action {
            TodosAction::Add(title) => {
                let id = state.next_id;
                state.next_id += 1;
                state.todos.push(Todo::new(id, title));
                smallvec![]
            },
            TodosAction::Delete(id) => {
                state.todos.retain(|todo| todo.id != id);
                smallvec![]
            },
            TodosAction::ClearCompleted => {
                state.todos.retain(|todo| !todo.is_complete);
                smallvec![]
            },
            TodosAction::SortCompleted => {
                // Stable: rows keep their relative order within each group.
                state.todos.sort_by_key(|todo| todo.is_complete);
                smallvec![]
            },
            TodosAction::Todo(id, TodoAction::ToggleCompleted)
                if state.todos.iter().any(|todo| todo.id == id) =>
            {
                smallvec![Effect::send(TodosAction::SortCompleted).debounce(
                    EffectId::of::<SortRequest>(),
                    SORT_DEBOUNCE,
                    Arc::clone(&env.clock),
                )]
            },
            TodosAction::Todo(..) => smallvec![],
        }
    }
}

/// The full todo list reducer
pub type TodosReducer = ForEach<TodosCore, TodoReducer, Vec<Todo>>;

/// Build the todo list reducer.
#[must_use]
pub fn reducer() -> TodosReducer {
    for_each(
        TodosCore,
        TodoReducer,
        ROWS,
        |state: &mut TodosState| &mut state.todos,
        ActionPrism::new(
            |action: &TodosAction| match action {
                TodosAction::Todo(id, action) => Some((*id, action.clone())),
                _ => None,
            },
            |(id, action)| TodosAction::Todo(id, action),
        ),
    )
}
