//! # Search Example
//!
//! A search field that queries a backend as the user types.
//!
//! This example showcases:
//! - Debouncing: only the last keystroke of a burst triggers a request
//! - Cancellation: clearing the query cancels the pending request
//! - Injected dependencies: the clock and the search client live in the
//!   environment, so tests run on virtual time against a fake backend
//! - Turning effect failures into actions
//!
//! ## Example
//!
//! ```
//! use reducer_kit_core::SystemClock;
//! use reducer_kit_runtime::Store;
//! use search::{InMemorySearchClient, SearchAction, SearchEnvironment, SearchReducer, SearchState};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let env = SearchEnvironment::new(
//!     Arc::new(SystemClock),
//!     Arc::new(InMemorySearchClient::new(["rust", "ruby"])),
//! );
//! let store = Store::new(SearchState::default(), SearchReducer, env);
//!
//! let mut handle = store.send_cascading(SearchAction::QueryChanged("ru".into())).await.unwrap();
//! handle.wait().await;
//! assert_eq!(store.state(|s| s.results.len()).await, 2);
//! # });
//! ```

use futures::future::BoxFuture;
use reducer_kit_core::{Clock, Effect, EffectId, Reducer, SmallVec, async_effect, smallvec};
use std::sync::Arc;
use std::time::Duration;

/// Quiet period after the last keystroke before a request is sent
pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// Longest query the backend accepts
pub const MAX_QUERY_LEN: usize = 64;

/// Errors from the search backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// The backend could not be reached
    #[error("search service unavailable")]
    Unavailable,
    /// The query exceeds [`MAX_QUERY_LEN`]
    #[error("query too long: {0} characters")]
    QueryTooLong(usize),
}

/// The search backend
pub trait SearchClient: Send + Sync {
    /// Find every entry matching `query`
    fn search(&self, query: String) -> BoxFuture<'static, Result<Vec<String>, SearchError>>;
}

/// A backend over a fixed word list, matching case-insensitive prefixes.
#[derive(Debug, Clone, Default)]
pub struct InMemorySearchClient {
    words: Arc<Vec<String>>,
}

impl InMemorySearchClient {
    /// Create a client over `words`
    #[must_use]
    pub fn new<I, W>(words: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: Into<String>,
    {
        Self {
            words: Arc::new(words.into_iter().map(Into::into).collect()),
        }
    }
}

impl SearchClient for InMemorySearchClient {
    fn search(&self, query: String) -> BoxFuture<'static, Result<Vec<String>, SearchError>> {
        let words = Arc::clone(&self.words);
        Box::pin(async move {
            if query.chars().count() > MAX_QUERY_LEN {
                return Err(SearchError::QueryTooLong(query.chars().count()));
            }
            let needle = query.to_lowercase();
            Ok(words
                .iter()
                .filter(|word| word.to_lowercase().starts_with(&needle))
                .cloned()
                .collect())
        })
    }
}

/// Search state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    /// Current query text
    pub query: String,
    /// Results of the last completed request
    pub results: Vec<String>,
    /// Whether a request is pending
    pub is_searching: bool,
    /// The last failure, cleared by the next success
    pub error: Option<SearchError>,
}

/// Search actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchAction {
    /// The user edited the query
    QueryChanged(String),
    /// The backend answered
    SearchResponse(Result<Vec<String>, SearchError>),
}

/// Search environment
#[derive(Clone)]
pub struct SearchEnvironment {
    /// Clock used for debouncing
    pub clock: Arc<dyn Clock>,
    /// Search backend
    pub client: Arc<dyn SearchClient>,
}

impl SearchEnvironment {
    /// Create an environment
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, client: Arc<dyn SearchClient>) -> Self {
        Self { clock, client }
    }
}

/// Identifies the in-flight search request
struct SearchRequest;

/// Search reducer
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchReducer;

impl Reducer for SearchReducer {
    type State = SearchState;
    type Action = SearchAction;
    type Environment = SearchEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            SearchAction::QueryChanged(query) => {
                state.query.clone_from(&query);

                if query.trim().is_empty() {
                    state.results.clear();
                    state.is_searching = false;
                    return smallvec![Effect::cancel(EffectId::of::<SearchRequest>())];
                }

                state.is_searching = true;
                let request = env.client.search(query);
                smallvec![
                    async_effect!(Some(SearchAction::SearchResponse(request.await)))
                        .debounce(EffectId::of::<SearchRequest>(), DEBOUNCE, Arc::clone(&env.clock))
                ]
            },
            SearchAction::SearchResponse(Ok(results)) => {
                state.is_searching = false;
                state.results = results;
                state.error = None;
                smallvec![]
            },
            SearchAction::SearchResponse(Err(error)) => {
                tracing::debug!(%error, query = %state.query, "Search failed");
                state.is_searching = false;
                state.error = Some(error);
                smallvec![]
            },
        }
    }
}
