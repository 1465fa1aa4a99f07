//! Scoped stores: live projections of a parent store.
//!
//! A [`ScopedStore`] reads its state by projecting the root state under the
//! root lock, and sends by embedding its action into the parent action
//! type. It owns no state of its own, so every read observes the same
//! reductions as the root store.

use crate::EffectHandle;
use crate::error::StoreError;
use futures::future::BoxFuture;
use std::sync::Arc;

type ReadFn<S> = Arc<dyn Fn() -> BoxFuture<'static, S> + Send + Sync>;
type SendFn<A> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<EffectHandle, StoreError>> + Send + Sync>;

/// A projection of a [`Store`](crate::Store) onto a child state and action.
///
/// Created by [`Store::scope`](crate::Store::scope) or by scoping another
/// `ScopedStore`.
pub struct ScopedStore<S, A> {
    read: ReadFn<S>,
    send: SendFn<A>,
}

impl<S, A> Clone for ScopedStore<S, A> {
    fn clone(&self) -> Self {
        Self {
            read: Arc::clone(&self.read),
            send: Arc::clone(&self.send),
        }
    }
}

impl<S, A> std::fmt::Debug for ScopedStore<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedStore").finish_non_exhaustive()
    }
}

impl<S, A> ScopedStore<S, A>
where
    S: Send + 'static,
    A: Send + 'static,
{
    pub(crate) fn new(read: ReadFn<S>, send: SendFn<A>) -> Self {
        Self { read, send }
    }

    /// Read the projected state via a closure.
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = (self.read)().await;
        f(&state)
    }

    /// The projected state, computed from the current root state.
    pub async fn snapshot(&self) -> S {
        (self.read)().await
    }

    /// Send a child action through the parent store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the root store is
    /// shutting down.
    pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
        (self.send)(action).await
    }

    /// Scope this store further.
    #[must_use]
    pub fn scope<CS, CA, F, G>(&self, to_child: F, embed: G) -> ScopedStore<CS, CA>
    where
        CS: Send + 'static,
        CA: Send + 'static,
        F: Fn(&S) -> CS + Send + Sync + 'static,
        G: Fn(CA) -> A + Send + Sync + 'static,
    {
        let to_child = Arc::new(to_child);
        let parent_read = Arc::clone(&self.read);
        let read: ReadFn<CS> = Arc::new(move || {
            let parent_read = Arc::clone(&parent_read);
            let to_child = Arc::clone(&to_child);
            Box::pin(async move { to_child(&parent_read().await) }) as BoxFuture<'static, CS>
        });

        let embed = Arc::new(embed);
        let parent_send = Arc::clone(&self.send);
        let send: SendFn<CA> = Arc::new(move |action: CA| parent_send(embed(action)));

        ScopedStore::new(read, send)
    }
}
