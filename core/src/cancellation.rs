//! Cooperative cancellation.
//!
//! - [`CancellationToken`]: a hierarchical, cloneable flag that effect tasks
//!   check at their suspension points. Cancelling a token cancels every child
//!   token derived from it.
//! - [`CancellationRegistry`]: the table mapping an [`EffectId`] to the tokens
//!   of its in-flight effects. Each store owns its own registry, so tests can
//!   run with isolated registries.

use crate::effect_id::EffectId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

struct TokenInner {
    cancelled: watch::Sender<bool>,
    children: Mutex<Vec<Weak<TokenInner>>>,
}

impl TokenInner {
    fn cancel(&self) {
        let already = self.cancelled.send_replace(true);
        if already {
            return;
        }

        let children = std::mem::take(&mut *lock(&self.children));
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A cooperative cancellation token.
///
/// # Example
///
/// ```
/// use reducer_kit_core::cancellation::CancellationToken;
///
/// let parent = CancellationToken::new();
/// let child = parent.child_token();
///
/// parent.cancel();
/// assert!(child.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Create a new, uncancelled root token.
    #[must_use]
    pub fn new() -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            inner: Arc::new(TokenInner {
                cancelled,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Derive a child token. Cancelling `self` cancels the child; cancelling
    /// the child leaves `self` untouched.
    #[must_use]
    pub fn child_token(&self) -> Self {
        let child = Self::new();
        if self.is_cancelled() {
            child.cancel();
            return child;
        }

        {
            let mut children = lock(&self.inner.children);
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }

        // The parent may have been cancelled between the check and the push.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Cancel this token and all of its descendants. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.cancelled.subscribe();
        // The sender lives as long as `self`, so `wait_for` only returns once
        // the flag flips.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Whether two tokens are the same token.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Registry of in-flight cancellable effects.
///
/// Cloning a registry shares the underlying table. Critical sections only
/// touch the map: tokens are cancelled after the lock is released.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    entries: Arc<Mutex<HashMap<EffectId, Vec<CancellationToken>>>>,
}

impl CancellationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` as an in-flight effect under `id`.
    pub fn register(&self, id: EffectId, token: CancellationToken) {
        tracing::trace!(%id, "Registering cancellable effect");
        lock(&self.entries).entry(id).or_default().push(token);
    }

    /// Remove `token` from the entry for `id`, dropping the entry when it
    /// becomes empty.
    pub fn deregister(&self, id: &EffectId, token: &CancellationToken) {
        let mut entries = lock(&self.entries);
        if let Some(tokens) = entries.get_mut(id) {
            tokens.retain(|registered| !registered.same_as(token));
            if tokens.is_empty() {
                entries.remove(id);
            }
        }
    }

    /// Cancel every effect registered under `id` and remove the entry.
    ///
    /// Returns the number of effects cancelled. Cancelling an identifier with
    /// nothing registered is a no-op.
    pub fn cancel(&self, id: &EffectId) -> usize {
        let tokens = lock(&self.entries).remove(id).unwrap_or_default();
        for token in &tokens {
            token.cancel();
        }
        if !tokens.is_empty() {
            tracing::debug!(%id, count = tokens.len(), "Cancelled in-flight effects");
        }
        tokens.len()
    }

    /// Cancel everything in the registry.
    pub fn cancel_all(&self) -> usize {
        let entries = std::mem::take(&mut *lock(&self.entries));
        let mut count = 0;
        for token in entries.into_values().flatten() {
            token.cancel();
            count += 1;
        }
        count
    }

    /// Whether any effect is registered under `id`.
    #[must_use]
    pub fn is_registered(&self, id: &EffectId) -> bool {
        lock(&self.entries).contains_key(id)
    }

    /// Number of identifiers with at least one in-flight effect.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

impl std::fmt::Debug for CancellationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationRegistry")
            .field("ids", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cancel_cascades_to_children_only() {
        let root = CancellationToken::new();
        let child = root.child_token();
        let grandchild = child.child_token();
        let sibling = root.child_token();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert!(!sibling.is_cancelled());
        assert!(!root.is_cancelled());

        root.cancel();
        assert!(sibling.is_cancelled());
    }

    #[test]
    fn child_of_cancelled_token_starts_cancelled() {
        let root = CancellationToken::new();
        root.cancel();
        assert!(root.child_token().is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        token.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[test]
    fn registry_cancel_is_idempotent() {
        let registry = CancellationRegistry::new();
        let id = EffectId::new("search");
        let token = CancellationToken::new();
        registry.register(id.clone(), token.clone());

        assert_eq!(registry.cancel(&id), 1);
        assert!(token.is_cancelled());
        assert!(!registry.is_registered(&id));

        // Second cancel finds nothing and does nothing.
        assert_eq!(registry.cancel(&id), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn deregister_removes_only_the_given_token() {
        let registry = CancellationRegistry::new();
        let id = EffectId::new("timer");
        let first = CancellationToken::new();
        let second = CancellationToken::new();
        registry.register(id.clone(), first.clone());
        registry.register(id.clone(), second.clone());

        registry.deregister(&id, &first);
        assert!(registry.is_registered(&id));

        assert_eq!(registry.cancel(&id), 1);
        assert!(second.is_cancelled());
        assert!(!first.is_cancelled());
    }

    #[test]
    fn registries_are_isolated() {
        let a = CancellationRegistry::new();
        let b = CancellationRegistry::new();
        let id = EffectId::new("shared-name");
        let token = CancellationToken::new();
        a.register(id.clone(), token.clone());

        assert_eq!(b.cancel(&id), 0);
        assert!(!token.is_cancelled());
        assert_eq!(a.cancel_all(), 1);
        assert!(token.is_cancelled());
    }
}
