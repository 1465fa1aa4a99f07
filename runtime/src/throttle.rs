//! Per-identifier throttle windows.
//!
//! Each store keeps one window per throttle [`EffectId`]. A window remembers
//! when it last emitted and holds at most one buffered action; the store
//! schedules a single flush per window at `last emission + interval`.
//!
//! A window with nothing buffered whose interval has run out behaves exactly
//! like a fresh one, so such windows are dropped on the next offer.

use chrono::{DateTime, Utc};
use reducer_kit_core::EffectId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What to do with an action offered to a throttle window.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Offer<A> {
    /// The window is quiescent: emit right away.
    EmitNow(A),
    /// The action was buffered and a flush must be scheduled `after` from now.
    ScheduleFlush {
        /// Time until the window reopens.
        after: Duration,
    },
    /// The action was buffered; a flush is already scheduled.
    Buffered,
}

struct Window<A> {
    last_emitted: Option<DateTime<Utc>>,
    interval: Duration,
    pending: Option<A>,
}

impl<A> Window<A> {
    const fn new(interval: Duration) -> Self {
        Self {
            last_emitted: None,
            interval,
            pending: None,
        }
    }

    fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.pending.is_some() || self.last_emitted.is_some_and(|last| since(last, now) < self.interval)
    }
}

fn since(then: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or(Duration::ZERO)
}

/// Throttle state for one store.
pub(crate) struct ThrottleWindows<A> {
    windows: Arc<Mutex<HashMap<EffectId, Window<A>>>>,
}

impl<A> Clone for ThrottleWindows<A> {
    fn clone(&self) -> Self {
        Self {
            windows: Arc::clone(&self.windows),
        }
    }
}

impl<A> Default for ThrottleWindows<A> {
    fn default() -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<A> ThrottleWindows<A> {
    fn lock(&self) -> MutexGuard<'_, HashMap<EffectId, Window<A>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer an action emitted at `now` to the window for `id`.
    ///
    /// With `latest`, a newer action replaces the buffered one; otherwise the
    /// first buffered action is kept.
    pub(crate) fn offer(
        &self,
        id: &EffectId,
        action: A,
        now: DateTime<Utc>,
        interval: Duration,
        latest: bool,
    ) -> Offer<A> {
        let mut windows = self.lock();
        windows.retain(|_, window| window.is_open(now));

        let window = windows.entry(id.clone()).or_insert_with(|| Window::new(interval));
        window.interval = interval;

        let Some(last) = window.last_emitted else {
            window.last_emitted = Some(now);
            return Offer::EmitNow(action);
        };

        let elapsed = since(last, now);
        if window.pending.is_none() && elapsed >= interval {
            window.last_emitted = Some(now);
            return Offer::EmitNow(action);
        }

        let flush_scheduled = window.pending.is_some();
        window.pending = Some(if latest {
            action
        } else {
            window.pending.take().unwrap_or(action)
        });

        if flush_scheduled {
            Offer::Buffered
        } else {
            Offer::ScheduleFlush {
                after: interval.saturating_sub(elapsed),
            }
        }
    }

    /// Take the buffered action for `id`, marking the window as emitted at `now`.
    pub(crate) fn take_pending(&self, id: &EffectId, now: DateTime<Utc>) -> Option<A> {
        let mut windows = self.lock();
        let window = windows.get_mut(id)?;
        let pending = window.pending.take();
        if pending.is_some() {
            window.last_emitted = Some(now);
        }
        pending
    }

    /// Drop the buffered action for `id` after its flush was cancelled.
    pub(crate) fn discard_pending(&self, id: &EffectId) {
        if let Some(window) = self.lock().get_mut(id) {
            window.pending = None;
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }
}
