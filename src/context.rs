//! # Session context
//!
//! Every session owns one context value of a user-chosen type `C` (for the
//! telco pack, [`TelcoContext`](crate::telco::TelcoContext)). It is shared by
//! reference between the agents, tools and handoff hooks of that session
//! through a [`ContextHandle`]; nobody owns it exclusively and it is never
//! replaced wholesale during normal operation.
//!
//! Access is split by capability:
//!
//! - instruction templates and guardrails only ever see `&C` (a read guard or
//!   a snapshot), so they cannot mutate it;
//! - handoff hooks and tools go through [`ContextHandle::update`], which is
//!   refused once the session has been closed.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{AgentsError, Result};

/// Bounds every context type must satisfy to travel through the engine.
pub trait AgentContext: Clone + Send + Sync + 'static {}

impl<T> AgentContext for T where T: Clone + Send + Sync + 'static {}

struct ContextCell<C> {
    value: RwLock<C>,
    closed: AtomicBool,
}

/// Shared, session-scoped handle to the context value.
pub struct ContextHandle<C> {
    inner: Arc<ContextCell<C>>,
}

impl<C> Clone for ContextHandle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: AgentContext> ContextHandle<C> {
    pub fn new(value: C) -> Self {
        Self {
            inner: Arc::new(ContextCell {
                value: RwLock::new(value),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Runs `f` against a shared borrow of the current value.
    pub fn read<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        let guard = self
            .inner
            .value
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Clones the current value.
    pub fn snapshot(&self) -> C {
        self.read(C::clone)
    }

    /// Mutates the value in place.
    ///
    /// Fails with [`AgentsError::Cancelled`] once the handle has been closed,
    /// so work that outlives its session cannot write into it.
    pub fn update<R>(&self, f: impl FnOnce(&mut C) -> R) -> Result<R> {
        if self.is_closed() {
            return Err(AgentsError::Cancelled);
        }
        let mut guard = self
            .inner
            .value
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut guard))
    }

    /// Puts a previously taken snapshot back. Used by transactional turns.
    pub(crate) fn restore(&self, snapshot: C) {
        let mut guard = self
            .inner
            .value
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = snapshot;
    }

    /// Stops accepting mutations. Reads keep working.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl<C: AgentContext + fmt::Debug> fmt::Debug for ContextHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read(|value| {
            f.debug_struct("ContextHandle")
                .field("value", value)
                .field("closed", &self.is_closed())
                .finish()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Facts {
        name: Option<String>,
        visits: u32,
    }

    #[test]
    fn test_update_is_visible_through_clones() {
        let handle = ContextHandle::new(Facts::default());
        let other = handle.clone();

        other
            .update(|f| f.name = Some("Ada".to_string()))
            .unwrap();

        assert_eq!(handle.read(|f| f.name.clone()), Some("Ada".to_string()));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let handle = ContextHandle::new(Facts::default());
        let before = handle.snapshot();
        handle.update(|f| f.visits += 1).unwrap();

        assert_eq!(before.visits, 0);
        assert_eq!(handle.snapshot().visits, 1);
    }

    #[test]
    fn test_closed_handle_rejects_updates() {
        let handle = ContextHandle::new(Facts::default());
        handle.close();

        let result = handle.update(|f| f.visits = 99);
        assert!(matches!(result, Err(AgentsError::Cancelled)));
        assert_eq!(handle.snapshot(), Facts::default());
    }

    #[test]
    fn test_restore_replaces_value() {
        let handle = ContextHandle::new(Facts::default());
        let snapshot = handle.snapshot();
        handle.update(|f| f.visits = 7).unwrap();
        handle.restore(snapshot);

        assert_eq!(handle.snapshot(), Facts::default());
    }
}
