//! Handler registry for fanning frames out to message handlers.
//!
//! Handlers are keyed by an id drawn from an atomic counter. The counter
//! starts at 0 and is incremented before use, so the first id is 1. Ids are
//! never reset or reused, even after removal.
//!
//! One mutex guards the map. It is held for insert, remove and for copying
//! the current handlers out in `HandlerRegistry::snapshot`, never while a
//! handler runs, so handlers may register or delete handlers themselves.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::{Callback, Handler};
use crate::connection::ConnectionInner;

/// Registry mapping handler ids to handlers.
#[derive(Debug, Default)]
pub(crate) struct HandlerRegistry {
    /// Handlers by id, iterated in registration order.
    handlers: Mutex<BTreeMap<u64, Arc<Handler>>>,
    /// Last id handed out.
    last_id: AtomicU64,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a handler and return it.
    pub(crate) fn register(
        &self,
        callback: Callback,
        is_async: bool,
        conn: Weak<ConnectionInner>,
    ) -> Arc<Handler> {
        let id = self.last_id.fetch_add(1, Ordering::AcqRel) + 1;
        let handler = Arc::new(Handler::new(id, callback, is_async, conn));

        self.lock().insert(id, handler.clone());
        handler
    }

    /// Remove a handler. Unknown ids are a no-op.
    ///
    /// Returns `true` if a handler was removed.
    pub(crate) fn remove(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Copy of the currently registered handlers, in id order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Handler>> {
        self.lock().values().cloned().collect()
    }

    /// Number of registered handlers.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if no handler is registered.
    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// No code runs under the lock that could panic midway through a
    /// mutation, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Arc<Handler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
