//! # Subscription registry - type-keyed, copy-on-write handler lists.
//!
//! Maps a message [`TypeId`] to the list of [`Subscription`]s registered for it.
//!
//! ## Architecture
//! ```text
//! routes: RwLock<HashMap<TypeId, Arc<Vec<Subscription>>>>
//!
//! publish  ──► snapshot(type)   → Arc::clone of the current list (O(1), read lock)
//! subscribe ─► insert(type, ..)  → copy-on-write push (write lock)
//! unsubscribe ► remove_*(type, ..) → copy-on-write remove (write lock)
//! dispose  ──► drain_waiters()  → removes every waiter registration, returns their slots
//! ```
//!
//! ## Rules
//! - A snapshot is never mutated after it is handed out: writers replace the list
//!   (`Arc::make_mut`) instead of editing one a queued job still references.
//! - No user code runs while a registry lock is held.
//! - Removal never fails: removing an unknown registration is a no-op.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::handlers::{DeliveryExecutor, SubscriptionId};
use crate::wait::PendingWait;

/// A published message, type-erased.
pub(crate) type Envelope = Arc<dyn Any + Send + Sync>;

/// Type-erased handler invocation.
pub(crate) type Invoker = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Handler list frozen at publish time.
pub(crate) type Snapshot = Arc<Vec<Subscription>>;

/// One registration.
#[derive(Clone)]
pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    /// Address of the user [`Handler`](crate::Handler); `None` for waiters.
    pub(crate) identity: Option<usize>,
    pub(crate) invoker: Invoker,
    pub(crate) executor: Option<Arc<dyn DeliveryExecutor>>,
    /// Completion slot of the waiter backing this registration.
    pub(crate) waiter: Option<Arc<dyn PendingWait>>,
}

/// Thread-safe subscription registry.
pub(crate) struct Registry {
    routes: RwLock<HashMap<TypeId, Snapshot>>,
    next_id: AtomicU64,
}

impl Registry {
    /// Creates an empty registry.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Registers the subscription built by `build` under `type_id`.
    ///
    /// `build` receives the id assigned to the new registration, so self-removing
    /// handlers can capture it.
    pub(crate) fn insert<F>(&self, type_id: TypeId, build: F) -> SubscriptionId
    where
        F: FnOnce(SubscriptionId) -> Subscription,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = build(id);

        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        Arc::make_mut(routes.entry(type_id).or_default()).push(subscription);
        id
    }

    /// Current handler list for `type_id`, or `None` when nobody listens.
    pub(crate) fn snapshot(&self, type_id: TypeId) -> Option<Snapshot> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .get(&type_id)
            .filter(|subs| !subs.is_empty())
            .map(Arc::clone)
    }

    /// Removes the registration with the given id.
    pub(crate) fn remove_by_id(&self, type_id: TypeId, id: SubscriptionId) -> bool {
        self.remove_first(type_id, |sub| sub.id == id)
    }

    /// Removes the first registration whose handler has the given identity.
    pub(crate) fn remove_by_identity(&self, type_id: TypeId, identity: usize) -> bool {
        self.remove_first(type_id, |sub| sub.identity == Some(identity))
    }

    /// Number of registrations (handlers and waiters) for `type_id`.
    pub(crate) fn count(&self, type_id: TypeId) -> usize {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes.get(&type_id).map_or(0, |subs| subs.len())
    }

    /// Removes every waiter registration and returns their completion slots.
    pub(crate) fn drain_waiters(&self) -> Vec<Arc<dyn PendingWait>> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let mut drained = Vec::new();
        let mut removed = Vec::new();

        for subs in routes.values_mut() {
            if subs.iter().all(|sub| sub.waiter.is_none()) {
                continue;
            }
            let (waiters, kept): (Vec<_>, Vec<_>) = Arc::make_mut(subs)
                .drain(..)
                .partition(|sub| sub.waiter.is_some());
            *Arc::make_mut(subs) = kept;

            drained.extend(waiters.iter().filter_map(|sub| sub.waiter.clone()));
            removed.extend(waiters);
        }
        routes.retain(|_, subs| !subs.is_empty());
        drop(routes);
        drop(removed);
        drained
    }

    // ---------------------------
    // Helpers
    // ---------------------------

    fn remove_first<P>(&self, type_id: TypeId, matches: P) -> bool
    where
        P: Fn(&Subscription) -> bool,
    {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subs) = routes.get_mut(&type_id) else {
            return false;
        };
        let Some(pos) = subs.iter().position(|sub| matches(sub)) else {
            return false;
        };

        let removed = Arc::make_mut(subs).remove(pos);
        if subs.is_empty() {
            routes.remove(&type_id);
        }
        drop(routes);
        drop(removed);
        true
    }
}
