//! # Handlers, subscription handles and delivery plumbing.
//!
//! This module provides the user-facing pieces of a subscription:
//! - [`Handler`] shared callback invoked for every published message of its type
//! - [`SubscriptionHandle`] returned by `subscribe*`, usable for removal
//! - [`DeliveryExecutor`] optional target that runs a handler somewhere other than the worker thread
//! - [`PanicHook`] diagnostic hook receiving contained handler panics
//!
//! ## Identity
//! Handlers are compared by `Arc` pointer identity. Subscribing the same [`Handler`]
//! twice creates two registrations; [`Bus::unsubscribe`](crate::Bus::unsubscribe)
//! removes the first one.
//!
//! ## Example
//! ```rust
//! use msgbus::{handler, Handler};
//!
//! let h: Handler<String> = handler(|msg: &String| println!("got {msg}"));
//! let same = h.clone();
//! assert!(std::sync::Arc::ptr_eq(&h, &same));
//! ```

mod executor;
mod panic;

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

pub use executor::{Delivery, DeliveryExecutor, ThreadExecutor, TokioExecutor};
pub use panic::{HandlerPanic, LogPanics, PanicHook};
pub(crate) use panic::panic_reason;

/// Shared message handler (`Arc<dyn Fn(&T)>`).
pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

/// Wraps a closure into a [`Handler`] so it can later be passed to
/// [`Bus::unsubscribe`](crate::Bus::unsubscribe).
pub fn handler<T, F>(f: F) -> Handler<T>
where
    T: 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identifier of one registration, unique per bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Handle to a registration created by `Bus::subscribe*`.
///
/// Dropping the handle does **not** unsubscribe; pass it to
/// [`Bus::unsubscribe_handle`](crate::Bus::unsubscribe_handle) instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub(crate) id: SubscriptionId,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
}

impl SubscriptionHandle {
    /// Registration id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Name of the message type this registration listens to.
    pub fn message_type(&self) -> &'static str {
        self.type_name
    }
}

/// Address used to match a [`Handler`] on unsubscribe.
pub(crate) fn identity_of<T: ?Sized>(handler: &Arc<T>) -> usize {
    Arc::as_ptr(handler) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_follows_arc_not_closure_body() {
        let a: Handler<u32> = handler(|_: &u32| {});
        let b: Handler<u32> = handler(|_: &u32| {});
        assert_eq!(identity_of(&a), identity_of(&a.clone()));
        assert_ne!(identity_of(&a), identity_of(&b));
    }

    #[test]
    fn test_subscription_id_display() {
        assert_eq!(SubscriptionId(42).to_string(), "sub#42");
        assert_eq!(SubscriptionId(42).get(), 42);
    }
}
