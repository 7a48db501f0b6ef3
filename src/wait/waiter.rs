//! # Waiter: an ephemeral, self-removing subscription bound to a future.
//!
//! ## Lifecycle
//! ```text
//! wait_for_message()
//!   ├─► WaitSlot (oneshot sender behind a mutex: first completion wins)
//!   ├─► registry.insert(waiter invoker)           ← eager, at call time
//!   └─► MessageWait { select!(slot, deadline, token) }
//!
//! settles exactly once, by whichever comes first:
//!   match     (worker)  ─► slot.complete(Ok(msg))        ─► unsubscribe
//!   timeout   (future)  ─► slot.complete(Err(TimedOut))  ─► unsubscribe (guard)
//!   cancel    (future)  ─► slot.complete(Err(Cancelled)) ─► unsubscribe (guard)
//!   dispose   (bus)     ─► slot.complete(Err(Disposed))  ─► removed by drain
//!   drop      (caller)  ─►                                  unsubscribe (guard)
//! ```
//!
//! The losing triggers find the slot already taken and do nothing; the timer and the
//! cancellation listener live inside the future and are dropped with it.

use std::any::TypeId;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::PendingWait;
use super::options::{Filter, WaitOptions};
use crate::core::registry::{Envelope, Invoker, Registry, Subscription};
use crate::error::BusError;
use crate::handlers::SubscriptionId;
use crate::handlers::panic_reason;

type Outcome<T> = Result<Arc<T>, BusError>;

/// One-shot completion shared by the waiter handler, the future and the bus.
struct WaitSlot<T> {
    tx: Mutex<Option<oneshot::Sender<Outcome<T>>>>,
}

impl<T> WaitSlot<T> {
    fn new(tx: oneshot::Sender<Outcome<T>>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Settles the wait; returns `false` if it was already settled.
    fn complete(&self, outcome: Outcome<T>) -> bool {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        match tx {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    fn is_settled(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl<T: Send + Sync + 'static> PendingWait for WaitSlot<T> {
    fn abandon(&self, error: BusError) {
        self.complete(Err(error));
    }
}

/// Point in time after which the wait fails.
#[derive(Clone, Copy, Debug)]
struct Deadline {
    timeout: Duration,
    at: Instant,
}

impl Deadline {
    /// `None` when `timeout` is too large to represent as an instant (never fires).
    fn after(timeout: Duration) -> Option<Self> {
        Instant::now()
            .checked_add(timeout)
            .map(|at| Self { timeout, at })
    }

    fn has_passed(&self) -> bool {
        Instant::now() >= self.at
    }

    fn error(&self) -> BusError {
        BusError::TimedOut {
            timeout: self.timeout,
        }
    }
}

/// Removes the waiter's registration; safe to run more than once.
#[derive(Clone)]
struct Release {
    registry: Weak<Registry>,
    type_id: TypeId,
    id: SubscriptionId,
}

impl Release {
    fn run(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_by_id(self.type_id, self.id);
        }
    }
}

/// Runs [`Release`] when the owning future completes or is dropped.
struct ReleaseOnDrop(Release);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.run();
    }
}

/// Registers a waiter for the next `T` accepted by `options`.
///
/// The registration is in place when this returns, before the future is first polled.
pub(crate) fn register<T>(registry: &Arc<Registry>, options: WaitOptions<T>) -> MessageWait<T>
where
    T: Send + Sync + 'static,
{
    let WaitOptions {
        filter,
        timeout,
        cancel,
    } = options;
    let deadline = timeout.and_then(Deadline::after);

    let (tx, rx) = oneshot::channel();
    let slot = Arc::new(WaitSlot::new(tx));
    let type_id = TypeId::of::<T>();
    let weak = Arc::downgrade(registry);

    let id = registry.insert(type_id, |id| {
        let release = Release {
            registry: weak.clone(),
            type_id,
            id,
        };
        let waiter: Arc<dyn PendingWait> = slot.clone();
        Subscription {
            id,
            identity: None,
            invoker: waiter_invoker(Arc::clone(&slot), filter, deadline, cancel.clone(), release),
            executor: None,
            waiter: Some(waiter),
        }
    });

    tracing::trace!(
        message_type = std::any::type_name::<T>(),
        subscription = %id,
        timeout = ?deadline.map(|d| d.timeout),
        "waiter registered"
    );

    let release = Release {
        registry: weak,
        type_id,
        id,
    };
    MessageWait::new(rx, slot, ReleaseOnDrop(release), deadline, cancel)
}

/// Handler run by the workers for every published `T` while the wait is pending.
fn waiter_invoker<T>(
    slot: Arc<WaitSlot<T>>,
    filter: Option<Filter<T>>,
    deadline: Option<Deadline>,
    cancel: Option<CancellationToken>,
    release: Release,
) -> Invoker
where
    T: Send + Sync + 'static,
{
    Arc::new(move |envelope: &Envelope| {
        if slot.is_settled() {
            return;
        }
        if let Some(reason) = gave_up(deadline, cancel.as_ref()) {
            slot.complete(Err(reason));
            release.run();
            return;
        }
        let Ok(message) = Arc::clone(envelope).downcast::<T>() else {
            return;
        };
        if let Some(filter) = &filter {
            match panic::catch_unwind(AssertUnwindSafe(|| filter(&*message))) {
                Ok(true) => {}
                Ok(false) => return,
                Err(payload) => {
                    tracing::debug!(
                        reason = %panic_reason(payload.as_ref()),
                        "wait filter panicked; still waiting"
                    );
                    return;
                }
            }
        }
        if slot.complete(Ok(message)) {
            release.run();
        }
    })
}

/// Failure that already applies, checked before a late message can win.
fn gave_up(deadline: Option<Deadline>, cancel: Option<&CancellationToken>) -> Option<BusError> {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Some(BusError::Cancelled);
    }
    deadline.filter(Deadline::has_passed).map(|d| d.error())
}

async fn timed_out(deadline: Option<Deadline>) -> BusError {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(deadline.at.into()).await;
            deadline.error()
        }
        None => std::future::pending().await,
    }
}

async fn cancelled(token: Option<CancellationToken>) -> BusError {
    match token {
        Some(token) => {
            token.cancelled().await;
            BusError::Cancelled
        }
        None => std::future::pending().await,
    }
}

/// Future returned by [`Bus::wait_for_message`](crate::Bus::wait_for_message).
///
/// Resolves to the first matching message, or fails with
/// [`BusError::TimedOut`], [`BusError::Cancelled`] or [`BusError::Disposed`].
///
/// ### Notes
/// - Dropping it before it settles unsubscribes the waiter.
/// - With a timeout configured it must be polled inside a tokio runtime with the
///   time driver enabled.
#[must_use = "dropping a MessageWait unsubscribes its waiter"]
pub struct MessageWait<T> {
    inner: BoxFuture<'static, Outcome<T>>,
}

impl<T> MessageWait<T>
where
    T: Send + Sync + 'static,
{
    fn new(
        rx: oneshot::Receiver<Outcome<T>>,
        slot: Arc<WaitSlot<T>>,
        guard: ReleaseOnDrop,
        deadline: Option<Deadline>,
        cancel: Option<CancellationToken>,
    ) -> Self {
        let inner = async move {
            let _guard = guard;
            let mut rx = rx;

            let first = tokio::select! {
                biased;
                received = &mut rx => Ok(received),
                reason = timed_out(deadline) => Err(reason),
                reason = cancelled(cancel) => Err(reason),
            };

            match first {
                Ok(received) => settle(received),
                Err(reason) => {
                    // Loses to a message that settled the slot concurrently.
                    slot.complete(Err(reason));
                    settle(rx.await)
                }
            }
        };
        Self {
            inner: inner.boxed(),
        }
    }
}

fn settle<T>(received: Result<Outcome<T>, oneshot::error::RecvError>) -> Outcome<T> {
    received.unwrap_or(Err(BusError::Disposed))
}

impl<T> Future for MessageWait<T> {
    type Output = Result<Arc<T>, BusError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<T> fmt::Debug for MessageWait<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageWait")
            .field("message_type", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}
