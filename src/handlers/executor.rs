//! # Delivery executors.
//!
//! By default a handler runs directly on the worker thread that dequeued the job.
//! A subscription may instead carry a [`DeliveryExecutor`]: the worker then hands the
//! (panic-contained) invocation to the executor and moves on to the next handler.
//!
//! ## Architecture
//! ```text
//! worker N ── job ──► handler A (inline)
//!                 ├─► handler B ──► executor.execute(delivery) ──► UI / event-loop thread
//!                 └─► handler C (inline)
//! ```
//!
//! ## Built-in executors
//! - any `Fn(Delivery)` closure
//! - [`TokioExecutor`]: spawns the delivery on a tokio runtime
//! - [`ThreadExecutor`]: a dedicated named thread with its own FIFO queue
//!
//! ## Rules
//! - Deliveries through one executor keep the order in which the worker submitted them
//!   only if the executor itself is FIFO ([`ThreadExecutor`] is).
//! - Disposing the bus drains the dispatch queue; it does not wait for deliveries already
//!   handed to an executor.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::error::BusError;

/// One handler invocation ready to run.
pub type Delivery = Box<dyn FnOnce() + Send + 'static>;

/// Runs handler invocations on a specific thread or context.
pub trait DeliveryExecutor: Send + Sync + 'static {
    /// Schedules `delivery` to run. Must not block on the delivery itself.
    fn execute(&self, delivery: Delivery);

    /// Returns the executor name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F> DeliveryExecutor for F
where
    F: Fn(Delivery) + Send + Sync + 'static,
{
    fn execute(&self, delivery: Delivery) {
        self(delivery)
    }
}

/// Delivers on a tokio runtime.
///
/// Each delivery becomes a spawned task, so deliveries may interleave with other
/// work on that runtime.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Executor targeting the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Executor targeting the runtime the caller is running on.
    ///
    /// Returns `None` outside of a tokio runtime.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl DeliveryExecutor for TokioExecutor {
    fn execute(&self, delivery: Delivery) {
        self.handle.spawn(async move { delivery() });
    }

    fn name(&self) -> &'static str {
        "tokio"
    }
}

/// Delivers on one dedicated, named thread, in submission order.
///
/// Useful when handlers must run on a single affinity thread (UI loops, non-`Sync`
/// resources owned by that thread). Dropping the last clone closes the queue and joins
/// the thread after it has run everything already submitted.
#[derive(Clone)]
pub struct ThreadExecutor {
    inner: Arc<ThreadInner>,
}

struct ThreadInner {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadExecutor {
    /// Starts the delivery thread.
    pub fn spawn(name: impl Into<String>) -> Result<Self, BusError> {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();

        let join = thread::Builder::new().name(name.clone()).spawn(move || {
            while let Some(delivery) = rx.blocking_recv() {
                delivery();
            }
        })?;

        Ok(Self {
            inner: Arc::new(ThreadInner {
                name,
                tx: Mutex::new(Some(tx)),
                join: Mutex::new(Some(join)),
            }),
        })
    }

    /// Name of the delivery thread.
    pub fn thread_name(&self) -> &str {
        &self.inner.name
    }
}

impl DeliveryExecutor for ThreadExecutor {
    fn execute(&self, delivery: Delivery) {
        let tx = self.inner.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let sent = tx.as_ref().is_some_and(|tx| tx.send(delivery).is_ok());
        if !sent {
            tracing::debug!(executor = %self.inner.name, "delivery dropped: executor closed");
        }
    }

    fn name(&self) -> &'static str {
        "thread"
    }
}

impl Drop for ThreadInner {
    fn drop(&mut self) {
        let tx = self.tx.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        drop(tx);

        let join = self.join.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(join) = join {
            if join.thread().id() == thread::current().id() {
                return;
            }
            let _ = join.join();
        }
    }
}
