//! # Dispatch queue and worker pool.
//!
//! [`Dispatcher`] owns a single unbounded FIFO queue of [`DispatchJob`]s and the
//! worker threads that drain it.
//!
//! ## Architecture
//! ```text
//! publish() ──► [ job | job | job | ... ]  (one shared FIFO, many producers)
//!                         │
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!       worker 0       worker 1  ...  worker N-1     (dequeue in admission order)
//!          │
//!          └─► for sub in job.snapshot:  invoke (inline or via executor)
//!                                        └─► panic → PanicHook, next handler
//! ```
//!
//! ## Rules
//! - **Non-blocking enqueue**: `enqueue()` never runs handlers and never waits for a worker.
//! - **FIFO admission**: jobs leave the queue in the order they entered it.
//! - **Sequential per job**: handlers of one job run one after another, in registration order.
//! - **Isolation**: a panicking handler is reported and skipped; siblings and later jobs still run.
//! - **Drain on close**: after `close()` no job is admitted, but every admitted job still runs.
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state inconsistent
//! if a handler panics while holding a lock on state it shares with other handlers.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;

use crate::core::config::BusConfig;
use crate::core::registry::{Envelope, Snapshot, Subscription};
use crate::error::BusError;
use crate::handlers::{HandlerPanic, PanicHook};

/// One published message paired with the handlers registered at publish time.
pub(crate) struct DispatchJob {
    message: Envelope,
    snapshot: Snapshot,
    type_name: &'static str,
}

impl DispatchJob {
    pub(crate) fn new(message: Envelope, snapshot: Snapshot, type_name: &'static str) -> Self {
        Self {
            message,
            snapshot,
            type_name,
        }
    }

    /// Invokes every handler of the snapshot, in order.
    fn run(self, hook: &Arc<dyn PanicHook>) {
        tracing::trace!(
            message_type = self.type_name,
            handlers = self.snapshot.len(),
            "dispatching"
        );
        for sub in self.snapshot.iter() {
            deliver(sub, &self.message, self.type_name, hook);
        }
    }
}

/// Runs one handler, inline or through its executor.
fn deliver(
    sub: &Subscription,
    message: &Envelope,
    type_name: &'static str,
    hook: &Arc<dyn PanicHook>,
) {
    let Some(executor) = &sub.executor else {
        invoke(sub, message, type_name, hook.as_ref());
        return;
    };

    let delivery = {
        let sub = sub.clone();
        let message = Arc::clone(message);
        let hook = Arc::clone(hook);
        move || invoke(&sub, &message, type_name, hook.as_ref())
    };
    let handed_off =
        panic::catch_unwind(AssertUnwindSafe(|| executor.execute(Box::new(delivery))));
    if let Err(payload) = handed_off {
        tracing::warn!(
            executor = executor.name(),
            subscription = %sub.id,
            "delivery executor panicked while scheduling"
        );
        report(hook.as_ref(), HandlerPanic::new(type_name, sub.id, payload.as_ref()));
    }
}

/// Calls the handler with panic containment.
fn invoke(sub: &Subscription, message: &Envelope, type_name: &'static str, hook: &dyn PanicHook) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (sub.invoker)(message)));
    if let Err(payload) = outcome {
        report(hook, HandlerPanic::new(type_name, sub.id, payload.as_ref()));
    }
}

/// Hands a report to the hook; a panicking hook is logged and otherwise ignored.
fn report(hook: &dyn PanicHook, report: HandlerPanic) {
    if panic::catch_unwind(AssertUnwindSafe(|| hook.on_panic(&report))).is_err() {
        tracing::error!(subscription = %report.subscription, "panic hook panicked");
    }
}

/// Shared FIFO queue plus the worker threads draining it.
pub(crate) struct Dispatcher {
    tx: RwLock<Option<mpsc::UnboundedSender<DispatchJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
}

impl Dispatcher {
    /// Spawns `cfg.workers` named worker threads.
    ///
    /// If a spawn fails, the workers already started are shut down before returning.
    pub(crate) fn start(cfg: &BusConfig, hook: Arc<dyn PanicHook>) -> Result<Self, BusError> {
        let (tx, rx) = mpsc::unbounded_channel::<DispatchJob>();
        let rx = Arc::new(Mutex::new(rx));
        let pending = Arc::new(AtomicUsize::new(0));

        let dispatcher = Self {
            tx: RwLock::new(Some(tx)),
            workers: Mutex::new(Vec::with_capacity(cfg.workers)),
            pending: Arc::clone(&pending),
        };

        for index in 0..cfg.workers {
            let rx = Arc::clone(&rx);
            let hook = Arc::clone(&hook);
            let pending = Arc::clone(&pending);

            let spawned = thread::Builder::new()
                .name(cfg.worker_thread_name(index))
                .spawn(move || worker_loop(&rx, &hook, &pending));

            match spawned {
                Ok(handle) => dispatcher.lock_workers().push(handle),
                Err(err) => {
                    dispatcher.close();
                    dispatcher.join();
                    return Err(err.into());
                }
            }
        }

        tracing::debug!(
            workers = cfg.workers,
            thread_name = %cfg.thread_name,
            "dispatch workers started"
        );
        Ok(dispatcher)
    }

    /// Admits a job to the queue without blocking.
    ///
    /// Fails with [`BusError::Disposed`] once [`close`](Self::close) has run.
    pub(crate) fn enqueue(&self, job: DispatchJob) -> Result<(), BusError> {
        let tx = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            return Err(BusError::Disposed);
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        if tx.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(BusError::Disposed);
        }
        Ok(())
    }

    /// Stops admission; workers keep draining what was already admitted.
    pub(crate) fn close(&self) {
        let tx = self.tx.write().unwrap_or_else(PoisonError::into_inner).take();
        drop(tx);
    }

    /// Waits for every worker to finish draining and exit.
    ///
    /// A worker never joins itself: when called from a handler, that worker is left
    /// to exit on its own once the queue is empty.
    pub(crate) fn join(&self) {
        let handles: Vec<JoinHandle<()>> = self.lock_workers().drain(..).collect();
        let me = thread::current().id();

        for handle in handles {
            if handle.thread().id() == me {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("dispatch worker terminated abnormally");
            }
        }
    }

    /// Jobs admitted but not yet picked up by a worker.
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Worker body: dequeue, run, repeat until the queue is closed and empty.
fn worker_loop(
    rx: &Mutex<mpsc::UnboundedReceiver<DispatchJob>>,
    hook: &Arc<dyn PanicHook>,
    pending: &AtomicUsize,
) {
    loop {
        let job = {
            let mut rx = rx.lock().unwrap_or_else(PoisonError::into_inner);
            rx.blocking_recv()
        };
        let Some(job) = job else {
            break;
        };
        pending.fetch_sub(1, Ordering::SeqCst);
        job.run(hook);
    }
    tracing::trace!(worker = ?thread::current().name(), "dispatch worker exiting");
}
