//! # Bus: typed publish/subscribe over a worker pool, with graceful disposal.
//!
//! The [`Bus`] owns the subscription registry, the dispatch queue with its worker
//! threads, and the lifecycle flag.
//!
//! ## Key responsibilities
//! - route each published message to the handlers registered for its exact type
//! - freeze the handler list at publish time (snapshot isolation)
//! - run handlers on worker threads (or their delivery executor), never on the publisher
//! - back [`wait_for_message`](Bus::wait_for_message) with self-removing waiters
//! - dispose: refuse new work, drain admitted jobs, fail pending waits, join workers
//!
//! ## High-level architecture
//! ```text
//! publish::<T>(msg)
//!   ├─► ensure_active()                      (Disposed → Err)
//!   ├─► registry.snapshot(TypeId::of::<T>()) (Arc clone, no copy)
//!   └─► dispatcher.enqueue(DispatchJob { msg, snapshot })
//!                          │
//!              worker threads (FIFO dequeue) ──► handlers, panic-contained
//!
//! dispose()
//!   ├─► disposed = true                      (publish/subscribe/wait now fail fast)
//!   ├─► dispatcher.close()                   (stop admission, keep draining)
//!   ├─► registry.drain_waiters() → abandon(Disposed)
//!   └─► dispatcher.join()                    (after the queue is empty)
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use msgbus::Bus;
//!
//! let bus = Bus::new(1).unwrap();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = seen.clone();
//! bus.subscribe(move |msg: &String| sink.lock().unwrap().push(msg.clone())).unwrap();
//!
//! bus.publish("a".to_string()).unwrap();
//! bus.publish("b".to_string()).unwrap();
//! bus.dispose(); // drains "a" and "b" first
//!
//! assert_eq!(*seen.lock().unwrap(), ["a", "b"]);
//! ```

use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::builder::BusBuilder;
use crate::core::config::BusConfig;
use crate::core::dispatch::{DispatchJob, Dispatcher};
use crate::core::registry::{Envelope, Invoker, Registry, Subscription};
use crate::error::BusError;
use crate::handlers::{
    DeliveryExecutor, Handler, LogPanics, PanicHook, SubscriptionHandle, identity_of,
};
use crate::wait::{self, MessageWait, WaitOptions};

/// Typed in-process message bus.
///
/// ### Properties
/// - **Non-blocking publish**: `publish()` only admits a job to the queue.
/// - **Broadcast**: every handler registered for `T` sees every published `T` once.
/// - **Isolation**: a panicking handler is reported to the [`PanicHook`] and skipped.
/// - **Drop disposes**: dropping the bus drains admitted work and joins the workers.
///
/// Share it across threads with `Arc<Bus>`.
pub struct Bus {
    cfg: BusConfig,
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    disposed: AtomicBool,
}

impl Bus {
    /// Creates a bus with `workers` dispatch threads and default naming.
    ///
    /// Fails with [`BusError::InvalidWorkerCount`] when `workers == 0`.
    pub fn new(workers: usize) -> Result<Self, BusError> {
        Self::with_config(BusConfig {
            workers,
            ..BusConfig::default()
        })
    }

    /// Creates a bus from an explicit configuration, logging handler panics.
    pub fn with_config(cfg: BusConfig) -> Result<Self, BusError> {
        Self::start(cfg, Arc::new(LogPanics))
    }

    /// Starts a [`BusBuilder`] seeded with [`BusConfig::default`].
    pub fn builder() -> BusBuilder {
        BusBuilder::new(BusConfig::default())
    }

    pub(crate) fn start(cfg: BusConfig, hook: Arc<dyn PanicHook>) -> Result<Self, BusError> {
        if cfg.workers == 0 {
            return Err(BusError::InvalidWorkerCount {
                workers: cfg.workers,
            });
        }
        let dispatcher = Dispatcher::start(&cfg, hook)?;

        Ok(Self {
            cfg,
            registry: Registry::new(),
            dispatcher,
            disposed: AtomicBool::new(false),
        })
    }

    /// Publishes `message` to every handler currently registered for `T`.
    ///
    /// Returns as soon as the job is queued; handlers run later on a worker thread.
    /// Publishing a type nobody listens to is accepted and does nothing.
    pub fn publish<T>(&self, message: T) -> Result<(), BusError>
    where
        T: Send + Sync + 'static,
    {
        self.ensure_active()?;

        let Some(snapshot) = self.registry.snapshot(TypeId::of::<T>()) else {
            tracing::trace!(message_type = type_name::<T>(), "no subscribers; dropped");
            return Ok(());
        };
        let message: Envelope = Arc::new(message);
        self.dispatcher
            .enqueue(DispatchJob::new(message, snapshot, type_name::<T>()))
    }

    /// Registers `handler` for messages of type `T`, run on a worker thread.
    pub fn subscribe<T, F>(&self, handler: F) -> Result<SubscriptionHandle, BusError>
    where
        T: Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_handler(Arc::new(handler), None)
    }

    /// Registers `handler` for `T`, delivered through `executor`.
    pub fn subscribe_on<T, F>(
        &self,
        handler: F,
        executor: Arc<dyn DeliveryExecutor>,
    ) -> Result<SubscriptionHandle, BusError>
    where
        T: Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_handler(Arc::new(handler), Some(executor))
    }

    /// Registers a shared [`Handler`], optionally delivered through `executor`.
    ///
    /// Keep a clone of `handler` to remove it later with [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe_handler<T>(
        &self,
        handler: Handler<T>,
        executor: Option<Arc<dyn DeliveryExecutor>>,
    ) -> Result<SubscriptionHandle, BusError>
    where
        T: Send + Sync + 'static,
    {
        self.ensure_active()?;

        let type_id = TypeId::of::<T>();
        let identity = identity_of(&handler);
        let invoker: Invoker = Arc::new(move |envelope: &Envelope| {
            if let Some(message) = (**envelope).downcast_ref::<T>() {
                handler(message);
            }
        });

        let id = self.registry.insert(type_id, |id| Subscription {
            id,
            identity: Some(identity),
            invoker,
            executor,
            waiter: None,
        });
        tracing::debug!(message_type = type_name::<T>(), subscription = %id, "subscribed");

        Ok(SubscriptionHandle {
            id,
            type_id,
            type_name: type_name::<T>(),
        })
    }

    /// Removes the first registration of `handler` for `T`.
    ///
    /// Returns `false` (and does nothing) when `handler` is not registered.
    /// Jobs already queued still deliver to it.
    pub fn unsubscribe<T>(&self, handler: &Handler<T>) -> bool
    where
        T: Send + Sync + 'static,
    {
        let removed = self
            .registry
            .remove_by_identity(TypeId::of::<T>(), identity_of(handler));
        if removed {
            tracing::debug!(message_type = type_name::<T>(), "unsubscribed");
        }
        removed
    }

    /// Removes the registration behind `handle`.
    pub fn unsubscribe_handle(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.registry.remove_by_id(handle.type_id, handle.id);
        if removed {
            tracing::debug!(
                message_type = handle.type_name,
                subscription = %handle.id,
                "unsubscribed"
            );
        }
        removed
    }

    /// Waits for the next `T` accepted by `options`.
    ///
    /// The waiter is registered before this returns, so a message published right after
    /// the call (even before the first `.await`) is observed. The timeout, if any, starts now.
    pub fn wait_for_message<T>(&self, options: WaitOptions<T>) -> Result<MessageWait<T>, BusError>
    where
        T: Send + Sync + 'static,
    {
        self.ensure_active()?;
        let wait = wait::register(&self.registry, options);

        // Dispose may have drained waiters between the check above and the insert.
        if self.is_disposed() {
            return Err(BusError::Disposed);
        }
        Ok(wait)
    }

    /// Shorthand for `wait_for_message(WaitOptions::new())`.
    pub fn next_message<T>(&self) -> Result<MessageWait<T>, BusError>
    where
        T: Send + Sync + 'static,
    {
        self.wait_for_message(WaitOptions::new())
    }

    /// Disposes the bus. Idempotent.
    ///
    /// On the first call:
    /// 1. new `publish`/`subscribe`/`wait_for_message` calls fail with [`BusError::Disposed`];
    /// 2. jobs already queued are still delivered;
    /// 3. pending waits fail with [`BusError::Disposed`];
    /// 4. blocks until the workers have drained the queue and exited.
    ///
    /// Safe to call from inside a handler: the calling worker is not joined.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(thread_name = %self.cfg.thread_name, "disposing bus");

        self.dispatcher.close();

        let waiters = self.registry.drain_waiters();
        let abandoned = waiters.len();
        for waiter in waiters {
            waiter.abandon(BusError::Disposed);
        }

        self.dispatcher.join();
        tracing::debug!(
            thread_name = %self.cfg.thread_name,
            abandoned_waits = abandoned,
            "bus disposed"
        );
    }

    /// True once [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Configuration the bus was built with.
    pub fn config(&self) -> &BusConfig {
        &self.cfg
    }

    /// Registrations (handlers and pending waiters) currently listening to `T`.
    pub fn subscriber_count<T>(&self) -> usize
    where
        T: 'static,
    {
        self.registry.count(TypeId::of::<T>())
    }

    /// Jobs queued but not yet picked up by a worker.
    pub fn pending_jobs(&self) -> usize {
        self.dispatcher.pending()
    }

    fn ensure_active(&self) -> Result<(), BusError> {
        if self.is_disposed() {
            Err(BusError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("cfg", &self.cfg)
            .field("disposed", &self.is_disposed())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    use crate::handlers::{Delivery, HandlerPanic, ThreadExecutor, handler};

    #[test]
    fn test_zero_workers_rejected() {
        let err = Bus::new(0).unwrap_err();
        assert_eq!(err, BusError::InvalidWorkerCount { workers: 0 });
    }

    #[test]
    fn test_publish_never_runs_handler_on_caller_thread() {
        let bus = Bus::new(1).unwrap();
        let caller = std::thread::current().id();
        let (tx, rx) = mpsc::channel();

        bus.subscribe(move |_: &u8| tx.send(std::thread::current().id()).unwrap())
            .unwrap();
        bus.publish(1u8).unwrap();

        let ran_on = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_ne!(ran_on, caller);
    }

    #[test]
    fn test_routing_is_by_exact_type() {
        let bus = Bus::new(1).unwrap();
        let ints = Arc::new(AtomicUsize::new(0));
        let strings = Arc::new(AtomicUsize::new(0));

        let i = ints.clone();
        bus.subscribe(move |_: &u32| {
            i.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let s = strings.clone();
        bus.subscribe(move |_: &String| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        bus.publish(1u32).unwrap();
        bus.publish(2u64).unwrap();
        bus.publish("x".to_string()).unwrap();
        bus.dispose();

        assert_eq!(ints.load(Ordering::SeqCst), 1);
        assert_eq!(strings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_by_identity_leaves_others() {
        let bus = Bus::new(1).unwrap();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let a_hits = hits.clone();
        let a: Handler<u32> = handler(move |n: &u32| a_hits.lock().unwrap().push(("a", *n)));
        let b_hits = hits.clone();
        let b: Handler<u32> = handler(move |n: &u32| b_hits.lock().unwrap().push(("b", *n)));

        bus.subscribe_handler(a.clone(), None).unwrap();
        bus.subscribe_handler(b.clone(), None).unwrap();
        assert_eq!(bus.subscriber_count::<u32>(), 2);

        assert!(bus.unsubscribe(&a));
        assert!(!bus.unsubscribe(&a));
        bus.publish(7u32).unwrap();
        bus.dispose();

        assert_eq!(*hits.lock().unwrap(), vec![("b", 7)]);
    }

    #[test]
    fn test_unsubscribe_handle() {
        let bus = Bus::new(1).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let handle = bus
            .subscribe(move |_: &i64| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(handle.message_type(), "i64");

        assert!(bus.unsubscribe_handle(&handle));
        assert!(!bus.unsubscribe_handle(&handle));
        bus.publish(1i64).unwrap();
        bus.dispose();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_operations_after_dispose_fail_fast() {
        let bus = Bus::new(2).unwrap();
        bus.dispose();
        bus.dispose();

        assert!(bus.is_disposed());
        assert_eq!(bus.publish(1u8), Err(BusError::Disposed));
        assert_eq!(
            bus.subscribe(|_: &u8| {}).unwrap_err(),
            BusError::Disposed
        );
        assert_eq!(bus.next_message::<u8>().unwrap_err(), BusError::Disposed);
        assert!(!bus.unsubscribe(&handler(|_: &u8| {})));
    }

    #[test]
    fn test_panic_hook_receives_reports() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let bus = Bus::builder()
            .with_workers(1)
            .with_panic_hook(move |r: &HandlerPanic| sink.lock().unwrap().push(r.reason.clone()))
            .build()
            .unwrap();

        bus.subscribe(|n: &u32| {
            if *n == 2 {
                panic!("two is bad");
            }
        })
        .unwrap();
        for n in 1..=3u32 {
            bus.publish(n).unwrap();
        }
        bus.dispose();

        assert_eq!(*reports.lock().unwrap(), vec!["two is bad".to_string()]);
    }

    #[test]
    fn test_executor_delivery_runs_on_executor_thread() {
        let bus = Bus::new(2).unwrap();
        let exec = ThreadExecutor::spawn("affinity").unwrap();
        let (tx, rx) = mpsc::channel();

        bus.subscribe_on(
            move |n: &u16| {
                let name = std::thread::current().name().map(str::to_string);
                tx.send((*n, name)).unwrap();
            },
            Arc::new(exec),
        )
        .unwrap();
        bus.publish(5u16).unwrap();

        let (n, name) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(n, 5);
        assert_eq!(name.as_deref(), Some("affinity"));
    }

    #[test]
    fn test_executor_handler_panic_is_reported() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let bus = Bus::builder()
            .with_workers(1)
            .with_panic_hook(move |r: &HandlerPanic| sink.lock().unwrap().push(r.reason.clone()))
            .build()
            .unwrap();
        let exec: Arc<dyn DeliveryExecutor> =
            Arc::new(ThreadExecutor::spawn("exec-panics").unwrap());
        let (tx, rx) = mpsc::channel();

        bus.subscribe_on(
            |n: &u32| {
                if *n == 1 {
                    panic!("exec boom");
                }
            },
            exec.clone(),
        )
        .unwrap();
        bus.subscribe_on(move |n: &u32| tx.send(*n).unwrap(), exec).unwrap();

        for n in 0..3u32 {
            bus.publish(n).unwrap();
        }
        let seen: Vec<u32> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();

        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(*reports.lock().unwrap(), vec!["exec boom".to_string()]);
    }

    fn refusing_executor(_: Delivery) {
        panic!("scheduler down");
    }

    #[test]
    fn test_executor_panicking_on_schedule_is_reported() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let bus = Bus::builder()
            .with_workers(1)
            .with_panic_hook(move |r: &HandlerPanic| {
                sink.lock().unwrap().push((r.subscription, r.reason.clone()))
            })
            .build()
            .unwrap();
        let (tx, rx) = mpsc::channel();

        let refused = bus
            .subscribe_on(|_: &i8| {}, Arc::new(refusing_executor))
            .unwrap();
        bus.subscribe(move |n: &i8| tx.send(*n).unwrap()).unwrap();

        bus.publish(7i8).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);

        bus.publish(8i8).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 8);
        bus.dispose();

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 2);
        assert!(
            reports
                .iter()
                .all(|(id, reason)| *id == refused.id() && reason == "scheduler down")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_racing_dispose_never_leaks() {
        for _ in 0..50 {
            let bus = Arc::new(Bus::new(1).unwrap());
            let start = Arc::new(std::sync::Barrier::new(2));

            let disposer = {
                let bus = bus.clone();
                let start = start.clone();
                std::thread::spawn(move || {
                    start.wait();
                    bus.dispose();
                })
            };

            start.wait();
            let registered = bus.next_message::<u8>();
            disposer.join().unwrap();

            match registered {
                Ok(wait) => assert_eq!(wait.await.unwrap_err(), BusError::Disposed),
                Err(err) => assert_eq!(err, BusError::Disposed),
            }
            assert_eq!(bus.subscriber_count::<u8>(), 0);
        }
    }

    #[test]
    fn test_dispose_from_inside_handler_does_not_deadlock() {
        let bus = Arc::new(Bus::new(1).unwrap());
        let (tx, rx) = mpsc::channel();

        let inner = Arc::downgrade(&bus);
        bus.subscribe(move |_: &()| {
            if let Some(bus) = inner.upgrade() {
                bus.dispose();
            }
            tx.send(()).unwrap();
        })
        .unwrap();
        bus.publish(()).unwrap();

        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(bus.is_disposed());
    }

    #[tokio::test]
    async fn test_pending_wait_counts_as_subscriber_until_settled() {
        let bus = Bus::new(1).unwrap();
        let wait = bus.next_message::<char>().unwrap();
        assert_eq!(bus.subscriber_count::<char>(), 1);

        bus.publish('z').unwrap();
        assert_eq!(*wait.await.unwrap(), 'z');
        assert_eq!(bus.subscriber_count::<char>(), 0);
    }
}
