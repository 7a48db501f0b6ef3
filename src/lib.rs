//! # msgbus
//!
//! **msgbus** is a typed, in-process publish/subscribe bus for Rust.
//!
//! Messages are routed by their concrete type. Publishing never runs handlers on the
//! caller's thread: each publish snapshots the handlers registered for the type and
//! queues one dispatch job, which a fixed pool of worker threads drains in FIFO order.
//! A one-shot, filtered, cancellable [`wait_for_message`](Bus::wait_for_message)
//! is built on the same subscriptions.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   publisher A        publisher B        publisher C
//!        │ publish::<T>     │                  │
//!        ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Bus                                                              │
//! │  - Registry   TypeId → Arc<[Subscription]>  (snapshot on publish) │
//! │  - Dispatcher single FIFO queue of DispatchJob{ msg, snapshot }   │
//! │  - lifecycle  Active ──dispose()──► Disposed (one way)            │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!    worker 0           worker 1    ...    worker N-1
//!        │
//!        ├─► handler 1 (inline)                ─┐
//!        ├─► handler 2 ──► DeliveryExecutor     ├─ panics caught → PanicHook
//!        └─► waiter   ──► filter → settle future ─┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Bus::new(workers) ──► Active
//!   publish / subscribe / unsubscribe / wait_for_message
//! dispose()
//!   ├─► refuse new publish / subscribe / wait   (BusError::Disposed)
//!   ├─► close queue, workers keep draining admitted jobs
//!   ├─► fail pending waits                      (BusError::Disposed)
//!   └─► join workers
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                        |
//! |-------------------|-----------------------------------------------------------------|-------------------------------------------|
//! | **Bus**           | Publish, subscribe, unsubscribe, dispose.                       | [`Bus`], [`BusBuilder`], [`BusConfig`]    |
//! | **Handlers**      | Shared callbacks, identity-based removal, handles.              | [`Handler`], [`SubscriptionHandle`]       |
//! | **Delivery**      | Run a handler on a specific thread or runtime.                  | [`DeliveryExecutor`], [`ThreadExecutor`]  |
//! | **Waiting**       | One-shot filtered wait with timeout/cancellation.               | [`WaitOptions`], [`MessageWait`]          |
//! | **Diagnostics**   | Contained handler panics.                                       | [`PanicHook`], [`LogPanics`]              |
//! | **Errors**        | Typed errors for configuration, lifecycle, and waits.           | [`BusError`]                              |
//! | **Shared buses**  | Lazily created process-wide instances.                          | [`single_worker`], [`multi_worker`]       |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use msgbus::{Bus, WaitOptions};
//!
//! #[derive(Debug)]
//! struct OrderPlaced { id: u64 }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), msgbus::BusError> {
//!     let bus = Bus::builder().with_thread_name("orders").with_workers(2).build()?;
//!
//!     bus.subscribe(|ev: &OrderPlaced| println!("order {} placed", ev.id))?;
//!
//!     let wait = bus.wait_for_message(
//!         WaitOptions::<OrderPlaced>::new()
//!             .filter(|ev| ev.id == 42)
//!             .timeout(Duration::from_secs(1)),
//!     )?;
//!
//!     bus.publish(OrderPlaced { id: 7 })?;
//!     bus.publish(OrderPlaced { id: 42 })?;
//!
//!     let placed = wait.await?;
//!     assert_eq!(placed.id, 42);
//!
//!     bus.dispose();
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod global;
mod handlers;
mod wait;

// ---- Public re-exports ----

pub use crate::core::{Bus, BusBuilder, BusConfig, DEFAULT_THREAD_NAME};
pub use error::BusError;
pub use global::{multi_worker, single_worker};
pub use handlers::{
    Delivery, DeliveryExecutor, Handler, HandlerPanic, LogPanics, PanicHook, SubscriptionHandle,
    SubscriptionId, ThreadExecutor, TokioExecutor, handler,
};
pub use wait::{Filter, MessageWait, WaitOptions};
