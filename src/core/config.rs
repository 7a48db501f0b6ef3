//! # Bus configuration.
//!
//! Provides [`BusConfig`] centralized settings for a [`Bus`](crate::Bus).
//!
//! Config is used in two ways:
//! 1. **Direct construction**: `Bus::with_config(config)`
//! 2. **Builder seed**: `Bus::builder().with_workers(4)` starts from `BusConfig::default()`
//!
//! ## Validation
//! - `workers = 0` is rejected with [`BusError::InvalidWorkerCount`](crate::BusError::InvalidWorkerCount)
//!   when the bus is built; it is never clamped.

use std::num::NonZeroUsize;

/// Default prefix for worker thread names.
pub const DEFAULT_THREAD_NAME: &str = "msgbus";

/// Configuration for a message bus.
///
/// ## Field semantics
/// - `thread_name`: prefix for worker thread names (`"{thread_name}-{index}"`)
/// - `workers`: number of dispatch worker threads (must be `>= 1`)
///
/// ## Ordering
/// With `workers == 1` handler side effects follow publish order exactly.
/// With more workers, jobs are still dequeued in publish order but may run concurrently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusConfig {
    /// Prefix used to name worker threads; shows up in debuggers and panic messages.
    pub thread_name: String,

    /// Number of worker threads draining the dispatch queue.
    pub workers: usize,
}

impl BusConfig {
    /// Single-worker configuration: fully deterministic delivery order.
    pub fn single(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
            workers: 1,
        }
    }

    /// Returns the thread name for the worker at `index`.
    #[inline]
    pub fn worker_thread_name(&self, index: usize) -> String {
        format!("{}-{index}", self.thread_name)
    }

    /// Worker count matching the host's available parallelism (at least 1).
    pub fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }
}

impl Default for BusConfig {
    /// Default configuration:
    ///
    /// - `thread_name = "msgbus"`
    /// - `workers = available_parallelism()` (falls back to 1)
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            workers: Self::default_workers(),
        }
    }
}
