use std::sync::Arc;

use super::bus::Bus;
use super::config::BusConfig;
use crate::error::BusError;
use crate::handlers::{LogPanics, PanicHook};

/// Builder for constructing a [`Bus`] with optional features.
///
/// ## Example
/// ```rust
/// use msgbus::{Bus, HandlerPanic};
///
/// let bus = Bus::builder()
///     .with_thread_name("orders")
///     .with_workers(2)
///     .with_panic_hook(|report: &HandlerPanic| eprintln!("{}: {}", report.message_type, report.reason))
///     .build()
///     .unwrap();
/// assert_eq!(bus.config().workers, 2);
/// ```
pub struct BusBuilder {
    cfg: BusConfig,
    hook: Arc<dyn PanicHook>,
}

impl BusBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: BusConfig) -> Self {
        Self {
            cfg,
            hook: Arc::new(LogPanics),
        }
    }

    /// Sets the worker thread name prefix.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.cfg.thread_name = name.into();
        self
    }

    /// Sets the number of worker threads (validated by [`build`](Self::build)).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.cfg.workers = workers;
        self
    }

    /// Replaces the default [`LogPanics`] hook.
    pub fn with_panic_hook<H: PanicHook>(mut self, hook: H) -> Self {
        self.hook = Arc::new(hook);
        self
    }

    /// Builds the bus and starts its workers.
    ///
    /// Fails with [`BusError::InvalidWorkerCount`] for zero workers, or
    /// [`BusError::SpawnFailed`] if a worker thread cannot be started.
    pub fn build(self) -> Result<Bus, BusError> {
        Bus::start(self.cfg, self.hook)
    }
}
