//! # Process-wide buses.
//!
//! Two lazily created instances for code that has no bus of its own to pass around:
//! - [`single_worker`]: one worker, delivery order equals publish order;
//! - [`multi_worker`]: one worker per available CPU.
//!
//! They live until the process exits. Calling [`Bus::dispose`] on either one disables
//! it for the rest of the process.

use std::sync::LazyLock;

use crate::core::{Bus, BusConfig, DEFAULT_THREAD_NAME};

static SINGLE: LazyLock<Bus> = LazyLock::new(|| {
    start(BusConfig::single(format!("{DEFAULT_THREAD_NAME}-single")))
});

static MULTI: LazyLock<Bus> = LazyLock::new(|| {
    start(BusConfig {
        thread_name: format!("{DEFAULT_THREAD_NAME}-multi"),
        workers: BusConfig::default_workers(),
    })
});

fn start(cfg: BusConfig) -> Bus {
    Bus::with_config(cfg)
        .unwrap_or_else(|err| panic!("failed to start process-wide message bus: {err}"))
}

/// Process-wide single-worker bus, created on first access.
///
/// # Panics
/// On first access, if the operating system refuses to start the worker thread.
pub fn single_worker() -> &'static Bus {
    &SINGLE
}

/// Process-wide multi-worker bus, created on first access.
///
/// # Panics
/// On first access, if the operating system refuses to start the worker threads.
pub fn multi_worker() -> &'static Bus {
    &MULTI
}
