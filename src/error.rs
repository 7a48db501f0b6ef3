//! Error types used by the message bus.
//!
//! [`BusError`] covers every failure the bus can surface:
//!
//! - **configuration**: rejected at construction ([`BusError::InvalidWorkerCount`],
//!   [`BusError::SpawnFailed`]);
//! - **lifecycle**: operations issued after [`Bus::dispose`](crate::Bus::dispose)
//!   ([`BusError::Disposed`]);
//! - **waits**: a [`MessageWait`](crate::MessageWait) that gave up before a matching
//!   message arrived ([`BusError::TimedOut`], [`BusError::Cancelled`]).
//!
//! Handler panics are never returned to callers; they are contained at the dispatch
//! site and reported through a [`PanicHook`](crate::PanicHook).

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the message bus.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus was configured with zero worker threads.
    #[error("worker count must be at least 1, got {workers}")]
    InvalidWorkerCount {
        /// The rejected worker count.
        workers: usize,
    },

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread: {reason}")]
    SpawnFailed {
        /// The underlying I/O error message.
        reason: String,
    },

    /// The bus has been disposed; no new work is accepted.
    #[error("message bus has been disposed")]
    Disposed,

    /// A wait elapsed before a matching message was published.
    #[error("wait timed out after {timeout:?}")]
    TimedOut {
        /// The configured wait timeout.
        timeout: Duration,
    },

    /// A wait was cancelled through its cancellation token.
    #[error("wait cancelled")]
    Cancelled,
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use msgbus::BusError;
    ///
    /// assert_eq!(BusError::Disposed.as_label(), "bus_disposed");
    /// assert_eq!(BusError::InvalidWorkerCount { workers: 0 }.as_label(), "bus_invalid_worker_count");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::InvalidWorkerCount { .. } => "bus_invalid_worker_count",
            BusError::SpawnFailed { .. } => "bus_spawn_failed",
            BusError::Disposed => "bus_disposed",
            BusError::TimedOut { .. } => "wait_timed_out",
            BusError::Cancelled => "wait_cancelled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            BusError::InvalidWorkerCount { workers } => format!("invalid worker count: {workers}"),
            BusError::SpawnFailed { reason } => format!("spawn failed: {reason}"),
            BusError::Disposed => "bus disposed".to_string(),
            BusError::TimedOut { timeout } => format!("timeout: {timeout:?}"),
            BusError::Cancelled => "wait cancelled".to_string(),
        }
    }

    /// Indicates whether a wait ended because it gave up (timeout or cancellation).
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use msgbus::BusError;
    ///
    /// assert!(BusError::Cancelled.is_cancellation());
    /// assert!(BusError::TimedOut { timeout: Duration::from_millis(5) }.is_cancellation());
    /// assert!(!BusError::Disposed.is_cancellation());
    /// ```
    pub fn is_cancellation(&self) -> bool {
        matches!(self, BusError::TimedOut { .. } | BusError::Cancelled)
    }
}

impl From<std::io::Error> for BusError {
    fn from(err: std::io::Error) -> Self {
        BusError::SpawnFailed {
            reason: err.to_string(),
        }
    }
}
