//! # Asynchronous wait for a single message.
//!
//! [`Bus::wait_for_message`](crate::Bus::wait_for_message) registers a short-lived
//! waiter and returns a [`MessageWait`] future that resolves with the next published
//! message of the requested type accepted by the filter.
//!
//! - [`WaitOptions`] filter, timeout and cancellation token
//! - [`MessageWait`] the future; dropping it unsubscribes the waiter
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use msgbus::{Bus, WaitOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), msgbus::BusError> {
//!     let bus = Bus::new(1)?;
//!     let wait = bus.wait_for_message(
//!         WaitOptions::<u32>::new()
//!             .filter(|n| *n >= 2)
//!             .timeout(Duration::from_secs(1)),
//!     )?;
//!
//!     bus.publish(1u32)?;
//!     bus.publish(2u32)?;
//!     assert_eq!(*wait.await?, 2);
//!     Ok(())
//! }
//! ```

mod options;
mod waiter;

pub use options::{Filter, WaitOptions};
pub use waiter::MessageWait;

pub(crate) use waiter::register;

use crate::error::BusError;

/// A waiter the bus can fail from the outside (on dispose).
pub(crate) trait PendingWait: Send + Sync + 'static {
    /// Settles the wait with `error` unless it already settled.
    fn abandon(&self, error: BusError);
}
