//! Bus core: registry, dispatch and lifecycle.
//!
//! The only public API from this module is [`Bus`] with its [`BusBuilder`] and
//! [`BusConfig`]; everything else is wiring.
//!
//! Internal modules:
//! - [`registry`]: type-keyed subscription lists with copy-on-write snapshots;
//! - [`dispatch`]: the shared FIFO queue and the worker threads draining it;
//! - [`bus`]: public surface and the dispose sequence;
//! - [`builder`]: fluent construction with a custom panic hook;
//! - [`config`]: worker count and thread naming.

mod builder;
mod bus;
mod config;
pub(crate) mod dispatch;
pub(crate) mod registry;

pub use builder::BusBuilder;
pub use bus::Bus;
pub use config::{BusConfig, DEFAULT_THREAD_NAME};
