//! # Diagnostic hook for contained handler panics.
//!
//! A panicking handler never reaches the publisher and never stops a worker.
//! The panic is caught at the dispatch site and handed to the bus's [`PanicHook`].
//!
//! The default hook is [`LogPanics`], which emits a `tracing` warning:
//! ```text
//! WARN msgbus: handler panicked message_type="app::Order" subscription=sub#3 reason="boom"
//! ```

use std::any::Any;

use super::SubscriptionId;

/// A handler panic caught during dispatch.
#[derive(Debug, Clone)]
pub struct HandlerPanic {
    /// Name of the message type being delivered.
    pub message_type: &'static str,
    /// Registration whose handler panicked.
    pub subscription: SubscriptionId,
    /// Rendered panic payload.
    pub reason: String,
}

impl HandlerPanic {
    pub(crate) fn new(
        message_type: &'static str,
        subscription: SubscriptionId,
        payload: &(dyn Any + Send),
    ) -> Self {
        Self {
            message_type,
            subscription,
            reason: panic_reason(payload),
        }
    }
}

/// Receives handler panics contained by the dispatch workers.
///
/// Called on the thread that ran the handler (a worker, or the delivery executor's thread).
/// Implementations must not panic.
pub trait PanicHook: Send + Sync + 'static {
    /// Reports one contained panic.
    fn on_panic(&self, report: &HandlerPanic);
}

impl<F> PanicHook for F
where
    F: Fn(&HandlerPanic) + Send + Sync + 'static,
{
    fn on_panic(&self, report: &HandlerPanic) {
        self(report)
    }
}

/// Default hook: logs every contained panic with `tracing::warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPanics;

impl PanicHook for LogPanics {
    fn on_panic(&self, report: &HandlerPanic) {
        tracing::warn!(
            message_type = report.message_type,
            subscription = %report.subscription,
            reason = %report.reason,
            "handler panicked"
        );
    }
}

/// Renders a panic payload (`&str` / `String` payloads verbatim).
pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_of(f: impl FnOnce() + std::panic::UnwindSafe) -> Box<dyn Any + Send> {
        std::panic::catch_unwind(f).unwrap_err()
    }

    #[test]
    fn test_panic_reason_renders_common_payloads() {
        let payload = payload_of(|| panic!("static boom"));
        assert_eq!(panic_reason(payload.as_ref()), "static boom");

        let payload = payload_of(|| panic!("formatted {}", 7));
        assert_eq!(panic_reason(payload.as_ref()), "formatted 7");

        let payload = payload_of(|| std::panic::panic_any(13u8));
        assert_eq!(panic_reason(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_closure_is_a_hook() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hook = move |r: &HandlerPanic| sink.lock().unwrap().push(r.reason.clone());
        hook.on_panic(&HandlerPanic {
            message_type: "u32",
            subscription: SubscriptionId(1),
            reason: "x".into(),
        });
        assert_eq!(*seen.lock().unwrap(), vec!["x".to_string()]);
    }
}
