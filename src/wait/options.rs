use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Shared message predicate.
pub type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync + 'static>;

/// Options for [`Bus::wait_for_message`](crate::Bus::wait_for_message).
///
/// All fields are optional: the default waits for the next message of the type,
/// forever, without external cancellation.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use msgbus::WaitOptions;
///
/// let token = CancellationToken::new();
/// let opts = WaitOptions::<u32>::new()
///     .filter(|n| n % 2 == 0)
///     .timeout(Duration::from_millis(250))
///     .cancel_on(token.clone());
/// assert_eq!(opts.timeout_duration(), Some(Duration::from_millis(250)));
/// ```
pub struct WaitOptions<T> {
    pub(crate) filter: Option<Filter<T>>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) cancel: Option<CancellationToken>,
}

impl<T> WaitOptions<T> {
    /// Waits for any message of the type, without timeout or cancellation.
    pub fn new() -> Self {
        Self {
            filter: None,
            timeout: None,
            cancel: None,
        }
    }

    /// Only messages for which `filter` returns `true` complete the wait.
    ///
    /// A panicking filter is treated as "no match": the wait stays registered.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Fails the wait with [`BusError::TimedOut`](crate::BusError::TimedOut) if no
    /// matching message arrives within `timeout`, measured from the call to `wait_for_message`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fails the wait with [`BusError::Cancelled`](crate::BusError::Cancelled) once
    /// `token` is cancelled.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Configured timeout, if any.
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
    }
}

impl<T> Default for WaitOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for WaitOptions<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            timeout: self.timeout,
            cancel: self.cancel.clone(),
        }
    }
}

impl<T> fmt::Debug for WaitOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitOptions")
            .field("filter", &self.filter.is_some())
            .field("timeout", &self.timeout)
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}
