//! Executor configuration.

use std::time::Duration;

/// Tunables of an [`Executor`](crate::Executor).
///
/// # Fields
///
/// - `poll_interval` - Longest a pending script promise waits for engine
///   activity before it is checked again (default: 100 ms). Pending promises
///   are woken as soon as anything runs in the context, so this only bounds
///   the idle re-check.
/// - `max_depth` - Nesting depth after which a result is treated as cyclic
///   (default: 256)
/// - `install_console` - Whether scripts get a `console` object (default: true)
///
/// # Example
///
/// ```
/// use portal_executor::ExecutorConfig;
/// use std::time::Duration;
///
/// let config = ExecutorConfig::new()
///     .with_poll_interval(Duration::from_millis(5))
///     .with_max_depth(64);
/// assert!(config.install_console);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    pub poll_interval: Duration,
    pub max_depth: usize,
    pub install_console: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_depth: 256,
            install_console: true,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_console(mut self, install: bool) -> Self {
        self.install_console = install;
        self
    }
}
