//! Configuration module

use std::time::Duration;

/// Default maximum number of entries kept in a status schedule.
pub const MAX_HISTORY_SIZE: usize = 15;

/// Core tunables
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum entries retained per status schedule
    pub max_history_size: usize,
    /// Deadline applied to a remote back-end attempt before the
    /// dispatcher falls back to local handling
    pub remote_timeout: Duration,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_history_size: MAX_HISTORY_SIZE,
            remote_timeout: Duration::from_secs(30),
            event_capacity: 1024,
        }
    }
}
