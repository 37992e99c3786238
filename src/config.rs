use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the session lifecycle coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Width of the window around "now" within which a supplied start time
    /// races immediate completion and gets nudged forward, in seconds.
    pub start_guard_secs: u64,
    /// How far a start time inside the guard window is pushed forward,
    /// in seconds.
    pub start_nudge_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            start_guard_secs: 5,
            start_nudge_secs: 5,
        }
    }
}

impl CoordinatorConfig {
    pub fn start_guard(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.start_guard_secs as i64)
    }

    pub fn start_nudge(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.start_nudge_secs as i64)
    }
}

/// Settings for the live-connection hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// How long a correlated request waits for its response, in seconds.
    pub request_timeout_secs: u64,
    /// Capacity of each connection's outbound event channel.
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            channel_capacity: 256,
        }
    }
}

impl HubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
