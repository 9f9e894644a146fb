//! General configuration settings for the preparation core.

use serde_derive::{Deserialize, Serialize};

use super::Duration;

/// General configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct General {
    /// How long a backend connect that keeps failing with transient errors
    /// is retried before the error is surfaced to the client.
    #[serde(default = "General::default_connect_retry_timeout")]
    pub connect_retry_timeout: Duration,

    /// Pause between two connect attempts.
    #[serde(default = "General::default_connect_retry_interval")]
    pub connect_retry_interval: Duration,

    /// Whether backend connections may be returned to the shared pool and
    /// repurposed for other compatible client sessions.
    #[serde(default)] // false
    pub connection_sharing: bool,

    /// Enforce required connection attributes before a backend connection is
    /// handed to the client.
    #[serde(default)] // false
    pub router_require_enforce: bool,

    /// Make reads on a read-only backend observe the client's own writes
    /// before the command is forwarded.
    #[serde(default = "General::default_wait_for_my_writes")]
    pub wait_for_my_writes: bool,

    /// Server-side timeout for the GTID wait. Zero turns the wait into a
    /// single probe.
    #[serde(default = "General::default_wait_for_my_writes_timeout")]
    pub wait_for_my_writes_timeout: Duration,

    /// Idle backend connections kept per pool.
    #[serde(default = "General::default_pool_capacity")]
    pub pool_capacity: usize,
}

impl General {
    pub fn default_connect_retry_timeout() -> Duration {
        Duration::from_secs(7)
    }

    pub fn default_connect_retry_interval() -> Duration {
        Duration::from_millis(100)
    }

    pub fn default_wait_for_my_writes() -> bool {
        true
    }

    pub fn default_wait_for_my_writes_timeout() -> Duration {
        Duration::from_secs(2)
    }

    pub fn default_pool_capacity() -> usize {
        64
    }
}

impl Default for General {
    fn default() -> General {
        General {
            connect_retry_timeout: General::default_connect_retry_timeout(),
            connect_retry_interval: General::default_connect_retry_interval(),
            connection_sharing: false,
            router_require_enforce: false,
            wait_for_my_writes: General::default_wait_for_my_writes(),
            wait_for_my_writes_timeout: General::default_wait_for_my_writes_timeout(),
            pool_capacity: General::default_pool_capacity(),
        }
    }
}
