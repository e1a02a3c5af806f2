//! Configuration for the session executor.

use std::ops::Range;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for session establishment, fail-over and shutdown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session timeout requested in the handshake
    pub session_timeout: Duration,

    /// Random delay drawn before a resumption handshake.
    ///
    /// Members that are reconfiguring refuse connections for a moment, so
    /// resumption waits a little before knocking.
    pub resume_backoff: Range<Duration>,

    /// Upper bound on the graceful disconnect at shutdown when no session
    /// timeout has been negotiated yet
    pub shutdown_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(30),
            resume_backoff: Duration::from_millis(1000)..Duration::from_millis(2000),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    /// Create a configuration with the given session timeout.
    pub fn new(session_timeout: Duration) -> Self {
        Self {
            session_timeout,
            ..Self::default()
        }
    }

    /// Replace the resumption backoff range.
    ///
    /// An empty range disables the backoff.
    pub fn with_resume_backoff(mut self, backoff: Range<Duration>) -> Self {
        self.resume_backoff = backoff;
        self
    }

    /// Create a configuration for low-latency local ensembles.
    pub fn local_network() -> Self {
        Self {
            session_timeout: Duration::from_secs(4),
            resume_backoff: Duration::from_millis(1000)..Duration::from_millis(2000),
            shutdown_timeout: Duration::from_secs(1),
        }
    }

    /// Create a configuration for high-latency WAN ensembles.
    pub fn wan_network() -> Self {
        Self {
            session_timeout: Duration::from_secs(60),
            resume_backoff: Duration::from_millis(1000)..Duration::from_millis(2000),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}
