//! Connection status tracking and reconnect throttling

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Snapshot of the store's view of the cluster
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,

    /// Reason for the most recent failure
    pub error: Option<String>,

    /// Wall-clock time of the most recent failed attempt
    pub last_attempt: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct HealthState {
    connected: bool,
    indices_ready: bool,
    error: Option<String>,
    last_attempt: Option<Instant>,
    last_attempt_at: Option<DateTime<Utc>>,
}

/// Tracks whether the cluster is reachable and when it was last checked.
///
/// The lock is only held for field updates, never across a request, so
/// concurrent callers may each decide to reconnect in the same window.
#[derive(Debug)]
pub struct ConnectionHealth {
    state: Mutex<HealthState>,
    reconnect_interval: Duration,
}

impl ConnectionHealth {
    pub fn new(reconnect_interval: Duration) -> Self {
        Self {
            state: Mutex::new(HealthState {
                connected: false,
                indices_ready: false,
                error: None,
                last_attempt: None,
                last_attempt_at: None,
            }),
            reconnect_interval,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn indices_ready(&self) -> bool {
        self.state.lock().indices_ready
    }

    pub fn mark_indices_ready(&self) {
        self.state.lock().indices_ready = true;
    }

    pub fn mark_connected(&self) {
        let mut state = self.state.lock();
        state.connected = true;
        state.error = None;
    }

    /// Record a failed attempt and start a new throttle window
    pub fn mark_disconnected(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        state.connected = false;
        state.error = Some(reason.into());
        state.last_attempt = Some(Instant::now());
        state.last_attempt_at = Some(Utc::now());
    }

    /// True when no attempt has been made yet or the throttle window has
    /// passed since the last one
    pub fn reconnect_due(&self) -> bool {
        match self.state.lock().last_attempt {
            Some(at) => at.elapsed() >= self.reconnect_interval,
            None => true,
        }
    }

    pub fn snapshot(&self) -> ConnectionStatus {
        let state = self.state.lock();
        ConnectionStatus {
            connected: state.connected,
            error: state.error.clone(),
            last_attempt: state.last_attempt_at,
        }
    }
}
