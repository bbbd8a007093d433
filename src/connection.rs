//! Connection state and the bounded reconnect policy.
//!
//! The engine task is the only writer of connection state; observers get a
//! [`tokio::sync::watch`] receiver of [`ConnectionStatus`] via the facade.
//!
//! Reconnection is fixed-delay and attempt-bounded. [`ReconnectPolicy`] is
//! a plain counter so the schedule can be unit tested without any sockets:
//! each unexpected close asks the policy for a decision, a successful open
//! or a manual `connect`/`force_reconnect` resets it.

use std::time::Duration;

/// Lifecycle state of the socket connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket, no pending retry.
    #[default]
    Disconnected,
    /// A socket open is in flight.
    Connecting,
    /// Socket established; frames flow.
    Connected,
    /// Unexpected close; a fixed-delay retry is scheduled.
    Reconnecting {
        /// Automatic attempt number (1-based).
        attempt: u32,
    },
    /// Reconnect budget exhausted. Cleared only by an explicit
    /// `connect` or `force_reconnect`.
    Failed {
        /// Why the connection was given up on.
        error: String,
    },
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting { attempt } => {
                write!(f, "reconnecting (attempt {attempt})")
            }
            ConnectionState::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Observable connection status, published through a watch channel.
///
///// Invariant: `session_id` is `Some` only while [`ConnectionState::Connected`]
/// or while reconnecting after having been connected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Session id assigned by the remote on handshake.
    pub session_id: Option<String>,
    /// Most recent connection-scoped error, if any.
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    /// True when frames can currently be sent.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Decision returned by [`ReconnectPolicy::on_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Schedule another attempt after the fixed delay.
    Retry {
        /// Attempt number about to run (1-based).
        attempt: u32,
    },
    /// The attempt budget is spent; stop retrying.
    GiveUp,
}

/// Fixed-delay, attempt-bounded reconnect accounting.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    attempt: u32,
    max_attempts: u32,
    delay: Duration,
}

impl ReconnectPolicy {
    /// Create a policy with the given bound and fixed delay.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            delay,
        }
    }

    /// Record an unexpected close or failed open attempt.
    ///
    /// Check-then-increment: attempts 1..=max are scheduled, the close
    /// after the final attempt yields [`ReconnectDecision::GiveUp`].
    pub fn on_failure(&mut self) -> ReconnectDecision {
        if self.attempt < self.max_attempts {
            self.attempt += 1;
            ReconnectDecision::Retry {
                attempt: self.attempt,
            }
        } else {
            ReconnectDecision::GiveUp
        }
    }

    /// Reset the counter: successful open, explicit connect, or forced
    /// reconnect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// The fixed delay before each scheduled attempt.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Attempts consumed since the last reset.
    #[must_use]
    pub fn attempts_used(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::new(5, Duration::from_secs(3))
    }

    #[test]
    fn test_retries_are_numbered_from_one() {
        let mut p = policy();
        assert_eq!(p.on_failure(), ReconnectDecision::Retry { attempt: 1 });
        assert_eq!(p.on_failure(), ReconnectDecision::Retry { attempt: 2 });
    }

    #[test]
    fn test_gives_up_after_budget_spent() {
        let mut p = policy();
        for expected in 1..=5 {
            assert_eq!(
                p.on_failure(),
                ReconnectDecision::Retry { attempt: expected }
            );
        }
        // The close after attempt 5 stops the schedule; no sixth attempt.
        assert_eq!(p.on_failure(), ReconnectDecision::GiveUp);
        assert_eq!(p.on_failure(), ReconnectDecision::GiveUp);
    }

    #[test]
    fn test_reset_restores_full_budget() {
        let mut p = policy();
        for _ in 0..5 {
            p.on_failure();
        }
        assert_eq!(p.on_failure(), ReconnectDecision::GiveUp);

        p.reset();
        assert_eq!(p.attempts_used(), 0);
        assert_eq!(p.on_failure(), ReconnectDecision::Retry { attempt: 1 });
    }

    #[test]
    fn test_delay_is_fixed() {
        let mut p = policy();
        let d = p.delay();
        p.on_failure();
        p.on_failure();
        // Never grows between attempts
        assert_eq!(p.delay(), d);
    }

    #[test]
    fn test_default_status_is_disconnected() {
        let status = ConnectionStatus::default();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(status.session_id.is_none());
        assert!(!status.is_connected());
    }
}
