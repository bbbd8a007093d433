//! Application-wide constants for execlink.
//!
//! This module centralizes the timing and bound constants of the protocol
//! engine. The values are policy, not tuning knobs: the reconnect schedule
//! is fixed-delay and attempt-bounded (never computed), and the job timeout
//! is the only local backstop for a job the remote stops answering for.

use std::time::Duration;

// ============================================================================
// Connection
// ============================================================================

/// Default execution host URL.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8765/ws";

/// Timeout for a single WebSocket open attempt.
///
/// Bounds how long the engine's dispatch loop is occupied by a connect,
/// so a black-holed host cannot stall request handling indefinitely.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between automatic reconnect attempts after an unexpected close.
///
/// Fixed, not exponential: the execution host is a single known endpoint
/// and the attempt bound below keeps the schedule finite.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Delay between the disconnect and the fresh connect of a forced reconnect.
pub const FORCE_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Maximum automatic reconnect attempts before the connection is marked
/// failed and left for an explicit `connect`/`force_reconnect`.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

// ============================================================================
// Jobs
// ============================================================================

/// Hard execution timeout for a submitted command.
///
/// If no terminal frame arrives within this window the job is retired
/// locally as timed out and the single job slot is freed.
pub const JOB_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_schedule_is_bounded() {
        assert!(MAX_RECONNECT_ATTEMPTS >= 1);
        // Worst-case automatic retry window stays under a minute
        assert!(RECONNECT_DELAY * MAX_RECONNECT_ATTEMPTS <= Duration::from_secs(60));
    }

    #[test]
    fn test_force_reconnect_is_faster_than_auto() {
        assert!(FORCE_RECONNECT_DELAY < RECONNECT_DELAY);
    }

    #[test]
    fn test_job_timeout_exceeds_connect_timeout() {
        // A job must survive at least one full connect attempt
        assert!(JOB_TIMEOUT > CONNECT_TIMEOUT);
    }
}
