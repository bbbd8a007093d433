//! Error taxonomy for the protocol engine.
//!
//! Every failure here is a recoverable state with an explicit recovery
//! action: `NotConnected` and `MaxReconnectAttemptsReached` are cured by
//! `connect`/`force_reconnect`, `Busy` by waiting for the slot to free,
//! `TimedOut` by submitting again. Nothing in this module is fatal to the
//! process.
//!
//! Connection-scoped errors surface through the connection status feed;
//! job-scoped errors surface only through that job's terminal outcome.

/// Errors surfaced by the command execution engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A send was attempted while the connection is not established.
    /// The command was rejected before any frame was written.
    NotConnected,
    /// A command was submitted while another job is still active.
    /// Rejected before any socket interaction.
    Busy,
    /// The socket closed unexpectedly. Triggers the bounded reconnect;
    /// does not by itself fail an in-flight job.
    ConnectionLost,
    /// The automatic reconnect budget is exhausted. The connection stays
    /// failed until an explicit `connect` or `force_reconnect`.
    MaxReconnectAttemptsReached,
    /// No terminal frame arrived within the job timeout; the job was
    /// retired locally.
    TimedOut,
    /// An inbound payload did not match any known frame shape. Dropped and
    /// logged inside the engine, never delivered to a job.
    MalformedFrame(String),
    /// The engine task is gone (client dropped or runtime shut down).
    Closed,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected to execution host"),
            Self::Busy => write!(f, "a job is already running"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::MaxReconnectAttemptsReached => {
                write!(f, "max reconnect attempts reached")
            }
            Self::TimedOut => write!(f, "job timed out"),
            Self::MalformedFrame(msg) => write!(f, "malformed frame: {msg}"),
            Self::Closed => write!(f, "engine closed"),
        }
    }
}

impl std::error::Error for EngineError {}
