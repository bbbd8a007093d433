//! Public facade over the engine task.
//!
//! [`CommandClient`] is a cheap handle: a request sender plus a watch
//! receiver for connection status. Cloning it shares the same engine task.
//! When the last clone is dropped the inbox closes and the engine task
//! shuts down, closing the socket on the way out.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::config::Config;
use crate::connection::{ConnectionState, ConnectionStatus};
use crate::engine::{self, EngineRequest};
use crate::error::EngineError;
use crate::job::{JobHandle, JobOutcome};

/// Handle to a remote command-execution session.
///
/// Must be created inside a tokio runtime; construction spawns the engine
/// task that owns the socket and all protocol state.
#[derive(Debug, Clone)]
pub struct CommandClient {
    requests: mpsc::UnboundedSender<EngineRequest>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl CommandClient {
    /// Spawn the engine task. The client starts disconnected; call
    /// [`connect`](Self::connect) to open the socket.
    pub fn new(config: Config) -> Self {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        tokio::spawn(engine::run(config, status_tx, req_rx));
        Self {
            requests: req_tx,
            status_rx,
        }
    }

    /// Open the socket. No-op if already connected or connecting.
    pub fn connect(&self) -> Result<(), EngineError> {
        self.send(EngineRequest::Connect)
    }

    /// Close the socket deterministically. Cancels any pending reconnect;
    /// the state settles at Disconnected, never Reconnecting.
    pub fn disconnect(&self) -> Result<(), EngineError> {
        self.send(EngineRequest::Disconnect)
    }

    /// Tear the socket down and reconnect fresh after a short delay, with
    /// the reconnect attempt budget restored.
    pub fn force_reconnect(&self) -> Result<(), EngineError> {
        self.send(EngineRequest::ForceReconnect)
    }

    /// Snapshot of the current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to connection status changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Wait until the connection is established. This waits for the
    /// socket, not the session id; the handshake ack may still be pending
    /// when this returns.
    ///
    /// # Errors
    ///
    /// [`EngineError::MaxReconnectAttemptsReached`] if the engine gives up
    /// first, [`EngineError::TimedOut`] if `timeout` elapses,
    /// [`EngineError::Closed`] if the engine task is gone.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), EngineError> {
        let mut rx = self.status_rx.clone();
        let wait = async {
            loop {
                {
                    let status = rx.borrow_and_update();
                    if status.is_connected() {
                        return Ok(());
                    }
                    if matches!(status.state, ConnectionState::Failed { .. }) {
                        return Err(EngineError::MaxReconnectAttemptsReached);
                    }
                }
                if rx.changed().await.is_err() {
                    return Err(EngineError::Closed);
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| EngineError::TimedOut)?
    }

    /// Submit a command and get a handle streaming its output.
    ///
    /// # Errors
    ///
    /// [`EngineError::Busy`] if a job is already in flight (one at a time),
    /// [`EngineError::NotConnected`] if there is no live socket,
    /// [`EngineError::ConnectionLost`] if the socket died mid-send.
    pub async fn execute(&self, command: impl Into<String>) -> Result<JobHandle, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineRequest::Submit {
            command: command.into(),
            reply: tx,
        })?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    /// Submit a command and wait for the terminal outcome, discarding the
    /// live stream. The outcome carries the full line buffer.
    pub async fn execute_collect(
        &self,
        command: impl Into<String>,
    ) -> Result<JobOutcome, EngineError> {
        let mut handle = self.execute(command).await?;
        while handle.next_line().await.is_some() {}
        handle.outcome().await
    }

    /// Whether the single job slot is currently occupied.
    pub async fn has_running_job(&self) -> Result<bool, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineRequest::IsBusy { reply: tx })?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    /// Ask the remote to cancel the active job. Advisory: the job ends only
    /// when a terminal frame arrives (or the timeout fires). No-op when no
    /// job id has been correlated yet.
    pub fn kill_current_job(&self) -> Result<(), EngineError> {
        self.send(EngineRequest::Kill)
    }

    /// Query the remote for the active job's status. Purely observational;
    /// state changes only in response to the answering frames.
    pub fn check_job_status(&self) -> Result<(), EngineError> {
        self.send(EngineRequest::CheckStatus)
    }

    fn send(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.requests.send(req).map_err(|_| EngineError::Closed)
    }
}
